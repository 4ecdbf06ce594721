//! Synthetic activity file builder for tests

use super::compute_crc;
use std::collections::HashMap;

/// Builds a byte-exact activity file from definition and data records
pub struct FitBuilder {
    header_length: u8,
    records: Vec<u8>,
    layouts: HashMap<u8, (bool, Vec<u8>)>,
}

impl FitBuilder {
    pub fn new() -> Self {
        Self {
            header_length: 14,
            records: Vec::new(),
            layouts: HashMap::new(),
        }
    }

    pub fn header_length(mut self, len: u8) -> Self {
        self.header_length = len;
        self
    }

    /// Append a definition record; `fields` are (number, width, base type).
    pub fn definition(mut self, local: u8, global: u16, little_endian: bool, fields: &[(u8, u8, u8)]) -> Self {
        self.records.push(0x40 | (local & 0x0F));
        self.records.push(0);
        self.records.push(if little_endian { 0 } else { 1 });
        if little_endian {
            self.records.extend_from_slice(&global.to_le_bytes());
        } else {
            self.records.extend_from_slice(&global.to_be_bytes());
        }
        self.records.push(fields.len() as u8);
        for &(number, width, base) in fields {
            self.records.extend_from_slice(&[number, width, base]);
        }
        self.layouts.insert(
            local,
            (little_endian, fields.iter().map(|f| f.1).collect()),
        );
        self
    }

    /// Append a data record encoded with the layout last defined for `local`.
    pub fn data(mut self, local: u8, values: &[u32]) -> Self {
        let (little_endian, widths) = self.layouts[&local].clone();
        assert_eq!(widths.len(), values.len(), "value count must match layout");

        self.records.push(local & 0x0F);
        for (&width, &value) in widths.iter().zip(values) {
            let bytes = if little_endian {
                value.to_le_bytes()
            } else {
                value.to_be_bytes()
            };
            match (width, little_endian) {
                (1, _) => self.records.push(value as u8),
                (2, true) => self.records.extend_from_slice(&bytes[..2]),
                (2, false) => self.records.extend_from_slice(&bytes[2..]),
                (4, _) => self.records.extend_from_slice(&bytes),
                (n, _) => self.records.extend(std::iter::repeat(0).take(n as usize)),
            }
        }
        self
    }

    /// Append bytes verbatim to the record section.
    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.records.extend_from_slice(bytes);
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(usize::from(self.header_length) + self.records.len() + 2);
        out.push(self.header_length);
        out.push(0x20);
        out.extend_from_slice(&2132u16.to_le_bytes());
        out.extend_from_slice(&(self.records.len() as u32).to_le_bytes());
        out.extend_from_slice(b".FIT");
        while out.len() < usize::from(self.header_length) {
            out.push(0);
        }
        out.extend_from_slice(&self.records);
        let crc = compute_crc(0, &out);
        out.extend_from_slice(&crc.to_le_bytes());
        out
    }
}

/// Seconds between the Unix epoch and the file format's epoch (1989-12-31)
pub const FIT_EPOCH_UNIX: u32 = 631_065_600;

/// Session and sample content for [`activity_file`]
pub struct ActivitySpec {
    pub sport: u8,
    /// Unix timestamp of the session start, or `None` to omit it
    pub start_unix: Option<u32>,
    pub elapsed_ms: u32,
    pub distance_cm: u32,
    pub avg_hr: u8,
    pub avg_power: u16,
    /// (heart rate, power, cadence) per sample
    pub samples: Vec<(u8, u16, u8)>,
}

impl Default for ActivitySpec {
    fn default() -> Self {
        Self {
            sport: 2,
            start_unix: Some(1_705_312_800), // 2024-01-15T10:00:00Z
            elapsed_ms: 3_600_000,
            distance_cm: 3_000_000,
            avg_hr: 0xFF,
            avg_power: 0xFFFF,
            samples: Vec::new(),
        }
    }
}

/// Build a complete activity file: per-sample records followed by a session.
pub fn activity_file(spec: &ActivitySpec) -> Vec<u8> {
    let mut b = FitBuilder::new().definition(
        1,
        20,
        true,
        &[(253, 4, 0x86), (3, 1, 0x02), (7, 2, 0x84), (4, 1, 0x02)],
    );
    let base = spec.start_unix.unwrap_or(FIT_EPOCH_UNIX + 1).saturating_sub(FIT_EPOCH_UNIX);
    for (i, &(hr, power, cadence)) in spec.samples.iter().enumerate() {
        b = b.data(
            1,
            &[base + i as u32, u32::from(hr), u32::from(power), u32::from(cadence)],
        );
    }

    let start = match spec.start_unix {
        Some(ts) => ts - FIT_EPOCH_UNIX,
        None => u32::MAX,
    };
    b.definition(
        0,
        18,
        true,
        &[
            (2, 4, 0x86),
            (5, 1, 0x00),
            (7, 4, 0x86),
            (9, 4, 0x86),
            (16, 1, 0x02),
            (20, 2, 0x84),
        ],
    )
    .data(
        0,
        &[
            start,
            u32::from(spec.sport),
            spec.elapsed_ms,
            spec.distance_cm,
            u32::from(spec.avg_hr),
            u32::from(spec.avg_power),
        ],
    )
    .build()
}
