//! Activity file stream decoder
//!
//! Decodes the self-describing binary record stream of an activity file into a
//! sequence of [`DecodedMessage`]s. Interpretation of every data record depends
//! on the definition records seen before it, so a stream is always decoded
//! strictly in order by a single [`StreamDecoder`] that owns its own
//! [`MessageLayoutTable`].
//!
//! States: `ExpectHeader → Dispatching → Done | Aborted`. After the first error
//! the decoder is aborted and yields nothing more.

mod cursor;
mod layout;

#[cfg(test)]
pub(crate) mod fixture;

pub use cursor::ByteCursor;
pub use layout::{
    BaseType, FieldLayout, LocalMessageDefinition, MessageLayoutTable, LOCAL_TYPE_SLOTS,
};

use crate::config::DecoderOptions;
use crate::error::DecodeError;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Signature stored at bytes 8..12 of the file header
pub const FILE_SIGNATURE: [u8; 4] = *b".FIT";

/// Smallest header carrying the length, record section size, and signature
pub const MIN_HEADER_LENGTH: u8 = 12;

const DEFINITION_FLAG: u8 = 0x40;
const DEVELOPER_FLAG: u8 = 0x20;
const COMPRESSED_TIMESTAMP_FLAG: u8 = 0x80;
const LOCAL_TYPE_MASK: u8 = 0x0F;

/// Parsed file header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHeader {
    pub header_length: u8,
    pub protocol_version: u8,
    pub profile_version: u16,
    /// Length of the record section that follows the header
    pub data_size: u32,
}

/// One field value read from a data record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedField {
    pub field_number: u8,
    pub byte_width: u8,
    pub base_type: BaseType,
    /// Unsigned integer exactly as stored, widened to 32 bits
    pub raw: u32,
}

impl DecodedField {
    /// The raw value, or `None` if it holds its type's "invalid" marker.
    pub fn value(&self) -> Option<u32> {
        match self.base_type.invalid_marker(self.byte_width) {
            Some(marker) if marker == self.raw => None,
            _ => Some(self.raw),
        }
    }

    /// The value sign-extended from its declared width.
    pub fn signed_value(&self) -> Option<i32> {
        let value = self.value()?;
        let shift = 32 - u32::from(self.byte_width) * 8;
        Some(((value << shift) as i32) >> shift)
    }
}

/// A data record interpreted under its local type's active layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedMessage {
    pub global_message_id: u16,
    pub local_type: u8,
    /// Time offset from a compressed-timestamp record header
    pub time_offset: Option<u8>,
    pub fields: Vec<DecodedField>,
}

impl DecodedMessage {
    pub fn field(&self, field_number: u8) -> Option<&DecodedField> {
        self.fields
            .iter()
            .rev()
            .find(|f| f.field_number == field_number)
    }

    /// Raw stored value, including "invalid" markers.
    pub fn raw(&self, field_number: u8) -> Option<u32> {
        self.field(field_number).map(|f| f.raw)
    }

    /// Stored value with "invalid" markers mapped to `None`.
    pub fn value(&self, field_number: u8) -> Option<u32> {
        self.field(field_number).and_then(DecodedField::value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecoderState {
    ExpectHeader,
    Dispatching { end: usize },
    Done,
    Aborted,
}

/// Sequential decoder for a single activity file.
///
/// Iterating yields each data record as a [`DecodedMessage`]. Definition
/// records are consumed internally.
pub struct StreamDecoder<'a> {
    buf: &'a [u8],
    cursor: ByteCursor<'a>,
    table: MessageLayoutTable,
    state: DecoderState,
    header: Option<FileHeader>,
    options: DecoderOptions,
}

impl<'a> StreamDecoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self::with_options(buf, DecoderOptions::default())
    }

    pub fn with_options(buf: &'a [u8], options: DecoderOptions) -> Self {
        Self {
            buf,
            cursor: ByteCursor::new(buf),
            table: MessageLayoutTable::new(),
            state: DecoderState::ExpectHeader,
            header: None,
            options,
        }
    }

    /// The file header, once it has been read
    pub fn header(&self) -> Option<&FileHeader> {
        self.header.as_ref()
    }

    pub fn is_done(&self) -> bool {
        self.state == DecoderState::Done
    }

    pub fn is_aborted(&self) -> bool {
        self.state == DecoderState::Aborted
    }

    /// Advance until the next data record or the end of the stream.
    ///
    /// The first error aborts the decoder and every later call returns `Ok(None)`.
    pub fn next_message(&mut self) -> Result<Option<DecodedMessage>, DecodeError> {
        let result = self.advance();
        if result.is_err() {
            self.state = DecoderState::Aborted;
        }
        result
    }

    fn advance(&mut self) -> Result<Option<DecodedMessage>, DecodeError> {
        loop {
            match self.state {
                DecoderState::ExpectHeader => {
                    let header = read_file_header(&mut self.cursor)?;
                    let end = usize::from(header.header_length) + header.data_size as usize;
                    debug!(
                        header_length = header.header_length,
                        data_size = header.data_size,
                        "file header accepted"
                    );
                    self.header = Some(header);
                    self.state = DecoderState::Dispatching { end };
                }
                DecoderState::Dispatching { end } => {
                    if self.cursor.offset() >= end {
                        if self.options.verify_crc {
                            verify_file_crc(self.buf, &mut self.cursor, end)?;
                        }
                        debug!(layouts = self.table.defined_count(), "record section finished");
                        self.state = DecoderState::Done;
                        return Ok(None);
                    }
                    if let Some(message) = self.dispatch_record()? {
                        return Ok(Some(message));
                    }
                }
                DecoderState::Done | DecoderState::Aborted => return Ok(None),
            }
        }
    }

    fn dispatch_record(&mut self) -> Result<Option<DecodedMessage>, DecodeError> {
        let header = self.cursor.read_u8()?;

        if self.options.compressed_timestamps && header & COMPRESSED_TIMESTAMP_FLAG != 0 {
            let local_type = (header >> 5) & 0x03;
            let time_offset = header & 0x1F;
            return self.decode_data(local_type, Some(time_offset)).map(Some);
        }

        let local_type = header & LOCAL_TYPE_MASK;
        if header & DEFINITION_FLAG != 0 {
            self.decode_definition(local_type, header & DEVELOPER_FLAG != 0)?;
            Ok(None)
        } else {
            self.decode_data(local_type, None).map(Some)
        }
    }

    fn decode_definition(&mut self, local_type: u8, has_developer_fields: bool) -> Result<(), DecodeError> {
        let c = &mut self.cursor;
        let _reserved = c.read_u8()?;
        let little_endian = c.read_u8()? == 0;
        let global_message_id = c.read_u16(little_endian)?;
        let field_count = c.read_u8()?;

        let mut fields = Vec::with_capacity(usize::from(field_count));
        for _ in 0..field_count {
            let spec = c.take(3)?;
            fields.push(FieldLayout::new(spec[0], spec[1], spec[2]));
        }

        let mut developer_bytes = 0;
        if has_developer_fields {
            let developer_count = c.read_u8()?;
            for _ in 0..developer_count {
                let spec = c.take(3)?;
                developer_bytes += usize::from(spec[1]);
            }
        }

        let definition = LocalMessageDefinition {
            global_message_id,
            little_endian,
            fields,
            developer_bytes,
        };

        if let Some(previous) = self.table.define(local_type, definition) {
            debug!(
                local_type,
                from = previous.global_message_id,
                to = global_message_id,
                "local type redefined"
            );
        } else {
            debug!(local_type, global_message_id, "local type defined");
        }
        Ok(())
    }

    fn decode_data(&mut self, local_type: u8, time_offset: Option<u8>) -> Result<DecodedMessage, DecodeError> {
        let definition = self
            .table
            .lookup(local_type)
            .ok_or(DecodeError::UndefinedLocalType(local_type))?;

        let mut fields = Vec::with_capacity(definition.fields.len());
        for layout in &definition.fields {
            match self
                .cursor
                .read_uint(layout.byte_width, definition.little_endian)?
            {
                Some(raw) => fields.push(DecodedField {
                    field_number: layout.field_number,
                    byte_width: layout.byte_width,
                    base_type: layout.base_type,
                    raw,
                }),
                None => trace!(
                    field = layout.field_number,
                    width = layout.byte_width,
                    "skipped field of unsupported width"
                ),
            }
        }
        self.cursor.take(definition.developer_bytes)?;

        Ok(DecodedMessage {
            global_message_id: definition.global_message_id,
            local_type,
            time_offset,
            fields,
        })
    }
}

impl Iterator for StreamDecoder<'_> {
    type Item = Result<DecodedMessage, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_message().transpose()
    }
}

/// Decode every data record of a file, failing on the first malformed record.
pub fn decode_messages(buf: &[u8], options: DecoderOptions) -> Result<Vec<DecodedMessage>, DecodeError> {
    StreamDecoder::with_options(buf, options).collect()
}

fn read_file_header(c: &mut ByteCursor<'_>) -> Result<FileHeader, DecodeError> {
    let header_length = c.read_u8()?;
    let protocol_version = c.read_u8()?;
    let profile_version = c.read_u16(true)?;
    let data_size = c.read_u32(true)?;
    let signature = c.take(4)?;

    if signature != FILE_SIGNATURE {
        return Err(DecodeError::InvalidSignature {
            found: [signature[0], signature[1], signature[2], signature[3]],
        });
    }
    if header_length < MIN_HEADER_LENGTH {
        return Err(DecodeError::InvalidHeaderLength(header_length));
    }
    c.seek(usize::from(header_length))?;

    Ok(FileHeader {
        header_length,
        protocol_version,
        profile_version,
        data_size,
    })
}

fn verify_file_crc(buf: &[u8], c: &mut ByteCursor<'_>, end: usize) -> Result<(), DecodeError> {
    c.seek(end)?;
    let found = c.read_u16(true)?;
    let calculated = compute_crc(0, &buf[..end]);
    if found != calculated {
        return Err(DecodeError::CrcMismatch { found, calculated });
    }
    Ok(())
}

/// Accumulate a slice of bytes into a cyclic redundancy check value.
pub fn compute_crc(init: u16, bytes: &[u8]) -> u16 {
    bytes.iter().fold(init, |acc, b| crc_byte(acc, *b))
}

fn crc_byte(mut crc: u16, b: u8) -> u16 {
    const CRC_TABLE: [u16; 16] = [
        0x0000, 0xCC01, 0xD801, 0x1400, 0xF001, 0x3C00, 0x2800, 0xE401, 0xA001, 0x6C00, 0x7800,
        0xB401, 0x5000, 0x9C01, 0x8801, 0x4400,
    ];

    let tmp = CRC_TABLE[(crc & 0xF) as usize];
    crc = (crc >> 4) & 0x0FFF;
    crc = crc ^ tmp ^ CRC_TABLE[(b & 0xF) as usize];

    let tmp = CRC_TABLE[(crc & 0xF) as usize];
    crc = (crc >> 4) & 0x0FFF;
    crc ^ tmp ^ CRC_TABLE[((b >> 4) & 0xF) as usize]
}

#[cfg(test)]
mod tests {
    use super::fixture::FitBuilder;
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_single_definition_and_data_round_trip() {
        let bytes = FitBuilder::new()
            .definition(0, 20, true, &[(3, 1, 0x02), (7, 2, 0x84), (253, 4, 0x86)])
            .data(0, &[142, 0x1234, 0x3B9A_CA00])
            .build();

        let messages = decode_messages(&bytes, DecoderOptions::default()).unwrap();
        assert_eq!(messages.len(), 1);

        let m = &messages[0];
        assert_eq!(m.global_message_id, 20);
        assert_eq!(m.raw(3), Some(142));
        assert_eq!(m.raw(7), Some(0x1234));
        assert_eq!(m.raw(253), Some(0x3B9A_CA00));
    }

    #[test]
    fn test_big_endian_definition() {
        let bytes = FitBuilder::new()
            .definition(1, 0x1234, false, &[(7, 2, 0x84), (9, 4, 0x86)])
            .data(1, &[0xABCD, 0x0102_0304])
            .build();

        // The global id is stored big-endian in the definition itself
        let record_start = 14;
        assert_eq!(&bytes[record_start + 3..record_start + 5], &[0x12, 0x34]);

        let messages = decode_messages(&bytes, DecoderOptions::default()).unwrap();
        assert_eq!(messages[0].global_message_id, 0x1234);
        assert_eq!(messages[0].raw(7), Some(0xABCD));
        assert_eq!(messages[0].raw(9), Some(0x0102_0304));
    }

    #[test]
    fn test_redefinition_applies_to_later_records() {
        let bytes = FitBuilder::new()
            .definition(0, 20, true, &[(3, 1, 0x02)])
            .data(0, &[150])
            .definition(0, 18, true, &[(7, 4, 0x86), (5, 1, 0x00)])
            .data(0, &[3_600_000, 2])
            .build();

        let messages = decode_messages(&bytes, DecoderOptions::default()).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].global_message_id, 20);
        assert_eq!(messages[0].raw(3), Some(150));
        assert_eq!(messages[1].global_message_id, 18);
        assert_eq!(messages[1].raw(7), Some(3_600_000));
        assert_eq!(messages[1].raw(5), Some(2));
        assert_eq!(messages[1].raw(3), None);
    }

    #[test]
    fn test_undefined_local_type_aborts() {
        let bytes = FitBuilder::new()
            .definition(0, 20, true, &[(3, 1, 0x02)])
            .data(0, &[150])
            .raw(&[0x05, 0x00])
            .build();

        let mut decoder = StreamDecoder::new(&bytes);
        assert!(decoder.next().unwrap().is_ok());
        assert_eq!(
            decoder.next().unwrap().unwrap_err(),
            DecodeError::UndefinedLocalType(5)
        );
        assert!(decoder.is_aborted());
        assert!(decoder.next().is_none());
    }

    #[test]
    fn test_invalid_signature() {
        let mut bytes = FitBuilder::new().build();
        bytes[8..12].copy_from_slice(b"ABCD");

        let err = decode_messages(&bytes, DecoderOptions::default()).unwrap_err();
        assert_eq!(err, DecodeError::InvalidSignature { found: *b"ABCD" });
        assert_eq!(err.code(), "invalid_signature");
    }

    #[test]
    fn test_short_buffer_is_out_of_bounds() {
        let err = decode_messages(&[14, 0x10, 0, 0], DecoderOptions::default()).unwrap_err();
        assert!(matches!(err, DecodeError::OutOfBounds { .. }));
    }

    #[test]
    fn test_truncated_record_section() {
        let mut bytes = FitBuilder::new()
            .definition(0, 20, true, &[(7, 2, 0x84)])
            .data(0, &[250])
            .build();
        // Drop the CRC and the last byte of the data record
        bytes.truncate(bytes.len() - 3);

        let err = decode_messages(&bytes, DecoderOptions::default()).unwrap_err();
        assert!(matches!(err, DecodeError::OutOfBounds { wanted: 2, remaining: 1, .. }));
    }

    #[test]
    fn test_twelve_byte_header() {
        let bytes = FitBuilder::new()
            .header_length(12)
            .definition(0, 20, true, &[(3, 1, 0x02)])
            .data(0, &[99])
            .build();

        let mut decoder = StreamDecoder::new(&bytes);
        let first = decoder.next().unwrap().unwrap();
        assert_eq!(first.raw(3), Some(99));
        assert_eq!(decoder.header().map(|h| h.header_length), Some(12));
        assert!(decoder.next().is_none());
        assert!(decoder.is_done());
    }

    #[test]
    fn test_sentinel_values_are_absent() {
        let bytes = FitBuilder::new()
            .definition(0, 20, true, &[(3, 1, 0x02), (7, 2, 0x84), (2, 4, 0x8C)])
            .data(0, &[0xFF, 0xFFFF, 0])
            .build();

        let messages = decode_messages(&bytes, DecoderOptions::default()).unwrap();
        let m = &messages[0];
        assert_eq!(m.raw(3), Some(0xFF));
        assert_eq!(m.value(3), None);
        assert_eq!(m.value(7), None);
        assert_eq!(m.value(2), None);
    }

    #[test]
    fn test_signed_value_extension() {
        let bytes = FitBuilder::new()
            .definition(0, 20, true, &[(2, 2, 0x83)])
            .data(0, &[0xFFF6])
            .build();

        let messages = decode_messages(&bytes, DecoderOptions::default()).unwrap();
        assert_eq!(messages[0].field(2).unwrap().signed_value(), Some(-10));
    }

    #[test]
    fn test_compressed_timestamp_header_uses_layout() {
        let bytes = FitBuilder::new()
            .definition(1, 20, true, &[(7, 2, 0x84)])
            // compressed header: local type 1, time offset 5
            .raw(&[0x80 | (1 << 5) | 5, 0x2C, 0x01])
            .build();
        let options = DecoderOptions {
            compressed_timestamps: true,
            ..DecoderOptions::default()
        };

        let messages = decode_messages(&bytes, options).unwrap();
        assert_eq!(messages[0].time_offset, Some(5));
        assert_eq!(messages[0].raw(7), Some(300));
    }

    #[test]
    fn test_high_bit_definition_header_uses_low_nibble() {
        let bytes = FitBuilder::new()
            .raw(&[0xC0, 0, 0, 20, 0, 1, 3, 1, 0x02])
            .raw(&[0x00, 99])
            .build();

        let messages = decode_messages(&bytes, DecoderOptions::default()).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].local_type, 0);
        assert_eq!(messages[0].time_offset, None);
        assert_eq!(messages[0].value(3), Some(99));
    }

    #[test]
    fn test_next_message_stops_after_error() {
        let bytes = FitBuilder::new()
            .raw(&[0x05, 0x00])
            .definition(0, 20, true, &[(3, 1, 0x02)])
            .data(0, &[150])
            .build();

        let mut decoder = StreamDecoder::new(&bytes);
        assert_eq!(decoder.next_message(), Err(DecodeError::UndefinedLocalType(5)));
        assert!(decoder.is_aborted());
        assert_eq!(decoder.next_message(), Ok(None));
        assert!(decoder.is_aborted());
    }

    #[test]
    fn test_developer_fields_are_skipped() {
        let bytes = FitBuilder::new()
            // definition with developer flag, one 2-byte field and one 3-byte dev field
            .raw(&[0x40 | 0x20, 0, 0, 20, 0, 1, 7, 2, 0x84, 1, 0, 3, 0])
            .raw(&[0x00, 0xC8, 0x00, 0xAA, 0xBB, 0xCC])
            .definition(2, 20, true, &[(3, 1, 0x02)])
            .data(2, &[120])
            .build();

        let messages = decode_messages(&bytes, DecoderOptions::default()).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].raw(7), Some(200));
        assert_eq!(messages[1].raw(3), Some(120));
    }

    #[test]
    fn test_crc_verification() {
        let bytes = FitBuilder::new()
            .definition(0, 20, true, &[(3, 1, 0x02)])
            .data(0, &[130])
            .build();
        let options = DecoderOptions {
            verify_crc: true,
            ..DecoderOptions::default()
        };
        assert!(decode_messages(&bytes, options).is_ok());

        let mut corrupt = bytes.clone();
        let last = corrupt.len() - 1;
        corrupt[last] ^= 0xFF;
        let err = decode_messages(&corrupt, options).unwrap_err();
        assert!(matches!(err, DecodeError::CrcMismatch { .. }));
    }

    #[test]
    fn test_crc_known_value() {
        assert_eq!(compute_crc(0, b"123456789"), 0xBB3D);
    }
}
