//! Field layouts and the per-stream local message table.

use serde::{Deserialize, Serialize};

/// Number of local message slots addressable by a record header
pub const LOCAL_TYPE_SLOTS: usize = 16;

/// Category of a field's base type, deciding its "invalid" marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaseType {
    /// `enum`, `uint8`, `uint16`, `uint32`, `byte`: invalid is the type max
    Unsigned,
    /// `sint8`, `sint16`, `sint32`: invalid is the positive max
    Signed,
    /// `uint8z`, `uint16z`, `uint32z`: invalid is zero
    UnsignedZ,
    /// `float32`, `float64`: invalid is all bits set
    Float,
    /// `string` and 64-bit types
    Opaque,
}

impl BaseType {
    /// Classify a base type code from a definition record's field spec.
    pub fn from_code(code: u8) -> Self {
        match code {
            0x00 | 0x02 | 0x84 | 0x86 | 0x0D => BaseType::Unsigned,
            0x01 | 0x83 | 0x85 => BaseType::Signed,
            0x0A | 0x8B | 0x8C => BaseType::UnsignedZ,
            0x88 | 0x89 => BaseType::Float,
            _ => BaseType::Opaque,
        }
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, BaseType::Signed)
    }

    /// The raw value meaning "not present" for a field of this type and width.
    pub fn invalid_marker(&self, byte_width: u8) -> Option<u32> {
        let bits = u32::from(byte_width) * 8;
        if !(1..=4).contains(&byte_width) {
            return None;
        }
        let all_ones = if bits == 32 { u32::MAX } else { (1u32 << bits) - 1 };
        match self {
            BaseType::Unsigned | BaseType::Float => Some(all_ones),
            BaseType::Signed => Some(all_ones >> 1),
            BaseType::UnsignedZ => Some(0),
            BaseType::Opaque => None,
        }
    }
}

/// Layout of one field inside a data record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldLayout {
    pub field_number: u8,
    pub byte_width: u8,
    pub base_type: BaseType,
}

impl FieldLayout {
    pub fn new(field_number: u8, byte_width: u8, base_type_code: u8) -> Self {
        Self {
            field_number,
            byte_width,
            base_type: BaseType::from_code(base_type_code),
        }
    }

    pub fn base_type_is_signed(&self) -> bool {
        self.base_type.is_signed()
    }
}

/// Layout installed for a local type by a definition record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalMessageDefinition {
    pub global_message_id: u16,
    pub little_endian: bool,
    pub fields: Vec<FieldLayout>,
    /// Trailing developer-field bytes in each data record, skipped on decode
    #[serde(default)]
    pub developer_bytes: usize,
}

impl LocalMessageDefinition {
    /// Total bytes a data record using this layout occupies after its header
    pub fn record_size(&self) -> usize {
        self.fields
            .iter()
            .map(|f| usize::from(f.byte_width))
            .sum::<usize>()
            + self.developer_bytes
    }
}

/// Active layouts for one stream, keyed by local type 0-15.
///
/// Each decode owns its own table; a data record always uses whatever the
/// most recent definition for its slot installed.
#[derive(Debug, Clone, Default)]
pub struct MessageLayoutTable {
    slots: [Option<LocalMessageDefinition>; LOCAL_TYPE_SLOTS],
}

impl MessageLayoutTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a layout, unconditionally replacing any earlier one.
    ///
    /// Returns the definition that was replaced, if any.
    pub fn define(
        &mut self,
        local_type: u8,
        definition: LocalMessageDefinition,
    ) -> Option<LocalMessageDefinition> {
        self.slots[slot(local_type)].replace(definition)
    }

    /// The active layout for a local type, or `None` if the slot was never defined.
    pub fn lookup(&self, local_type: u8) -> Option<&LocalMessageDefinition> {
        self.slots[slot(local_type)].as_ref()
    }

    pub fn defined_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

fn slot(local_type: u8) -> usize {
    usize::from(local_type & 0x0F)
}
