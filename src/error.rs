//! Error types for trainload

use thiserror::Error;

/// Errors that abort decoding of a single activity file.
///
/// None of these affect other files in a batch; see [`crate::batch`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("Invalid file signature: expected \".FIT\", found {found:?}")]
    InvalidSignature { found: [u8; 4] },

    #[error("Unsupported header length: {0}")]
    InvalidHeaderLength(u8),

    #[error("Read past end of buffer at offset {offset}: wanted {wanted} bytes, {remaining} remaining")]
    OutOfBounds {
        offset: usize,
        wanted: usize,
        remaining: usize,
    },

    #[error("Data record references undefined local message type {0}")]
    UndefinedLocalType(u8),

    #[error("Calculated ({calculated:#06x}) and found ({found:#06x}) CRC values do not match")]
    CrcMismatch { found: u16, calculated: u16 },
}

impl DecodeError {
    /// Stable machine-readable code used in batch reports and exports
    pub fn code(&self) -> &'static str {
        match self {
            DecodeError::InvalidSignature { .. } => "invalid_signature",
            DecodeError::InvalidHeaderLength(_) => "invalid_header_length",
            DecodeError::OutOfBounds { .. } => "truncated_record",
            DecodeError::UndefinedLocalType(_) => "undefined_local_type",
            DecodeError::CrcMismatch { .. } => "crc_mismatch",
        }
    }
}

/// Why a single file produced no activity summary
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Decoding succeeded but the session carries no usable start time
    #[error("Activity has no start time")]
    MissingStartTime,

    #[error("Unreadable archive: {0}")]
    UnreadableArchive(String),

    #[error("Archive contains no activity file")]
    ArchiveWithoutActivity,
}

impl Rejection {
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::Decode(err) => err.code(),
            Rejection::MissingStartTime => "missing_start_time",
            Rejection::UnreadableArchive(_) => "unreadable_archive",
            Rejection::ArchiveWithoutActivity => "archive_without_activity",
        }
    }
}

/// Errors that can occur outside the per-file decode loop
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Activity rejected: {0}")]
    Rejected(#[from] Rejection),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Encoding error: {0}")]
    EncodingError(String),
}
