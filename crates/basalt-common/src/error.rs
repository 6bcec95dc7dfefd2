//! Error types for Basalt.

use thiserror::Error;

/// Result type alias using BasaltError.
pub type Result<T> = std::result::Result<T, BasaltError>;

/// Errors that can occur in Basalt operations.
#[derive(Debug, Error)]
pub enum BasaltError {
    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // File format errors
    #[error("not a basalt table file: bad magic {actual:#010x}")]
    BadMagic { actual: u32 },

    #[error("unsupported table format version {0}")]
    UnsupportedVersion(u16),

    // B+ tree errors
    #[error("invalid node type: {0}")]
    InvalidNodeType(u8),

    #[error("B+ tree corrupted: {0}")]
    Corrupted(String),

    // Value errors
    #[error("value too large: {size} bytes (max {max})")]
    ValueTooLarge { size: usize, max: usize },

    // Registry errors
    #[error("invalid table name: {0}")]
    InvalidTableName(String),
}
