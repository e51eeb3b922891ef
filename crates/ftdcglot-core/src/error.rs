//! Error type shared by the decode pipeline.

use std::fmt;

/// Errors raised while reading FTDC capture data.
///
/// Every variant that concerns a block carries the byte offset of the
/// envelope document the block came from, so truncated or mixed-version
/// capture files can be pinned down.
#[derive(Debug)]
pub enum FtdcError {
    /// A length prefix runs past the buffer, or the slice is not a document.
    CorruptEnvelope {
        offset: usize,
        declared_len: usize,
        buffer_len: usize,
        reason: String,
    },
    /// The chunk payload did not inflate.
    DecompressionError { offset: usize, reason: String },
    /// Flattened attribute count differs from the block header.
    InconsistentSchema {
        offset: usize,
        declared: u32,
        discovered: usize,
    },
    /// The block header or the delta stream ended early.
    TruncatedBlock { offset: usize, reason: String },
    /// Nothing to decode (no `metrics.*` files found).
    NoData(String),
    /// I/O error reading capture files.
    Io(std::io::Error),
}

impl fmt::Display for FtdcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FtdcError::CorruptEnvelope {
                offset,
                declared_len,
                buffer_len,
                reason,
            } => write!(
                f,
                "corrupt envelope at offset {}: {} (declared length {}, buffer length {})",
                offset, reason, declared_len, buffer_len
            ),
            FtdcError::DecompressionError { offset, reason } => {
                write!(f, "chunk at offset {} does not inflate: {}", offset, reason)
            }
            FtdcError::InconsistentSchema {
                offset,
                declared,
                discovered,
            } => write!(
                f,
                "inconsistent schema in chunk at offset {}: header declares {} attributes, reference document has {}",
                offset, declared, discovered
            ),
            FtdcError::TruncatedBlock { offset, reason } => {
                write!(f, "truncated chunk at offset {}: {}", offset, reason)
            }
            FtdcError::NoData(msg) => write!(f, "no data: {}", msg),
            FtdcError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for FtdcError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FtdcError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for FtdcError {
    fn from(e: std::io::Error) -> Self {
        FtdcError::Io(e)
    }
}

impl FtdcError {
    /// Byte offset of the envelope document the error refers to, if any.
    pub fn offset(&self) -> Option<usize> {
        match self {
            FtdcError::CorruptEnvelope { offset, .. }
            | FtdcError::DecompressionError { offset, .. }
            | FtdcError::InconsistentSchema { offset, .. }
            | FtdcError::TruncatedBlock { offset, .. } => Some(*offset),
            FtdcError::NoData(_) | FtdcError::Io(_) => None,
        }
    }

    /// True for errors confined to a single block; the buffer can go on.
    pub fn is_block_local(&self) -> bool {
        matches!(
            self,
            FtdcError::DecompressionError { .. }
                | FtdcError::InconsistentSchema { .. }
                | FtdcError::TruncatedBlock { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FtdcError>;
