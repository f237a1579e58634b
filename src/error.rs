//! Error types for device arrays and interface kernels

use thiserror::Error;

/// Errors raised by device-memory containers and the interface scatter kernels
///
/// `SizeMismatch` and `AllocationFailure` signal contract violations or
/// exhausted device memory. Callers are expected to abort the solve rather
/// than retry.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// Index-based access outside `[0, len)`
    #[error("index {index} out of range for device array of length {len}")]
    OutOfRange {
        /// Offending index (or end of the requested range)
        index: usize,
        /// Length of the container that was accessed
        len: usize,
    },

    /// `first()` on a zero-length array
    #[error("device array is empty")]
    EmptyContainer,

    /// Inconsistent sizes between addressing tables and device arrays
    #[error("size mismatch: {0}")]
    SizeMismatch(String),

    /// Device memory exhausted (or the request cannot be represented)
    #[error("device allocation of {requested_bytes} bytes failed: {reason}")]
    AllocationFailure {
        /// Bytes requested by the failing allocation
        requested_bytes: usize,
        /// Why the allocator refused the request
        reason: String,
    },

    /// Malformed textual list
    #[error("parse error: {0}")]
    Parse(String),

    /// Stream or file I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for device operations
pub type Result<T> = std::result::Result<T, DeviceError>;

impl DeviceError {
    pub(crate) fn size_mismatch(message: impl Into<String>) -> Self {
        Self::SizeMismatch(message.into())
    }

    pub(crate) fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }
}
