use std::fmt::Display;
use std::ops::Range;

/// A specialized error type for slice-resolution operations.
#[non_exhaustive]
#[derive(Debug, Clone, thiserror::Error)]
pub enum SliceError {
    /// The storage backend could not be reached or returned a fatal error
    /// during load or create. Propagated synchronously; never retried here.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
    /// Append attempted on a sealed slice.
    #[error("slice is sealed")]
    SliceSealed,
    /// Read requested outside the readable extent of the slice.
    #[error("range {}..{} outside readable extent {}..{}", .requested.start, .requested.end, .readable.start, .readable.end)]
    OutOfRange {
        requested: Range<u64>,
        readable: Range<u64>,
    },
    /// Configuration value was invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Internal error (runtime construction, bookkeeping violations, etc.).
    #[error("internal error: {0}")]
    Internal(String),
}

impl SliceError {
    /// Create a backend-unavailable error from a displayable value.
    pub fn backend_unavailable<T>(msg: T) -> Self
    where
        T: Display,
    {
        Self::BackendUnavailable(msg.to_string())
    }

    /// Create an invalid configuration error from a displayable value.
    pub fn invalid_config<T>(msg: T) -> Self
    where
        T: Display,
    {
        Self::InvalidConfig(msg.to_string())
    }

    /// Create an internal error from a displayable value.
    pub fn internal<T>(msg: T) -> Self
    where
        T: Display,
    {
        Self::Internal(msg.to_string())
    }

    /// Create an out-of-range read error.
    pub fn out_of_range(requested: Range<u64>, readable: Range<u64>) -> Self {
        Self::OutOfRange {
            requested,
            readable,
        }
    }
}

impl From<std::io::Error> for SliceError {
    fn from(err: std::io::Error) -> Self {
        Self::BackendUnavailable(err.to_string())
    }
}

/// A Result type alias for slice-resolution operations.
pub type SliceResult<T> = Result<T, SliceError>;
