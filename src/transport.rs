//! Interface to the physical transport that performs durable reads and
//! writes against the remote storage backend.
//!
//! The transport is an external collaborator: implementations own
//! connection management, retry, backoff, and timeout policy. Everything
//! here is blocking; callers that must not stall run these operations on
//! the worker runtime.

use std::ops::Range;
use std::sync::Arc;

use crate::error::SliceResult;
use crate::range::SliceRange;

/// Durable state of an extent as observed by a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtentState {
    /// Next appendable offset (one past the last durable byte).
    pub cursor: u64,
    /// Whether the extent was sealed remotely.
    pub sealed: bool,
}

/// Data-plane handle onto one stream extent.
///
/// Offsets are absolute logical offsets within the stream, not relative to
/// the extent. Writes are expected to be contiguous; the slice layer above
/// enforces that by assigning offsets.
pub trait Extent: Send + Sync {
    /// Durably write `payload` at `offset`.
    fn write_at(&self, offset: u64, payload: &[u8]) -> SliceResult<()>;

    /// Read back the bytes covering `range`.
    fn read_at(&self, range: Range<u64>) -> SliceResult<Vec<u8>>;
}

/// A probe result carrying both the observed durable state and the handle
/// used for subsequent reads and appends.
pub struct LoadedExtent {
    pub state: ExtentState,
    pub extent: Arc<dyn Extent>,
}

/// Control-plane primitives the manager needs from the storage backend.
///
/// "Extent not found" is a normal outcome of `probe_and_load`, not an
/// error: the manager branches on it to decide between reconstructing an
/// existing slice and creating an empty one.
pub trait ExtentTransport: Send + Sync {
    /// Probe for an existing extent and, if present, load its durable
    /// state. Fails only when the backend cannot be consulted at all.
    fn probe_and_load(
        &self,
        stream_name: &str,
        range: &SliceRange,
    ) -> SliceResult<Option<LoadedExtent>>;

    /// Create a brand-new empty extent for the given identity.
    fn create_empty_extent(
        &self,
        stream_name: &str,
        range: &SliceRange,
    ) -> SliceResult<Arc<dyn Extent>>;
}
