use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::{SliceError, SliceResult};
use crate::range::StreamIdentity;
use crate::transport::{Extent, LoadedExtent};

/// A bounded, stateful handle onto one contiguous extent of a stream.
///
/// A slice is either open (appendable) or sealed (immutable). Sealing is
/// terminal for a given instance; recovery obtains a fresh slice through
/// the manager instead of reopening a sealed one. Reads are valid in both
/// states and are bounds-checked against `[start, cursor)`.
///
/// # Thread Safety
///
/// The cursor and sealed flag are atomics, so reads never block appenders.
/// Offset assignment during `append` is made atomic per call by an internal
/// lock; the slice does not otherwise serialize concurrent appenders.
pub struct Slice {
    identity: StreamIdentity,
    extent: Arc<dyn Extent>,
    /// Next appendable offset. Monotonic while open.
    cursor: AtomicU64,
    sealed: AtomicBool,
    /// Serializes offset assignment and the write-through for one append.
    append_lock: Mutex<()>,
}

impl Slice {
    /// Wrap a freshly created empty extent: cursor at the range start, open.
    pub(crate) fn create_empty(identity: StreamIdentity, extent: Arc<dyn Extent>) -> Self {
        let start = identity.range().start;
        Self {
            identity,
            extent,
            cursor: AtomicU64::new(start),
            sealed: AtomicBool::new(false),
            append_lock: Mutex::new(()),
        }
    }

    /// Reconstruct a slice from a probed extent, positioned at the extent's
    /// durable cursor and sealed state.
    pub(crate) fn from_loaded(identity: StreamIdentity, loaded: LoadedExtent) -> Self {
        Self {
            identity,
            extent: loaded.extent,
            cursor: AtomicU64::new(loaded.state.cursor),
            sealed: AtomicBool::new(loaded.state.sealed),
            append_lock: Mutex::new(()),
        }
    }

    pub fn identity(&self) -> &StreamIdentity {
        &self.identity
    }

    /// First logical offset covered by this slice.
    pub fn start(&self) -> u64 {
        self.identity.range().start
    }

    /// Next appendable offset.
    pub fn cursor(&self) -> u64 {
        self.cursor.load(Ordering::Acquire)
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    /// Append `payload` at the next contiguous offset and return the offset
    /// range it now occupies.
    ///
    /// Fails with [`SliceError::SliceSealed`] once the slice is sealed and
    /// propagates [`SliceError::BackendUnavailable`] from the extent write
    /// unchanged; retry policy belongs to the transport. The cursor only
    /// advances after the write succeeds, so a failed append leaves the
    /// slice where it was.
    pub fn append(&self, payload: &[u8]) -> SliceResult<Range<u64>> {
        let _guard = self.append_lock.lock();
        if self.sealed.load(Ordering::Acquire) {
            return Err(SliceError::SliceSealed);
        }
        let offset = self.cursor.load(Ordering::Acquire);
        if payload.is_empty() {
            return Ok(offset..offset);
        }
        self.extent.write_at(offset, payload)?;
        let end = offset + payload.len() as u64;
        self.cursor.store(end, Ordering::Release);
        Ok(offset..end)
    }

    /// Read back the bytes covering `range`.
    ///
    /// Valid in either state. Fails with [`SliceError::OutOfRange`] when the
    /// request leaves `[start, cursor)`.
    pub fn read(&self, range: Range<u64>) -> SliceResult<Vec<u8>> {
        let readable = self.start()..self.cursor();
        if range.start < readable.start || range.end > readable.end || range.start > range.end {
            return Err(SliceError::out_of_range(range, readable));
        }
        if range.is_empty() {
            return Ok(Vec::new());
        }
        self.extent.read_at(range)
    }

    /// Transition open → sealed. Idempotent; a no-op when already sealed.
    pub fn seal(&self) {
        self.sealed.store(true, Ordering::Release);
    }
}

impl std::fmt::Debug for Slice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slice")
            .field("identity", &self.identity)
            .field("cursor", &self.cursor())
            .field("sealed", &self.is_sealed())
            .finish()
    }
}
