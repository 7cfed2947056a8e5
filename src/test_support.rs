//! In-memory transport used by unit and integration tests.
//!
//! Tracks how many control-plane operations the manager issued and supports
//! one-shot failure injection on each primitive, so tests can assert both
//! the happy path and claim-release behavior on backend failure.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::{SliceError, SliceResult};
use crate::range::SliceRange;
use crate::transport::{Extent, ExtentState, ExtentTransport, LoadedExtent};

#[derive(Default)]
struct Shared {
    probes: AtomicU64,
    creates: AtomicU64,
    writes: AtomicU64,
    fail_next_probe: AtomicBool,
    fail_next_create: AtomicBool,
    fail_next_write: AtomicBool,
}

impl Shared {
    fn take(flag: &AtomicBool) -> bool {
        flag.swap(false, Ordering::AcqRel)
    }
}

/// One in-memory extent. Offsets are absolute; storage is relative to the
/// extent's base offset.
pub struct MemoryExtent {
    base: u64,
    data: Mutex<Vec<u8>>,
    sealed: AtomicBool,
    shared: Arc<Shared>,
}

impl MemoryExtent {
    fn new(base: u64, shared: Arc<Shared>) -> Self {
        Self {
            base,
            data: Mutex::new(Vec::new()),
            sealed: AtomicBool::new(false),
            shared,
        }
    }

    fn state(&self) -> ExtentState {
        ExtentState {
            cursor: self.base + self.data.lock().len() as u64,
            sealed: self.sealed.load(Ordering::Acquire),
        }
    }
}

impl Extent for MemoryExtent {
    fn write_at(&self, offset: u64, payload: &[u8]) -> SliceResult<()> {
        if Shared::take(&self.shared.fail_next_write) {
            return Err(SliceError::backend_unavailable("injected write failure"));
        }
        self.shared.writes.fetch_add(1, Ordering::AcqRel);
        let mut data = self.data.lock();
        let rel = (offset - self.base) as usize;
        if rel != data.len() {
            return Err(SliceError::internal(format!(
                "non-contiguous write at {offset}, extent cursor {}",
                self.base + data.len() as u64
            )));
        }
        data.extend_from_slice(payload);
        Ok(())
    }

    fn read_at(&self, range: Range<u64>) -> SliceResult<Vec<u8>> {
        let data = self.data.lock();
        let lo = (range.start - self.base) as usize;
        let hi = (range.end - self.base) as usize;
        data.get(lo..hi)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| SliceError::backend_unavailable("read past durable extent"))
    }
}

/// Transport double keeping every extent in process memory.
#[derive(Clone)]
pub struct MemoryTransport {
    extents: Arc<Mutex<HashMap<(String, SliceRange), Arc<MemoryExtent>>>>,
    shared: Arc<Shared>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self {
            extents: Arc::new(Mutex::new(HashMap::new())),
            shared: Arc::new(Shared::default()),
        }
    }

    /// Pre-populate an extent so a later probe reconstructs it, mirroring a
    /// process restart over already-durable data.
    pub fn seed_extent(&self, stream_name: &str, range: SliceRange, payload: &[u8], sealed: bool) {
        let extent = Arc::new(MemoryExtent::new(range.start, self.shared.clone()));
        extent.data.lock().extend_from_slice(payload);
        extent.sealed.store(sealed, Ordering::Release);
        self.extents
            .lock()
            .insert((stream_name.to_string(), range), extent);
    }

    /// Number of probe operations the manager issued.
    pub fn probe_count(&self) -> u64 {
        self.shared.probes.load(Ordering::Acquire)
    }

    /// Number of create-empty operations the manager issued.
    pub fn create_count(&self) -> u64 {
        self.shared.creates.load(Ordering::Acquire)
    }

    pub fn write_count(&self) -> u64 {
        self.shared.writes.load(Ordering::Acquire)
    }

    pub fn fail_next_probe(&self) {
        self.shared.fail_next_probe.store(true, Ordering::Release);
    }

    pub fn fail_next_create(&self) {
        self.shared.fail_next_create.store(true, Ordering::Release);
    }

    pub fn fail_next_write(&self) {
        self.shared.fail_next_write.store(true, Ordering::Release);
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtentTransport for MemoryTransport {
    fn probe_and_load(
        &self,
        stream_name: &str,
        range: &SliceRange,
    ) -> SliceResult<Option<LoadedExtent>> {
        if Shared::take(&self.shared.fail_next_probe) {
            return Err(SliceError::backend_unavailable("injected probe failure"));
        }
        self.shared.probes.fetch_add(1, Ordering::AcqRel);
        let extents = self.extents.lock();
        Ok(extents
            .get(&(stream_name.to_string(), *range))
            .map(|extent| LoadedExtent {
                state: extent.state(),
                extent: extent.clone() as Arc<dyn Extent>,
            }))
    }

    fn create_empty_extent(
        &self,
        stream_name: &str,
        range: &SliceRange,
    ) -> SliceResult<Arc<dyn Extent>> {
        if Shared::take(&self.shared.fail_next_create) {
            return Err(SliceError::backend_unavailable("injected create failure"));
        }
        self.shared.creates.fetch_add(1, Ordering::AcqRel);
        let extent = Arc::new(MemoryExtent::new(range.start, self.shared.clone()));
        self.extents
            .lock()
            .insert((stream_name.to_string(), *range), extent.clone());
        Ok(extent)
    }
}
