use std::sync::Arc;

use arc_swap::ArcSwapOption;

use crate::error::SliceResult;
use crate::manager::StreamSliceManager;
use crate::range::{SliceRange, StreamIdentity};
use crate::slice::Slice;

/// Per-segment façade giving the log-segment layer a stable, lazy handle to
/// "the slice for this segment" without registry knowledge.
///
/// One supplier is constructed per segment at open/roll time and bound to a
/// single `(stream name, range)` identity. `get` resolves lazily through
/// the manager and memoizes the result; `reset` replaces the memoized
/// reference with a fresh empty slice during segment-index recovery. The
/// cached reference is non-owning: the manager owns slice lifecycle, and
/// the supplier can always re-resolve through it.
pub struct StreamSliceSupplier {
    manager: Arc<StreamSliceManager>,
    identity: StreamIdentity,
    cached: ArcSwapOption<Slice>,
}

impl StreamSliceSupplier {
    pub fn new(
        manager: Arc<StreamSliceManager>,
        stream_name: impl Into<Arc<str>>,
        range: SliceRange,
    ) -> Self {
        Self {
            manager,
            identity: StreamIdentity::new(stream_name, range),
            cached: ArcSwapOption::const_empty(),
        }
    }

    pub fn identity(&self) -> &StreamIdentity {
        &self.identity
    }

    /// Return the memoized slice, resolving through the manager on first
    /// use.
    ///
    /// Repeated calls return the same instance until a `reset` intervenes.
    /// The resolved slice is installed only if the cache is still empty, so
    /// a `get` racing a `reset` can never clobber the recovery slice; the
    /// racing caller observes one complete slice either way. Manager
    /// failures propagate unchanged.
    pub fn get(&self) -> SliceResult<Arc<Slice>> {
        if let Some(slice) = self.cached.load_full() {
            return Ok(slice);
        }
        let resolved = self
            .manager
            .load_or_create_slice(self.identity.stream_name(), self.identity.range())?;
        let prior = self
            .cached
            .compare_and_swap(&None::<Arc<Slice>>, Some(resolved.clone()));
        match &*prior {
            Some(installed) => Ok(installed.clone()),
            None => Ok(resolved),
        }
    }

    /// Replace the memoized slice with a fresh empty open one.
    ///
    /// Recovery only: the segment's prior content is discarded. The
    /// previous cached reference is dropped here, not torn down — teardown
    /// of abandoned slices is a manager/transport concern.
    pub fn reset(&self) -> SliceResult<Arc<Slice>> {
        let fresh = self.manager.new_slice(self.identity.stream_name())?;
        self.cached.store(Some(fresh.clone()));
        Ok(fresh)
    }
}
