use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace, warn};

use crate::config::SliceManagerConfig;
use crate::error::{SliceError, SliceResult};
use crate::range::{SliceRange, StreamIdentity};
use crate::runtime::SliceRuntime;
use crate::slice::Slice;
use crate::transport::ExtentTransport;

/// Outcome of one identity's resolution, shared between the claimant and
/// any callers that arrived while it was in flight.
enum CellState {
    /// A claimant is resolving; waiters block on the condvar.
    Pending,
    /// Resolution published its slice; the cell is the registry entry.
    Ready(Arc<Slice>),
    /// Resolution failed and the claim was released. Waiters surface the
    /// claimant's error unchanged; the registry entry is already gone, so
    /// a later call reclaims the identity and retries.
    Failed(SliceError),
}

/// Registry cell implementing the claim → resolve → publish transaction
/// for one identity.
struct ResolveCell {
    state: Mutex<CellState>,
    resolved: Condvar,
}

impl ResolveCell {
    fn pending() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(CellState::Pending),
            resolved: Condvar::new(),
        })
    }

    fn ready(slice: Arc<Slice>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(CellState::Ready(slice)),
            resolved: Condvar::new(),
        })
    }

    /// Block until the claimant publishes or fails.
    fn wait(&self) -> SliceResult<Arc<Slice>> {
        let mut state = self.state.lock();
        while matches!(*state, CellState::Pending) {
            self.resolved.wait(&mut state);
        }
        match &*state {
            CellState::Ready(slice) => Ok(slice.clone()),
            CellState::Failed(err) => Err(err.clone()),
            CellState::Pending => unreachable!("resolved condvar woke on pending cell"),
        }
    }

    fn publish(&self, slice: Arc<Slice>) {
        *self.state.lock() = CellState::Ready(slice);
        self.resolved.notify_all();
    }

    fn fail(&self, err: SliceError) {
        *self.state.lock() = CellState::Failed(err);
        self.resolved.notify_all();
    }
}

/// How the caller of `load_or_create_slice` entered the protocol.
enum Entry {
    /// This caller claimed the identity and must resolve it.
    Claimed(Arc<ResolveCell>),
    /// Another caller holds the claim (or already published); await it.
    Await(Arc<ResolveCell>),
}

/// Counters describing how resolutions were satisfied.
#[derive(Default)]
struct ResolutionCounters {
    registry_hits: AtomicU64,
    loaded: AtomicU64,
    created: AtomicU64,
    failures: AtomicU64,
}

/// Point-in-time snapshot of the manager's resolution counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResolutionMetrics {
    /// Resolutions satisfied by an already-registered slice.
    pub registry_hits: u64,
    /// Slices reconstructed from an existing remote extent.
    pub loaded: u64,
    /// Slices created over a brand-new empty extent.
    pub created: u64,
    /// Resolutions that surfaced a backend failure.
    pub failures: u64,
}

/// Sole authority resolving a [`StreamIdentity`] to a live [`Slice`].
///
/// The registry guarantees at most one `Slice` instance per identity
/// process-wide. Resolution for one identity is linearizable: a caller
/// claims the identity, resolves it against the transport off-lock, and
/// publishes the result before releasing the claim; concurrent callers for
/// the same identity block on the claim and share its outcome, so exactly
/// one backend load-or-create is observed per identity.
///
/// The manager is an explicitly constructed, injectable component — one
/// instance is shared by every supplier, there is no global registry.
pub struct StreamSliceManager {
    transport: Arc<dyn ExtentTransport>,
    runtime: Arc<SliceRuntime>,
    registry: Mutex<HashMap<StreamIdentity, Arc<ResolveCell>>>,
    /// Next fresh generation per stream, minted by `new_slice`.
    generations: Mutex<HashMap<Arc<str>, u64>>,
    counters: ResolutionCounters,
}

impl StreamSliceManager {
    /// Build a manager with its own worker runtime.
    pub fn with_config(
        config: SliceManagerConfig,
        transport: Arc<dyn ExtentTransport>,
    ) -> SliceResult<Self> {
        let runtime = Arc::new(SliceRuntime::create(&config)?);
        Ok(Self::with_runtime(runtime, transport))
    }

    /// Build a manager over an injected runtime, shared with other
    /// components.
    pub fn with_runtime(runtime: Arc<SliceRuntime>, transport: Arc<dyn ExtentTransport>) -> Self {
        Self {
            transport,
            runtime,
            registry: Mutex::new(HashMap::new()),
            generations: Mutex::new(HashMap::new()),
            counters: ResolutionCounters::default(),
        }
    }

    /// Worker runtime executing blocking resolution calls.
    pub fn runtime(&self) -> Arc<SliceRuntime> {
        self.runtime.clone()
    }

    pub fn metrics(&self) -> ResolutionMetrics {
        ResolutionMetrics {
            registry_hits: self.counters.registry_hits.load(Ordering::Acquire),
            loaded: self.counters.loaded.load(Ordering::Acquire),
            created: self.counters.created.load(Ordering::Acquire),
            failures: self.counters.failures.load(Ordering::Acquire),
        }
    }

    /// Resolve an identity to its live slice, loading existing remote state
    /// or creating an empty extent as needed.
    ///
    /// Idempotent: a registered identity returns its cached instance. May
    /// block on transport I/O or on another caller's in-flight resolution
    /// for the same identity. On backend failure the claim is released and
    /// the error propagates unchanged, so a later call may retry.
    pub fn load_or_create_slice(
        &self,
        stream_name: &str,
        range: SliceRange,
    ) -> SliceResult<Arc<Slice>> {
        let identity = StreamIdentity::new(stream_name, range);
        let entry = {
            let mut registry = self.registry.lock();
            match registry.get(&identity) {
                Some(cell) => Entry::Await(cell.clone()),
                None => {
                    let cell = ResolveCell::pending();
                    registry.insert(identity.clone(), cell.clone());
                    Entry::Claimed(cell)
                }
            }
        };
        match entry {
            Entry::Claimed(cell) => self.resolve_claim(identity, cell),
            Entry::Await(cell) => {
                trace!(%identity, "awaiting registered slice");
                let slice = cell.wait()?;
                self.counters.registry_hits.fetch_add(1, Ordering::AcqRel);
                Ok(slice)
            }
        }
    }

    /// Unconditionally create a fresh empty open slice for `stream_name`
    /// under the next generation, register it, and return it.
    ///
    /// Recovery only: prior content is deliberately discarded, never
    /// probed, so a corrupted prior extent cannot block this call. The
    /// abandoned extent is left for transport-side garbage collection.
    pub fn new_slice(&self, stream_name: &str) -> SliceResult<Arc<Slice>> {
        let range = self.mint_range(stream_name);
        let identity = StreamIdentity::new(stream_name, range);
        let extent = self
            .transport
            .create_empty_extent(stream_name, &range)
            .inspect_err(|err| {
                self.counters.failures.fetch_add(1, Ordering::AcqRel);
                warn!(%identity, %err, "failed to create recovery slice");
            })?;
        let slice = Arc::new(Slice::create_empty(identity.clone(), extent));
        self.counters.created.fetch_add(1, Ordering::AcqRel);
        {
            let mut registry = self.registry.lock();
            // A freshly minted generation must be unregistered; overwriting
            // would leave two live slices for one identity.
            if registry.contains_key(&identity) {
                return Err(SliceError::internal(format!(
                    "freshly minted identity {identity} already registered"
                )));
            }
            registry.insert(identity.clone(), ResolveCell::ready(slice.clone()));
        }
        debug!(%identity, "created recovery slice, prior extent orphaned");
        Ok(slice)
    }

    /// Mint an open-ended range under the next generation for the stream.
    ///
    /// Every mint advances past both the stream's counter and the highest
    /// generation currently registered for the stream, so an identity
    /// registered between mints (a persisted pre-restart range resolved
    /// through `load_or_create_slice`) can never be minted again.
    fn mint_range(&self, stream_name: &str) -> SliceRange {
        let mut generations = self.generations.lock();
        let counter = generations.entry(Arc::from(stream_name)).or_insert(0);
        let registered = {
            let registry = self.registry.lock();
            registry
                .keys()
                .filter(|identity| identity.stream_name() == stream_name)
                .map(|identity| identity.range().generation)
                .max()
                .unwrap_or(0)
        };
        *counter = (*counter).max(registered) + 1;
        SliceRange::open_ended_with_generation(0, *counter)
    }

    /// Resolve a claimed identity and publish the outcome before releasing
    /// the claim.
    fn resolve_claim(
        &self,
        identity: StreamIdentity,
        cell: Arc<ResolveCell>,
    ) -> SliceResult<Arc<Slice>> {
        match self.resolve(&identity) {
            Ok(slice) => {
                cell.publish(slice.clone());
                Ok(slice)
            }
            Err(err) => {
                self.counters.failures.fetch_add(1, Ordering::AcqRel);
                warn!(%identity, %err, "slice resolution failed, claim released");
                self.registry.lock().remove(&identity);
                cell.fail(err.clone());
                Err(err)
            }
        }
    }

    /// Probe for existing remote state; reconstruct on a hit, create empty
    /// on a miss. "Not found" is a normal branch, not a failure.
    fn resolve(&self, identity: &StreamIdentity) -> SliceResult<Arc<Slice>> {
        let range = identity.range();
        match self
            .transport
            .probe_and_load(identity.stream_name(), &range)?
        {
            Some(loaded) => {
                debug!(
                    %identity,
                    cursor = loaded.state.cursor,
                    sealed = loaded.state.sealed,
                    "loaded slice from existing extent",
                );
                self.counters.loaded.fetch_add(1, Ordering::AcqRel);
                Ok(Arc::new(Slice::from_loaded(identity.clone(), loaded)))
            }
            None => {
                let extent = self
                    .transport
                    .create_empty_extent(identity.stream_name(), &range)?;
                debug!(%identity, "created empty slice");
                self.counters.created.fetch_add(1, Ordering::AcqRel);
                Ok(Arc::new(Slice::create_empty(identity.clone(), extent)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::test_support::MemoryTransport;
    use crate::transport::{Extent, LoadedExtent};

    fn manager_with_transport() -> (StreamSliceManager, MemoryTransport) {
        let transport = MemoryTransport::new();
        let manager =
            StreamSliceManager::with_config(SliceManagerConfig::for_tests(), Arc::new(transport.clone()))
                .expect("create manager");
        (manager, transport)
    }

    #[test]
    fn load_or_create_is_idempotent() {
        let (manager, transport) = manager_with_transport();
        let range = SliceRange::open_ended(0);
        let first = manager.load_or_create_slice("topic-0", range).expect("resolve");
        let second = manager.load_or_create_slice("topic-0", range).expect("resolve");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(transport.probe_count(), 1);
        assert_eq!(transport.create_count(), 1);
        assert_eq!(manager.metrics().registry_hits, 1);
    }

    #[test]
    fn load_reconstructs_existing_extent() {
        let (manager, transport) = manager_with_transport();
        let range = SliceRange::open_ended(0);
        transport.seed_extent("topic-0", range, &[7u8; 500], true);
        let slice = manager.load_or_create_slice("topic-0", range).expect("resolve");
        assert_eq!(slice.cursor(), 500);
        assert!(slice.is_sealed());
        assert!(matches!(slice.append(b"x"), Err(SliceError::SliceSealed)));
        assert_eq!(manager.metrics().loaded, 1);
        assert_eq!(transport.create_count(), 0);
    }

    #[test]
    fn distinct_identities_resolve_independently() {
        let (manager, _transport) = manager_with_transport();
        let a = manager
            .load_or_create_slice("topic-0", SliceRange::open_ended(0))
            .expect("resolve");
        let b = manager
            .load_or_create_slice("topic-1", SliceRange::open_ended(0))
            .expect("resolve");
        let c = manager
            .load_or_create_slice("topic-0", SliceRange::open_ended(128))
            .expect("resolve");
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn failed_resolution_releases_claim_for_retry() {
        let (manager, transport) = manager_with_transport();
        let range = SliceRange::open_ended(0);
        transport.fail_next_probe();
        let err = manager
            .load_or_create_slice("topic-0", range)
            .expect_err("injected failure");
        assert!(matches!(err, SliceError::BackendUnavailable(_)));
        assert_eq!(manager.metrics().failures, 1);
        // The claim was released; the identity resolves cleanly afterwards.
        let slice = manager.load_or_create_slice("topic-0", range).expect("retry");
        assert_eq!(slice.cursor(), 0);
    }

    #[test]
    fn new_slice_mints_fresh_generations() {
        let (manager, transport) = manager_with_transport();
        let first = manager.new_slice("topic-0").expect("new slice");
        let second = manager.new_slice("topic-0").expect("new slice");
        assert!(!Arc::ptr_eq(&first, &second));
        assert_ne!(
            first.identity().range().generation,
            second.identity().range().generation
        );
        assert_eq!(first.cursor(), first.start());
        assert!(!first.is_sealed());
        // Recovery never probes prior extents.
        assert_eq!(transport.probe_count(), 0);
    }

    #[test]
    fn new_slice_advances_past_generations_registered_after_minting() {
        let (manager, _transport) = manager_with_transport();
        manager.new_slice("topic-0").expect("seed counter");
        let persisted = SliceRange::open_ended_with_generation(0, 2);
        let registered = manager
            .load_or_create_slice("topic-0", persisted)
            .expect("resolve persisted range");
        let fresh = manager.new_slice("topic-0").expect("new slice");
        assert!(fresh.identity().range().generation > 2);
        // The persisted identity keeps its original instance.
        let resolved = manager
            .load_or_create_slice("topic-0", persisted)
            .expect("resolve again");
        assert!(Arc::ptr_eq(&registered, &resolved));
    }

    /// Fails every probe with an internal error; the first probe blocks on
    /// a gate so a second caller can park on the claim first.
    struct GatedInternalFailTransport {
        started: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
        gated: AtomicBool,
    }

    impl ExtentTransport for GatedInternalFailTransport {
        fn probe_and_load(
            &self,
            _stream_name: &str,
            _range: &SliceRange,
        ) -> SliceResult<Option<LoadedExtent>> {
            if self.gated.swap(false, std::sync::atomic::Ordering::AcqRel) {
                self.started.lock().send(()).ok();
                self.release.lock().recv().ok();
            }
            Err(SliceError::internal("extent metadata corrupted"))
        }

        fn create_empty_extent(
            &self,
            _stream_name: &str,
            _range: &SliceRange,
        ) -> SliceResult<Arc<dyn Extent>> {
            Err(SliceError::internal("extent metadata corrupted"))
        }
    }

    #[test]
    fn waiters_observe_the_claimants_error_unchanged() {
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let transport = Arc::new(GatedInternalFailTransport {
            started: Mutex::new(started_tx),
            release: Mutex::new(release_rx),
            gated: AtomicBool::new(true),
        });
        let manager = Arc::new(
            StreamSliceManager::with_config(SliceManagerConfig::for_tests(), transport)
                .expect("create manager"),
        );
        let range = SliceRange::open_ended(0);

        let claimant = {
            let manager = manager.clone();
            thread::spawn(move || manager.load_or_create_slice("topic-0", range))
        };
        started_rx.recv().expect("claimant reached the transport");
        let waiter = {
            let manager = manager.clone();
            thread::spawn(move || manager.load_or_create_slice("topic-0", range))
        };
        thread::sleep(Duration::from_millis(20));
        release_tx.send(()).expect("release claimant");

        let claimant_err = claimant.join().expect("join").expect_err("claimant fails");
        let waiter_err = waiter.join().expect("join").expect_err("waiter fails");
        assert!(matches!(claimant_err, SliceError::Internal(_)));
        // Not rewrapped as BackendUnavailable on the waiting path.
        assert!(matches!(waiter_err, SliceError::Internal(_)));
    }

    #[test]
    fn new_slice_generation_skips_registered_identities() {
        let (manager, _transport) = manager_with_transport();
        let occupied = SliceRange::open_ended_with_generation(0, 5);
        manager
            .load_or_create_slice("topic-0", occupied)
            .expect("resolve");
        let fresh = manager.new_slice("topic-0").expect("new slice");
        assert!(fresh.identity().range().generation > 5);
    }

    #[test]
    fn new_slice_is_registered_under_its_identity() {
        let (manager, _transport) = manager_with_transport();
        let fresh = manager.new_slice("topic-0").expect("new slice");
        let range = fresh.identity().range();
        let resolved = manager
            .load_or_create_slice("topic-0", range)
            .expect("resolve registered");
        assert!(Arc::ptr_eq(&fresh, &resolved));
    }
}
