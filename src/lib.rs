//! Slice resolution for a tiered, network-backed log-storage engine.
//!
//! The crate maps a logical log segment, identified by a stream name and a
//! [`SliceRange`], onto a bounded ordered extent ([`Slice`]) of an elastic
//! append-only stream, so a log-segment abstraction can treat remote
//! storage like a local append-only file. [`StreamSliceManager`] owns the
//! load-or-create protocol and guarantees one live slice per identity even
//! under concurrent resolution; [`StreamSliceSupplier`] is the per-segment
//! façade with lazy `get` and the recovery-only `reset` that discards a
//! corrupted tail without losing the segment's identity.
//!
//! The physical transport is a collaborator behind [`ExtentTransport`]; it
//! owns durability, retry, and timeout policy.

pub mod config;
pub mod error;
pub mod range;
pub mod runtime;
pub mod slice;
pub mod supplier;
pub mod test_support;
pub mod transport;

mod manager;

pub use config::SliceManagerConfig;
pub use error::{SliceError, SliceResult};
pub use manager::{ResolutionMetrics, StreamSliceManager};
pub use range::{SliceRange, StreamIdentity};
pub use runtime::SliceRuntime;
pub use slice::Slice;
pub use supplier::StreamSliceSupplier;
pub use transport::{Extent, ExtentState, ExtentTransport, LoadedExtent};
