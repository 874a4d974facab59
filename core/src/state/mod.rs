//! Shared lifecycle state machine and snapshot persistence.
//!
//! Both managers move through the same phases:
//!
//! ```text
//! NotStarted -> Active <-> Backgrounded
//! Active | Backgrounded -> Ended(Completed | Abandoned | TimedOut)
//! ```
//!
//! Snapshots of the owning session are written through a single in-order
//! [`SnapshotWriter`] so that back-to-back mutations never leave a stale value
//! in the store.

pub mod snapshot;
pub mod transitions;
pub mod types;

pub use snapshot::{load_snapshot, SnapshotWriter};
pub use transitions::{LifecycleAction, StateTransition, TransitionError};
pub use types::{EndKind, SessionPhase};
