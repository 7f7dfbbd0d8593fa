// ── Snapshot storage ──
//
// The single source of truth consumers read from. Writes come only from
// the reconciliation step.

mod snapshot_store;

pub use snapshot_store::{SnapshotStore, Subscription};
