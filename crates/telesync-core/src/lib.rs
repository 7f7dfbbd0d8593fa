// telesync-core: Push/pull synchronization layer between telesync-api and consumers (CLI).

pub mod clock;
pub mod config;
pub mod convert;
pub mod controller;
pub mod error;
pub mod model;
pub mod pull;
pub mod push;
pub mod reconcile;
pub mod store;
pub mod stream;

#[cfg(test)]
mod testing;

// ── Primary re-exports ──────────────────────────────────────────────
pub use clock::Clock;
pub use config::{ControllerConfig, ReconnectConfig, SyncConfig, TlsVerification};
pub use controller::{Controller, Freshness, SyncReport, SyncState};
pub use error::{ErrorKind, SyncError};
pub use pull::{PullAdapter, PullSource};
pub use push::{
    ConnectionState, Frame, FrameStream, PushAdapter, PushEvent, PushTransport,
    WebSocketTransport,
};
pub use reconcile::{Outcome, RejectReason};
pub use store::{SnapshotStore, Subscription};
pub use stream::{SnapshotStream, SnapshotWatchStream};

pub use model::{
    Alert, AlertSeverity, AlertThresholds, Fields, MetricValue, Snapshot, Source, evaluate_alerts,
    metric,
};
