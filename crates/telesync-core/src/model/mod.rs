// ── Domain model ──
//
// Canonical types shared by the adapters, the store, and consumers.

mod alert;
mod snapshot;

pub use alert::{Alert, AlertSeverity, AlertThresholds, evaluate_alerts};
pub use snapshot::{Fields, MetricValue, Snapshot, Source, metric};
