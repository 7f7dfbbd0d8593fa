// ── Wire → domain conversion ──
//
// Turns a decoded telemetry message into a `Snapshot`. Only top-level
// scalars are metrics; nested or null values are skipped.

use chrono::{DateTime, Utc};
use serde_json::Value;
use telesync_api::TelemetryMessage;

use crate::error::SyncError;
use crate::model::{Fields, MetricValue, Snapshot, Source};

/// Convert a telemetry message received at `observed_at` into a snapshot.
///
/// Fails with [`SyncError::Parse`] when the message carries no usable
/// metric at all.
pub fn snapshot_from_message(
    message: &TelemetryMessage,
    observed_at: DateTime<Utc>,
    source: Source,
) -> Result<Snapshot, SyncError> {
    let fields: Fields = message
        .metrics
        .iter()
        .filter_map(|(name, value)| metric_value(value).map(|v| (name.clone(), v)))
        .collect();

    if fields.is_empty() {
        return Err(SyncError::parse("payload contains no scalar metrics"));
    }

    Ok(Snapshot::new(fields, observed_at, source).with_reported_at(message.reported_at()))
}

/// Parse a raw text body (HTTP response or WebSocket text frame).
///
/// Returns `Ok(None)` for keep-alive messages.
pub fn snapshot_from_text(
    text: &str,
    observed_at: DateTime<Utc>,
    source: Source,
) -> Result<Option<Snapshot>, SyncError> {
    match telesync_api::payload::parse(text)? {
        telesync_api::Inbound::Telemetry(message) => {
            snapshot_from_message(&message, observed_at, source).map(Some)
        }
        telesync_api::Inbound::KeepAlive => Ok(None),
    }
}

fn metric_value(value: &Value) -> Option<MetricValue> {
    match value {
        Value::Bool(b) => Some(MetricValue::Bool(*b)),
        Value::Number(n) => n.as_f64().map(MetricValue::Number),
        Value::String(s) => Some(MetricValue::Text(s.clone())),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
