// ── Telemetry snapshot ──
//
// One immutable observation of device state, tagged with where it came
// from and when this client received it.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Well-known metric names. The field set is open; these are only the
/// ones with typed accessors on [`Snapshot`].
pub mod metric {
    pub const TEMPERATURE: &str = "temperature";
    pub const HUMIDITY: &str = "humidity";
    pub const BATTERY: &str = "battery";
    pub const STORAGE_USED: &str = "storage_used";
    pub const SOLAR_ACTIVE: &str = "solar_active";
    pub const DOOR_OPEN: &str = "door_open";
    pub const DOOR_OPEN_DURATION: &str = "door_open_duration";
}

// ── Source ───────────────────────────────────────────────────────────

/// Which adapter produced a snapshot.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Source {
    Push,
    Pull,
}

// ── MetricValue ──────────────────────────────────────────────────────

/// A single scalar metric reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl MetricValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            // Whole numbers print without a trailing `.0`.
            Self::Number(n) if n.fract().abs() < f64::EPSILON && n.abs() < 1e15 => {
                write!(f, "{n:.0}")
            }
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Metric name -> value. Ordered so snapshots render deterministically.
pub type Fields = BTreeMap<String, MetricValue>;

// ── Snapshot ─────────────────────────────────────────────────────────

/// One immutable observation of device telemetry.
///
/// `observed_at` is the receipt time assigned by the adapter and is the
/// only ordering key. `sequence` is stamped by reconciliation when the
/// snapshot is accepted into the store (zero until then) and is meant
/// for change detection only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    fields: Arc<Fields>,
    observed_at: DateTime<Utc>,
    sequence: u64,
    source: Source,
    #[serde(skip_serializing_if = "Option::is_none")]
    reported_at: Option<DateTime<Utc>>,
}

impl Snapshot {
    pub fn new(fields: Fields, observed_at: DateTime<Utc>, source: Source) -> Self {
        Self {
            fields: Arc::new(fields),
            observed_at,
            sequence: 0,
            source,
            reported_at: None,
        }
    }

    /// Attach the device-reported timestamp. Informational only.
    pub fn with_reported_at(mut self, reported_at: Option<DateTime<Utc>>) -> Self {
        self.reported_at = reported_at;
        self
    }

    pub(crate) fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn observed_at(&self) -> DateTime<Utc> {
        self.observed_at
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn source(&self) -> Source {
        self.source
    }

    pub fn reported_at(&self) -> Option<DateTime<Utc>> {
        self.reported_at
    }

    pub fn get(&self, name: &str) -> Option<&MetricValue> {
        self.fields.get(name)
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(MetricValue::as_f64)
    }

    pub fn flag(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(MetricValue::as_bool)
    }

    // ── Typed accessors ──────────────────────────────────────────────

    /// Cold-store temperature in °C.
    pub fn temperature(&self) -> Option<f64> {
        self.number(metric::TEMPERATURE)
    }

    /// Relative humidity in percent.
    pub fn humidity(&self) -> Option<f64> {
        self.number(metric::HUMIDITY)
    }

    /// Battery charge in percent.
    pub fn battery(&self) -> Option<f64> {
        self.number(metric::BATTERY)
    }

    pub fn storage_used(&self) -> Option<f64> {
        self.number(metric::STORAGE_USED)
    }

    pub fn solar_active(&self) -> Option<bool> {
        self.flag(metric::SOLAR_ACTIVE)
    }

    pub fn door_open(&self) -> Option<bool> {
        self.flag(metric::DOOR_OPEN)
    }

    /// How long the door has been open, as reported by the device.
    pub fn door_open_duration(&self) -> Option<Duration> {
        self.number(metric::DOOR_OPEN_DURATION)
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }
}
