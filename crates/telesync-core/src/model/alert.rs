// ── Threshold alerts ──
//
// Consumer-side alert evaluation over the current snapshot. Pure: no
// state is kept between evaluations.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::snapshot::{Snapshot, metric};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Normal,
    Warning,
    Critical,
}

/// One finding from [`evaluate_alerts`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub severity: AlertSeverity,
    /// The metric that tripped, or `None` for the all-clear alert.
    pub metric: Option<&'static str>,
    pub message: String,
    /// `observed_at` of the snapshot the alert was derived from.
    pub observed_at: DateTime<Utc>,
}

/// Limits for cold-storage telemetry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertThresholds {
    pub temperature_critical: f64,
    pub temperature_warning: f64,
    pub battery_critical: f64,
    pub battery_warning: f64,
    pub humidity_warning: f64,
    pub door_open_warning: Duration,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            temperature_critical: 8.0,
            temperature_warning: 6.0,
            battery_critical: 25.0,
            battery_warning: 40.0,
            humidity_warning: 80.0,
            door_open_warning: Duration::from_secs(300),
        }
    }
}

/// Evaluate a snapshot against the thresholds.
///
/// Missing metrics never alert. When nothing trips, a single
/// [`AlertSeverity::Normal`] alert is returned so consumers always have
/// something to show.
pub fn evaluate_alerts(snapshot: &Snapshot, limits: &AlertThresholds) -> Vec<Alert> {
    let observed_at = snapshot.observed_at();
    let alert = |severity, metric, message: String| Alert {
        severity,
        metric: Some(metric),
        message,
        observed_at,
    };
    let mut alerts = Vec::new();

    if let Some(temp) = snapshot.temperature() {
        if temp > limits.temperature_critical {
            alerts.push(alert(
                AlertSeverity::Critical,
                metric::TEMPERATURE,
                format!(
                    "Temperature critical: {temp}°C exceeds safe limit ({}°C)",
                    limits.temperature_critical
                ),
            ));
        } else if temp > limits.temperature_warning {
            alerts.push(alert(
                AlertSeverity::Warning,
                metric::TEMPERATURE,
                format!("Temperature warning: {temp}°C approaching limit"),
            ));
        }
    }

    if let Some(battery) = snapshot.battery() {
        if battery < limits.battery_critical {
            alerts.push(alert(
                AlertSeverity::Critical,
                metric::BATTERY,
                format!("Battery critical: {battery}% - charge immediately"),
            ));
        } else if battery < limits.battery_warning {
            alerts.push(alert(
                AlertSeverity::Warning,
                metric::BATTERY,
                format!("Battery low: {battery}% remaining"),
            ));
        }
    }

    if let Some(humidity) = snapshot.humidity() {
        if humidity > limits.humidity_warning {
            alerts.push(alert(
                AlertSeverity::Warning,
                metric::HUMIDITY,
                format!("High humidity: {humidity}% - check ventilation"),
            ));
        }
    }

    if snapshot.door_open() == Some(true) {
        if let Some(open_for) = snapshot
            .door_open_duration()
            .filter(|d| *d > limits.door_open_warning)
        {
            alerts.push(alert(
                AlertSeverity::Warning,
                metric::DOOR_OPEN,
                format!(
                    "Door open: container door has been open for {} minutes",
                    open_for.as_secs() / 60
                ),
            ));
        }
    }

    if alerts.is_empty() {
        alerts.push(Alert {
            severity: AlertSeverity::Normal,
            metric: None,
            message: "All systems operating normally".into(),
            observed_at,
        });
    }

    alerts
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::{Fields, MetricValue, Source};

    fn snapshot(pairs: &[(&str, MetricValue)]) -> Snapshot {
        let fields: Fields = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect();
        let at = Utc.with_ymd_and_hms(2026, 2, 10, 12, 0, 0).unwrap();
        Snapshot::new(fields, at, Source::Pull)
    }

    fn severities(alerts: &[Alert]) -> Vec<(Option<&'static str>, AlertSeverity)> {
        alerts.iter().map(|a| (a.metric, a.severity)).collect()
    }

    #[test]
    fn nominal_readings_yield_single_normal_alert() {
        let snap = snapshot(&[
            ("temperature", MetricValue::Number(4.4)),
            ("humidity", MetricValue::Number(61.0)),
            ("battery", MetricValue::Number(61.0)),
            ("door_open", MetricValue::Bool(false)),
        ]);
        let alerts = evaluate_alerts(&snap, &AlertThresholds::default());
        assert_eq!(severities(&alerts), vec![(None, AlertSeverity::Normal)]);
    }

    #[test]
    fn temperature_bands() {
        let limits = AlertThresholds::default();

        let warm = snapshot(&[("temperature", MetricValue::Number(6.5))]);
        assert_eq!(
            severities(&evaluate_alerts(&warm, &limits)),
            vec![(Some("temperature"), AlertSeverity::Warning)]
        );

        let hot = snapshot(&[("temperature", MetricValue::Number(8.2))]);
        assert_eq!(
            severities(&evaluate_alerts(&hot, &limits)),
            vec![(Some("temperature"), AlertSeverity::Critical)]
        );

        // Exactly at the limit does not trip.
        let edge = snapshot(&[("temperature", MetricValue::Number(8.0))]);
        assert_eq!(
            severities(&evaluate_alerts(&edge, &limits)),
            vec![(Some("temperature"), AlertSeverity::Warning)]
        );
    }

    #[test]
    fn battery_and_humidity_stack() {
        let snap = snapshot(&[
            ("battery", MetricValue::Number(22.0)),
            ("humidity", MetricValue::Number(84.0)),
        ]);
        let alerts = evaluate_alerts(&snap, &AlertThresholds::default());
        assert_eq!(
            severities(&alerts),
            vec![
                (Some("battery"), AlertSeverity::Critical),
                (Some("humidity"), AlertSeverity::Warning),
            ]
        );
    }

    #[test]
    fn door_needs_both_flag_and_duration() {
        let limits = AlertThresholds::default();

        let brief = snapshot(&[
            ("door_open", MetricValue::Bool(true)),
            ("door_open_duration", MetricValue::Number(120.0)),
        ]);
        assert_eq!(evaluate_alerts(&brief, &limits)[0].severity, AlertSeverity::Normal);

        let long = snapshot(&[
            ("door_open", MetricValue::Bool(true)),
            ("door_open_duration", MetricValue::Number(900.0)),
        ]);
        let alerts = evaluate_alerts(&long, &limits);
        assert_eq!(alerts[0].metric, Some("door_open"));
        assert!(alerts[0].message.contains("15 minutes"));
    }

    #[test]
    fn custom_thresholds() {
        let limits = AlertThresholds {
            temperature_warning: 4.0,
            ..AlertThresholds::default()
        };
        let snap = snapshot(&[("temperature", MetricValue::Number(4.4))]);
        assert_eq!(
            evaluate_alerts(&snap, &limits)[0].severity,
            AlertSeverity::Warning
        );
    }
}
