//! Output formatting: table, JSON, YAML, plain.
//!
//! Renders data in the format selected by `--output`. Table uses `tabled`,
//! structured formats use serde, plain emits `key=value` lines.

use std::fmt::Write as _;
use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use serde::Serialize;
use tabled::{Table, Tabled, settings::Style};

use telesync_core::{AlertSeverity, Freshness, Snapshot, SyncState};

use crate::cli::{ColorMode, OutputFormat};

// ── Color helpers ────────────────────────────────────────────────────

/// Determine whether color output should be enabled.
pub fn should_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none(),
    }
}

pub fn paint_severity(severity: AlertSeverity, color: bool) -> String {
    let label = severity_label(severity);
    if !color {
        return label.to_owned();
    }
    match severity {
        AlertSeverity::Critical => label.red().bold().to_string(),
        AlertSeverity::Warning => label.yellow().to_string(),
        AlertSeverity::Normal => label.green().to_string(),
    }
}

pub fn severity_label(severity: AlertSeverity) -> &'static str {
    match severity {
        AlertSeverity::Critical => "critical",
        AlertSeverity::Warning => "warning",
        AlertSeverity::Normal => "normal",
    }
}

pub fn paint_state(state: SyncState, color: bool) -> String {
    let label = state.to_string();
    if !color {
        return label;
    }
    match state {
        SyncState::Live { .. } => label.green().to_string(),
        SyncState::Degraded => label.yellow().to_string(),
        SyncState::Starting | SyncState::Stopped => label.dimmed().to_string(),
    }
}

pub fn paint_freshness(freshness: Freshness, color: bool) -> String {
    let label = match freshness {
        Freshness::Fresh => "fresh".to_owned(),
        Freshness::Stale {
            last_observed: Some(at),
        } => format!("stale (last {})", at.format("%H:%M:%S")),
        Freshness::Stale {
            last_observed: None,
        } => "stale (no data yet)".to_owned(),
    };
    match (color, freshness.is_stale()) {
        (false, _) => label,
        (true, true) => label.red().to_string(),
        (true, false) => label.green().to_string(),
    }
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a list of serde-serializable + tabled items in the chosen format.
///
/// - `table`: uses the `Tabled` derive to build a pretty table
/// - `json` / `json-compact`: serializes the original data via serde
/// - `yaml`: serializes via serde_yaml
/// - `plain`: calls `line_fn` on each item to emit one line per item
pub fn render_list<T, R>(
    format: OutputFormat,
    data: &[T],
    to_row: impl Fn(&T) -> R,
    line_fn: impl Fn(&T) -> String,
) -> String
where
    T: Serialize,
    R: Tabled,
{
    match format {
        OutputFormat::Table => {
            let rows: Vec<R> = data.iter().map(to_row).collect();
            render_table(&rows)
        }
        OutputFormat::Json => render_json(data, false),
        OutputFormat::JsonCompact => render_json(data, true),
        OutputFormat::Yaml => render_yaml(data),
        OutputFormat::Plain => data.iter().map(&line_fn).collect::<Vec<_>>().join("\n"),
    }
}

/// Render a single serde-serializable item in the chosen format.
///
/// Table rendering uses a custom `detail_fn` that returns a pre-formatted
/// string, since single-item views don't use `Tabled` derive.
pub fn render_single<T>(
    format: OutputFormat,
    data: &T,
    detail_fn: impl Fn(&T) -> String,
    plain_fn: impl Fn(&T) -> String,
) -> String
where
    T: Serialize,
{
    match format {
        OutputFormat::Table => detail_fn(data),
        OutputFormat::Json => render_json(data, false),
        OutputFormat::JsonCompact => render_json(data, true),
        OutputFormat::Yaml => render_yaml(data),
        OutputFormat::Plain => plain_fn(data),
    }
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
    let _ = stdout.flush();
}

// ── Snapshot views ───────────────────────────────────────────────────

#[derive(Tabled)]
struct MetricRow {
    #[tabled(rename = "Metric")]
    name: String,
    #[tabled(rename = "Value")]
    value: String,
}

/// Metric table followed by provenance lines.
pub fn snapshot_detail(snapshot: &Snapshot) -> String {
    let rows: Vec<MetricRow> = snapshot
        .fields()
        .iter()
        .map(|(name, value)| MetricRow {
            name: name.clone(),
            value: value.to_string(),
        })
        .collect();

    let mut out = render_table(&rows);
    let _ = write!(
        out,
        "\nobserved {} via {}",
        snapshot.observed_at().to_rfc3339(),
        snapshot.source()
    );
    if let Some(reported) = snapshot.reported_at() {
        let _ = write!(out, " (device clock {})", reported.to_rfc3339());
    }
    out
}

/// One `name=value` line per metric.
pub fn snapshot_plain(snapshot: &Snapshot) -> String {
    snapshot
        .fields()
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Metrics on a single line, for streaming views.
pub fn snapshot_inline(snapshot: &Snapshot) -> String {
    snapshot
        .fields()
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join(" ")
}

// ── Format-specific renderers ────────────────────────────────────────

fn render_table<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

fn render_json<T: Serialize + ?Sized>(data: &T, compact: bool) -> String {
    let rendered = if compact {
        serde_json::to_string(data)
    } else {
        serde_json::to_string_pretty(data)
    };
    rendered.unwrap_or_else(|e| format!("{{\"error\":\"serialization failed: {e}\"}}"))
}

/// Compact single-line JSON, for line-delimited streams.
pub fn render_json_line<T: Serialize + ?Sized>(data: &T) -> String {
    render_json(data, true)
}

/// YAML output.
pub fn render_yaml<T: Serialize + ?Sized>(data: &T) -> String {
    serde_yaml::to_string(data).unwrap_or_else(|e| format!("# serialization failed: {e}\n"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{TimeZone, Utc};
    use telesync_core::{Fields, MetricValue, Source};

    use super::*;

    fn snapshot() -> Snapshot {
        let mut fields = Fields::new();
        fields.insert("temperature".into(), MetricValue::Number(4.5));
        fields.insert("door_open".into(), MetricValue::Bool(false));
        Snapshot::new(
            fields,
            Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
            Source::Pull,
        )
    }

    #[test]
    fn plain_lists_metrics_in_name_order() {
        assert_eq!(snapshot_plain(&snapshot()), "door_open=false\ntemperature=4.5");
    }

    #[test]
    fn table_includes_metrics_and_source() {
        let out = snapshot_detail(&snapshot());
        assert!(out.contains("temperature"));
        assert!(out.contains("4.5"));
        assert!(out.contains("via pull"));
    }

    #[test]
    fn json_renders_fields_and_source() {
        let out = render_single(OutputFormat::Json, &snapshot(), snapshot_detail, snapshot_plain);
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["source"], "pull");
        assert_eq!(value["fields"]["temperature"], 4.5);
    }

    #[test]
    fn colorless_labels_are_plain_text() {
        assert_eq!(paint_severity(AlertSeverity::Critical, false), "critical");
        assert_eq!(
            paint_state(SyncState::Live { via: Source::Push }, false),
            "live (push)"
        );
        assert_eq!(
            paint_freshness(
                Freshness::Stale {
                    last_observed: None
                },
                false
            ),
            "stale (no data yet)"
        );
    }
}
