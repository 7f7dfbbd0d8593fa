//! `telesync watch`: run the sync controller and stream what it sees.
//!
//! Human formats print one timestamped line per event. JSON formats emit
//! one object per line, YAML one document per event.

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;

use telesync_core::{
    Alert, AlertSeverity, AlertThresholds, Controller, ControllerConfig, Freshness, Snapshot,
    Source, SyncReport, SyncState, evaluate_alerts,
};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

#[derive(Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum WatchEvent<'a> {
    Snapshot { snapshot: &'a Snapshot },
    State { sync: SyncState },
    Freshness { freshness: Freshness },
    Report {
        origin: Source,
        kind: String,
        message: String,
        at: DateTime<Utc>,
    },
    Alerts { alerts: &'a [Alert] },
}

struct Printer {
    format: OutputFormat,
    color: bool,
    quiet: bool,
    thresholds: Option<AlertThresholds>,
}

impl Printer {
    fn structured(&self) -> bool {
        !matches!(self.format, OutputFormat::Table | OutputFormat::Plain)
    }

    fn emit(&self, event: &WatchEvent<'_>) {
        let rendered = match self.format {
            OutputFormat::Yaml => format!("---\n{}", output::render_yaml(event).trim_end()),
            _ => output::render_json_line(event),
        };
        output::print_output(&rendered, self.quiet);
    }

    fn line(&self, at: DateTime<Utc>, tag: &str, text: &str) {
        let stamp = at.with_timezone(&Local).format("%H:%M:%S");
        output::print_output(&format!("{stamp}  {tag:<9} {text}"), self.quiet);
    }

    fn snapshot(&self, snapshot: &Snapshot) {
        if self.structured() {
            self.emit(&WatchEvent::Snapshot { snapshot });
        } else {
            let tag = format!("#{} {}", snapshot.sequence(), snapshot.source());
            self.line(
                snapshot.observed_at(),
                &tag,
                &output::snapshot_inline(snapshot),
            );
        }

        if let Some(ref limits) = self.thresholds {
            self.alerts(snapshot, &evaluate_alerts(snapshot, limits));
        }
    }

    fn alerts(&self, snapshot: &Snapshot, alerts: &[Alert]) {
        if self.structured() {
            self.emit(&WatchEvent::Alerts { alerts });
            return;
        }
        for alert in alerts
            .iter()
            .filter(|a| a.severity > AlertSeverity::Normal)
        {
            self.line(
                snapshot.observed_at(),
                &output::paint_severity(alert.severity, self.color),
                &alert.message,
            );
        }
    }

    fn state(&self, sync: SyncState) {
        if self.structured() {
            self.emit(&WatchEvent::State { sync });
        } else {
            self.line(Utc::now(), "state", &output::paint_state(sync, self.color));
        }
    }

    fn freshness(&self, freshness: Freshness) {
        if self.structured() {
            self.emit(&WatchEvent::Freshness { freshness });
        } else {
            self.line(
                Utc::now(),
                "data",
                &output::paint_freshness(freshness, self.color),
            );
        }
    }

    /// Reports go to stderr in human formats so stdout stays clean.
    fn report(&self, report: &SyncReport) {
        if self.structured() {
            self.emit(&WatchEvent::Report {
                origin: report.origin,
                kind: report.error.kind().to_string(),
                message: report.error.to_string(),
                at: report.at,
            });
        } else {
            let stamp = report.at.with_timezone(&Local).format("%H:%M:%S");
            eprintln!("{stamp}  {:<9} {}", report.origin, report.error);
        }
    }
}

pub async fn handle(
    args: &WatchArgs,
    mut config: ControllerConfig,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    if args.pull_only {
        config.stream_url = None;
    }
    let status_url = config.status_url.clone();
    let controller = Controller::new(config).map_err(|e| CliError::from_sync(e, &status_url))?;

    let printer = Printer {
        format: global.output,
        color: output::should_color(global.color),
        quiet: global.quiet,
        thresholds: args.alerts.then(AlertThresholds::default),
    };

    let seen = follow(&controller, &printer, args.count).await;
    controller.stop().await;
    tracing::debug!(snapshots = seen, "watch finished");
    Ok(())
}

/// Drive the output loop until Ctrl-C or `limit` snapshots. Returns the
/// number of snapshots printed.
async fn follow(controller: &Controller, printer: &Printer, limit: Option<u64>) -> u64 {
    let mut changes = controller.snapshots();
    let mut sync_state = controller.sync_state();
    let mut freshness = controller.freshness();
    let mut reports = controller.reports();

    controller.start().await;
    printer.state(*sync_state.borrow_and_update());

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut seen = 0_u64;

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::debug!("interrupted");
                break;
            }
            next = changes.changed() => match next {
                Some(Some(snapshot)) => {
                    printer.snapshot(&snapshot);
                    seen += 1;
                    if limit.is_some_and(|n| seen >= n) {
                        break;
                    }
                }
                Some(None) => {}
                None => break,
            },
            Ok(()) = sync_state.changed() => {
                let state = *sync_state.borrow_and_update();
                printer.state(state);
            }
            Ok(()) = freshness.changed() => {
                let value = *freshness.borrow_and_update();
                printer.freshness(value);
            }
            report = reports.recv() => match report {
                Ok(report) => printer.report(&report),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "report stream lagged");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    seen
}
