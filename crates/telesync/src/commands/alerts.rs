//! `telesync alerts`: fetch once and evaluate thresholds.

use tabled::Tabled;

use telesync_core::{Alert, AlertSeverity, AlertThresholds, ControllerConfig, evaluate_alerts};

use crate::cli::{AlertsArgs, FailOn, GlobalOpts};
use crate::commands::fetch;
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct AlertRow {
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Message")]
    message: String,
}

pub async fn handle(
    args: &AlertsArgs,
    config: &ControllerConfig,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let snapshot = fetch::fetch_snapshot(config).await?;
    let alerts = evaluate_alerts(&snapshot, &thresholds(args));
    let color = output::should_color(global.color);

    let out = output::render_list(
        global.output,
        &alerts,
        |alert| AlertRow {
            severity: output::paint_severity(alert.severity, color),
            metric: alert.metric.unwrap_or("-").to_owned(),
            message: alert.message.clone(),
        },
        |alert| format!("{}\t{}", output::severity_label(alert.severity), alert.message),
    );
    output::print_output(&out, global.quiet);

    match args.fail_on {
        Some(fail_on) => check_fail_on(&alerts, fail_on),
        None => Ok(()),
    }
}

/// Defaults with any flag overrides applied.
pub fn thresholds(args: &AlertsArgs) -> AlertThresholds {
    let defaults = AlertThresholds::default();
    AlertThresholds {
        temperature_critical: args
            .temperature_critical
            .unwrap_or(defaults.temperature_critical),
        temperature_warning: args
            .temperature_warning
            .unwrap_or(defaults.temperature_warning),
        battery_critical: args.battery_critical.unwrap_or(defaults.battery_critical),
        battery_warning: args.battery_warning.unwrap_or(defaults.battery_warning),
        humidity_warning: args.humidity_warning.unwrap_or(defaults.humidity_warning),
        door_open_warning: args.door_open_warning.unwrap_or(defaults.door_open_warning),
    }
}

fn check_fail_on(alerts: &[Alert], fail_on: FailOn) -> Result<(), CliError> {
    let floor = match fail_on {
        FailOn::Warning => AlertSeverity::Warning,
        FailOn::Critical => AlertSeverity::Critical,
    };
    let count = alerts.iter().filter(|a| a.severity >= floor).count();
    if count == 0 {
        return Ok(());
    }
    Err(CliError::AlertsRaised {
        count,
        severity: output::severity_label(floor).into(),
    })
}
