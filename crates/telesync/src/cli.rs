//! Clap derive structures for the `telesync` CLI.
//!
//! Defines the command tree, global flags, and shared types.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// telesync -- live device telemetry over push with polling fallback
#[derive(Debug, Parser)]
#[command(
    name = "telesync",
    version,
    about = "Watch device telemetry from the command line",
    long_about = "A client for devices that publish telemetry over a WebSocket push\n\
        channel and an HTTP status endpoint.\n\n\
        Push is preferred; when it goes silent or drops, telesync polls the\n\
        status endpoint until push recovers.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Device profile to use
    #[arg(long, short = 'p', env = "TELESYNC_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "TELESYNC_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Status endpoint URL (overrides profile)
    #[arg(long, short = 's', env = "TELESYNC_STATUS_URL", global = true)]
    pub status_url: Option<String>,

    /// Push endpoint URL (overrides profile)
    #[arg(long, env = "TELESYNC_STREAM_URL", global = true)]
    pub stream_url: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "TELESYNC_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Accept self-signed TLS certificates on the status endpoint
    #[arg(long, short = 'k', env = "TELESYNC_INSECURE", global = true)]
    pub insecure: bool,

    /// Status request timeout ("8s", "1m 30s", or plain seconds)
    #[arg(long, env = "TELESYNC_TIMEOUT", value_parser = parse_timeout, global = true)]
    pub timeout: Option<Duration>,
}

fn parse_timeout(raw: &str) -> Result<Duration, String> {
    let duration = match raw.trim().parse::<u64>() {
        Ok(secs) => Duration::from_secs(secs),
        Err(_) => humantime::parse_duration(raw).map_err(|e| e.to_string())?,
    };
    if duration.is_zero() {
        return Err("timeout must be greater than zero".into());
    }
    Ok(duration)
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Follow live telemetry until interrupted
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Fetch one snapshot from the status endpoint
    #[command(alias = "f")]
    Fetch,

    /// Fetch one snapshot and evaluate threshold alerts
    #[command(alias = "a")]
    Alerts(AlertsArgs),

    /// Manage configuration profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Watch ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Ignore the push endpoint and poll only
    #[arg(long)]
    pub pull_only: bool,

    /// Exit after this many snapshots
    #[arg(long, short = 'n')]
    pub count: Option<u64>,

    /// Also evaluate alerts for every snapshot
    #[arg(long)]
    pub alerts: bool,
}

// ── Alerts ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct AlertsArgs {
    /// Temperature above which an alert is critical (°C)
    #[arg(long)]
    pub temperature_critical: Option<f64>,

    /// Temperature above which an alert is a warning (°C)
    #[arg(long)]
    pub temperature_warning: Option<f64>,

    /// Battery level below which an alert is critical (%)
    #[arg(long)]
    pub battery_critical: Option<f64>,

    /// Battery level below which an alert is a warning (%)
    #[arg(long)]
    pub battery_warning: Option<f64>,

    /// Humidity above which an alert is a warning (%)
    #[arg(long)]
    pub humidity_warning: Option<f64>,

    /// Door-open time after which an alert is raised ("5m")
    #[arg(long, value_parser = humantime::parse_duration)]
    pub door_open_warning: Option<Duration>,

    /// Exit non-zero when any alert reaches this severity
    #[arg(long)]
    pub fail_on: Option<FailOn>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FailOn {
    Warning,
    Critical,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file path
    Path,

    /// Show the effective configuration
    Show,

    /// Write a starter config file. `--status-url` and `--stream-url`
    /// set the default profile's endpoints.
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// List configured profiles
    Profiles,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
