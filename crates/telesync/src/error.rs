//! CLI error types with miette diagnostics.
//!
//! Maps `SyncError` and `ConfigError` into user-facing errors with
//! actionable help text.

use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;

use telesync_config::ConfigError;
use telesync_core::SyncError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
    pub const PAYLOAD: i32 = 9;
    pub const ALERT: i32 = 10;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Device ───────────────────────────────────────────────────────

    #[error("Could not reach the status endpoint at {url}: {reason}")]
    #[diagnostic(
        code(telesync::connection_failed),
        help(
            "Check that the device is running and reachable.\n\
             URL: {url}\n\
             For self-signed certificates try --insecure (-k)."
        )
    )]
    ConnectionFailed { url: String, reason: String },

    #[error("The status endpoint did not answer within {after:?}")]
    #[diagnostic(
        code(telesync::timeout),
        help("Raise the limit with --timeout, e.g. --timeout 20s.")
    )]
    Timeout { after: Duration },

    #[error("Unusable telemetry payload: {message}")]
    #[diagnostic(
        code(telesync::payload),
        help("The endpoint answered, but not with a telemetry object. Is the URL right?")
    )]
    Payload { message: String },

    #[error("{count} alert(s) at or above {severity}")]
    #[diagnostic(code(telesync::alerts))]
    AlertsRaised { count: usize, severity: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("No config found and no --status-url given")]
    #[diagnostic(
        code(telesync::no_config),
        help(
            "Create a config with: telesync config init\n\
             Or pass --status-url (TELESYNC_STATUS_URL).\n\
             Looked in: {path}"
        )
    )]
    NoConfig { path: String },

    #[error("Profile '{name}' not found")]
    #[diagnostic(
        code(telesync::profile_not_found),
        help("Available profiles: {available}")
    )]
    ProfileNotFound { name: String, available: String },

    #[error("Invalid {field}: {reason}")]
    #[diagnostic(code(telesync::validation))]
    Validation { field: String, reason: String },

    #[error("Config file already exists at {path}")]
    #[diagnostic(
        code(telesync::config_exists),
        help("Pass --force to overwrite it.")
    )]
    ConfigExists { path: String },

    #[error(transparent)]
    #[diagnostic(code(telesync::config))]
    Config(ConfigError),

    #[error(transparent)]
    #[diagnostic(code(telesync::io))]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Payload { .. } => exit_code::PAYLOAD,
            Self::AlertsRaised { .. } => exit_code::ALERT,
            Self::NoConfig { .. } | Self::Validation { .. } => exit_code::USAGE,
            Self::ProfileNotFound { .. } => exit_code::NOT_FOUND,
            Self::ConfigExists { .. } => exit_code::CONFLICT,
            Self::Config(_) | Self::Io(_) => exit_code::GENERAL,
        }
    }

    /// Attach the endpoint URL to a sync failure.
    pub fn from_sync(err: SyncError, url: &url::Url) -> Self {
        match err {
            SyncError::Transport { message, .. } => Self::ConnectionFailed {
                url: url.to_string(),
                reason: message,
            },
            SyncError::Timeout { after } => Self::Timeout { after },
            SyncError::Parse { message } => Self::Payload { message },
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            ConfigError::ProfileNotFound { profile } => Self::ProfileNotFound {
                name: profile,
                available: "(none)".into(),
            },
            other => Self::Config(other),
        }
    }
}
