//! CLI configuration: thin wrapper around `telesync_config`.
//!
//! Adds resolution that respects `GlobalOpts` flag overrides
//! (--status-url, --stream-url, --insecure, --timeout).

use std::path::PathBuf;

use telesync_core::{ControllerConfig, TlsVerification};

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub use telesync_config::{Config, load_config_from, save_config_to};

/// The config file in effect: `--config` or the platform default.
pub fn config_file(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(telesync_config::config_path)
}

pub fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    let config = match global.config {
        Some(ref path) => load_config_from(path)?,
        None => telesync_config::load_config()?,
    };
    Ok(config)
}

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Build a `ControllerConfig` from the config file, profile, and CLI
/// overrides. Without a matching profile, `--status-url` alone is
/// enough.
pub fn build_controller_config(
    global: &GlobalOpts,
    config: &Config,
) -> Result<ControllerConfig, CliError> {
    let name = active_profile_name(global, config);

    let base = if let Some(profile) = config.profiles.get(&name) {
        tracing::debug!(profile = %name, "using profile");
        telesync_config::profile_to_controller_config(profile, &config.defaults)?
    } else if global.profile.is_some() {
        return Err(CliError::ProfileNotFound {
            name,
            available: available_profiles(config),
        });
    } else {
        let raw = global.status_url.as_deref().ok_or_else(|| CliError::NoConfig {
            path: config_file(global).display().to_string(),
        })?;
        let status_url = telesync_config::parse_url("status_url", raw, &["http", "https"])?;
        ControllerConfig {
            status_url,
            stream_url: None,
            tls: if config.defaults.insecure {
                TlsVerification::DangerAcceptInvalid
            } else {
                TlsVerification::SystemDefaults
            },
            sync: config.defaults.sync.to_sync_config()?,
        }
    };

    apply_overrides(base, global)
}

fn apply_overrides(
    mut config: ControllerConfig,
    global: &GlobalOpts,
) -> Result<ControllerConfig, CliError> {
    if let Some(ref raw) = global.status_url {
        config.status_url = telesync_config::parse_url("status_url", raw, &["http", "https"])?;
    }
    if let Some(ref raw) = global.stream_url {
        config.stream_url = Some(telesync_config::parse_url(
            "stream_url",
            raw,
            &["ws", "wss"],
        )?);
    }
    if global.insecure {
        config.tls = TlsVerification::DangerAcceptInvalid;
    }
    if let Some(timeout) = global.timeout {
        config.sync.pull_timeout = timeout;
    }
    Ok(config)
}

fn available_profiles(config: &Config) -> String {
    if config.profiles.is_empty() {
        return "(none)".into();
    }
    config.profiles.keys().cloned().collect::<Vec<_>>().join(", ")
}
