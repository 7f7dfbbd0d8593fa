//! Shared configuration for the telesync CLI.
//!
//! TOML profiles, environment overrides, and translation to
//! `telesync_core::ControllerConfig`. The CLI adds `GlobalOpts`-aware
//! wrappers on top.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use telesync_core::{ControllerConfig, ReconnectConfig, SyncConfig, TlsVerification};

/// Prefix for environment overrides. Nested keys use `__`, e.g.
/// `TELESYNC_DEFAULTS__OUTPUT=json`.
pub const ENV_PREFIX: &str = "TELESYNC_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{profile}' not found in config")]
    ProfileNotFound { profile: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named device profiles.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: BTreeMap::new(),
        }
    }
}

impl Config {
    /// A starter config with one local profile, written by `config init`.
    pub fn example() -> Self {
        let mut profiles = BTreeMap::new();
        profiles.insert(
            "default".into(),
            Profile {
                status_url: "http://localhost:8000/api/status".into(),
                stream_url: Some("ws://localhost:8000/ws/sensors".into()),
                ca_cert: None,
                insecure: None,
                sync: SyncSettings::default(),
            },
        );
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults {
                sync: SyncSettings {
                    liveness_window: Some("30s".into()),
                    poll_interval: Some("8s".into()),
                    staleness_threshold: Some("20s".into()),
                    pull_timeout: Some("8s".into()),
                    ..SyncSettings::default()
                },
                ..Defaults::default()
            },
            profiles,
        }
    }

    /// Look up a profile by name, falling back to `default_profile` and
    /// then to `"default"`. Returns the resolved name with the profile.
    pub fn profile(&self, name: Option<&str>) -> Result<(String, &Profile), ConfigError> {
        let name = name
            .map(str::to_owned)
            .or_else(|| self.default_profile.clone())
            .unwrap_or_else(|| "default".into());

        match self.profiles.get(&name) {
            Some(profile) => Ok((name, profile)),
            None => Err(ConfigError::ProfileNotFound { profile: name }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    #[serde(default)]
    pub insecure: bool,

    /// Sync timing shared by every profile.
    #[serde(default)]
    pub sync: SyncSettings,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            insecure: false,
            sync: SyncSettings::default(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}

/// A named device profile.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Profile {
    /// Request/response status endpoint (e.g., "http://gw.local:8000/api/status").
    pub status_url: String,

    /// Push endpoint (e.g., "ws://gw.local:8000/ws/sensors"). Omit for pull-only.
    pub stream_url: Option<String>,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Override insecure TLS setting.
    pub insecure: Option<bool>,

    /// Per-profile overrides of `[defaults.sync]`.
    #[serde(default)]
    pub sync: SyncSettings,
}

/// Human-readable sync timing. Durations are strings like `"30s"` or
/// `"1m 30s"`; unset fields fall through to the next layer.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct SyncSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liveness_window: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_interval: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staleness_threshold: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pull_timeout: Option<String>,
    /// `"off"` disables client pings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ping_interval: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconnect_initial: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconnect_max: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconnect_factor: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconnect_jitter: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconnect_stable_after: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconnect_max_retries: Option<u32>,
}

impl SyncSettings {
    /// Field-by-field overlay: values set in `over` win.
    pub fn overlay(&self, over: &SyncSettings) -> SyncSettings {
        SyncSettings {
            liveness_window: over.liveness_window.clone().or_else(|| self.liveness_window.clone()),
            poll_interval: over.poll_interval.clone().or_else(|| self.poll_interval.clone()),
            staleness_threshold: over
                .staleness_threshold
                .clone()
                .or_else(|| self.staleness_threshold.clone()),
            pull_timeout: over.pull_timeout.clone().or_else(|| self.pull_timeout.clone()),
            ping_interval: over.ping_interval.clone().or_else(|| self.ping_interval.clone()),
            reconnect_initial: over
                .reconnect_initial
                .clone()
                .or_else(|| self.reconnect_initial.clone()),
            reconnect_max: over.reconnect_max.clone().or_else(|| self.reconnect_max.clone()),
            reconnect_factor: over.reconnect_factor.or(self.reconnect_factor),
            reconnect_jitter: over.reconnect_jitter.or(self.reconnect_jitter),
            reconnect_stable_after: over
                .reconnect_stable_after
                .clone()
                .or_else(|| self.reconnect_stable_after.clone()),
            reconnect_max_retries: over.reconnect_max_retries.or(self.reconnect_max_retries),
        }
    }

    /// Resolve against core defaults and validate.
    pub fn to_sync_config(&self) -> Result<SyncConfig, ConfigError> {
        let base = SyncConfig::default();
        let reconnect = ReconnectConfig {
            initial_delay: duration_or(
                "reconnect_initial",
                self.reconnect_initial.as_deref(),
                base.reconnect.initial_delay,
            )?,
            factor: self.reconnect_factor.unwrap_or(base.reconnect.factor),
            max_delay: duration_or(
                "reconnect_max",
                self.reconnect_max.as_deref(),
                base.reconnect.max_delay,
            )?,
            jitter: self.reconnect_jitter.unwrap_or(base.reconnect.jitter),
            stable_after: duration_or(
                "reconnect_stable_after",
                self.reconnect_stable_after.as_deref(),
                base.reconnect.stable_after,
            )?,
            max_retries: self.reconnect_max_retries.or(base.reconnect.max_retries),
        };

        if !(reconnect.factor.is_finite() && reconnect.factor >= 1.0) {
            return Err(invalid("reconnect_factor", "must be a number >= 1"));
        }
        if !(0.0..=1.0).contains(&reconnect.jitter) {
            return Err(invalid("reconnect_jitter", "must be between 0 and 1"));
        }
        if reconnect.initial_delay > reconnect.max_delay {
            return Err(invalid("reconnect_initial", "must not exceed reconnect_max"));
        }

        let ping_interval = match self.ping_interval.as_deref().map(str::trim) {
            Some("off" | "none") => None,
            Some(raw) => Some(parse_duration("ping_interval", raw)?),
            None => base.ping_interval,
        };
        if ping_interval == Some(Duration::ZERO) {
            return Err(invalid(
                "ping_interval",
                "must be greater than zero (use \"off\" to disable pings)",
            ));
        }

        let sync = SyncConfig {
            liveness_window: duration_or(
                "liveness_window",
                self.liveness_window.as_deref(),
                base.liveness_window,
            )?,
            poll_interval: duration_or(
                "poll_interval",
                self.poll_interval.as_deref(),
                base.poll_interval,
            )?,
            staleness_threshold: duration_or(
                "staleness_threshold",
                self.staleness_threshold.as_deref(),
                base.staleness_threshold,
            )?,
            pull_timeout: duration_or(
                "pull_timeout",
                self.pull_timeout.as_deref(),
                base.pull_timeout,
            )?,
            ping_interval,
            reconnect,
        };

        for (field, value) in [
            ("liveness_window", sync.liveness_window),
            ("poll_interval", sync.poll_interval),
            ("staleness_threshold", sync.staleness_threshold),
            ("pull_timeout", sync.pull_timeout),
        ] {
            if value.is_zero() {
                return Err(invalid(field, "must be greater than zero"));
            }
        }

        Ok(sync)
    }
}

fn parse_duration(field: &str, raw: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(raw.trim()).map_err(|e| invalid(field, format!("'{raw}': {e}")))
}

fn duration_or(
    field: &str,
    raw: Option<&str>,
    fallback: Duration,
) -> Result<Duration, ConfigError> {
    raw.map_or(Ok(fallback), |raw| parse_duration(field, raw))
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("dev", "telesync", "telesync").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("telesync");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load the full Config from `path` + environment. A missing file is
/// not an error.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Translation ─────────────────────────────────────────────────────

/// Build a `ControllerConfig` from a profile and the global defaults,
/// with no CLI flag overrides.
pub fn profile_to_controller_config(
    profile: &Profile,
    defaults: &Defaults,
) -> Result<ControllerConfig, ConfigError> {
    let status_url = parse_url("status_url", &profile.status_url, &["http", "https"])?;
    let stream_url = profile
        .stream_url
        .as_deref()
        .map(|raw| parse_url("stream_url", raw, &["ws", "wss"]))
        .transpose()?;

    let tls = if profile.insecure.unwrap_or(defaults.insecure) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };

    let sync = defaults.sync.overlay(&profile.sync).to_sync_config()?;

    Ok(ControllerConfig {
        status_url,
        stream_url,
        tls,
        sync,
    })
}

/// Parse and scheme-check a URL.
pub fn parse_url(field: &str, raw: &str, schemes: &[&str]) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| invalid(field, format!("invalid URL '{raw}': {e}")))?;
    if !schemes.contains(&url.scheme()) {
        return Err(invalid(
            field,
            format!("expected a {} URL, got '{raw}'", schemes.join("/")),
        ));
    }
    Ok(url)
}
