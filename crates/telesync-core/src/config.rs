// ── Runtime sync configuration ──
//
// These types describe *how* to stay in sync with one device. They never
// touch disk: the config crate or the CLI builds a `ControllerConfig`
// and hands it to `Controller::new`.

use std::path::PathBuf;
use std::time::Duration;

use telesync_api::{TlsMode, TransportConfig};
use url::Url;

const TRANSPORT_SLACK: Duration = Duration::from_secs(1);

/// Shortest period any controller timer runs with.
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

/// TLS verification strategy for the status endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(PathBuf),
    /// Skip verification (self-signed gateways).
    DangerAcceptInvalid,
}

impl From<&TlsVerification> for TlsMode {
    fn from(tls: &TlsVerification) -> Self {
        match tls {
            TlsVerification::SystemDefaults => TlsMode::System,
            TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
            TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
        }
    }
}

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff for push reconnection.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Growth factor per attempt. Default: 2.
    pub factor: f64,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Relative jitter applied to each delay, in `[0, 1]`. Default: 0.25,
    /// i.e. each delay is scaled by a random factor in `[0.75, 1.25]`.
    pub jitter: f64,

    /// A connected period longer than this resets the attempt counter.
    /// Default: 10s.
    pub stable_after: Duration,

    /// Maximum reconnection attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            factor: 2.0,
            max_delay: Duration::from_secs(30),
            jitter: 0.25,
            stable_after: Duration::from_secs(10),
            max_retries: None,
        }
    }
}

// ── SyncConfig ───────────────────────────────────────────────────────

/// Timing knobs for one controller. Every field is independently
/// overridable.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Silence (no frame of any kind) tolerated on a connected push
    /// channel before it is torn down. Also bounds how long `start()`
    /// waits for a first push snapshot before falling back to polling.
    pub liveness_window: Duration,
    /// Fixed poll period while degraded.
    pub poll_interval: Duration,
    /// Age beyond which the latest snapshot is reported stale.
    pub staleness_threshold: Duration,
    /// Deadline for a single pull request.
    pub pull_timeout: Duration,
    /// Client ping period on the push channel. `None` disables pings.
    pub ping_interval: Option<Duration>,
    pub reconnect: ReconnectConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            liveness_window: Duration::from_secs(30),
            poll_interval: Duration::from_secs(8),
            staleness_threshold: Duration::from_secs(20),
            pull_timeout: Duration::from_secs(8),
            ping_interval: Some(Duration::from_secs(10)),
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Raise every zero-length period to [`MIN_PERIOD`]. A zero ping
    /// interval turns client pings off.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        for period in [
            &mut self.liveness_window,
            &mut self.poll_interval,
            &mut self.staleness_threshold,
            &mut self.pull_timeout,
        ] {
            *period = (*period).max(MIN_PERIOD);
        }
        self.ping_interval = self.ping_interval.filter(|p| !p.is_zero());
        self
    }
}

// ── ControllerConfig ─────────────────────────────────────────────────

/// Everything needed to build a [`Controller`](crate::Controller) for one
/// device.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Request/response endpoint returning the current telemetry object.
    pub status_url: Url,
    /// Push endpoint. `None` runs the controller in pull-only mode.
    pub stream_url: Option<Url>,
    pub tls: TlsVerification,
    pub sync: SyncConfig,
}

impl ControllerConfig {
    pub fn new(status_url: Url) -> Self {
        Self {
            status_url,
            stream_url: None,
            tls: TlsVerification::default(),
            sync: SyncConfig::default(),
        }
    }

    #[must_use]
    pub fn with_stream_url(mut self, stream_url: Url) -> Self {
        self.stream_url = Some(stream_url);
        self
    }

    /// Transport settings for the HTTP client. The request ceiling sits
    /// just above the pull timeout so the adapter's deadline fires first.
    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            tls: TlsMode::from(&self.tls),
            timeout: self.sync.pull_timeout + TRANSPORT_SLACK,
        }
    }
}
