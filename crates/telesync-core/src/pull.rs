// ── Pull adapter ──
//
// One request, one snapshot. No retries: the controller owns the retry
// schedule, which keeps this trivially testable against fixed fixtures.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use telesync_api::StatusClient;

use crate::clock::Clock;
use crate::config::ControllerConfig;
use crate::convert;
use crate::error::SyncError;
use crate::model::{Snapshot, Source};

/// A request/response endpoint that returns the current telemetry body.
///
/// Implemented for [`StatusClient`]; tests substitute scripted doubles.
pub trait PullSource: Send + Sync {
    /// Perform one request and return the raw response body.
    fn fetch(&self) -> BoxFuture<'_, Result<String, SyncError>>;
}

impl PullSource for StatusClient {
    fn fetch(&self) -> BoxFuture<'_, Result<String, SyncError>> {
        Box::pin(async move { self.fetch_raw().await.map_err(SyncError::from) })
    }
}

/// Fetches one snapshot on demand.
#[derive(Clone)]
pub struct PullAdapter {
    source: Arc<dyn PullSource>,
    timeout: Duration,
    clock: Clock,
}

impl PullAdapter {
    pub fn new(source: Arc<dyn PullSource>, timeout: Duration, clock: Clock) -> Self {
        Self {
            source,
            timeout,
            clock,
        }
    }

    /// Build an adapter over the HTTP status endpoint described by `config`.
    pub fn for_config(config: &ControllerConfig, clock: Clock) -> Result<Self, SyncError> {
        let client = StatusClient::new(config.status_url.clone(), &config.transport())?;
        Ok(Self::new(Arc::new(client), config.sync.pull_timeout, clock))
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Perform exactly one request.
    ///
    /// Fails with `Transport` on network failure, `Parse` on a malformed
    /// body and `Timeout` when no response arrives within the deadline.
    /// `observed_at` is the moment the body was received.
    pub async fn fetch_once(&self) -> Result<Snapshot, SyncError> {
        let body = tokio::time::timeout(self.timeout, self.source.fetch())
            .await
            .map_err(|_| SyncError::Timeout {
                after: self.timeout,
            })??;

        let observed_at = self.clock.now();
        convert::snapshot_from_text(&body, observed_at, Source::Pull)?
            .ok_or_else(|| SyncError::parse("status endpoint returned a keep-alive, not telemetry"))
    }
}

impl std::fmt::Debug for PullAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PullAdapter")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
