// ── Push adapter ──
//
// Owns one long-lived streaming connection and its reconnection policy.
// A background loop connects, reads frames under a liveness deadline,
// and on any loss backs off exponentially (with jitter) before trying
// again. Connection state lives in a `watch`; snapshots, state changes
// and caught errors fan out on a `broadcast`.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use rand::Rng;
use serde::Serialize;
use telesync_api::{WsFrame, WsOptions};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::clock::Clock;
use crate::config::ReconnectConfig;
use crate::convert;
use crate::error::SyncError;
use crate::model::{Snapshot, Source};

const EVENT_CHANNEL_SIZE: usize = 256;

// ── Transport seam ───────────────────────────────────────────────────

/// One inbound unit on the push channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// An application message.
    Text(String),
    /// Protocol-level liveness with no data.
    KeepAlive,
}

impl From<WsFrame> for Frame {
    fn from(frame: WsFrame) -> Self {
        match frame {
            WsFrame::Text(text) => Self::Text(text),
            WsFrame::KeepAlive => Self::KeepAlive,
        }
    }
}

/// An open push session. Ends when the peer closes.
pub type FrameStream = BoxStream<'static, Result<Frame, SyncError>>;

/// A duplex message channel the adapter can open sessions on.
///
/// The adapter only needs to open a session and read frames; keep-alive
/// sending is the transport's business.
pub trait PushTransport: Send + Sync {
    fn open(&self) -> BoxFuture<'_, Result<FrameStream, SyncError>>;
}

/// [`PushTransport`] over a WebSocket endpoint.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    url: Url,
    options: WsOptions,
}

impl WebSocketTransport {
    pub fn new(url: Url, ping_interval: Option<Duration>) -> Self {
        Self {
            url,
            options: WsOptions { ping_interval },
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl PushTransport for WebSocketTransport {
    fn open(&self) -> BoxFuture<'_, Result<FrameStream, SyncError>> {
        Box::pin(async move {
            let frames = telesync_api::websocket::open(&self.url, &self.options).await?;
            Ok(frames
                .map(|frame| frame.map(Frame::from).map_err(SyncError::from))
                .boxed())
        })
    }
}

// ── ConnectionState ──────────────────────────────────────────────────

/// Push connection state. Owned by the adapter; read-only elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Reconnecting {
        attempt: u32,
        next_retry_at: DateTime<Utc>,
    },
    /// Only reachable when `max_retries` is set.
    Failed,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// `connect()` is a no-op in these states.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Connecting | Self::Connected | Self::Reconnecting { .. })
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Connecting => f.write_str("connecting"),
            Self::Connected => f.write_str("connected"),
            Self::Reconnecting {
                attempt,
                next_retry_at,
            } => write!(
                f,
                "reconnecting (attempt {attempt}, next at {})",
                next_retry_at.format("%H:%M:%S")
            ),
            Self::Failed => f.write_str("failed"),
        }
    }
}

/// Everything the adapter announces.
#[derive(Debug, Clone)]
pub enum PushEvent {
    StateChanged(ConnectionState),
    Snapshot(Snapshot),
    /// A caught error: a malformed message or a lost session. Parse
    /// errors never change connection state.
    Error(SyncError),
}

// ── Backoff ──────────────────────────────────────────────────────────

/// Delay before reconnection attempt `attempt` (zero-based), jittered.
pub fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let jitter = config.jitter.clamp(0.0, 1.0);
    let scale = if jitter > 0.0 {
        rand::thread_rng().gen_range(1.0 - jitter..=1.0 + jitter)
    } else {
        1.0
    };
    backoff_with_scale(attempt, config, scale)
}

/// Deterministic core of [`calculate_backoff`]: `initial * factor^attempt`,
/// capped, then multiplied by `scale` and capped again.
pub fn backoff_with_scale(attempt: u32, config: &ReconnectConfig, scale: f64) -> Duration {
    let max = config.max_delay.as_secs_f64();
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let raw = config.initial_delay.as_secs_f64() * config.factor.max(1.0).powi(exponent);
    let secs = (raw.min(max) * scale).clamp(0.0, max);
    Duration::try_from_secs_f64(secs).unwrap_or(config.max_delay)
}

// ── PushAdapter ──────────────────────────────────────────────────────

/// Maintains the push connection in a background task.
///
/// Cheaply cloneable. `connect()` must be called from within a tokio
/// runtime.
#[derive(Clone)]
pub struct PushAdapter {
    inner: Arc<PushInner>,
}

struct PushInner {
    transport: Arc<dyn PushTransport>,
    liveness_window: Duration,
    reconnect: ReconnectConfig,
    clock: Clock,
    state: watch::Sender<ConnectionState>,
    events: broadcast::Sender<PushEvent>,
    run: Mutex<Option<Run>>,
}

struct Run {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Why a connected session ended.
enum SessionEnd {
    Closed,
    Silent,
    Failed(SyncError),
}

impl PushAdapter {
    pub fn new(
        transport: Arc<dyn PushTransport>,
        liveness_window: Duration,
        reconnect: ReconnectConfig,
        clock: Clock,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        Self {
            inner: Arc::new(PushInner {
                transport,
                liveness_window,
                reconnect,
                clock,
                state,
                events,
                run: Mutex::new(None),
            }),
        }
    }

    /// Start the connection loop. No-op while a loop is already running.
    pub fn connect(&self) {
        let mut run = self
            .inner
            .run
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if run.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            tracing::debug!("push connect ignored, already active");
            return;
        }

        let cancel = CancellationToken::new();
        self.inner.set_state(ConnectionState::Connecting);
        let handle = tokio::spawn(run_loop(Arc::clone(&self.inner), cancel.clone()));
        *run = Some(Run { cancel, handle });
    }

    /// Tear down the connection loop and release the channel.
    ///
    /// Once this returns no further events are emitted except the final
    /// transition to `Idle`.
    pub async fn disconnect(&self) {
        let run = self
            .inner
            .run
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(Run { cancel, handle }) = run {
            cancel.cancel();
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "push loop ended abnormally");
            }
        }
        self.inner.set_state(ConnectionState::Idle);
    }

    /// Current connection state plus change notification.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Subscribe to snapshots, state transitions and caught errors.
    pub fn subscribe(&self) -> broadcast::Receiver<PushEvent> {
        self.inner.events.subscribe()
    }

    pub fn liveness_window(&self) -> Duration {
        self.inner.liveness_window
    }
}

impl fmt::Debug for PushAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushAdapter")
            .field("state", &*self.inner.state.borrow())
            .field("liveness_window", &self.inner.liveness_window)
            .finish_non_exhaustive()
    }
}

impl PushInner {
    fn set_state(&self, next: ConnectionState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next.clone();
                true
            }
        });
        if changed {
            tracing::info!(state = %next, "push connection state");
            let _ = self.events.send(PushEvent::StateChanged(next));
        }
    }

    fn emit(&self, event: PushEvent) {
        // No receivers is fine; the controller may not be listening.
        let _ = self.events.send(event);
    }

    /// Read one session until it closes, errors, or goes silent.
    async fn read_session(&self, mut frames: FrameStream) -> SessionEnd {
        loop {
            let Ok(next) = tokio::time::timeout(self.liveness_window, frames.next()).await else {
                return SessionEnd::Silent;
            };

            match next {
                None => return SessionEnd::Closed,
                Some(Err(e)) => return SessionEnd::Failed(e),
                Some(Ok(Frame::KeepAlive)) => tracing::trace!("push keep-alive"),
                Some(Ok(Frame::Text(text))) => {
                    let observed_at = self.clock.now();
                    match convert::snapshot_from_text(&text, observed_at, Source::Push) {
                        Ok(Some(snapshot)) => self.emit(PushEvent::Snapshot(snapshot)),
                        Ok(None) => tracing::trace!("push application keep-alive"),
                        Err(e) => {
                            tracing::debug!(error = %e, "discarding malformed push message");
                            self.emit(PushEvent::Error(e));
                        }
                    }
                }
            }
        }
    }
}

// ── Background reconnection loop ─────────────────────────────────────

/// connect → read → on loss, back off → reconnect.
async fn run_loop(inner: Arc<PushInner>, cancel: CancellationToken) {
    let mut attempt: u32 = 0;

    loop {
        inner.set_state(ConnectionState::Connecting);

        let opened = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            opened = inner.transport.open() => opened,
        };

        match opened {
            Ok(frames) => {
                let connected_at = Instant::now();
                inner.set_state(ConnectionState::Connected);

                let end = tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    end = inner.read_session(frames) => end,
                };

                if connected_at.elapsed() > inner.reconnect.stable_after {
                    attempt = 0;
                }

                match end {
                    SessionEnd::Closed => tracing::info!("push channel closed by peer"),
                    SessionEnd::Silent => tracing::warn!(
                        window_ms =
                            u64::try_from(inner.liveness_window.as_millis()).unwrap_or(u64::MAX),
                        "no push frame within liveness window, dropping channel"
                    ),
                    SessionEnd::Failed(e) => {
                        tracing::warn!(error = %e, "push channel failed");
                        inner.emit(PushEvent::Error(e));
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, attempt, "push connect failed");
                inner.emit(PushEvent::Error(e));
            }
        }

        if let Some(max) = inner.reconnect.max_retries.filter(|max| attempt >= *max) {
            tracing::error!(max_retries = max, "push reconnection limit reached, giving up");
            inner.set_state(ConnectionState::Failed);
            break;
        }

        let delay = calculate_backoff(attempt, &inner.reconnect);
        attempt = attempt.saturating_add(1);
        let next_retry_at = inner.clock.wall_at(Instant::now() + delay);
        tracing::info!(
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            attempt,
            "waiting before push reconnect"
        );
        inner.set_state(ConnectionState::Reconnecting {
            attempt,
            next_retry_at,
        });

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }
    }

    tracing::debug!("push loop exiting");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::testing::{FakePush, body, next_event, wait_connected};

    fn adapter(fake: &Arc<FakePush>, reconnect: ReconnectConfig) -> PushAdapter {
        PushAdapter::new(
            Arc::clone(fake) as Arc<dyn PushTransport>,
            Duration::from_secs(30),
            reconnect,
            Clock::new(),
        )
    }

    fn no_jitter() -> ReconnectConfig {
        ReconnectConfig {
            jitter: 0.0,
            ..ReconnectConfig::default()
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let cfg = no_jitter();
        let delays: Vec<u64> = (0..7)
            .map(|n| backoff_with_scale(n, &cfg, 1.0).as_secs())
            .collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 30, 30]);
        assert_eq!(backoff_with_scale(u32::MAX, &cfg, 1.0), Duration::from_secs(30));
    }

    #[test]
    fn jitter_stays_in_band_and_under_cap() {
        let cfg = ReconnectConfig::default();
        for _ in 0..200 {
            let d = calculate_backoff(2, &cfg).as_secs_f64();
            assert!((3.0..=5.0).contains(&d), "delay {d} outside jitter band");
            let capped = calculate_backoff(10, &cfg);
            assert!(capped <= cfg.max_delay);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn delivers_snapshots_and_keepalives() {
        let fake = Arc::new(FakePush::new());
        let session = fake.accept();
        let push = adapter(&fake, no_jitter());
        let mut events = push.subscribe();

        push.connect();
        assert!(matches!(
            next_event(&mut events).await,
            PushEvent::StateChanged(ConnectionState::Connecting)
        ));
        assert!(matches!(
            next_event(&mut events).await,
            PushEvent::StateChanged(ConnectionState::Connected)
        ));

        session.send(Frame::KeepAlive);
        session.send(Frame::Text(body(4.4)));
        match next_event(&mut events).await {
            PushEvent::Snapshot(snap) => {
                assert_eq!(snap.source(), Source::Push);
                assert_eq!(snap.temperature(), Some(4.4));
            }
            other => panic!("expected snapshot, got {other:?}"),
        }
        push.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn connect_is_idempotent() {
        let fake = Arc::new(FakePush::new());
        let _session = fake.accept();
        let push = adapter(&fake, no_jitter());

        push.connect();
        push.connect();
        tokio::time::sleep(Duration::from_millis(10)).await;
        push.connect();

        assert_eq!(fake.open_count(), 1);
        assert!(push.state().borrow().is_connected());
        push.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn silent_channel_reconnects_after_liveness_window() {
        let fake = Arc::new(FakePush::new());
        let _silent = fake.accept();
        let push = adapter(&fake, no_jitter());
        let state = push.state();

        push.connect();
        tokio::time::sleep(Duration::from_secs(29)).await;
        assert!(state.borrow().is_connected());

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert!(matches!(
            *state.borrow(),
            ConnectionState::Reconnecting { attempt: 1, .. }
        ));
        push.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn parse_error_is_reported_without_state_change() {
        let fake = Arc::new(FakePush::new());
        let session = fake.accept();
        let push = adapter(&fake, no_jitter());
        let mut events = push.subscribe();

        push.connect();
        wait_connected(&mut events).await;
        session.send(Frame::Text("{broken".into()));

        match next_event(&mut events).await {
            PushEvent::Error(e) => assert!(e.is_parse()),
            other => panic!("expected parse error, got {other:?}"),
        }
        assert!(push.state().borrow().is_connected());
        push.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn refused_connections_back_off_exponentially() {
        let fake = Arc::new(FakePush::new());
        let push = adapter(&fake, no_jitter());

        push.connect();
        tokio::time::sleep(Duration::from_millis(16_500)).await;

        // Opens at 0, 1, 3, 7, 15 seconds.
        let opens: Vec<u64> = fake.open_offsets().iter().map(Duration::as_secs).collect();
        assert_eq!(opens, vec![0, 1, 3, 7, 15]);
        push.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stable_session_resets_attempts() {
        let fake = Arc::new(FakePush::new());
        fake.refuse();
        fake.refuse();
        let stable = fake.accept();
        let push = adapter(&fake, no_jitter());
        let state = push.state();

        push.connect();
        // Refused at 0 and 1, connected at 3.
        tokio::time::sleep(Duration::from_secs(15)).await;
        assert!(state.borrow().is_connected());

        drop(stable);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(matches!(
            *state.borrow(),
            ConnectionState::Reconnecting { attempt: 1, .. }
        ));
        push.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_retries() {
        let fake = Arc::new(FakePush::new());
        let push = adapter(
            &fake,
            ReconnectConfig {
                max_retries: Some(2),
                ..no_jitter()
            },
        );

        push.connect();
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(*push.state().borrow(), ConnectionState::Failed);
        assert_eq!(fake.open_count(), 3);

        // A failed loop can be restarted.
        push.connect();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(fake.open_count(), 4);
        push.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_goes_idle_and_stops_events() {
        let fake = Arc::new(FakePush::new());
        let session = fake.accept();
        let push = adapter(&fake, no_jitter());

        push.connect();
        tokio::time::sleep(Duration::from_millis(10)).await;
        push.disconnect().await;
        assert_eq!(*push.state().borrow(), ConnectionState::Idle);

        let mut events = push.subscribe();
        session.send(Frame::Text(body(9.0)));
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(events.try_recv().is_err());
        assert_eq!(fake.open_count(), 1);

        push.disconnect().await;
    }
}
