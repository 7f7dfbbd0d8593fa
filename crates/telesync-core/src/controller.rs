// ── Synchronization controller ──
//
// Owns the overall strategy for one device: prefer push, fall back to
// scheduled pulls while push is unavailable, and report staleness
// independently of transport state. All store writes happen on a single
// driver task spawned by `start()`.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::{ControllerConfig, SyncConfig};
use crate::error::SyncError;
use crate::model::{Snapshot, Source};
use crate::pull::PullAdapter;
use crate::push::{ConnectionState, PushAdapter, PushEvent, WebSocketTransport};
use crate::reconcile::{self, Outcome};
use crate::store::SnapshotStore;
use crate::stream::SnapshotStream;

const REPORT_CHANNEL_SIZE: usize = 64;

// ── Observable state ─────────────────────────────────────────────────

/// Controller state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SyncState {
    /// `start()` was called; waiting for push to deliver.
    Starting,
    /// Snapshots are flowing through the preferred path.
    Live { via: Source },
    /// Push is unavailable; polling on a fixed schedule.
    Degraded,
    Stopped,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Starting => f.write_str("starting"),
            Self::Live { via } => write!(f, "live ({via})"),
            Self::Degraded => f.write_str("degraded"),
            Self::Stopped => f.write_str("stopped"),
        }
    }
}

/// Data freshness, decoupled from connection state.
///
/// A connected channel that stops delivering goes `Stale` just the same
/// as a dropped one. This is what "live" indicators should key on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "freshness", rename_all = "snake_case")]
pub enum Freshness {
    Fresh,
    Stale {
        /// `observed_at` of the latest snapshot, if there is one.
        last_observed: Option<DateTime<Utc>>,
    },
}

impl Freshness {
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::Stale { .. })
    }
}

/// A caught adapter error. Reports never change sync state on their own.
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub origin: Source,
    pub error: SyncError,
    pub at: DateTime<Utc>,
}

// ── Controller ───────────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<ControllerInner>`. `start()` and `stop()`
/// never fail and are idempotent. Call `stop()` before dropping the last
/// handle; a running driver keeps the controller alive.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    sync: SyncConfig,
    clock: Clock,
    store: Arc<SnapshotStore>,
    pull: PullAdapter,
    push: Option<PushAdapter>,
    /// Stands in for push connection state in pull-only mode.
    idle_connection: watch::Sender<ConnectionState>,
    sync_state: watch::Sender<SyncState>,
    freshness: watch::Sender<Freshness>,
    reports: broadcast::Sender<SyncReport>,
    generation: AtomicU64,
    driver: Mutex<Option<Driver>>,
}

struct Driver {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Controller {
    /// Build a controller over the HTTP status endpoint and, when a
    /// stream URL is configured, a WebSocket push channel.
    pub fn new(mut config: ControllerConfig) -> Result<Self, SyncError> {
        config.sync = config.sync.normalized();
        let clock = Clock::new();
        let pull = PullAdapter::for_config(&config, clock)?;
        let push = config.stream_url.clone().map(|url| {
            PushAdapter::new(
                Arc::new(WebSocketTransport::new(url, config.sync.ping_interval)),
                config.sync.liveness_window,
                config.sync.reconnect.clone(),
                clock,
            )
        });
        Ok(Self::with_adapters(config.sync, clock, pull, push))
    }

    /// Build a controller from pre-built adapters. `push: None` runs in
    /// pull-only mode. Zero-length periods in `sync` are raised to
    /// [`MIN_PERIOD`](crate::config::MIN_PERIOD).
    pub fn with_adapters(
        sync: SyncConfig,
        clock: Clock,
        pull: PullAdapter,
        push: Option<PushAdapter>,
    ) -> Self {
        let normalized = sync.clone().normalized();
        if normalized != sync {
            warn!("zero-length sync period raised to the minimum");
        }
        let sync = normalized;

        let (idle_connection, _) = watch::channel(ConnectionState::Idle);
        let (sync_state, _) = watch::channel(SyncState::Stopped);
        let (freshness, _) = watch::channel(Freshness::Fresh);
        let (reports, _) = broadcast::channel(REPORT_CHANNEL_SIZE);

        Self {
            inner: Arc::new(ControllerInner {
                sync,
                clock,
                store: Arc::new(SnapshotStore::new()),
                pull,
                push,
                idle_connection,
                sync_state,
                freshness,
                reports,
                generation: AtomicU64::new(0),
                driver: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.sync
    }

    pub fn is_pull_only(&self) -> bool {
        self.inner.push.is_none()
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Begin synchronizing. No-op while already running.
    pub async fn start(&self) {
        let mut driver = self.inner.driver.lock().await;
        if driver.as_ref().is_some_and(|d| !d.handle.is_finished()) {
            debug!("start ignored, controller already running");
            return;
        }

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.set_sync_state(SyncState::Starting);
        self.inner.set_freshness(Freshness::Fresh);

        // Subscribe before connecting so no transition is missed.
        let push_events = self.inner.push.as_ref().map(|push| {
            let events = push.subscribe();
            push.connect();
            events
        });

        let cancel = CancellationToken::new();
        let task = DriverTask::new(
            Arc::clone(&self.inner),
            generation,
            cancel.clone(),
            push_events,
        );
        let handle = tokio::spawn(task.run());
        *driver = Some(Driver { cancel, handle });

        info!(generation, pull_only = self.is_pull_only(), "sync controller started");
    }

    /// Stop synchronizing: cancel timers, discard any in-flight poll and
    /// close the push channel. No store notification fires after this
    /// returns. Idempotent.
    pub async fn stop(&self) {
        let mut driver = self.inner.driver.lock().await;
        let Some(Driver { cancel, handle }) = driver.take() else {
            self.inner.set_sync_state(SyncState::Stopped);
            return;
        };

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        cancel.cancel();
        if let Err(e) = handle.await {
            warn!(error = %e, "sync driver ended abnormally");
        }
        if let Some(push) = &self.inner.push {
            push.disconnect().await;
        }

        self.inner.set_sync_state(SyncState::Stopped);
        info!(generation, "sync controller stopped");
    }

    // ── Consumer API ─────────────────────────────────────────────

    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.inner.store
    }

    /// The latest accepted snapshot.
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.inner.store.current()
    }

    /// Async view of accepted snapshots.
    pub fn snapshots(&self) -> SnapshotStream {
        self.inner.store.watch()
    }

    /// Push connection state (always `Idle` in pull-only mode).
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        match &self.inner.push {
            Some(push) => push.state(),
            None => self.inner.idle_connection.subscribe(),
        }
    }

    pub fn sync_state(&self) -> watch::Receiver<SyncState> {
        self.inner.sync_state.subscribe()
    }

    /// Staleness signal. Transitions to `Stale` when the latest snapshot
    /// is older than the configured threshold while running.
    pub fn freshness(&self) -> watch::Receiver<Freshness> {
        self.inner.freshness.subscribe()
    }

    /// Caught adapter errors.
    pub fn reports(&self) -> broadcast::Receiver<SyncReport> {
        self.inner.reports.subscribe()
    }

    /// Incremented on every `start()` and `stop()`.
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("sync_state", &*self.inner.sync_state.borrow())
            .field("generation", &self.generation())
            .field("pull_only", &self.is_pull_only())
            .finish_non_exhaustive()
    }
}

impl ControllerInner {
    fn current_sync_state(&self) -> SyncState {
        *self.sync_state.borrow()
    }

    fn set_sync_state(&self, next: SyncState) {
        let changed = self.sync_state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            match next {
                SyncState::Degraded => warn!(state = %next, "sync state"),
                _ => info!(state = %next, "sync state"),
            }
        }
    }

    fn set_freshness(&self, next: Freshness) {
        self.freshness.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    fn report(&self, origin: Source, error: SyncError) {
        let _ = self.reports.send(SyncReport {
            origin,
            error,
            at: self.clock.now(),
        });
    }
}

// ── Driver task ──────────────────────────────────────────────────────

struct PollResult {
    generation: u64,
    result: Result<Snapshot, SyncError>,
}

enum Step {
    Push(Result<PushEvent, RecvError>),
    PollDone(PollResult),
    Fallback,
    Stale,
    PollTick,
}

/// Single task that owns every timer and every store write for one
/// `start()`..`stop()` cycle.
struct DriverTask {
    inner: Arc<ControllerInner>,
    generation: u64,
    cancel: CancellationToken,
    push_events: Option<broadcast::Receiver<PushEvent>>,
    started_at: Instant,
    /// Give up waiting for the first push snapshot at this point.
    fallback_at: Option<Instant>,
    poll: Option<Interval>,
    in_flight: Option<JoinHandle<()>>,
    poll_tx: mpsc::Sender<PollResult>,
    poll_rx: mpsc::Receiver<PollResult>,
    /// Cleared once `Stale` has been emitted, re-armed on acceptance.
    stale_at: Option<Instant>,
}

impl DriverTask {
    fn new(
        inner: Arc<ControllerInner>,
        generation: u64,
        cancel: CancellationToken,
        push_events: Option<broadcast::Receiver<PushEvent>>,
    ) -> Self {
        let (poll_tx, poll_rx) = mpsc::channel(1);
        let started_at = Instant::now();
        let fallback_at = push_events
            .is_some()
            .then(|| started_at + inner.sync.liveness_window);

        let mut task = Self {
            inner,
            generation,
            cancel,
            push_events,
            started_at,
            fallback_at,
            poll: None,
            in_flight: None,
            poll_tx,
            poll_rx,
            stale_at: None,
        };
        task.reschedule_staleness();
        if task.push_events.is_none() {
            task.ensure_polling();
        }
        task
    }

    async fn run(mut self) {
        loop {
            let step = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                event = recv_push(self.push_events.as_mut()) => Step::Push(event),
                Some(done) = self.poll_rx.recv() => Step::PollDone(done),
                () = sleep_until_opt(self.fallback_at) => Step::Fallback,
                () = sleep_until_opt(self.stale_at) => Step::Stale,
                () = tick_opt(self.poll.as_mut()) => Step::PollTick,
            };

            match step {
                Step::Push(event) => self.on_push(event),
                Step::PollDone(done) => self.on_poll_done(done),
                Step::Fallback => {
                    warn!(
                        window_ms = millis(self.inner.sync.liveness_window),
                        "no push snapshot within liveness window, falling back to polling"
                    );
                    self.enter_degraded();
                }
                Step::Stale => self.on_stale(),
                Step::PollTick => self.on_poll_tick(),
            }
        }

        if let Some(poll) = self.in_flight.take() {
            poll.abort();
        }
        debug!(generation = self.generation, "sync driver exiting");
    }

    // ── Push ─────────────────────────────────────────────────────

    fn on_push(&mut self, event: Result<PushEvent, RecvError>) {
        match event {
            Ok(PushEvent::StateChanged(state)) => self.on_connection_state(&state),
            Ok(PushEvent::Snapshot(snapshot)) => {
                self.submit(snapshot);
                if self.inner.current_sync_state() != (SyncState::Live { via: Source::Push }) {
                    self.enter_live_push();
                }
            }
            Ok(PushEvent::Error(error)) => self.inner.report(Source::Push, error),
            Err(RecvError::Lagged(missed)) => {
                warn!(missed, "push events lagged, resyncing connection state");
                if let Some(push) = &self.inner.push {
                    let state = push.state().borrow().clone();
                    self.on_connection_state(&state);
                }
            }
            Err(RecvError::Closed) => {
                debug!("push event channel closed");
                self.push_events = None;
            }
        }
    }

    fn on_connection_state(&mut self, state: &ConnectionState) {
        match state {
            // Live only once a snapshot actually arrives.
            ConnectionState::Connecting | ConnectionState::Connected => {}
            ConnectionState::Reconnecting { .. }
            | ConnectionState::Failed
            | ConnectionState::Idle => {
                self.enter_degraded();
            }
        }
    }

    fn enter_live_push(&mut self) {
        self.fallback_at = None;
        if self.poll.take().is_some() {
            debug!("push recovered, poll schedule cancelled");
        }
        self.inner.set_sync_state(SyncState::Live { via: Source::Push });
    }

    fn enter_degraded(&mut self) {
        self.fallback_at = None;
        self.inner.set_sync_state(SyncState::Degraded);
        self.ensure_polling();
    }

    // ── Pull ─────────────────────────────────────────────────────

    /// Start the poll schedule if it is not running. The first tick
    /// fires immediately.
    fn ensure_polling(&mut self) {
        if self.poll.is_some() {
            return;
        }
        let mut interval = tokio::time::interval(self.inner.sync.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.poll = Some(interval);
        debug!(
            interval_ms = millis(self.inner.sync.poll_interval),
            "poll schedule started"
        );
    }

    fn on_poll_tick(&mut self) {
        if self.in_flight.as_ref().is_some_and(|h| !h.is_finished()) {
            debug!("previous poll still in flight, skipping tick");
            return;
        }

        let pull = self.inner.pull.clone();
        let tx = self.poll_tx.clone();
        let generation = self.generation;
        self.in_flight = Some(tokio::spawn(async move {
            let result = pull.fetch_once().await;
            let _ = tx.send(PollResult { generation, result }).await;
        }));
    }

    fn on_poll_done(&mut self, done: PollResult) {
        if done.generation != self.inner.generation.load(Ordering::SeqCst) {
            debug!(
                poll_generation = done.generation,
                generation = self.generation,
                "discarding poll result from a previous run"
            );
            return;
        }
        self.in_flight = None;
        let pull_only = self.inner.push.is_none();

        match done.result {
            Ok(snapshot) => {
                self.submit(snapshot);
                if pull_only {
                    self.inner.set_sync_state(SyncState::Live { via: Source::Pull });
                }
            }
            Err(error) => {
                warn!(error = %error, "poll failed, retrying on next tick");
                if pull_only && error.is_transport() {
                    self.inner.set_sync_state(SyncState::Degraded);
                }
                self.inner.report(Source::Pull, error);
            }
        }
    }

    // ── Store & staleness ────────────────────────────────────────

    fn submit(&mut self, snapshot: Snapshot) {
        if let Outcome::Accepted(_) = reconcile::submit(&self.inner.store, snapshot) {
            self.inner.set_freshness(Freshness::Fresh);
            self.reschedule_staleness();
        }
    }

    fn reschedule_staleness(&mut self) {
        let threshold = self.inner.sync.staleness_threshold;
        let base = match self.inner.store.current() {
            Some(current) => self.inner.clock.instant_at(current.observed_at()),
            None => self.started_at,
        };
        self.stale_at = base.checked_add(threshold);
    }

    fn on_stale(&mut self) {
        self.stale_at = None;
        let last_observed = self.inner.store.current().map(|s| s.observed_at());
        warn!(
            threshold_ms = millis(self.inner.sync.staleness_threshold),
            last_observed = ?last_observed,
            "telemetry is stale"
        );
        self.inner.set_freshness(Freshness::Stale { last_observed });
    }
}

// ── Optional timers ──────────────────────────────────────────────────

async fn recv_push(
    events: Option<&mut broadcast::Receiver<PushEvent>>,
) -> Result<PushEvent, RecvError> {
    match events {
        Some(events) => events.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

async fn tick_opt(interval: Option<&mut Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
