// Scripted doubles for the pull and push seams.

#![allow(clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::future::BoxFuture;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::error::SyncError;
use crate::pull::PullSource;
use crate::push::{ConnectionState, Frame, FrameStream, PushEvent, PushTransport};

pub(crate) fn body(temperature: f64) -> String {
    format!(r#"{{"temperature":{temperature},"humidity":61,"door_open":false}}"#)
}

pub(crate) async fn next_event(events: &mut broadcast::Receiver<PushEvent>) -> PushEvent {
    tokio::time::timeout(Duration::from_secs(300), events.recv())
        .await
        .unwrap()
        .unwrap()
}

pub(crate) async fn wait_connected(events: &mut broadcast::Receiver<PushEvent>) {
    loop {
        if let PushEvent::StateChanged(ConnectionState::Connected) = next_event(events).await {
            return;
        }
    }
}

// ── Pull ─────────────────────────────────────────────────────────────

#[derive(Clone)]
struct PullStep {
    delay: Duration,
    result: Result<String, SyncError>,
}

/// Replays scripted responses in order, then repeats the fallback.
pub(crate) struct FakePull {
    script: Mutex<VecDeque<PullStep>>,
    fallback: Mutex<PullStep>,
    calls: Mutex<Vec<Instant>>,
    created: Instant,
}

impl FakePull {
    pub(crate) fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(PullStep {
                delay: Duration::ZERO,
                result: Err(SyncError::transport("no scripted response")),
            }),
            calls: Mutex::new(Vec::new()),
            created: Instant::now(),
        }
    }

    pub(crate) fn push_ok(&self, body: String) {
        self.push_ok_after(Duration::ZERO, body);
    }

    pub(crate) fn push_ok_after(&self, delay: Duration, body: String) {
        self.script.lock().unwrap().push_back(PullStep {
            delay,
            result: Ok(body),
        });
    }

    pub(crate) fn push_err(&self, err: SyncError) {
        self.script.lock().unwrap().push_back(PullStep {
            delay: Duration::ZERO,
            result: Err(err),
        });
    }

    /// Response used once the script runs out.
    pub(crate) fn otherwise(&self, delay: Duration, result: Result<String, SyncError>) {
        *self.fallback.lock().unwrap() = PullStep { delay, result };
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Call times relative to construction.
    pub(crate) fn call_offsets(&self) -> Vec<Duration> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|at| at.duration_since(self.created))
            .collect()
    }
}

impl PullSource for FakePull {
    fn fetch(&self) -> BoxFuture<'_, Result<String, SyncError>> {
        self.calls.lock().unwrap().push(Instant::now());
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.lock().unwrap().clone());
        Box::pin(async move {
            tokio::time::sleep(step.delay).await;
            step.result
        })
    }
}

// ── Push ─────────────────────────────────────────────────────────────

enum Session {
    Accept(mpsc::UnboundedReceiver<Result<Frame, SyncError>>),
    Refuse,
}

/// Server side of one accepted fake session. Dropping it closes the
/// session cleanly; holding it without sending leaves the channel silent.
pub(crate) struct SessionHandle {
    tx: mpsc::UnboundedSender<Result<Frame, SyncError>>,
}

impl SessionHandle {
    pub(crate) fn send(&self, frame: Frame) {
        let _ = self.tx.send(Ok(frame));
    }

    pub(crate) fn fail(&self, err: SyncError) {
        let _ = self.tx.send(Err(err));
    }
}

/// Hands out scripted sessions in order; refuses once the script is empty.
pub(crate) struct FakePush {
    sessions: Mutex<VecDeque<Session>>,
    opens: Mutex<Vec<Instant>>,
    created: Instant,
}

impl FakePush {
    pub(crate) fn new() -> Self {
        Self {
            sessions: Mutex::new(VecDeque::new()),
            opens: Mutex::new(Vec::new()),
            created: Instant::now(),
        }
    }

    pub(crate) fn accept(&self) -> SessionHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        self.sessions.lock().unwrap().push_back(Session::Accept(rx));
        SessionHandle { tx }
    }

    pub(crate) fn refuse(&self) {
        self.sessions.lock().unwrap().push_back(Session::Refuse);
    }

    pub(crate) fn open_count(&self) -> usize {
        self.opens.lock().unwrap().len()
    }

    pub(crate) fn open_offsets(&self) -> Vec<Duration> {
        self.opens
            .lock()
            .unwrap()
            .iter()
            .map(|at| at.duration_since(self.created))
            .collect()
    }
}

impl PushTransport for FakePush {
    fn open(&self) -> BoxFuture<'_, Result<FrameStream, SyncError>> {
        self.opens.lock().unwrap().push(Instant::now());
        let session = self
            .sessions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Session::Refuse);
        Box::pin(async move {
            match session {
                Session::Accept(rx) => Ok(UnboundedReceiverStream::new(rx).boxed()),
                Session::Refuse => Err(SyncError::transport("connection refused")),
            }
        })
    }
}
