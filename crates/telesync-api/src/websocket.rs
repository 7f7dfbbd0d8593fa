//! WebSocket telemetry frame stream.
//!
//! Opens a single connection to the device's push endpoint and exposes it
//! as a [`Stream`] of [`WsFrame`]s. One connection only: reconnection,
//! backoff, and liveness policy belong to `telesync-core`'s push adapter.
//!
//! # Example
//!
//! ```rust,ignore
//! use futures_util::StreamExt;
//! use telesync_api::websocket::{self, WsFrame, WsOptions};
//! use url::Url;
//!
//! let url = Url::parse("wss://gw.local/ws/sensors")?;
//! let mut frames = websocket::open(&url, &WsOptions::default()).await?;
//!
//! while let Some(frame) = frames.next().await {
//!     if let WsFrame::Text(text) = frame? {
//!         println!("{text}");
//!     }
//! }
//! ```

use std::pin::Pin;
use std::time::Duration;

use futures_core::Stream;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::{self, Message};
use url::Url;

use crate::error::Error;

// ── Frames ───────────────────────────────────────────────────────────

/// One inbound unit from the push channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsFrame {
    /// An application message (UTF-8 text frame).
    Text(String),
    /// A protocol-level ping or pong. Carries no data but proves liveness.
    KeepAlive,
}

/// Boxed frame stream handed to the push adapter.
///
/// The stream ends when the peer closes the connection. Dropping it
/// closes the socket.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<WsFrame, Error>> + Send>>;

// ── Options ──────────────────────────────────────────────────────────

/// Per-connection options.
#[derive(Debug, Clone)]
pub struct WsOptions {
    /// Send a Ping this often while connected. `None` disables client pings.
    pub ping_interval: Option<Duration>,
}

impl Default for WsOptions {
    fn default() -> Self {
        Self {
            ping_interval: Some(Duration::from_secs(10)),
        }
    }
}

// ── Connect ──────────────────────────────────────────────────────────

/// Establish one WebSocket connection and return its frame stream.
pub async fn open(url: &Url, options: &WsOptions) -> Result<FrameStream, Error> {
    tracing::info!(url = %url, "Connecting to WebSocket");

    let (ws_stream, _response) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

    tracing::info!("WebSocket connected");

    Ok(Box::pin(frames(ws_stream, options.ping_interval)))
}

// ── Frame pump ───────────────────────────────────────────────────────

enum Step {
    Read(Option<Result<Message, tungstenite::Error>>),
    Ping,
}

/// Turn an established socket into a frame stream.
///
/// Owns both halves: reads are surfaced as frames, and the write half is
/// used only for periodic pings. tungstenite answers server pings itself.
/// A zero `ping_interval` disables pings like `None`.
pub fn frames<S>(
    ws: WebSocketStream<S>,
    ping_interval: Option<Duration>,
) -> impl Stream<Item = Result<WsFrame, Error>> + Send
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async_stream::stream! {
        let (mut write, mut read) = ws.split();
        let mut pinger = ping_interval.filter(|p| !p.is_zero()).map(|period| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval
        });

        loop {
            let step = tokio::select! {
                frame = read.next() => Step::Read(frame),
                () = next_ping(pinger.as_mut()) => Step::Ping,
            };

            match step {
                Step::Read(Some(Ok(Message::Text(text)))) => {
                    yield Ok(WsFrame::Text(text.as_str().to_owned()));
                }
                Step::Read(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => {
                    tracing::trace!("WebSocket keep-alive");
                    yield Ok(WsFrame::KeepAlive);
                }
                Step::Read(Some(Ok(Message::Close(frame)))) => {
                    if let Some(ref cf) = frame {
                        tracing::info!(
                            code = %cf.code,
                            reason = %cf.reason,
                            "WebSocket close frame received"
                        );
                    } else {
                        tracing::info!("WebSocket close frame received (no payload)");
                    }
                    break;
                }
                Step::Read(Some(Ok(_))) => {
                    // Binary, raw Frame -- ignore
                }
                Step::Read(Some(Err(e))) => {
                    yield Err(Error::WebSocketConnect(e.to_string()));
                    break;
                }
                Step::Read(None) => {
                    tracing::info!("WebSocket stream ended");
                    break;
                }
                Step::Ping => {
                    if let Err(e) = write.send(Message::Ping(Default::default())).await {
                        yield Err(Error::WebSocketConnect(e.to_string()));
                        break;
                    }
                }
            }
        }
    }
}

async fn next_ping(interval: Option<&mut Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

// ── Tests ────────────────────────────────────────────────────────────
