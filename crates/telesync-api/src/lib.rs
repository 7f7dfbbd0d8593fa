// telesync-api: Async wire clients for device telemetry (HTTP status + WebSocket stream)

pub mod error;
pub mod payload;
pub mod status;
pub mod transport;
pub mod websocket;

pub use error::Error;
pub use payload::{Inbound, TelemetryMessage};
pub use status::StatusClient;
pub use transport::{TlsMode, TransportConfig};
pub use websocket::{FrameStream, WsFrame, WsOptions};
