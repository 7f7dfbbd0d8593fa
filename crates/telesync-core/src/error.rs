// ── Sync error taxonomy ──
//
// Every adapter failure folds into one of three recoverable kinds. None
// of them is fatal: they are reported and the controller carries on.
// The `From<telesync_api::Error>` impl translates wire-level errors.

use std::time::Duration;

use strum::Display;
use thiserror::Error;

/// Unified error type for the core crate.
///
/// Cloneable so it can be fanned out through report channels.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// Network or channel failure.
    #[error("Transport error: {message}")]
    Transport {
        message: String,
        /// HTTP status, when the failure was a non-success response.
        status: Option<u16>,
    },

    /// The payload arrived but could not be turned into a snapshot.
    #[error("Parse error: {message}")]
    Parse { message: String },

    /// No response within the deadline. Handled like a transport error.
    #[error("Timed out after {after:?}")]
    Timeout { after: Duration },
}

/// Coarse classification of a [`SyncError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ErrorKind {
    Transport,
    Parse,
    Timeout,
}

impl SyncError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            status: None,
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport { .. } => ErrorKind::Transport,
            Self::Parse { .. } => ErrorKind::Parse,
            Self::Timeout { .. } => ErrorKind::Timeout,
        }
    }

    /// Transport and timeout errors both mean "the channel is unhealthy".
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Timeout { .. })
    }

    pub fn is_parse(&self) -> bool {
        matches!(self, Self::Parse { .. })
    }

    /// Nothing in the sync layer is fatal.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::Parse { .. } | Self::Timeout { .. }
        )
    }
}

// ── Conversion from wire-layer errors ────────────────────────────────

impl From<telesync_api::Error> for SyncError {
    fn from(err: telesync_api::Error) -> Self {
        use telesync_api::Error as Api;

        match err {
            Api::Transport(e) => SyncError::Transport {
                status: e.status().map(|s| s.as_u16()),
                message: e.to_string(),
            },
            Api::InvalidUrl(e) => SyncError::transport(format!("invalid URL: {e}")),
            Api::Http { status, .. } => SyncError::Transport {
                message: format!("HTTP {status} from status endpoint"),
                status: Some(status),
            },
            Api::Timeout { timeout_ms } => SyncError::Timeout {
                after: Duration::from_millis(timeout_ms),
            },
            Api::Tls(msg) => SyncError::transport(format!("TLS error: {msg}")),
            Api::WebSocketConnect(reason) => {
                SyncError::transport(format!("WebSocket connection failed: {reason}"))
            }
            Api::WebSocketClosed { code, reason } => {
                SyncError::transport(format!("WebSocket closed (code {code}): {reason}"))
            }
            Api::Deserialization { message, body: _ } => SyncError::Parse { message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_is_transport_with_status() {
        let err = SyncError::from(telesync_api::Error::Http {
            status: 502,
            body: "bad gateway".into(),
        });
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(matches!(err, SyncError::Transport { status: Some(502), .. }));
    }

    #[test]
    fn deserialization_is_parse() {
        let err = SyncError::from(telesync_api::Error::Deserialization {
            message: "expected value at line 1 column 1".into(),
            body: "<html>".into(),
        });
        assert!(err.is_parse());
        assert!(!err.is_transport());
    }

    #[test]
    fn timeout_counts_as_transport() {
        let err = SyncError::Timeout {
            after: Duration::from_secs(8),
        };
        assert!(err.is_transport());
        assert_eq!(err.kind().to_string(), "timeout");
        assert_eq!(err.to_string(), "Timed out after 8s");
    }
}
