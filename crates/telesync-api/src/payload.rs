// Telemetry payload envelope shared by the status endpoint and the
// WebSocket stream.
//
// Both surfaces deliver the same flat JSON object. This module only
// splits protocol noise (keep-alives, the device clock) from the metric
// body; deciding which metrics are usable is the core crate's job.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::error::Error;

/// Application-level keep-alive markers, matched against a `"type"` field.
const KEEPALIVE_TYPES: &[&str] = &["keepalive", "ping", "heartbeat"];

/// Key carrying the device-reported timestamp.
const LAST_UPDATE_KEY: &str = "last_update";

/// Raw bodies are clipped to this many bytes inside error values.
const MAX_ERROR_BODY: usize = 512;

/// One decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A telemetry observation.
    Telemetry(TelemetryMessage),
    /// A liveness marker with no data.
    KeepAlive,
}

/// A telemetry object as it came off the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryMessage {
    /// Every top-level key except `last_update`, values untouched.
    pub metrics: Map<String, Value>,
    /// Device-reported timestamp string, if the device sent one.
    pub last_update: Option<String>,
}

impl TelemetryMessage {
    /// The device-reported timestamp, if present and RFC 3339.
    pub fn reported_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.last_update.as_deref()?;
        match DateTime::parse_from_rfc3339(raw) {
            Ok(ts) => Some(ts.with_timezone(&Utc)),
            Err(e) => {
                tracing::debug!(error = %e, raw, "ignoring unparseable last_update");
                None
            }
        }
    }
}

/// Decode a text body into an [`Inbound`] message.
pub fn parse(text: &str) -> Result<Inbound, Error> {
    let value: Value = serde_json::from_str(text).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body: clip(text),
    })?;

    let mut object = match value {
        Value::Object(object) => object,
        other => {
            return Err(Error::Deserialization {
                message: format!("expected a JSON object, got {}", json_kind(&other)),
                body: clip(text),
            });
        }
    };

    if object
        .get("type")
        .and_then(Value::as_str)
        .is_some_and(|kind| KEEPALIVE_TYPES.contains(&kind))
    {
        return Ok(Inbound::KeepAlive);
    }

    let last_update = match object.remove(LAST_UPDATE_KEY) {
        Some(Value::String(s)) => Some(s),
        _ => None,
    };

    Ok(Inbound::Telemetry(TelemetryMessage {
        metrics: object,
        last_update,
    }))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

pub(crate) fn clip(text: &str) -> String {
    if text.len() <= MAX_ERROR_BODY {
        return text.to_owned();
    }
    let mut end = MAX_ERROR_BODY;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_status_object() {
        let body = json!({
            "temperature": 4.4,
            "humidity": 61.0,
            "solar_active": true,
            "door_open": false,
            "last_update": "2026-02-10T12:00:00.250000+00:00"
        })
        .to_string();

        let Inbound::Telemetry(msg) = parse(&body).unwrap() else {
            panic!("expected telemetry");
        };
        assert_eq!(msg.metrics.len(), 4);
        assert_eq!(msg.metrics["temperature"], json!(4.4));
        assert!(!msg.metrics.contains_key("last_update"));
        assert_eq!(
            msg.reported_at().unwrap().to_rfc3339(),
            "2026-02-10T12:00:00.250+00:00"
        );
    }

    #[test]
    fn keepalive_markers() {
        for kind in ["keepalive", "ping", "heartbeat"] {
            let body = json!({ "type": kind }).to_string();
            assert_eq!(parse(&body).unwrap(), Inbound::KeepAlive);
        }
    }

    #[test]
    fn other_type_field_is_telemetry() {
        let body = json!({ "type": "reading", "temperature": 5.0 }).to_string();
        assert!(matches!(parse(&body).unwrap(), Inbound::Telemetry(_)));
    }

    #[test]
    fn garbled_last_update_is_dropped() {
        let body = json!({ "battery": 61, "last_update": "yesterday-ish" }).to_string();
        let Inbound::Telemetry(msg) = parse(&body).unwrap() else {
            panic!("expected telemetry");
        };
        assert!(msg.reported_at().is_none());
    }

    #[test]
    fn rejects_non_object() {
        let err = parse("[1, 2, 3]").unwrap_err();
        assert!(matches!(
            err,
            Error::Deserialization { ref message, .. } if message.contains("an array")
        ));
    }

    #[test]
    fn rejects_malformed_json() {
        let err = parse("not json at all").unwrap_err();
        assert!(err.is_payload());
    }

    #[test]
    fn clips_large_bodies() {
        let body = "x".repeat(2_000);
        let err = parse(&body).unwrap_err();
        let Error::Deserialization { body, .. } = err else {
            panic!("expected deserialization error");
        };
        assert_eq!(body.len(), MAX_ERROR_BODY);
    }
}
