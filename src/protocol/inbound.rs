//! Inbound frame classification.
//!
//! The service sends loosely shaped JSON objects. [`Inbound::parse`] sorts
//! each frame into exactly one kind, checked in this order:
//!
//! | Shape | Kind |
//! |-------|------|
//! | `{"type":"pong"}` | [`Inbound::Pong`] |
//! | has `requestId` | [`Inbound::Response`] |
//! | `{"type":"error", ...}` | [`Inbound::Error`] |
//! | `{"channel":C,"data":D}` | [`Inbound::Channel`] |
//! | `{"event":E,"data":D}` | [`Inbound::Event`] |
//!
//! Anything else is a protocol error and becomes a `parseError` event.
//! A field of an unexpected type only disqualifies its own row, so extra
//! fields never break delivery of an otherwise valid frame.

// ============================================================================
// Imports
// ============================================================================

use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::identifiers::RequestId;

// ============================================================================
// Inbound
// ============================================================================

/// A classified frame from the remote service.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Heartbeat answer. Consumed silently.
    Pong,

    /// Service-level error notice.
    Error {
        /// Human-readable message.
        message: String,
    },

    /// Data published on a channel.
    Channel {
        /// Channel name.
        channel: String,
        /// Channel payload.
        data: Value,
    },

    /// Named service event for lifecycle listeners.
    Event {
        /// Event name.
        event: String,
        /// Event payload.
        data: Value,
    },

    /// Answer to an earlier request.
    Response {
        /// Correlation id.
        request_id: RequestId,
        /// `Ok(data)` or `Err(message)`.
        result: std::result::Result<Value, String>,
    },

    /// Answer carrying a `requestId` this client could never have issued.
    ForeignResponse {
        /// The id as sent, rendered as text.
        request_id: String,
    },
}

impl Inbound {
    /// Parses and classifies one text frame.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if the frame is not valid JSON
    /// - [`Error::Protocol`] if it is not an object or matches no known shape
    pub fn parse(text: &str) -> Result<Self> {
        let mut frame = match serde_json::from_str::<Value>(text)? {
            Value::Object(map) => map,
            _ => return Err(Error::protocol("Frame is not a JSON object")),
        };

        let kind = frame.get("type").and_then(Value::as_str);
        if kind == Some("pong") {
            return Ok(Self::Pong);
        }
        let is_error = kind == Some("error");

        if let Some(id) = take_present(&mut frame, "requestId") {
            let Some(request_id) = id.as_str().and_then(RequestId::parse) else {
                let request_id = match id {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                return Ok(Self::ForeignResponse { request_id });
            };
            let result = match take_present(&mut frame, "error") {
                Some(error) => Err(error_text(error)),
                None => Ok(take_data(&mut frame)),
            };
            return Ok(Self::Response { request_id, result });
        }

        if is_error {
            let message = take_present(&mut frame, "message")
                .or_else(|| take_present(&mut frame, "error"))
                .map(error_text)
                .unwrap_or_else(|| "unknown error".to_string());
            return Ok(Self::Error { message });
        }

        if let Some(channel) = take_string(&mut frame, "channel") {
            return Ok(Self::Channel {
                channel,
                data: take_data(&mut frame),
            });
        }

        if let Some(event) = take_string(&mut frame, "event") {
            return Ok(Self::Event {
                event,
                data: take_data(&mut frame),
            });
        }

        Err(Error::protocol("Unrecognized frame"))
    }
}

/// Removes a field unless it is absent or `null`.
fn take_present(frame: &mut Map<String, Value>, key: &str) -> Option<Value> {
    frame.remove(key).filter(|v| !v.is_null())
}

/// Removes a string field. Other types leave the field in place.
fn take_string(frame: &mut Map<String, Value>, key: &str) -> Option<String> {
    match frame.get(key) {
        Some(Value::String(_)) => match frame.remove(key) {
            Some(Value::String(s)) => Some(s),
            _ => None,
        },
        _ => None,
    }
}

fn take_data(frame: &mut Map<String, Value>) -> Value {
    frame.remove("data").unwrap_or(Value::Null)
}

/// Flattens an `error` field that may be a string or a structured object.
fn error_text(error: Value) -> String {
    match error {
        Value::String(s) => s,
        Value::Object(ref map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string()),
        other => other.to_string(),
    }
}

// ============================================================================
// Tests
// ============================================================================
