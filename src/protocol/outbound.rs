//! Outbound envelopes.
//!
//! Every directive the client writes is one JSON object tagged by `type`.

// ============================================================================
// Imports
// ============================================================================

use serde::Serialize;
use serde_json::Value;

use crate::error::Result;
use crate::identifiers::RequestId;

// ============================================================================
// Outbound
// ============================================================================

/// An envelope from the client to the remote service.
///
/// # Format
///
/// ```json
/// { "type": "subscribe", "channel": "trades" }
/// { "type": "unsubscribe", "channel": "trades" }
/// { "type": "ping" }
/// { "type": "send", "payload": { ... } }
/// { "type": "request", "requestType": "quote", "requestId": "uuid", "payload": { ... } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Outbound {
    /// Start receiving a channel.
    Subscribe {
        /// Channel name.
        channel: String,
    },

    /// Stop receiving a channel.
    Unsubscribe {
        /// Channel name.
        channel: String,
    },

    /// Keepalive probe.
    Ping,

    /// Fire-and-forget application payload.
    Send {
        /// Opaque payload.
        payload: Value,
    },

    /// Correlated request.
    #[serde(rename_all = "camelCase")]
    Request {
        /// Application-level request type.
        request_type: String,
        /// Correlation id echoed by the response.
        request_id: RequestId,
        /// Opaque payload.
        payload: Value,
    },
}

impl Outbound {
    /// Creates a subscribe directive.
    #[inline]
    #[must_use]
    pub fn subscribe(channel: impl Into<String>) -> Self {
        Self::Subscribe {
            channel: channel.into(),
        }
    }

    /// Creates an unsubscribe directive.
    #[inline]
    #[must_use]
    pub fn unsubscribe(channel: impl Into<String>) -> Self {
        Self::Unsubscribe {
            channel: channel.into(),
        }
    }

    /// Wraps a payload in a send envelope.
    #[inline]
    #[must_use]
    pub fn send(payload: Value) -> Self {
        Self::Send { payload }
    }

    /// Creates a request envelope.
    #[inline]
    #[must_use]
    pub fn request(request_type: impl Into<String>, request_id: RequestId, payload: Value) -> Self {
        Self::Request {
            request_type: request_type.into(),
            request_id,
            payload,
        }
    }

    /// Returns the envelope kind as written on the wire.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Subscribe { .. } => "subscribe",
            Self::Unsubscribe { .. } => "unsubscribe",
            Self::Ping => "ping",
            Self::Send { .. } => "send",
            Self::Request { .. } => "request",
        }
    }

    /// Serializes the envelope to a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if the payload cannot be serialized.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn encoded(envelope: &Outbound) -> Value {
        let text = envelope.encode().expect("encode");
        serde_json::from_str(&text).expect("valid json")
    }

    #[test]
    fn test_subscribe_format() {
        assert_eq!(
            encoded(&Outbound::subscribe("trades")),
            json!({ "type": "subscribe", "channel": "trades" })
        );
    }

    #[test]
    fn test_ping_format() {
        assert_eq!(encoded(&Outbound::Ping), json!({ "type": "ping" }));
    }

    #[test]
    fn test_send_wraps_payload() {
        let value = encoded(&Outbound::send(json!({ "order": 7 })));
        assert_eq!(value["type"], "send");
        assert_eq!(value["payload"]["order"], 7);
    }

    #[test]
    fn test_request_uses_camel_case_fields() {
        let id = RequestId::generate();
        let value = encoded(&Outbound::request("quote", id, json!({ "symbol": "ETH" })));

        assert_eq!(value["type"], "request");
        assert_eq!(value["requestType"], "quote");
        assert_eq!(value["requestId"], id.to_string());
        assert_eq!(value["payload"]["symbol"], "ETH");
    }

    #[test]
    fn test_kind() {
        assert_eq!(Outbound::unsubscribe("a").kind(), "unsubscribe");
        assert_eq!(Outbound::send(Value::Null).kind(), "send");
    }
}
