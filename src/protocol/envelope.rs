//! Wire envelope and text-frame codec.
//!
//! Wire format: one JSON object per WebSocket text frame.
//! - Requests have `type` + `requestId` + optional `data`
//! - Responses/errors echo the request's `requestId`
//! - Pushes and heartbeats have `type` + `data` but NO `requestId`

use serde::Serialize;
use serde_json::{json, Map, Value};
use thiserror::Error;

use super::types::{MessageType, PushKind};

/// Codec errors. Decoding never panics; anything that is not a well-formed
/// envelope comes back as `MalformedFrame`.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Failed to encode envelope: {0}")]
    Encode(#[from] serde_json::Error),
}

/// The unit exchanged over the transport.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Envelope {
    pub fn new(kind: MessageType, request_id: Option<String>, data: Option<Value>) -> Self {
        Self {
            kind: kind.as_tag().to_string(),
            request_id,
            data,
        }
    }

    /// Successful result for `request_id`.
    pub fn response(request_id: impl Into<String>, data: Value) -> Self {
        Self::new(MessageType::Response, Some(request_id.into()), Some(data))
    }

    /// Failed result for `request_id`; the message lands in `data.error`.
    pub fn error(request_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            MessageType::Error,
            Some(request_id.into()),
            Some(json!({ "error": message.into() })),
        )
    }

    /// Server-bound telemetry push (no correlation id).
    pub fn push(kind: PushKind, data: Value) -> Self {
        Self::new(kind.message_type(), None, Some(data))
    }

    pub fn heartbeat() -> Self {
        Self::new(MessageType::Heartbeat, None, None)
    }

    pub fn message_type(&self) -> MessageType {
        MessageType::from_tag(&self.kind)
    }

    /// Encode to a text frame.
    pub fn encode(&self) -> Result<String, CodecError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a text frame. Only the structural shape is checked here.
    pub fn decode(frame: &str) -> Result<Self, CodecError> {
        let value: Value = serde_json::from_str(frame)
            .map_err(|e| CodecError::MalformedFrame(format!("invalid JSON: {}", e)))?;

        let Value::Object(mut object) = value else {
            return Err(malformed("top-level value is not an object"));
        };

        let kind = match object.remove("type") {
            Some(Value::String(kind)) => kind,
            Some(_) => return Err(malformed("`type` is not a string")),
            None => return Err(malformed("missing `type`")),
        };

        let request_id = match object.remove("requestId") {
            None | Some(Value::Null) => None,
            Some(Value::String(id)) => Some(id),
            Some(_) => return Err(malformed("`requestId` is not a string")),
        };

        let data = match object.remove("data") {
            None | Some(Value::Null) => None,
            Some(Value::Object(map)) => Some(Value::Object(map)),
            Some(_) => return Err(malformed("`data` is not an object")),
        };

        Ok(Self {
            kind,
            request_id,
            data,
        })
    }

    /// `data` as a mapping, empty when absent.
    pub fn data_object(&self) -> Map<String, Value> {
        match &self.data {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        }
    }
}

fn malformed(reason: &str) -> CodecError {
    CodecError::MalformedFrame(reason.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_request() {
        let env = Envelope::decode(
            r#"{"type":"READ_FILE","requestId":"r1","data":{"path":"plugins/Foo/config.yml"}}"#,
        )
        .unwrap();
        assert_eq!(env.message_type(), MessageType::ReadFile);
        assert_eq!(env.request_id.as_deref(), Some("r1"));
        assert_eq!(
            env.data_object()["path"],
            Value::String("plugins/Foo/config.yml".into())
        );
    }

    #[test]
    fn test_decode_push_without_data() {
        let env = Envelope::decode(r#"{"type":"HEARTBEAT_ACK"}"#).unwrap();
        assert_eq!(env.message_type(), MessageType::HeartbeatAck);
        assert!(env.request_id.is_none());
        assert!(env.data.is_none());
        assert!(env.data_object().is_empty());
    }

    #[test]
    fn test_decode_rejects_bad_shapes() {
        for frame in [
            "not json",
            "[1,2,3]",
            "\"READ_FILE\"",
            "{}",
            r#"{"type":42}"#,
            r#"{"type":"READ_FILE","requestId":7}"#,
            r#"{"type":"READ_FILE","data":"plugins/a.yml"}"#,
        ] {
            assert!(
                matches!(Envelope::decode(frame), Err(CodecError::MalformedFrame(_))),
                "{frame} should be malformed"
            );
        }
    }

    #[test]
    fn test_encode_omits_absent_fields() {
        assert_eq!(Envelope::heartbeat().encode().unwrap(), r#"{"type":"HEARTBEAT"}"#);

        let push = Envelope::push(PushKind::Metrics, json!({"tps": 20.0}));
        let value: Value = serde_json::from_str(&push.encode().unwrap()).unwrap();
        assert_eq!(value, json!({"type": "METRICS_BATCH", "data": {"tps": 20.0}}));
    }

    #[test]
    fn test_error_envelope_shape() {
        let env = Envelope::error("r9", "Command not allowed");
        let value: Value = serde_json::from_str(&env.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"type": "ERROR", "requestId": "r9", "data": {"error": "Command not allowed"}})
        );
    }
}
