//! Outbound stamping and inbound inspection of wire envelopes
//!
//! The actor treats payloads as opaque JSON. It only stamps one field (the
//! correlation id) on send and reads one field (the operation tag) on
//! receive, to spot the handshake-ok signal. Both names are configuration.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const DEFAULT_CORRELATION_FIELD: &str = "client-event-id";
pub const DEFAULT_OP_FIELD: &str = "op";
pub const DEFAULT_HANDSHAKE_OP: &str = "init-ok";

/// Protocol errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Outbound payload must be a JSON object, got {0}")]
    NotAnObject(&'static str),
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Field names of the surrounding wire protocol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireProtocol {
    #[serde(default = "default_correlation_field")]
    pub correlation_field: String,
    #[serde(default = "default_op_field")]
    pub op_field: String,
    #[serde(default = "default_handshake_op")]
    pub handshake_op: String,
    /// Mark the session authenticated when an inbound message carries the handshake op
    #[serde(default = "default_detect_handshake")]
    pub detect_handshake: bool,
}

fn default_correlation_field() -> String {
    DEFAULT_CORRELATION_FIELD.to_string()
}

fn default_op_field() -> String {
    DEFAULT_OP_FIELD.to_string()
}

fn default_handshake_op() -> String {
    DEFAULT_HANDSHAKE_OP.to_string()
}

fn default_detect_handshake() -> bool {
    true
}

impl Default for WireProtocol {
    fn default() -> Self {
        Self {
            correlation_field: default_correlation_field(),
            op_field: default_op_field(),
            handshake_op: default_handshake_op(),
            detect_handshake: default_detect_handshake(),
        }
    }
}

impl WireProtocol {
    /// Stamp `correlation_id` on an outbound payload and serialize it
    ///
    /// The stamp wins over a caller field with the same name.
    pub fn encode_outbound(
        &self,
        correlation_id: &str,
        payload: Value,
    ) -> Result<String, ProtocolError> {
        let mut object = match payload {
            Value::Object(object) => object,
            other => return Err(ProtocolError::NotAnObject(json_kind(&other))),
        };
        object.insert(
            self.correlation_field.clone(),
            Value::String(correlation_id.to_string()),
        );
        Ok(serde_json::to_string(&Value::Object(object))?)
    }

    /// Parse an inbound frame
    pub fn decode_inbound(&self, raw: &str) -> Result<Value, ProtocolError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Operation tag of a payload, if it has one
    pub fn op<'a>(&self, payload: &'a Value) -> Option<&'a str> {
        payload.get(&self.op_field).and_then(Value::as_str)
    }

    /// True when handshake detection is on and the payload is a handshake-ok
    pub fn is_handshake_ok(&self, payload: &Value) -> bool {
        self.detect_handshake && self.op(payload) == Some(self.handshake_op.as_str())
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.correlation_field.is_empty() {
            return Err("correlation_field must not be empty".to_string());
        }
        if self.op_field.is_empty() {
            return Err("op_field must not be empty".to_string());
        }
        if self.handshake_op.is_empty() {
            return Err("handshake_op must not be empty".to_string());
        }
        Ok(())
    }
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
