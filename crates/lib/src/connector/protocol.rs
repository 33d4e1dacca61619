//! Signaling wire types.
//!
//! Duplex envelope: `{ "message_type": "connect"|"forward"|"config"|"device_info"|"device_msg",
//! "device_id"?, "payload"?, "device_info"?, "error"? }`. Polling endpoints use plain JSON bodies.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{DeviceInfo, InfraConfig};

/// Client -> server messages on the duplex channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "message_type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Select a device.
    Connect { device_id: String },
    /// Relay a payload to the selected device.
    Forward { payload: Value },
}

/// Server -> client message on the duplex channel, classified for dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Message carried an `error` field; takes precedence over the message type.
    Error(String),
    /// The whole `config` message is the infra config.
    Config(InfraConfig),
    DeviceInfo(DeviceInfo),
    DeviceMsg(Value),
    /// Not JSON, not an object, or an unknown `message_type`; holds the raw text.
    Unrecognized(String),
}

impl Inbound {
    pub fn parse(text: &str) -> Self {
        let Ok(value) = serde_json::from_str::<Value>(text) else {
            return Inbound::Unrecognized(text.to_string());
        };
        let Value::Object(mut obj) = value else {
            return Inbound::Unrecognized(text.to_string());
        };
        if let Some(err) = obj.get("error").filter(|e| is_set(e)) {
            return Inbound::Error(error_text(err));
        }
        match obj.get("message_type").and_then(|v| v.as_str()) {
            Some("config") => Inbound::Config(InfraConfig(Value::Object(obj))),
            Some("device_info") => {
                Inbound::DeviceInfo(DeviceInfo(obj.remove("device_info").unwrap_or(Value::Null)))
            }
            Some("device_msg") => Inbound::DeviceMsg(obj.remove("payload").unwrap_or(Value::Null)),
            _ => Inbound::Unrecognized(text.to_string()),
        }
    }
}

/// `null`, `false` and `""` mean no error.
fn is_set(err: &Value) -> bool {
    !matches!(err, Value::Null | Value::Bool(false)) && err.as_str() != Some("")
}

/// Server error fields are usually strings; anything else is kept as its JSON text.
fn error_text(err: &Value) -> String {
    match err {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// POST polled_connections body.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ConnectRequest<'a> {
    pub device_id: &'a str,
}

/// POST polled_connections response.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ConnectResponse {
    pub connection_id: Value,
    #[serde(default)]
    pub device_info: Value,
}

impl ConnectResponse {
    /// Connection ids are opaque; numeric ids are used in their decimal form.
    pub fn connection_handle(&self) -> String {
        match &self.connection_id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// POST polled_connections/{id}/:forward body.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ForwardRequest<'a> {
    pub payload: &'a Value,
}

/// One item of GET polled_connections/{id}/messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolledMessage {
    #[serde(default)]
    pub payload: Value,
}
