//! Connectors to a single device through the signaling server.
//!
//! Two interchangeable transports implement [`Connector`]: a WebSocket duplex channel
//! and an HTTP polling fallback. [`create_connector`] picks one once, at construction.

mod backoff;
mod duplex;
mod error;
mod negotiate;
mod polling;
mod protocol;
mod sink;

pub use backoff::Backoff;
pub use duplex::DuplexConnector;
pub use error::ConnectorError;
pub use negotiate::create_connector;
pub use polling::PollingConnector;
pub use protocol::{ClientMessage, Inbound, PolledMessage};
pub use sink::{DeviceMsgCallback, DeviceMsgSink};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Opaque device identifier supplied by the hosting page.
pub type DeviceId = String;

/// Server-issued id binding forward/poll calls to one polled session.
pub type ConnectionHandle = String;

/// Connectivity configuration (ICE servers etc.), opaque to the connector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InfraConfig(pub serde_json::Value);

/// Descriptor of the selected device, as sent by the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceInfo(pub serde_json::Value);

/// Result of a successful device request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSession {
    pub device_info: DeviceInfo,
    pub infra_config: InfraConfig,
}

/// Which transport a connector runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Duplex,
    Polling,
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transport::Duplex => f.write_str("websocket"),
            Transport::Polling => f.write_str("polling"),
        }
    }
}

/// Shared contract of both transports. One connector serves exactly one device session.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Transport chosen at construction; informational only.
    fn transport(&self) -> Transport;

    /// Select the device and open the signaling relationship with it.
    /// May wait for the device to appear. Supported once per connector.
    async fn request_device(&self, device_id: &str) -> Result<DeviceSession, ConnectorError>;

    /// Forward an opaque payload to the selected device.
    /// Fails with [`ConnectorError::DeviceNotSelected`] before `request_device` resolves.
    async fn send_to_device(&self, payload: serde_json::Value) -> Result<(), ConnectorError>;

    /// Register the callback for inbound device payloads, replacing any previous one.
    /// Payloads arriving with no callback registered are logged and dropped.
    fn on_device_msg(&self, callback: DeviceMsgCallback);
}
