//! devlink core library: connectors that reach a single device through a signaling
//! server, over WebSocket or HTTP polling, plus config shared with the CLI.

pub mod config;
pub mod connector;
pub mod device;
pub mod init;

pub use connector::{create_connector, Connector, ConnectorError, DeviceSession, Transport};
