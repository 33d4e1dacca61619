//! Transport negotiation: try the WebSocket once, fall back to polling for good.

use super::{Connector, DuplexConnector, PollingConnector};
use crate::config::{self, Config};
use std::sync::Arc;

/// Open a connector to the signaling server at `config.server.url`. A failed or timed-out
/// WebSocket handshake is not an error: it only selects the polling transport.
/// Requires a tokio runtime.
pub async fn create_connector(config: &Config) -> Arc<dyn Connector> {
    let base_url = config.server.url.trim().trim_end_matches('/').to_string();
    let ws_url = config::duplex_url(&base_url, &config.server.duplex_path);
    let timeout = config.server.handshake_timeout();

    match tokio::time::timeout(timeout, tokio_tungstenite::connect_async(ws_url.as_str())).await {
        Ok(Ok((ws, _))) => {
            log::info!("negotiate: using websocket transport ({})", ws_url);
            Arc::new(DuplexConnector::new(ws))
        }
        Ok(Err(e)) => {
            log::info!("negotiate: websocket unavailable ({}), using polling transport", e);
            Arc::new(PollingConnector::new(&base_url, config.polling.clone()))
        }
        Err(_) => {
            log::info!(
                "negotiate: websocket handshake timed out after {:?}, using polling transport",
                timeout
            );
            Arc::new(PollingConnector::new(&base_url, config.polling.clone()))
        }
    }
}
