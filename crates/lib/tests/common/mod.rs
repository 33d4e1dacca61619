//! Shared helpers: serve a fake signaling server on an ephemeral port and collect device messages.

#![allow(dead_code)]

use devlink::config::{Config, PollingConfig};
use devlink::Connector;
use std::time::Duration;
use tokio::sync::mpsc;

/// Bind 127.0.0.1:0, serve `app` in the background, return its base URL. The task is left running.
pub async fn serve(app: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local_addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{}", addr)
}

/// Config pointing at `base_url` with short handshake timeout and fast polling.
pub fn test_config(base_url: &str) -> Config {
    let mut config = Config::default();
    config.server.url = base_url.to_string();
    config.server.handshake_timeout_ms = 2_000;
    config.polling = fast_polling();
    config
}

pub fn fast_polling() -> PollingConfig {
    PollingConfig {
        min_delay_ms: 10,
        max_delay_ms: 40,
        poll_timeout_ms: 300,
    }
}

/// Register a callback that forwards every inbound payload into a channel.
pub fn collect_device_msgs(connector: &dyn Connector) -> mpsc::UnboundedReceiver<serde_json::Value> {
    let (tx, rx) = mpsc::unbounded_channel();
    connector.on_device_msg(Box::new(move |payload| {
        let _ = tx.send(payload);
    }));
    rx
}

pub async fn next_msg(rx: &mut mpsc::UnboundedReceiver<serde_json::Value>) -> serde_json::Value {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("device message within 5s")
        .expect("callback channel open")
}
