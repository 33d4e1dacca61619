use tokio_tungstenite::tungstenite;

#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error("signaling request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("signaling server returned {status}: {body}")]
    Status { status: u16, body: String },
    /// Explicit `error` field sent by the server (unknown device, unauthorized, ...).
    #[error("{0}")]
    Server(String),
    #[error("unrecognized message from signaling server: {0}")]
    Protocol(String),
    #[error("invalid signaling response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("no device selected; request_device must succeed first")]
    DeviceNotSelected,
    #[error("a device was already requested on this connector")]
    DeviceAlreadyRequested,
    #[error("signaling channel closed")]
    ChannelClosed,
}
