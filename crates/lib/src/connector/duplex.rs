//! Duplex connector: one WebSocket to the signaling server.
//!
//! A single reader task demultiplexes inbound frames in arrival order into config,
//! device-info and device-message events. States: Idle -> AwaitingDeviceInfo -> Ready,
//! plus Closed once the socket goes away.

use super::protocol::{ClientMessage, Inbound};
use super::{
    Connector, ConnectorError, DeviceMsgCallback, DeviceMsgSink, DeviceSession, InfraConfig,
    Transport,
};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DuplexState {
    Idle,
    AwaitingDeviceInfo,
    Ready,
    Closed,
}

type DeviceReply = oneshot::Sender<Result<DeviceSession, ConnectorError>>;

/// In-flight requests, one slot per request kind.
#[derive(Default)]
struct PendingRequests {
    connect: Option<DeviceReply>,
}

/// Connection state mutated only by the reader task and request/send calls.
pub(crate) struct DuplexInner {
    state: DuplexState,
    infra_config: Option<InfraConfig>,
    pending: PendingRequests,
}

impl DuplexInner {
    pub(crate) fn new() -> Self {
        Self {
            state: DuplexState::Idle,
            infra_config: None,
            pending: PendingRequests::default(),
        }
    }

    pub(crate) fn state(&self) -> DuplexState {
        self.state
    }

    /// Register the pending device request. Only valid from Idle.
    fn begin_connect(
        &mut self,
    ) -> Result<oneshot::Receiver<Result<DeviceSession, ConnectorError>>, ConnectorError> {
        match self.state {
            DuplexState::Idle => {}
            DuplexState::Closed => return Err(ConnectorError::ChannelClosed),
            DuplexState::AwaitingDeviceInfo | DuplexState::Ready => {
                return Err(ConnectorError::DeviceAlreadyRequested)
            }
        }
        let (tx, rx) = oneshot::channel();
        self.pending.connect = Some(tx);
        self.state = DuplexState::AwaitingDeviceInfo;
        Ok(rx)
    }

    /// The connect message never left; forget the request.
    fn abandon_connect(&mut self) {
        self.pending.connect = None;
        if self.state == DuplexState::AwaitingDeviceInfo {
            self.state = DuplexState::Idle;
        }
    }

    fn reject_connect(&mut self, err: ConnectorError) -> bool {
        match self.pending.connect.take() {
            Some(tx) => {
                let _ = tx.send(Err(err));
                if self.state == DuplexState::AwaitingDeviceInfo {
                    self.state = DuplexState::Idle;
                }
                true
            }
            None => false,
        }
    }

    /// Dispatch one inbound text frame. Returns a device payload for the callback, if any.
    pub(crate) fn handle_text(&mut self, text: &str) -> Option<serde_json::Value> {
        match Inbound::parse(text) {
            Inbound::Error(e) => {
                log::warn!("duplex: server error: {}", e);
                if !self.reject_connect(ConnectorError::Server(e)) {
                    log::debug!("duplex: server error with no request pending");
                }
                None
            }
            Inbound::Config(config) => {
                log::debug!("duplex: infra config received");
                self.infra_config = Some(config);
                None
            }
            Inbound::DeviceInfo(device_info) => {
                let Some(tx) = self.pending.connect.take() else {
                    log::warn!("duplex: unsolicited device_info ignored");
                    return None;
                };
                let infra_config = self.infra_config.clone().unwrap_or_else(|| {
                    log::warn!("duplex: device_info arrived before config");
                    InfraConfig::default()
                });
                self.state = DuplexState::Ready;
                log::info!("duplex: device available");
                if tx
                    .send(Ok(DeviceSession {
                        device_info,
                        infra_config,
                    }))
                    .is_err()
                {
                    log::debug!("duplex: device request was dropped by the caller");
                }
                None
            }
            Inbound::DeviceMsg(payload) => Some(payload),
            Inbound::Unrecognized(raw) => {
                log::error!("duplex: unrecognized message from server: {}", raw);
                self.reject_connect(ConnectorError::Protocol(raw));
                None
            }
        }
    }

    /// Socket gone: fail whatever is still waiting.
    pub(crate) fn close(&mut self) {
        self.reject_connect(ConnectorError::ChannelClosed);
        self.state = DuplexState::Closed;
    }
}

fn lock(inner: &Mutex<DuplexInner>) -> MutexGuard<'_, DuplexInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Connector over an open WebSocket.
pub struct DuplexConnector<S> {
    writer: tokio::sync::Mutex<SplitSink<WebSocketStream<S>, Message>>,
    inner: Arc<Mutex<DuplexInner>>,
    sink: DeviceMsgSink,
    reader: JoinHandle<()>,
}

impl<S> DuplexConnector<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Take ownership of an open socket and start the reader task. Requires a tokio runtime.
    pub fn new(ws: WebSocketStream<S>) -> Self {
        let (writer, reader) = ws.split();
        let inner = Arc::new(Mutex::new(DuplexInner::new()));
        let sink = DeviceMsgSink::new();
        let reader = tokio::spawn(read_loop(reader, inner.clone(), sink.clone()));
        Self {
            writer: tokio::sync::Mutex::new(writer),
            inner,
            sink,
            reader,
        }
    }

    async fn send(&self, msg: &ClientMessage) -> Result<(), ConnectorError> {
        let text = serde_json::to_string(msg)?;
        self.writer.lock().await.send(Message::Text(text)).await?;
        Ok(())
    }
}

async fn read_loop<S>(
    mut frames: SplitStream<WebSocketStream<S>>,
    inner: Arc<Mutex<DuplexInner>>,
    sink: DeviceMsgSink,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(frame) = frames.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                log::warn!("duplex: read failed: {}", e);
                break;
            }
        };
        let payload = lock(&inner).handle_text(&text);
        if let Some(payload) = payload {
            sink.deliver(payload);
        }
    }
    log::info!("duplex: signaling channel closed");
    lock(&inner).close();
}

#[async_trait]
impl<S> Connector for DuplexConnector<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    fn transport(&self) -> Transport {
        Transport::Duplex
    }

    async fn request_device(&self, device_id: &str) -> Result<DeviceSession, ConnectorError> {
        let reply = lock(&self.inner).begin_connect()?;
        log::info!("duplex: requesting device {}", device_id);
        let connect = ClientMessage::Connect {
            device_id: device_id.to_string(),
        };
        if let Err(e) = self.send(&connect).await {
            lock(&self.inner).abandon_connect();
            return Err(e);
        }
        reply.await.map_err(|_| ConnectorError::ChannelClosed)?
    }

    async fn send_to_device(&self, payload: serde_json::Value) -> Result<(), ConnectorError> {
        let state = lock(&self.inner).state();
        match state {
            DuplexState::Ready => {}
            DuplexState::Closed => return Err(ConnectorError::ChannelClosed),
            DuplexState::Idle | DuplexState::AwaitingDeviceInfo => {
                return Err(ConnectorError::DeviceNotSelected)
            }
        }
        self.send(&ClientMessage::Forward { payload }).await
    }

    fn on_device_msg(&self, callback: DeviceMsgCallback) {
        self.sink.set(callback);
    }
}

impl<S> Drop for DuplexConnector<S> {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
