//! Polling connector: HTTP request/response fallback when no WebSocket is available.
//!
//! `POST polled_connections` opens the session; a background task then polls
//! `polled_connections/{id}/messages?start=<cursor>` with exponential backoff, and
//! payloads go out via `POST polled_connections/{id}/:forward`.

use super::protocol::{ConnectRequest, ConnectResponse, ForwardRequest, PolledMessage};
use super::{
    Backoff, ConnectionHandle, Connector, ConnectorError, DeviceInfo, DeviceMsgCallback,
    DeviceMsgSink, DeviceSession, InfraConfig, Transport,
};
use crate::config::PollingConfig;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock, PoisonError};
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;

/// Session-scoped endpoints derived from the connection handle.
#[derive(Debug, Clone, PartialEq)]
struct SessionEndpoints {
    handle: ConnectionHandle,
    forward_url: String,
    messages_url: String,
}

impl SessionEndpoints {
    fn new(base_url: &str, handle: ConnectionHandle) -> Self {
        let connection = format!("{}/polled_connections/{}", base_url, handle);
        Self {
            forward_url: format!("{}/:forward", connection),
            messages_url: format!("{}/messages", connection),
            handle,
        }
    }
}

/// Connector that talks to the signaling server over plain HTTP requests.
pub struct PollingConnector {
    base_url: String,
    client: reqwest::Client,
    polling: PollingConfig,
    infra_config: OnceCell<InfraConfig>,
    session: OnceLock<SessionEndpoints>,
    requested: AtomicBool,
    sink: DeviceMsgSink,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl PollingConnector {
    pub fn new(base_url: &str, polling: PollingConfig) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            polling,
            infra_config: OnceCell::new(),
            session: OnceLock::new(),
            requested: AtomicBool::new(false),
            sink: DeviceMsgSink::new(),
            poller: Mutex::new(None),
        }
    }

    /// GET infra_config, fetched once per connector; concurrent callers share the in-flight request.
    pub async fn infra_config(&self) -> Result<InfraConfig, ConnectorError> {
        let config = self
            .infra_config
            .get_or_try_init(|| async {
                let url = format!("{}/infra_config", self.base_url);
                log::debug!("polling: fetching {}", url);
                let res = self.client.get(&url).send().await?;
                let value: Value = read_json(res).await?;
                Ok::<_, ConnectorError>(InfraConfig(value))
            })
            .await?;
        Ok(config.clone())
    }

    /// POST the payload to the session's forward endpoint; returns the server's decoded reply.
    pub async fn forward(&self, payload: Value) -> Result<Value, ConnectorError> {
        let endpoints = self.session.get().ok_or(ConnectorError::DeviceNotSelected)?;
        let res = self
            .client
            .post(&endpoints.forward_url)
            .json(&ForwardRequest { payload: &payload })
            .send()
            .await?;
        read_json(res).await
    }

    /// Start the poll loop for the open session. No-op (returns false) when no session
    /// exists yet or the loop was already started.
    pub fn start_polling(&self) -> bool {
        let Some(endpoints) = self.session.get() else {
            return false;
        };
        let mut slot = self.poller.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            log::debug!("polling: poll loop already started");
            return false;
        }
        let poll = PollLoop {
            client: self.client.clone(),
            messages_url: endpoints.messages_url.clone(),
            timeout: self.polling.poll_timeout(),
            cursor: 0,
            backoff: Backoff::new(self.polling.min_delay(), self.polling.max_delay()),
            sink: self.sink.clone(),
        };
        log::info!("polling: starting poll loop for connection {}", endpoints.handle);
        *slot = Some(tokio::spawn(poll.run()));
        true
    }

    /// Abort the poll loop. It cannot be restarted on this connector.
    pub fn stop_polling(&self) {
        let slot = self.poller.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = slot.as_ref() {
            handle.abort();
        }
    }

    async fn connect(&self, device_id: &str) -> Result<DeviceSession, ConnectorError> {
        let infra_config = self.infra_config().await?;
        let url = format!("{}/polled_connections", self.base_url);
        let res = self
            .client
            .post(&url)
            .json(&ConnectRequest { device_id })
            .send()
            .await?;
        let connected: ConnectResponse = read_json(res).await?;
        let endpoints = SessionEndpoints::new(&self.base_url, connected.connection_handle());
        log::info!(
            "polling: connected to device {} (connection {})",
            device_id,
            endpoints.handle
        );
        let _ = self.session.set(endpoints);
        self.start_polling();
        Ok(DeviceSession {
            device_info: DeviceInfo(connected.device_info),
            infra_config,
        })
    }
}

#[async_trait]
impl Connector for PollingConnector {
    fn transport(&self) -> Transport {
        Transport::Polling
    }

    async fn request_device(&self, device_id: &str) -> Result<DeviceSession, ConnectorError> {
        if self.requested.swap(true, Ordering::SeqCst) {
            return Err(ConnectorError::DeviceAlreadyRequested);
        }
        let result = self.connect(device_id).await;
        if result.is_err() {
            self.requested.store(false, Ordering::SeqCst);
        }
        result
    }

    async fn send_to_device(&self, payload: Value) -> Result<(), ConnectorError> {
        let reply = self.forward(payload).await?;
        log::debug!("polling: forward acknowledged: {}", reply);
        Ok(())
    }

    fn on_device_msg(&self, callback: DeviceMsgCallback) {
        self.sink.set(callback);
    }
}

impl Drop for PollingConnector {
    fn drop(&mut self) {
        self.stop_polling();
    }
}

/// Background poll task state: cursor and backoff are private to the loop.
struct PollLoop {
    client: reqwest::Client,
    messages_url: String,
    timeout: Duration,
    cursor: u64,
    backoff: Backoff,
    sink: DeviceMsgSink,
}

impl PollLoop {
    /// Runs until aborted.
    async fn run(mut self) {
        loop {
            let outcome = self.poll_once().await;
            let delay = self.next_delay(outcome);
            tokio::time::sleep(delay).await;
        }
    }

    /// Delay before the next poll. A failed poll keeps the cursor and counts as an empty poll.
    fn next_delay(&mut self, outcome: Result<usize, ConnectorError>) -> Duration {
        let received = match outcome {
            Ok(n) => n,
            Err(e) => {
                log::warn!("polling: poll at start={} failed: {}", self.cursor, e);
                0
            }
        };
        self.backoff.next(received)
    }

    async fn poll_once(&mut self) -> Result<usize, ConnectorError> {
        let res = self
            .client
            .get(&self.messages_url)
            .query(&[("start", self.cursor)])
            .timeout(self.timeout)
            .send()
            .await?;
        let batch: Option<Vec<PolledMessage>> = read_json(res).await?;
        Ok(self.deliver(batch.unwrap_or_default()))
    }

    /// Advance the cursor past the batch, then hand each payload over in order.
    fn deliver(&mut self, batch: Vec<PolledMessage>) -> usize {
        let n = batch.len();
        self.cursor += n as u64;
        for message in batch {
            self.sink.deliver(message.payload);
        }
        n
    }
}

/// Check status and decode a JSON body. An empty body decodes as `null`.
async fn read_json<T: DeserializeOwned>(res: reqwest::Response) -> Result<T, ConnectorError> {
    let status = res.status();
    if !status.is_success() {
        let body = res.text().await.unwrap_or_default();
        return Err(ConnectorError::Status {
            status: status.as_u16(),
            body,
        });
    }
    let body = res.text().await?;
    let body = if body.trim().is_empty() { "null" } else { body.as_str() };
    Ok(serde_json::from_str(body)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn fast() -> PollingConfig {
        PollingConfig {
            min_delay_ms: 5,
            max_delay_ms: 20,
            poll_timeout_ms: 200,
        }
    }

    fn poll_loop(cursor: u64, sink: DeviceMsgSink) -> PollLoop {
        PollLoop {
            client: reqwest::Client::new(),
            messages_url: String::new(),
            timeout: Duration::from_secs(1),
            cursor,
            backoff: Backoff::default(),
            sink,
        }
    }

    #[test]
    fn session_endpoints_from_handle() {
        let e = SessionEndpoints::new("http://op:1080", "abc".to_string());
        assert_eq!(e.forward_url, "http://op:1080/polled_connections/abc/:forward");
        assert_eq!(e.messages_url, "http://op:1080/polled_connections/abc/messages");
    }

    #[tokio::test]
    async fn send_before_request_fails() {
        let connector = PollingConnector::new("http://127.0.0.1:1", fast());
        assert!(matches!(
            connector.send_to_device(json!("hi")).await,
            Err(ConnectorError::DeviceNotSelected)
        ));
    }

    #[tokio::test]
    async fn start_polling_is_idempotent() {
        let connector = PollingConnector::new("http://127.0.0.1:1", fast());
        assert!(!connector.start_polling(), "no session yet");

        let _ = connector
            .session
            .set(SessionEndpoints::new("http://127.0.0.1:1", "c1".to_string()));
        assert!(connector.start_polling());
        assert!(!connector.start_polling());

        connector.stop_polling();
        assert!(!connector.start_polling(), "stopped loop stays stopped");
    }

    #[test]
    fn cursor_counts_every_delivered_message_once() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = DeviceMsgSink::new();
        let s = seen.clone();
        sink.set(Box::new(move |p| s.lock().unwrap().push(p)));

        let mut poll = poll_loop(0, sink);
        let batch = |items: &[i64]| -> Vec<PolledMessage> {
            items
                .iter()
                .map(|i| PolledMessage { payload: json!(i) })
                .collect()
        };

        assert_eq!(poll.deliver(batch(&[1, 2])), 2);
        assert_eq!(poll.cursor, 2);
        assert_eq!(poll.deliver(batch(&[])), 0);
        assert_eq!(poll.cursor, 2);
        assert_eq!(poll.deliver(batch(&[3, 4, 5])), 3);
        assert_eq!(poll.cursor, 5);
        assert_eq!(*seen.lock().unwrap(), vec![json!(1), json!(2), json!(3), json!(4), json!(5)]);
    }

    #[test]
    fn cursor_advances_even_without_callback() {
        let mut poll = poll_loop(7, DeviceMsgSink::new());
        poll.deliver(vec![PolledMessage { payload: json!("dropped") }]);
        assert_eq!(poll.cursor, 8);
    }

    #[test]
    fn loop_delay_follows_batch_size() {
        let mut poll = poll_loop(0, DeviceMsgSink::new());
        let ms = Duration::from_millis;
        assert_eq!(poll.next_delay(Ok(0)), ms(1000));
        assert_eq!(poll.next_delay(Ok(0)), ms(2000));
        assert_eq!(poll.next_delay(Ok(0)), ms(4000));
        assert_eq!(poll.next_delay(Ok(2)), ms(1000), "non-empty poll resets");
        assert_eq!(poll.next_delay(Ok(0)), ms(2000));
    }

    #[test]
    fn failed_poll_backs_off_like_an_empty_one() {
        let mut poll = poll_loop(3, DeviceMsgSink::new());
        let failure = || {
            Err(ConnectorError::Status {
                status: 500,
                body: String::new(),
            })
        };
        let ms = Duration::from_millis;
        assert_eq!(poll.next_delay(failure()), ms(1000));
        assert_eq!(poll.next_delay(failure()), ms(2000));
        assert_eq!(poll.cursor, 3);
        assert_eq!(poll.next_delay(Ok(1)), ms(1000));
    }
}
