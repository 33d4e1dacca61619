//! Single replaceable callback slot for inbound device payloads.

use std::sync::{Arc, PoisonError, RwLock};

/// Callback invoked once per inbound device payload, in arrival order.
pub type DeviceMsgCallback = Box<dyn Fn(serde_json::Value) + Send + Sync>;

/// Shared slot holding the current callback. Cloning shares the slot.
#[derive(Clone, Default)]
pub struct DeviceMsgSink {
    inner: Arc<RwLock<Option<Arc<dyn Fn(serde_json::Value) + Send + Sync>>>>,
}

impl DeviceMsgSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the callback; applies to the next delivery.
    pub fn set(&self, callback: DeviceMsgCallback) {
        let mut slot = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(Arc::from(callback));
    }

    /// Hand a payload to the callback. Without a callback the payload is dropped, not queued.
    /// Returns whether a callback received it.
    pub fn deliver(&self, payload: serde_json::Value) -> bool {
        // Clone out of the lock so the callback may re-register itself.
        let callback = self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match callback {
            Some(cb) => {
                cb(payload);
                true
            }
            None => {
                log::error!("device message received with no callback registered, dropping: {}", payload);
                false
            }
        }
    }
}

impl std::fmt::Debug for DeviceMsgSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registered = self
            .inner
            .read()
            .map(|g| g.is_some())
            .unwrap_or(false);
        f.debug_struct("DeviceMsgSink")
            .field("registered", &registered)
            .finish()
    }
}
