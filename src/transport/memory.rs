//! In-process broker over `tokio::sync::broadcast`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::broker::{Broker, Subscription};
use crate::config::TransportSettings;
use crate::error::{Error, Result};

/// Default per-channel buffer.
pub const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug)]
struct Shared {
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
    capacity: usize,
    closed: AtomicBool,
}

impl Shared {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn channels(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, broadcast::Sender<String>>>> {
        self.channels
            .lock()
            .map_err(|_| Error::transport("broker state poisoned"))
    }

    /// Drop a channel once its last subscriber has gone.
    fn release(&self, channel: &str) {
        if let Ok(mut channels) = self.channels.lock() {
            if channels.get(channel).map(|tx| tx.receiver_count() == 0).unwrap_or(false) {
                channels.remove(channel);
                tracing::debug!("Released empty channel {}", channel);
            }
        }
    }
}

/// In-process broker. Only agents running in this process can reach each
/// other through it; it is not a cross-process bus, and agents in separate
/// processes need another [`Broker`] implementation.
///
/// Cloning yields another handle to the same channels. A subscriber that falls
/// more than `capacity` messages behind loses the overflow.
#[derive(Debug, Clone)]
pub struct MemoryBroker {
    shared: Arc<Shared>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                channels: Mutex::new(HashMap::new()),
                capacity: capacity.max(1),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Broker sized by `transport.capacity`.
    pub fn from_settings(settings: &TransportSettings) -> Self {
        Self::with_capacity(settings.capacity)
    }

    /// Simulate connection loss: every subscription errors and every
    /// further publish/subscribe fails.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        if let Ok(mut channels) = self.shared.channels.lock() {
            channels.clear();
        }
        tracing::warn!("Memory broker closed");
    }

    /// Number of live subscribers on a channel.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.shared
            .channels
            .lock()
            .ok()
            .and_then(|channels| channels.get(channel).map(|tx| tx.receiver_count()))
            .unwrap_or(0)
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    fn name(&self) -> &str {
        "memory"
    }

    async fn ping(&self) -> Result<()> {
        if self.shared.is_closed() {
            return Err(Error::transport("memory broker is closed"));
        }
        Ok(())
    }

    async fn publish(&self, channel: &str, message: String) -> Result<usize> {
        if self.shared.is_closed() {
            return Err(Error::transport("memory broker is closed"));
        }

        let channels = self.shared.channels()?;
        let Some(tx) = channels.get(channel) else {
            tracing::debug!("No subscriber on {}, message dropped", channel);
            return Ok(0);
        };

        // A send error only means every receiver is gone.
        Ok(tx.send(message).unwrap_or(0))
    }

    async fn subscribe(&self, channel: &str) -> Result<Box<dyn Subscription>> {
        if self.shared.is_closed() {
            return Err(Error::transport("memory broker is closed"));
        }

        let receiver = {
            let mut channels = self.shared.channels()?;
            channels
                .entry(channel.to_string())
                .or_insert_with(|| broadcast::channel(self.shared.capacity).0)
                .subscribe()
        };

        Ok(Box::new(MemorySubscription {
            channel: channel.to_string(),
            receiver: Some(receiver),
            shared: Arc::clone(&self.shared),
        }))
    }
}

struct MemorySubscription {
    channel: String,
    receiver: Option<broadcast::Receiver<String>>,
    shared: Arc<Shared>,
}

#[async_trait]
impl Subscription for MemorySubscription {
    fn channel(&self) -> &str {
        &self.channel
    }

    async fn next_message(&mut self) -> Result<Option<String>> {
        let Some(receiver) = self.receiver.as_mut() else {
            return Ok(None);
        };

        loop {
            match receiver.recv().await {
                Ok(message) => return Ok(Some(message)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Subscriber on {} lagged, {} messages lost", self.channel, skipped);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    if self.shared.is_closed() {
                        return Err(Error::transport(format!(
                            "connection lost while listening on {}",
                            self.channel
                        )));
                    }
                    return Ok(None);
                }
            }
        }
    }

    async fn unsubscribe(&mut self) -> Result<()> {
        if self.receiver.take().is_some() {
            self.shared.release(&self.channel);
            tracing::debug!("Unsubscribed from {}", self.channel);
        }
        Ok(())
    }
}

impl Drop for MemorySubscription {
    fn drop(&mut self) {
        if self.receiver.take().is_some() {
            self.shared.release(&self.channel);
        }
    }
}
