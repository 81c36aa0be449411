// In-process PubSub hub
//
// Every peer created from the same hub sees every message published on a topic
// it subscribed to, including its own. Used for tests and single-process runs.

use crate::network::pubsub::{NetworkError, PubSub, Subscribers, Subscription, TopicHandle};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::trace;

/// Default per-subscription queue length
pub const DEFAULT_MEMORY_BUFFER: usize = 1024;

/// Shared message hub
#[derive(Clone)]
pub struct MemoryHub {
    subscribers: Arc<Mutex<Subscribers>>,
    max_message_bytes: Option<usize>,
}

impl Default for MemoryHub {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_BUFFER)
    }
}

impl MemoryHub {
    /// Create a hub whose subscriptions each buffer up to `buffer` messages
    pub fn new(buffer: usize) -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Subscribers::new(buffer))),
            max_message_bytes: None,
        }
    }

    /// Reject published payloads larger than `bytes`
    pub fn with_max_message_bytes(mut self, bytes: usize) -> Self {
        self.max_message_bytes = Some(bytes);
        self
    }

    /// A transport handle for one peer attached to this hub
    pub fn peer(&self) -> MemoryPubSub {
        MemoryPubSub { hub: self.clone() }
    }
}

/// PubSub handle backed by a [`MemoryHub`]
#[derive(Clone)]
pub struct MemoryPubSub {
    hub: MemoryHub,
}

#[async_trait]
impl PubSub for MemoryPubSub {
    async fn join(&self, name: &str) -> Result<TopicHandle, NetworkError> {
        TopicHandle::new(name)
    }

    async fn publish(&self, topic: &TopicHandle, data: Vec<u8>) -> Result<(), NetworkError> {
        if let Some(max) = self.hub.max_message_bytes {
            if data.len() > max {
                return Err(NetworkError::MessageTooLarge {
                    size: data.len(),
                    max,
                });
            }
        }
        let delivered = self.hub.subscribers.lock().deliver(topic.name(), &data);
        trace!(topic = topic.name(), delivered, "memory publish");
        Ok(())
    }

    async fn subscribe(&self, topic: &TopicHandle) -> Result<Subscription, NetworkError> {
        Ok(self.hub.subscribers.lock().add(topic))
    }

    async fn unsubscribe(&self, subscription: Subscription) -> Result<(), NetworkError> {
        self.hub
            .subscribers
            .lock()
            .remove(subscription.topic().name(), subscription.id());
        Ok(())
    }

    fn max_message_bytes(&self) -> Option<usize> {
        self.hub.max_message_bytes
    }
}
