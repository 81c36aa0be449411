// PubSub - the named-topic publish/subscribe contract the gossip layer runs on
//
// Implementations deliver raw bytes; typing, self-filtering and payload
// encoding live one layer up in `IoTopic`.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;

/// Errors from the publish/subscribe layer
#[derive(Error, Debug, Clone)]
pub enum NetworkError {
    #[error("Invalid topic: {0}")]
    InvalidTopic(String),

    #[error("Join failed: {0}")]
    JoinFailed(String),

    #[error("Subscribe failed: {0}")]
    SubscribeFailed(String),

    #[error("Publish failed: {0}")]
    PublishFailed(String),

    #[error("Message of {size} bytes exceeds the {max} byte limit")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Encoding failed: {0}")]
    EncodeFailed(String),

    #[error("Decoding failed: {0}")]
    DecodeFailed(String),

    #[error("Swarm setup failed: {0}")]
    SwarmBuildFailed(String),

    #[error("Listen failed: {0}")]
    ListenFailed(String),

    #[error("Network closed")]
    Closed,
}

/// A joined topic
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TopicHandle {
    name: String,
}

impl TopicHandle {
    pub fn new(name: impl Into<String>) -> Result<Self, NetworkError> {
        let name = name.into();
        if name.is_empty() {
            return Err(NetworkError::InvalidTopic("topic name is empty".to_string()));
        }
        Ok(Self { name })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for TopicHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Identifier of one subscription, unique per transport instance
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Receiving end of a topic subscription
pub struct Subscription {
    id: SubscriptionId,
    topic: TopicHandle,
    receiver: mpsc::Receiver<Vec<u8>>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn topic(&self) -> &TopicHandle {
        &self.topic
    }

    /// Next message, or `None` once the transport has dropped the subscription
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.receiver.recv().await
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .finish()
    }
}

/// Named-topic publish/subscribe transport
#[async_trait]
pub trait PubSub: Send + Sync {
    /// Join a topic so it can be published to and subscribed on
    async fn join(&self, name: &str) -> Result<TopicHandle, NetworkError>;

    /// Publish opaque bytes to a joined topic
    async fn publish(&self, topic: &TopicHandle, data: Vec<u8>) -> Result<(), NetworkError>;

    /// Start receiving messages published on a topic
    async fn subscribe(&self, topic: &TopicHandle) -> Result<Subscription, NetworkError>;

    /// Stop receiving on a subscription
    async fn unsubscribe(&self, subscription: Subscription) -> Result<(), NetworkError>;

    /// Largest payload `publish` accepts, if the transport has a limit
    fn max_message_bytes(&self) -> Option<usize> {
        None
    }
}

// ============================================================================
// SUBSCRIBER BOOKKEEPING
// ============================================================================

/// Per-topic fan-out to bounded subscriber queues
///
/// Shared by transport implementations. Delivery never waits: a full queue
/// drops the message for that subscriber.
pub(crate) struct Subscribers {
    topics: HashMap<String, Vec<(SubscriptionId, mpsc::Sender<Vec<u8>>)>>,
    next_id: u64,
    buffer: usize,
}

impl Subscribers {
    pub(crate) fn new(buffer: usize) -> Self {
        Self {
            topics: HashMap::new(),
            next_id: 0,
            buffer: buffer.max(1),
        }
    }

    /// Whether anyone is subscribed to `topic`
    pub(crate) fn has_topic(&self, topic: &str) -> bool {
        self.topics.get(topic).is_some_and(|subs| !subs.is_empty())
    }

    /// Register a new subscriber
    pub(crate) fn add(&mut self, topic: &TopicHandle) -> Subscription {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;

        let (tx, rx) = mpsc::channel(self.buffer);
        self.topics
            .entry(topic.name().to_string())
            .or_default()
            .push((id, tx));

        Subscription {
            id,
            topic: topic.clone(),
            receiver: rx,
        }
    }

    /// Remove a subscriber; returns true if the topic has no subscribers left
    pub(crate) fn remove(&mut self, topic: &str, id: SubscriptionId) -> bool {
        let now_empty = match self.topics.get_mut(topic) {
            Some(subs) => {
                subs.retain(|(sub_id, _)| *sub_id != id);
                subs.is_empty()
            }
            None => true,
        };
        if now_empty {
            self.topics.remove(topic);
        }
        now_empty
    }

    /// Deliver a message to every live subscriber of `topic`
    ///
    /// Returns the number of queues the message was placed on.
    pub(crate) fn deliver(&mut self, topic: &str, data: &[u8]) -> usize {
        let Some(subs) = self.topics.get_mut(topic) else {
            return 0;
        };

        let mut delivered = 0;
        subs.retain(|(id, tx)| match tx.try_send(data.to_vec()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                warn!(topic, subscription = id.0, "subscriber queue full, dropping message");
                true
            }
            Err(TrySendError::Closed(_)) => false,
        });

        delivered
    }

    /// Topics whose subscribers have all gone away
    pub(crate) fn drain_closed(&mut self) -> Vec<String> {
        let mut emptied = Vec::new();
        self.topics.retain(|topic, subs| {
            subs.retain(|(_, tx)| !tx.is_closed());
            if subs.is_empty() {
                emptied.push(topic.clone());
                false
            } else {
                true
            }
        });
        emptied
    }
}
