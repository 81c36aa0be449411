// IoTopic - typed reader/writer over a PubSub topic
//
// Every payload travels inside an `Envelope` that names the sending node.
// Readers drop their own node's envelopes, so self-filtering does not depend
// on what the transport echoes back.

use crate::model::NodeId;
use crate::network::pubsub::{NetworkError, PubSub, Subscription, TopicHandle};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

/// Wire wrapper for every gossip message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub sender: NodeId,
    pub payload: T,
}

impl<T: Serialize> Envelope<T> {
    pub fn encode(&self) -> Result<Vec<u8>, NetworkError> {
        postcard::to_allocvec(self).map_err(|e| NetworkError::EncodeFailed(e.to_string()))
    }
}

impl<T: DeserializeOwned> Envelope<T> {
    pub fn decode(bytes: &[u8]) -> Result<Self, NetworkError> {
        postcard::from_bytes(bytes).map_err(|e| NetworkError::DecodeFailed(e.to_string()))
    }
}

/// A joined topic carrying payloads of type `T`
pub struct IoTopic<T> {
    pubsub: Arc<dyn PubSub>,
    handle: TopicHandle,
    local: NodeId,
    _payload: PhantomData<fn() -> T>,
}

impl<T> Clone for IoTopic<T> {
    fn clone(&self) -> Self {
        Self {
            pubsub: self.pubsub.clone(),
            handle: self.handle.clone(),
            local: self.local.clone(),
            _payload: PhantomData,
        }
    }
}

impl<T> IoTopic<T>
where
    T: Serialize + DeserializeOwned + Send,
{
    /// Join `name` on the given transport as node `local`
    pub async fn join(
        pubsub: Arc<dyn PubSub>,
        local: NodeId,
        name: &str,
    ) -> Result<Self, NetworkError> {
        let handle = pubsub.join(name).await?;
        Ok(Self {
            pubsub,
            handle,
            local,
            _payload: PhantomData,
        })
    }

    pub fn name(&self) -> &str {
        self.handle.name()
    }

    /// Publish one payload
    pub async fn write(&self, payload: &T) -> Result<(), NetworkError> {
        let bytes = self.encode(payload)?;
        self.publish_encoded(bytes).await
    }

    /// Wrap `payload` in this node's envelope, checked against the
    /// transport's message size limit
    pub fn encode(&self, payload: &T) -> Result<Vec<u8>, NetworkError> {
        let envelope = Envelope {
            sender: self.local.clone(),
            payload,
        };
        let bytes = envelope.encode()?;
        if let Some(max) = self.pubsub.max_message_bytes() {
            if bytes.len() > max {
                return Err(NetworkError::MessageTooLarge {
                    size: bytes.len(),
                    max,
                });
            }
        }
        Ok(bytes)
    }

    /// Publish bytes produced by [`IoTopic::encode`]
    pub async fn publish_encoded(&self, bytes: Vec<u8>) -> Result<(), NetworkError> {
        self.pubsub.publish(&self.handle, bytes).await
    }

    /// Start reading payloads published by other nodes
    pub async fn subscribe(&self) -> Result<TopicReader<T>, NetworkError> {
        let subscription = self.pubsub.subscribe(&self.handle).await?;
        Ok(TopicReader {
            pubsub: self.pubsub.clone(),
            subscription: Some(subscription),
            local: self.local.clone(),
            _payload: PhantomData,
        })
    }
}

/// Receiving side of an [`IoTopic`]
pub struct TopicReader<T> {
    pubsub: Arc<dyn PubSub>,
    subscription: Option<Subscription>,
    local: NodeId,
    _payload: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> TopicReader<T> {
    pub fn topic(&self) -> Option<&str> {
        self.subscription.as_ref().map(|s| s.topic().name())
    }

    /// Next payload from another node
    ///
    /// Returns `None` when `cancel` fires or the subscription has ended.
    /// Cancel-safe: dropping the future loses no message.
    pub async fn next(&mut self, cancel: &CancellationToken) -> Option<T> {
        let subscription = self.subscription.as_mut()?;
        loop {
            let bytes = tokio::select! {
                _ = cancel.cancelled() => return None,
                bytes = subscription.recv() => bytes?,
            };

            let envelope = match Envelope::<T>::decode(&bytes) {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!(topic = subscription.topic().name(), error = %e, "dropping undecodable message");
                    continue;
                }
            };

            if envelope.sender == self.local {
                trace!(topic = subscription.topic().name(), "skipping own message");
                continue;
            }

            return Some(envelope.payload);
        }
    }

    /// Unsubscribe from the topic
    pub async fn close(mut self) -> Result<(), NetworkError> {
        match self.subscription.take() {
            Some(subscription) => self.pubsub.unsubscribe(subscription).await,
            None => Ok(()),
        }
    }
}
