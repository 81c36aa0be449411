// Network Module - gossip transport and the typed topics built on it
//
// - pubsub: the transport contract and its errors
// - memory: in-process hub
// - swarm: libp2p gossipsub with mDNS discovery
// - topic: sender-tagged envelopes over a topic
// - sets / files: the announcement topic and per-set file streams

mod files;
mod memory;
mod pubsub;
mod sets;
mod swarm;
mod topic;

pub use files::{file_stream_topic, FileMsg, FileStream, FileStreamReader};
pub use memory::{MemoryHub, MemoryPubSub, DEFAULT_MEMORY_BUFFER};
pub use pubsub::{NetworkError, PubSub, Subscription, SubscriptionId, TopicHandle};
pub use sets::{SetAnnouncement, SetAnnouncementMsg, SetAnnouncementReader, SET_ANNOUNCEMENT_TOPIC};
pub use swarm::{NetworkConfig, SwarmNetwork};
pub use topic::{Envelope, IoTopic, TopicReader};
