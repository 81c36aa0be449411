// Set announcements - the well-known topic on which new sets are advertised

use crate::model::{NodeId, SetId};
use crate::network::pubsub::{NetworkError, PubSub};
use crate::network::topic::{IoTopic, TopicReader};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Topic every node joins at startup
pub const SET_ANNOUNCEMENT_TOPIC: &str = "set-announcement";

/// Announcement that a set's file stream is about to start
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetAnnouncementMsg {
    pub set_id: SetId,
}

pub type SetAnnouncement = IoTopic<SetAnnouncementMsg>;
pub type SetAnnouncementReader = TopicReader<SetAnnouncementMsg>;

impl IoTopic<SetAnnouncementMsg> {
    /// Join the announcement topic
    pub async fn join_announcements(
        pubsub: Arc<dyn PubSub>,
        local: NodeId,
    ) -> Result<Self, NetworkError> {
        Self::join(pubsub, local, SET_ANNOUNCEMENT_TOPIC).await
    }

    /// Announce a set
    pub async fn announce(&self, set_id: &SetId) -> Result<(), NetworkError> {
        self.write(&SetAnnouncementMsg {
            set_id: set_id.clone(),
        })
        .await
    }
}
