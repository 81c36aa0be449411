// Broadcaster - announce a set, then stream its members

use crate::model::{File, NodeId, SetId};
use crate::network::{FileStream, NetworkError, PubSub, SetAnnouncement};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Publishes sets onto the gossip mesh
pub struct Broadcaster {
    pubsub: Arc<dyn PubSub>,
    local: NodeId,
    announcements: SetAnnouncement,
    announce_grace: Duration,
}

impl Broadcaster {
    /// `announce_grace` is the pause between the announcement and the first
    /// file, giving listeners time to subscribe to the set's stream.
    pub fn new(
        pubsub: Arc<dyn PubSub>,
        local: NodeId,
        announcements: SetAnnouncement,
        announce_grace: Duration,
    ) -> Self {
        Self {
            pubsub,
            local,
            announcements,
            announce_grace,
        }
    }

    /// Announce `set_id` and publish every file on its stream
    ///
    /// Peers that subscribe after a file went out never see it. A set with
    /// a file too large for the transport is never announced.
    pub async fn broadcast(&self, set_id: &SetId, files: &[File]) -> Result<(), NetworkError> {
        let stream = FileStream::join_set(self.pubsub.clone(), self.local.clone(), set_id).await?;
        let messages = stream.encode_files(files)?;

        self.announcements.announce(set_id).await?;
        debug!(%set_id, "set announced");

        if !self.announce_grace.is_zero() {
            tokio::time::sleep(self.announce_grace).await;
        }

        for message in messages {
            stream.publish_encoded(message).await?;
        }

        info!(%set_id, files = files.len(), topic = stream.name(), "set broadcast");
        Ok(())
    }
}
