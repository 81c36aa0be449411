// Node - assembles storage, gossip, ingestion and the file service
//
// Bring-up order: store, identity, network, announcement topic, recovery of
// persisted sets, then the background watcher and pending-set sweeper.

use crate::api::FileService;
use crate::config::NodeConfig;
use crate::error::Error;
use crate::model::NodeId;
use crate::network::{MemoryHub, PubSub, SetAnnouncement, SwarmNetwork};
use crate::protocol::{Broadcaster, PendingSetAggregator, Processor, SetCompleted, Streamer};
use crate::storage::FileStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// A running mesh node
pub struct Node {
    node_id: NodeId,
    store: Arc<FileStore>,
    service: Arc<FileService>,
    recovered: Vec<SetCompleted>,
    completions: Option<mpsc::Receiver<SetCompleted>>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Node {
    /// Start a node on the libp2p gossip network
    pub async fn start(config: NodeConfig) -> Result<Self, Error> {
        config.validate()?;

        let store = Arc::new(Self::open_store(&config)?);
        let keypair = store.get_or_create_keypair()?;
        let cancel = CancellationToken::new();

        let network = SwarmNetwork::start(keypair, config.network.clone(), cancel.child_token())?;
        let node_id = NodeId::from_peer_id(network.local_peer_id());
        info!(%node_id, peer_id = %network.local_peer_id(), "node identity loaded");

        Self::assemble(config, store, Arc::new(network), node_id, cancel).await
    }

    /// Start a node on an existing transport
    ///
    /// Used with [`crate::network::MemoryHub`] to run several nodes in one
    /// process.
    pub async fn start_with_pubsub(
        config: NodeConfig,
        pubsub: Arc<dyn PubSub>,
        node_id: NodeId,
    ) -> Result<Self, Error> {
        config.validate()?;
        let store = Arc::new(Self::open_store(&config)?);
        Self::assemble(config, store, pubsub, node_id, CancellationToken::new()).await
    }

    /// File service over the configured store, with no peers and no
    /// background tasks
    ///
    /// Uploads reach nobody. The store must not be held open by a running
    /// node.
    pub async fn offline_service(config: &NodeConfig) -> Result<FileService, Error> {
        config.validate()?;
        let store = Arc::new(Self::open_store(config)?);
        let pending = Arc::new(PendingSetAggregator::new(config.aggregator.clone()));
        let processor = Arc::new(Processor::new(store, pending));

        let pubsub: Arc<dyn PubSub> = Arc::new(MemoryHub::default().peer());
        let node_id = NodeId::generate();
        let announcements = SetAnnouncement::join_announcements(pubsub.clone(), node_id.clone()).await?;
        let broadcaster = Broadcaster::new(pubsub, node_id, announcements, Duration::ZERO);

        Ok(FileService::new(processor, broadcaster))
    }

    fn open_store(config: &NodeConfig) -> Result<FileStore, Error> {
        let store = match &config.data_dir {
            Some(dir) => {
                info!(path = %dir.display(), "opening store");
                FileStore::open(dir)?
            }
            None => {
                debug!("using temporary store");
                FileStore::temporary()?
            }
        };
        Ok(store)
    }

    async fn assemble(
        config: NodeConfig,
        store: Arc<FileStore>,
        pubsub: Arc<dyn PubSub>,
        node_id: NodeId,
        cancel: CancellationToken,
    ) -> Result<Self, Error> {
        let pending = Arc::new(PendingSetAggregator::new(config.aggregator.clone()));
        let processor = Arc::new(Processor::new(store.clone(), pending.clone()));

        // Without the announcement topic the node can neither learn of nor
        // publish sets.
        let announcements = SetAnnouncement::join_announcements(pubsub.clone(), node_id.clone()).await?;
        let reader = announcements.subscribe().await?;

        let recovered = processor.recover_persisted_sets()?;
        if !recovered.is_empty() {
            info!(sets = recovered.len(), "recovered persisted sets");
        }

        let broadcaster = Broadcaster::new(
            pubsub.clone(),
            node_id.clone(),
            announcements,
            config.announce_grace,
        );
        let service = Arc::new(FileService::new(processor.clone(), broadcaster));

        let (completed_tx, completed_rx) = mpsc::channel(config.completion_buffer);
        let streamer = Streamer::new(pubsub, node_id.clone(), processor, config.streamer.clone())
            .with_completion_channel(completed_tx);

        let mut tasks = Vec::new();

        let watch_cancel = cancel.clone();
        tasks.push(tokio::spawn(async move {
            streamer.watch_new(reader, watch_cancel).await;
        }));

        let sweep_cancel = cancel.clone();
        let sweep_interval = config.sweep_interval;
        tasks.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(sweep_interval);
            loop {
                tokio::select! {
                    _ = sweep_cancel.cancelled() => break,
                    _ = interval.tick() => {
                        let evicted = pending.evict_expired();
                        if evicted > 0 {
                            debug!(evicted, "swept idle pending sets");
                        }
                    }
                }
            }
        }));

        info!(%node_id, "node started");
        Ok(Self {
            node_id,
            store,
            service,
            recovered,
            completions: Some(completed_rx),
            cancel,
            tasks,
        })
    }

    /// Upload and read operations
    pub fn service(&self) -> Arc<FileService> {
        self.service.clone()
    }

    /// Sets found complete in storage at startup
    pub fn recovered(&self) -> &[SetCompleted] {
        &self.recovered
    }

    /// Receiver of sets completed from gossip; available once
    pub fn take_completions(&mut self) -> Option<mpsc::Receiver<SetCompleted>> {
        self.completions.take()
    }

    /// Token that stops the node when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop background tasks and flush the store
    pub async fn shutdown(self) -> Result<(), Error> {
        info!(node_id = %self.node_id, "shutting down");
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                debug!(error = %e, "background task ended abnormally");
            }
        }
        self.store.flush()?;
        Ok(())
    }
}
