// Streamer - discover announced sets and ingest their file streams
//
// One watcher drains the announcement topic. Each newly announced set gets
// its own ingestion task, bounded by a semaphore, which feeds files to the
// processor until the set completes, turns out corrupted, goes idle, or the
// node shuts down.

use crate::model::{NodeId, SetId};
use crate::network::{FileStream, FileStreamReader, PubSub, SetAnnouncementReader};
use crate::proof::{self, HashBytes};
use crate::protocol::processor::{Processor, SetCompleted};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Invalid streamer configuration
#[derive(Error, Debug)]
#[error("Invalid streamer config: {0}")]
pub struct StreamerConfigError(String);

/// Configuration for set ingestion
#[derive(Clone, Debug)]
pub struct StreamerConfig {
    /// Ingestion tasks allowed to run at once
    pub max_concurrent_sets: usize,
    /// A set with no new file for this long is abandoned
    pub set_idle_timeout: Duration,
    /// Announced set ids remembered for duplicate suppression
    pub max_seen_sets: usize,
    /// How long an announced set id is remembered
    pub seen_ttl: Duration,
}

impl Default for StreamerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_sets: 64,
            set_idle_timeout: Duration::from_secs(120),
            max_seen_sets: 4096,
            seen_ttl: Duration::from_secs(600),
        }
    }
}

impl StreamerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_concurrent_sets(mut self, max: usize) -> Self {
        self.max_concurrent_sets = max;
        self
    }

    pub fn with_set_idle_timeout(mut self, timeout: Duration) -> Self {
        self.set_idle_timeout = timeout;
        self
    }

    pub fn with_max_seen_sets(mut self, max: usize) -> Self {
        self.max_seen_sets = max;
        self
    }

    pub fn with_seen_ttl(mut self, ttl: Duration) -> Self {
        self.seen_ttl = ttl;
        self
    }

    pub fn validate(&self) -> Result<(), StreamerConfigError> {
        if self.max_concurrent_sets == 0 {
            return Err(StreamerConfigError(
                "max_concurrent_sets must be positive".to_string(),
            ));
        }
        if self.set_idle_timeout.is_zero() {
            return Err(StreamerConfigError(
                "set_idle_timeout must be positive".to_string(),
            ));
        }
        if self.max_seen_sets < self.max_concurrent_sets {
            return Err(StreamerConfigError(
                "max_seen_sets must be at least max_concurrent_sets".to_string(),
            ));
        }
        if self.seen_ttl < self.set_idle_timeout {
            return Err(StreamerConfigError(
                "seen_ttl must not be shorter than set_idle_timeout".to_string(),
            ));
        }
        Ok(())
    }
}

/// How an ingestion task ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamOutcome {
    Completed(HashBytes),
    Corrupted,
    /// No file arrived within the idle timeout
    Abandoned,
    Cancelled,
    /// The transport ended the subscription
    Closed,
}

/// Set ids already announced, bounded by count and age
struct SeenSets {
    max: usize,
    ttl: Duration,
    sets: HashMap<SetId, Instant>,
}

impl SeenSets {
    fn new(max: usize, ttl: Duration) -> Self {
        Self {
            max,
            ttl,
            sets: HashMap::new(),
        }
    }

    /// Record `set_id`; false if it was announced within the ttl
    fn insert(&mut self, set_id: &SetId) -> bool {
        let now = Instant::now();
        let ttl = self.ttl;
        self.sets.retain(|_, seen| now.duration_since(*seen) < ttl);

        if self.sets.contains_key(set_id) {
            return false;
        }

        if self.sets.len() >= self.max {
            let oldest = self
                .sets
                .iter()
                .min_by_key(|(_, seen)| **seen)
                .map(|(id, _)| id.clone());
            if let Some(oldest) = oldest {
                debug!(set_id = %oldest, "seen set limit reached, forgetting oldest announcement");
                self.sets.remove(&oldest);
            }
        }

        self.sets.insert(set_id.clone(), now);
        true
    }

    fn forget(&mut self, set_id: &SetId) {
        self.sets.remove(set_id);
    }

    fn len(&self) -> usize {
        self.sets.len()
    }
}

/// Discovers and ingests sets announced by other nodes
#[derive(Clone)]
pub struct Streamer {
    pubsub: Arc<dyn PubSub>,
    local: NodeId,
    processor: Arc<Processor>,
    config: StreamerConfig,
    completed: Option<mpsc::Sender<SetCompleted>>,
}

impl Streamer {
    pub fn new(
        pubsub: Arc<dyn PubSub>,
        local: NodeId,
        processor: Arc<Processor>,
        config: StreamerConfig,
    ) -> Self {
        Self {
            pubsub,
            local,
            processor,
            config,
            completed: None,
        }
    }

    /// Report every completed set on `tx`
    pub fn with_completion_channel(mut self, tx: mpsc::Sender<SetCompleted>) -> Self {
        self.completed = Some(tx);
        self
    }

    /// Drain announcements, spawning one ingestion task per new set
    ///
    /// Returns once `cancel` fires (or the announcement subscription ends)
    /// and every ingestion task has finished.
    pub async fn watch_new(&self, mut announcements: SetAnnouncementReader, cancel: CancellationToken) {
        let permits = Arc::new(Semaphore::new(self.config.max_concurrent_sets));
        let mut seen = SeenSets::new(self.config.max_seen_sets, self.config.seen_ttl);
        let mut tasks = JoinSet::new();

        while let Some(announcement) = announcements.next(&cancel).await {
            while let Some(result) = tasks.try_join_next() {
                if let Err(e) = result {
                    error!(error = %e, "ingestion task failed");
                }
            }

            let set_id = announcement.set_id;
            if !seen.insert(&set_id) {
                debug!(%set_id, "set already seen");
                continue;
            }

            let permit = match permits.clone().try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    warn!(%set_id, "too many sets in flight, skipping announcement");
                    seen.forget(&set_id);
                    continue;
                }
            };

            let reader = match self.join_set(&set_id).await {
                Ok(reader) => reader,
                Err(e) => {
                    warn!(%set_id, error = %e, "failed to join file stream");
                    seen.forget(&set_id);
                    continue;
                }
            };

            info!(%set_id, tracked = seen.len(), "ingesting announced set");
            let streamer = self.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let _permit = permit;
                streamer.process_stream(set_id, reader, cancel).await
            });
        }

        if let Err(e) = announcements.close().await {
            debug!(error = %e, "announcement subscription already closed");
        }

        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "ingestion task failed");
            }
        }
        info!("set watcher stopped");
    }

    async fn join_set(&self, set_id: &SetId) -> Result<FileStreamReader, crate::network::NetworkError> {
        let stream = FileStream::join_set(self.pubsub.clone(), self.local.clone(), set_id).await?;
        stream.files().await
    }

    /// Feed one set's file stream to the processor until it resolves
    pub async fn process_stream(
        &self,
        set_id: SetId,
        mut reader: FileStreamReader,
        cancel: CancellationToken,
    ) -> StreamOutcome {
        let outcome = loop {
            let file = match tokio::time::timeout(self.config.set_idle_timeout, reader.next(&cancel)).await {
                Ok(Some(file)) => file,
                Ok(None) if cancel.is_cancelled() => break StreamOutcome::Cancelled,
                Ok(None) => break StreamOutcome::Closed,
                Err(_) => {
                    warn!(%set_id, "no files within idle timeout, abandoning set");
                    break StreamOutcome::Abandoned;
                }
            };

            if file.set_id() != &set_id {
                debug!(%set_id, other = %file.set_id(), "ignoring file from another set");
                continue;
            }

            let file_number = file.file_number();
            if let Err(e) = self.processor.process_file(file) {
                warn!(%set_id, file_number, error = %e, "failed to process file");
                continue;
            }

            match self.processor.complete_set(&set_id) {
                Ok(root) => {
                    info!(%set_id, root = %proof::encode_hex(&root), "set complete");
                    self.notify(SetCompleted {
                        set_id: set_id.clone(),
                        root,
                    });
                    break StreamOutcome::Completed(root);
                }
                Err(e) if e.is_incomplete() => continue,
                Err(e) => {
                    error!(%set_id, error = %e, "set corrupted");
                    break StreamOutcome::Corrupted;
                }
            }
        };

        if !matches!(outcome, StreamOutcome::Completed(_)) {
            self.processor.pending().evict(&set_id);
        }
        if let Err(e) = reader.close().await {
            debug!(%set_id, error = %e, "file stream already closed");
        }
        outcome
    }

    fn notify(&self, completed: SetCompleted) {
        if let Some(tx) = &self.completed {
            if let Err(e) = tx.try_send(completed) {
                warn!(error = %e, "completion listener not keeping up");
            }
        }
    }
}
