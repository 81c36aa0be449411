// Pending sets - in-memory reassembly of sets arriving out of order
//
// Every compound read-modify sequence runs under a single lock acquisition,
// and no critical section awaits or touches storage.

use crate::model::{File, SetId};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// Invalid aggregator configuration
#[derive(Error, Debug)]
#[error("Invalid aggregator config: {0}")]
pub struct AggregatorConfigError(String);

/// Bounds on the number and lifetime of sets under assembly
#[derive(Clone, Debug)]
pub struct AggregatorConfig {
    /// Sets tracked at once; adding one more evicts the least recently active
    pub max_pending_sets: usize,
    /// Sets idle for longer than this are dropped by `evict_expired`
    pub pending_ttl: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            max_pending_sets: 1024,
            pending_ttl: Duration::from_secs(600),
        }
    }
}

impl AggregatorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_pending_sets(mut self, max: usize) -> Self {
        self.max_pending_sets = max;
        self
    }

    pub fn with_pending_ttl(mut self, ttl: Duration) -> Self {
        self.pending_ttl = ttl;
        self
    }

    pub fn validate(&self) -> Result<(), AggregatorConfigError> {
        if self.max_pending_sets == 0 {
            return Err(AggregatorConfigError(
                "max_pending_sets must be positive".to_string(),
            ));
        }
        if self.pending_ttl.is_zero() {
            return Err(AggregatorConfigError("pending_ttl must be positive".to_string()));
        }
        Ok(())
    }
}

/// Result of trying to take a set out of the aggregator
#[derive(Debug, PartialEq, Eq)]
pub enum Completion {
    /// Not all positions have arrived (or the set is unknown)
    Incomplete { expected: usize, found: usize },
    /// Members disagreed about the set; the set has been dropped
    Corrupted(String),
    /// Every member, ordered by file number; the set has been removed
    Complete(Vec<File>),
}

struct PendingSet {
    /// Set count declared by the first file seen
    expected: usize,
    files: BTreeMap<usize, File>,
    inconsistency: Option<String>,
    last_activity: Instant,
}

impl PendingSet {
    fn new(expected: usize) -> Self {
        Self {
            expected,
            files: BTreeMap::new(),
            inconsistency: None,
            last_activity: Instant::now(),
        }
    }

    fn is_complete(&self) -> bool {
        self.inconsistency.is_none() && self.files.len() == self.expected
    }
}

/// Concurrency-safe accumulator of set members
pub struct PendingSetAggregator {
    config: AggregatorConfig,
    sets: Mutex<HashMap<SetId, PendingSet>>,
}

impl Default for PendingSetAggregator {
    fn default() -> Self {
        Self::new(AggregatorConfig::default())
    }
}

impl PendingSetAggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        Self {
            config,
            sets: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Track a file under its set
    ///
    /// A second file at an already filled position replaces the first.
    pub fn add_file(&self, file: File) {
        let set_id = file.set_id().clone();
        let mut sets = self.sets.lock();

        if !sets.contains_key(&set_id) && sets.len() >= self.config.max_pending_sets {
            let oldest = sets
                .iter()
                .min_by_key(|(_, set)| set.last_activity)
                .map(|(id, _)| id.clone());
            if let Some(oldest) = oldest {
                warn!(set_id = %oldest, "pending set limit reached, evicting least recently active set");
                sets.remove(&oldest);
            }
        }

        let set = sets
            .entry(set_id.clone())
            .or_insert_with(|| PendingSet::new(file.set_count()));
        set.last_activity = Instant::now();
        let expected = set.expected;

        if file.set_count() != expected {
            set.inconsistency.get_or_insert_with(|| {
                format!(
                    "file {} declares {} files, set started with {}",
                    file.file_number(),
                    file.set_count(),
                    expected
                )
            });
        } else if file.file_number() >= expected {
            set.inconsistency.get_or_insert_with(|| {
                format!(
                    "file number {} outside a set of {}",
                    file.file_number(),
                    expected
                )
            });
        }

        let file_number = file.file_number();
        set.files.insert(file_number, file);
        debug!(
            %set_id,
            file_number,
            received = set.files.len(),
            expected,
            "tracking file"
        );
    }

    /// Whether every position of the set has arrived without disagreement
    pub fn is_complete(&self, set_id: &SetId) -> bool {
        self.sets
            .lock()
            .get(set_id)
            .is_some_and(PendingSet::is_complete)
    }

    /// Remove a set and return its files ordered by file number
    pub fn remove_and_sort(&self, set_id: &SetId) -> Vec<File> {
        self.sets
            .lock()
            .remove(set_id)
            .map(|set| set.files.into_values().collect())
            .unwrap_or_default()
    }

    /// Check completeness and, if complete, remove the set in one step
    pub fn take_complete(&self, set_id: &SetId) -> Completion {
        let mut sets = self.sets.lock();

        let Some(set) = sets.get(set_id) else {
            return Completion::Incomplete {
                expected: 0,
                found: 0,
            };
        };

        if let Some(reason) = &set.inconsistency {
            let reason = reason.clone();
            sets.remove(set_id);
            return Completion::Corrupted(reason);
        }

        if !set.is_complete() {
            return Completion::Incomplete {
                expected: set.expected,
                found: set.files.len(),
            };
        }

        match sets.remove(set_id) {
            Some(set) => Completion::Complete(set.files.into_values().collect()),
            None => Completion::Incomplete {
                expected: 0,
                found: 0,
            },
        }
    }

    /// Drop a set regardless of its state
    pub fn evict(&self, set_id: &SetId) -> bool {
        self.sets.lock().remove(set_id).is_some()
    }

    /// Drop every set idle for longer than the configured TTL
    pub fn evict_expired(&self) -> usize {
        let ttl = self.config.pending_ttl;
        let mut sets = self.sets.lock();
        let before = sets.len();
        sets.retain(|set_id, set| {
            let keep = set.last_activity.elapsed() < ttl;
            if !keep {
                debug!(%set_id, "evicting idle pending set");
            }
            keep
        });
        before - sets.len()
    }

    /// Number of sets under assembly
    pub fn pending_sets(&self) -> usize {
        self.sets.lock().len()
    }

    /// Number of distinct positions received for a set
    pub fn pending_files(&self, set_id: &SetId) -> usize {
        self.sets
            .lock()
            .get(set_id)
            .map(|set| set.files.len())
            .unwrap_or(0)
    }
}
