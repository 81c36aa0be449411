// Processor - persist incoming files, track them, and derive set roots

use crate::error::Error;
use crate::model::{File, SetId};
use crate::proof::{self, HashBytes};
use crate::protocol::pending::{Completion, PendingSetAggregator};
use crate::storage::{Persistence, StoreError};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A set whose root has been computed locally
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SetCompleted {
    pub set_id: SetId,
    pub root: HashBytes,
}

/// Turns individual files into complete, rooted sets
pub struct Processor {
    store: Arc<dyn Persistence>,
    pending: Arc<PendingSetAggregator>,
}

impl Processor {
    pub fn new(store: Arc<dyn Persistence>, pending: Arc<PendingSetAggregator>) -> Self {
        Self { store, pending }
    }

    pub fn store(&self) -> &Arc<dyn Persistence> {
        &self.store
    }

    pub fn pending(&self) -> &Arc<PendingSetAggregator> {
        &self.pending
    }

    /// Persist a file, then track it for reassembly
    ///
    /// A file that cannot be persisted is not tracked.
    pub fn process_file(&self, file: File) -> Result<(), Error> {
        if !file.has_valid_position() {
            return Err(Error::InvalidInput(format!(
                "file {} outside a set of {}",
                file.file_number(),
                file.set_count()
            )));
        }

        self.store.save_file(&file)?;
        debug!(
            set_id = %file.set_id(),
            file_number = file.file_number(),
            "file persisted"
        );
        self.pending.add_file(file);
        Ok(())
    }

    /// Root of the set if every member has arrived
    ///
    /// `SetIncomplete` only means more files are needed.
    pub fn complete_set(&self, set_id: &SetId) -> Result<HashBytes, Error> {
        match self.pending.take_complete(set_id) {
            Completion::Incomplete { expected, found } => Err(Error::SetIncomplete {
                set_id: set_id.to_string(),
                expected,
                found,
            }),
            Completion::Corrupted(reason) => Err(Error::SetCorrupted(format!(
                "set {}: {}",
                set_id, reason
            ))),
            Completion::Complete(files) => {
                let leaves: Vec<&[u8]> = files.iter().map(|f| f.contents.as_slice()).collect();
                Ok(proof::root_of(&leaves)?)
            }
        }
    }

    /// Process a whole set at once and return its root
    pub fn process_files(&self, set_id: &SetId, files: Vec<File>) -> Result<HashBytes, Error> {
        if files.is_empty() {
            return Err(Error::EmptyInput);
        }
        if let Some(stray) = files.iter().find(|f| f.set_id() != set_id) {
            return Err(Error::InvalidInput(format!(
                "file {} belongs to set {}, not {}",
                stray.file_number(),
                stray.set_id(),
                set_id
            )));
        }

        for file in files {
            self.process_file(file)?;
        }
        self.complete_set(set_id)
    }

    /// Recompute roots of sets already complete in storage
    ///
    /// Sets that are partially persisted or fail their integrity checks are
    /// skipped.
    pub fn recover_persisted_sets(&self) -> Result<Vec<SetCompleted>, Error> {
        let mut recovered = Vec::new();

        for set_id in self.store.set_ids()? {
            let records = match self.store.files(&set_id) {
                Ok(records) => records,
                Err(StoreError::CountMismatch { expected, found }) => {
                    debug!(%set_id, expected, found, "persisted set incomplete, skipping");
                    continue;
                }
                Err(StoreError::Corrupted(reason)) => {
                    warn!(%set_id, %reason, "persisted set corrupted, skipping");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let leaves: Vec<&[u8]> = records.iter().map(|r| r.contents.as_slice()).collect();
            let root = proof::root_of(&leaves)?;
            info!(%set_id, root = %proof::encode_hex(&root), "recovered persisted set");
            recovered.push(SetCompleted { set_id, root });
        }

        Ok(recovered)
    }
}
