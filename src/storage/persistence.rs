// Persistence - the contract the protocol and service layers store files through

use crate::model::{File, FileMetadata, SetId};
use crate::proof::{self, HashBytes};
use crate::storage::StoreError;
use serde::{Deserialize, Serialize};

/// A persisted set member together with its content hash
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFile {
    pub metadata: FileMetadata,
    /// Keccak-256 of `contents` at the time the file was saved
    pub hash: HashBytes,
    pub contents: Vec<u8>,
}

impl StoredFile {
    pub fn from_file(file: &File) -> Self {
        Self {
            metadata: file.metadata.clone(),
            hash: proof::hash(&file.contents),
            contents: file.contents.clone(),
        }
    }

    /// Check that the stored hash still matches the stored contents
    pub fn is_intact(&self) -> bool {
        proof::hash(&self.contents) == self.hash
    }

    pub fn into_file(self) -> File {
        File {
            metadata: self.metadata,
            contents: self.contents,
        }
    }
}

/// Storage collaborator for set members
///
/// Saving the same `(set_id, file_number)` twice overwrites the first record,
/// so duplicate gossip delivery never corrupts state.
pub trait Persistence: Send + Sync {
    /// Persist one file
    fn save_file(&self, file: &File) -> Result<(), StoreError>;

    /// Load the file at `index` within a set
    fn file(&self, set_id: &SetId, index: usize) -> Result<StoredFile, StoreError>;

    /// Load every member of a set ordered by file number
    ///
    /// Fails with `CountMismatch` unless exactly `set_count` members are
    /// stored, and with `Corrupted` if members disagree on the set count,
    /// positions have gaps, or a stored hash no longer matches its contents.
    fn files(&self, set_id: &SetId) -> Result<Vec<StoredFile>, StoreError>;

    /// Distinct set ids that have at least one persisted member
    fn set_ids(&self) -> Result<Vec<SetId>, StoreError>;
}
