// FileStore - Persistent key-value storage using sled
//
// Provides typed access for storing:
// - Set members, keyed by set id and file number
// - The node's libp2p identity keypair

use crate::model::{File, SetId};
use crate::storage::{Persistence, StoredFile};
use std::collections::BTreeSet;
use std::path::Path;
use thiserror::Error;

/// Key prefixes for organizing data
mod keys {
    pub const IDENTITY_KEYPAIR: &[u8] = b"identity:keypair";
    pub const FILE_PREFIX: &str = "file:";
}

/// Errors from storage operations
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to open database: {0}")]
    OpenFailed(String),

    #[error("Database operation failed: {0}")]
    DatabaseError(String),

    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    #[error("Flush failed: {0}")]
    FlushFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Expected {expected} files, found {found}")]
    CountMismatch { expected: usize, found: usize },

    #[error("Stored data corrupted: {0}")]
    Corrupted(String),
}

impl From<sled::Error> for StoreError {
    fn from(err: sled::Error) -> Self {
        StoreError::DatabaseError(err.to_string())
    }
}

/// Persistent store for set members
///
/// Uses sled for crash-safe, embedded storage.
/// All writes are atomic and durable after flush.
pub struct FileStore {
    db: sled::Db,
}

impl FileStore {
    /// Open or create a store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path).map_err(|e| StoreError::OpenFailed(e.to_string()))?;
        Ok(Self { db })
    }

    /// Open a store that lives only as long as this handle
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| StoreError::OpenFailed(e.to_string()))?;
        Ok(Self { db })
    }

    /// Flush all pending writes to disk
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db
            .flush()
            .map_err(|e| StoreError::FlushFailed(e.to_string()))?;
        Ok(())
    }

    // ========================================================================
    // KEY LAYOUT
    // ========================================================================

    // Set ids are hex-encoded so arbitrary ids cannot collide through the
    // ':' separator.
    fn set_prefix(set_id: &SetId) -> Vec<u8> {
        format!("{}{}:", keys::FILE_PREFIX, hex::encode(set_id.as_str())).into_bytes()
    }

    fn file_key(set_id: &SetId, file_number: usize) -> Vec<u8> {
        let mut key = Self::set_prefix(set_id);
        key.extend_from_slice(format!("{:020}", file_number).as_bytes());
        key
    }

    fn set_id_from_key(key: &[u8]) -> Option<SetId> {
        let rest = key.strip_prefix(keys::FILE_PREFIX.as_bytes())?;
        let end = rest.iter().position(|b| *b == b':')?;
        let raw = hex::decode(&rest[..end]).ok()?;
        String::from_utf8(raw).ok().map(SetId::from)
    }

    fn decode_record(bytes: &[u8]) -> Result<StoredFile, StoreError> {
        postcard::from_bytes(bytes).map_err(|e| StoreError::DeserializationFailed(e.to_string()))
    }

    /// Overwrite a stored record as-is (no hash recomputation)
    pub fn put_record(&self, record: &StoredFile) -> Result<(), StoreError> {
        let key = Self::file_key(&record.metadata.set_id, record.metadata.file_number);
        let bytes = postcard::to_allocvec(record)
            .map_err(|e| StoreError::SerializationFailed(e.to_string()))?;
        self.db.insert(key, bytes)?;
        Ok(())
    }

    // ========================================================================
    // IDENTITY PERSISTENCE
    // ========================================================================

    /// Save the node's libp2p keypair
    pub fn save_keypair(&self, keypair: &libp2p::identity::Keypair) -> Result<(), StoreError> {
        let bytes = keypair
            .to_protobuf_encoding()
            .map_err(|e| StoreError::SerializationFailed(e.to_string()))?;
        self.db.insert(keys::IDENTITY_KEYPAIR, bytes)?;
        Ok(())
    }

    /// Load the node's libp2p keypair
    pub fn load_keypair(&self) -> Result<Option<libp2p::identity::Keypair>, StoreError> {
        match self.db.get(keys::IDENTITY_KEYPAIR)? {
            Some(bytes) => {
                let keypair = libp2p::identity::Keypair::from_protobuf_encoding(&bytes)
                    .map_err(|e| StoreError::DeserializationFailed(e.to_string()))?;
                Ok(Some(keypair))
            }
            None => Ok(None),
        }
    }

    /// Get the node keypair, creating one if it doesn't exist
    pub fn get_or_create_keypair(&self) -> Result<libp2p::identity::Keypair, StoreError> {
        if let Some(keypair) = self.load_keypair()? {
            return Ok(keypair);
        }

        let keypair = libp2p::identity::Keypair::generate_ed25519();
        self.save_keypair(&keypair)?;
        Ok(keypair)
    }
}

impl Persistence for FileStore {
    fn save_file(&self, file: &File) -> Result<(), StoreError> {
        self.put_record(&StoredFile::from_file(file))
    }

    fn file(&self, set_id: &SetId, index: usize) -> Result<StoredFile, StoreError> {
        match self.db.get(Self::file_key(set_id, index))? {
            Some(bytes) => Self::decode_record(&bytes),
            None => Err(StoreError::NotFound(format!("file {} of set {}", index, set_id))),
        }
    }

    fn files(&self, set_id: &SetId) -> Result<Vec<StoredFile>, StoreError> {
        let mut records = Vec::new();
        for result in self.db.scan_prefix(Self::set_prefix(set_id)) {
            let (_, value) = result?;
            records.push(Self::decode_record(&value)?);
        }

        let expected = match records.first() {
            Some(first) => first.metadata.set_count,
            None => return Err(StoreError::NotFound(format!("set {}", set_id))),
        };

        if records.iter().any(|r| r.metadata.set_count != expected) {
            return Err(StoreError::Corrupted(format!(
                "members of set {} disagree on set count",
                set_id
            )));
        }

        if let Some(bad) = records.iter().find(|r| !r.is_intact()) {
            return Err(StoreError::Corrupted(format!(
                "file {} of set {} does not match its hash",
                bad.metadata.file_number, set_id
            )));
        }

        if records.len() != expected {
            return Err(StoreError::CountMismatch {
                expected,
                found: records.len(),
            });
        }

        // Keys are zero-padded, so scan order is file-number order
        if records
            .iter()
            .enumerate()
            .any(|(i, r)| r.metadata.file_number != i)
        {
            return Err(StoreError::Corrupted(format!(
                "set {} has gaps in its file numbers",
                set_id
            )));
        }

        Ok(records)
    }

    fn set_ids(&self) -> Result<Vec<SetId>, StoreError> {
        let mut ids = BTreeSet::new();
        for result in self.db.scan_prefix(keys::FILE_PREFIX.as_bytes()) {
            let (key, _) = result?;
            if let Some(id) = Self::set_id_from_key(&key) {
                ids.insert(id);
            }
        }
        Ok(ids.into_iter().collect())
    }
}
