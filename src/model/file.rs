// File model - a single member of a file set and the identifiers around it

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

// ============================================================================
// SET ID
// ============================================================================

/// Identifier of a file set
///
/// Generated ids are 16 random bytes rendered in the familiar
/// 8-4-4-4-12 hex grouping. Ids received from the network are opaque strings.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SetId(String);

impl SetId {
    /// Generate a fresh random set id
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        let hex = hex::encode(bytes);
        Self(format!(
            "{}-{}-{}-{}-{}",
            &hex[0..8],
            &hex[8..12],
            &hex[12..16],
            &hex[16..20],
            &hex[20..32]
        ))
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SetId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for SetId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ============================================================================
// NODE ID
// ============================================================================

/// Unique identifier for a node in the mesh
///
/// Carried in every gossip envelope so a node can recognise (and skip)
/// its own messages regardless of what the transport reports.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId([u8; 32]);

impl NodeId {
    /// Generate a random node ID
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Derive a node ID from a libp2p peer id
    pub fn from_peer_id(peer_id: &libp2p::PeerId) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"nodeid:");
        hasher.update(peer_id.to_bytes());
        let result = hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&result);
        Self(bytes)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

// ============================================================================
// FILE
// ============================================================================

/// Position and membership information of a file within its set
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub set_id: SetId,
    /// Declared total number of files in the set
    pub set_count: usize,
    /// 0-based position within the set
    pub file_number: usize,
}

/// A file belonging to a set
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    pub metadata: FileMetadata,
    pub contents: Vec<u8>,
}

impl File {
    pub fn new(set_id: SetId, set_count: usize, file_number: usize, contents: Vec<u8>) -> Self {
        Self {
            metadata: FileMetadata {
                set_id,
                set_count,
                file_number,
            },
            contents,
        }
    }

    pub fn set_id(&self) -> &SetId {
        &self.metadata.set_id
    }

    pub fn set_count(&self) -> usize {
        self.metadata.set_count
    }

    pub fn file_number(&self) -> usize {
        self.metadata.file_number
    }

    /// Check that the position is inside the declared set size
    pub fn has_valid_position(&self) -> bool {
        self.metadata.set_count > 0 && self.metadata.file_number < self.metadata.set_count
    }
}
