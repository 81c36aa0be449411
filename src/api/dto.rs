// DTOs - request and response shapes of the upload and read operations

use crate::error::Error;
use crate::proof::{self, HashBytes, Proof};
use serde::{Deserialize, Serialize};

/// Files to upload as one set, each 0x-hex encoded
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRequest {
    pub files: Vec<String>,
}

impl UploadRequest {
    pub fn from_contents<C: AsRef<[u8]>>(contents: &[C]) -> Self {
        Self {
            files: contents.iter().map(|c| proof::encode_hex(c.as_ref())).collect(),
        }
    }

    /// Decode every file, failing on the first malformed one
    pub fn decode_files(&self) -> Result<Vec<Vec<u8>>, Error> {
        self.files
            .iter()
            .map(|f| proof::decode_hex(f).map_err(Error::from))
            .collect()
    }
}

/// Result of an upload
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub success: bool,
    #[serde(rename = "setId")]
    pub set_id: String,
    /// 0x-hex Merkle root of the set
    #[serde(rename = "hash")]
    pub root: String,
}

impl UploadResponse {
    pub fn new(set_id: String, root: &HashBytes) -> Self {
        Self {
            success: true,
            set_id,
            root: proof::encode_hex(root),
        }
    }
}

/// Inclusion proof as served to clients
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofResponse {
    /// Sibling hashes from leaf to root, 0x-hex
    pub proof: Vec<String>,
    pub index: u64,
}

impl From<&Proof> for ProofResponse {
    fn from(inclusion: &Proof) -> Self {
        Self {
            proof: inclusion.hashes.iter().map(|h| proof::encode_hex(h)).collect(),
            index: inclusion.index,
        }
    }
}

impl ProofResponse {
    pub fn decode(&self) -> Result<Proof, Error> {
        let hashes = self
            .proof
            .iter()
            .map(|h| proof::decode_hash(h))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Proof {
            hashes,
            index: self.index,
        })
    }
}

/// A single file together with its inclusion proof
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileResponse {
    /// 0x-hex file contents
    pub file: String,
    pub proof: ProofResponse,
}
