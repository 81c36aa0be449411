// FileService - upload sets and serve files with inclusion proofs

use crate::api::dto::{FileResponse, ProofResponse, UploadResponse};
use crate::error::Error;
use crate::model::{File, SetId};
use crate::proof::{self, HashBytes, MerkleTree};
use crate::protocol::{Broadcaster, Processor};
use crate::storage::{StoreError, StoredFile};
use std::sync::Arc;
use tracing::{info, warn};

/// Upload and read operations exposed to clients
pub struct FileService {
    processor: Arc<Processor>,
    broadcaster: Broadcaster,
}

impl FileService {
    pub fn new(processor: Arc<Processor>, broadcaster: Broadcaster) -> Self {
        Self {
            processor,
            broadcaster,
        }
    }

    /// Upload `contents` as a new set
    ///
    /// The set is broadcast before it is processed locally, so peers start
    /// receiving files while the root is still being computed.
    pub async fn upload(&self, contents: Vec<Vec<u8>>) -> Result<UploadResponse, Error> {
        let (set_id, files) = Self::new_set(contents)?;

        self.broadcaster.broadcast(&set_id, &files).await?;
        let root = self.processor.process_files(&set_id, files)?;

        info!(%set_id, root = %proof::encode_hex(&root), "set uploaded");
        Ok(UploadResponse::new(set_id.to_string(), &root))
    }

    /// Upload `contents` only if they hash to `declared_root`
    ///
    /// A mismatching set is neither broadcast nor stored.
    pub async fn upload_with_root(
        &self,
        contents: Vec<Vec<u8>>,
        declared_root: &str,
    ) -> Result<UploadResponse, Error> {
        let declared = proof::decode_hash(declared_root)?;
        let computed = proof::root_of(&contents)?;
        if declared != computed {
            warn!(declared = %declared_root, "upload rejected, root mismatch");
            return Err(Error::RootMismatch {
                declared: proof::encode_hex(&declared),
                computed: proof::encode_hex(&computed),
            });
        }

        self.upload(contents).await
    }

    /// Serve the file at `index` of a fully assembled set with its proof
    pub fn file(&self, set_id: &SetId, index: usize) -> Result<FileResponse, Error> {
        let records = self.complete_records(set_id)?;

        let record = records
            .get(index)
            .ok_or_else(|| Error::NotFound(format!("file {} of set {}", index, set_id)))?;

        let leaves: Vec<&[u8]> = records.iter().map(|r| r.contents.as_slice()).collect();
        let tree = MerkleTree::build(&leaves)?;
        let inclusion = tree.proof_at(index)?;

        Ok(FileResponse {
            file: proof::encode_hex(&record.contents),
            proof: ProofResponse::from(&inclusion),
        })
    }

    /// Root of a fully assembled set
    pub fn root(&self, set_id: &SetId) -> Result<HashBytes, Error> {
        let records = self.complete_records(set_id)?;
        let leaves: Vec<&[u8]> = records.iter().map(|r| r.contents.as_slice()).collect();
        Ok(proof::root_of(&leaves)?)
    }

    fn new_set(contents: Vec<Vec<u8>>) -> Result<(SetId, Vec<File>), Error> {
        if contents.is_empty() {
            return Err(Error::EmptyInput);
        }

        let set_id = SetId::generate();
        let set_count = contents.len();
        let files = contents
            .into_iter()
            .enumerate()
            .map(|(i, c)| File::new(set_id.clone(), set_count, i, c))
            .collect();
        Ok((set_id, files))
    }

    fn complete_records(&self, set_id: &SetId) -> Result<Vec<StoredFile>, Error> {
        match self.processor.store().files(set_id) {
            Ok(records) => Ok(records),
            Err(StoreError::NotFound(what)) => Err(Error::NotFound(what)),
            Err(StoreError::CountMismatch { expected, found }) if found < expected => {
                Err(Error::SetIncomplete {
                    set_id: set_id.to_string(),
                    expected,
                    found,
                })
            }
            Err(StoreError::CountMismatch { expected, found }) => Err(Error::SetCorrupted(
                format!("set {} has {} files, expected {}", set_id, found, expected),
            )),
            Err(StoreError::Corrupted(reason)) => Err(Error::SetCorrupted(reason)),
            Err(e) => Err(e.into()),
        }
    }
}
