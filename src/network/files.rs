// File streams - one topic per set carrying its members

use crate::model::{File, NodeId, SetId};
use crate::network::pubsub::{NetworkError, PubSub};
use crate::network::topic::{IoTopic, TopicReader};
use crate::proof;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

const FILE_TOPIC_PREFIX: &str = "set-files/";

/// Topic name of a set's file stream
pub fn file_stream_topic(set_id: &SetId) -> String {
    format!("{}{}", FILE_TOPIC_PREFIX, set_id)
}

/// One set member on the wire
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMsg {
    /// Hex Keccak-256 of the decoded contents
    pub id: String,
    pub set_id: SetId,
    pub set_count: usize,
    pub file_number: usize,
    /// Base64 contents
    pub contents: String,
}

impl FileMsg {
    pub fn from_file(file: &File) -> Self {
        Self {
            id: hex::encode(proof::hash(&file.contents)),
            set_id: file.metadata.set_id.clone(),
            set_count: file.metadata.set_count,
            file_number: file.metadata.file_number,
            contents: STANDARD.encode(&file.contents),
        }
    }

    /// Decode the contents and check them against `id`
    pub fn into_file(self) -> Result<File, NetworkError> {
        let contents = STANDARD
            .decode(self.contents.as_bytes())
            .map_err(|e| NetworkError::DecodeFailed(format!("file contents: {}", e)))?;

        let id = hex::encode(proof::hash(&contents));
        if !id.eq_ignore_ascii_case(&self.id) {
            return Err(NetworkError::DecodeFailed(format!(
                "file {} of set {} does not match its id",
                self.file_number, self.set_id
            )));
        }

        Ok(File::new(self.set_id, self.set_count, self.file_number, contents))
    }
}

pub type FileStream = IoTopic<FileMsg>;

impl IoTopic<FileMsg> {
    /// Join the file stream of `set_id`
    pub async fn join_set(
        pubsub: Arc<dyn PubSub>,
        local: NodeId,
        set_id: &SetId,
    ) -> Result<Self, NetworkError> {
        Self::join(pubsub, local, &file_stream_topic(set_id)).await
    }

    /// Publish one member of the set
    pub async fn send_file(&self, file: &File) -> Result<(), NetworkError> {
        self.write(&FileMsg::from_file(file)).await
    }

    /// Encode every member up front; fails if any would exceed the
    /// transport's message size limit
    pub fn encode_files(&self, files: &[File]) -> Result<Vec<Vec<u8>>, NetworkError> {
        files
            .iter()
            .map(|file| self.encode(&FileMsg::from_file(file)))
            .collect()
    }

    /// Subscribe and yield decoded, verified files
    pub async fn files(&self) -> Result<FileStreamReader, NetworkError> {
        Ok(FileStreamReader {
            inner: self.subscribe().await?,
        })
    }
}

/// Reader that drops file messages whose contents do not match their id
pub struct FileStreamReader {
    inner: TopicReader<FileMsg>,
}

impl FileStreamReader {
    /// Next intact file, or `None` on cancellation or end of stream
    pub async fn next(&mut self, cancel: &CancellationToken) -> Option<File> {
        loop {
            let msg = self.inner.next(cancel).await?;
            match msg.into_file() {
                Ok(file) => return Some(file),
                Err(e) => {
                    warn!(topic = self.inner.topic().unwrap_or_default(), error = %e, "dropping file message");
                }
            }
        }
    }

    pub async fn close(self) -> Result<(), NetworkError> {
        self.inner.close().await
    }
}
