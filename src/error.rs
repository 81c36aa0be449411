// Error taxonomy shared by the processor, streamer and service layers

use crate::config::ConfigError;
use crate::network::NetworkError;
use crate::proof::ProofError;
use crate::storage::StoreError;
use thiserror::Error;

/// Errors surfaced by set processing and the upload/read service
#[derive(Error, Debug)]
pub enum Error {
    /// A tree (or an upload) was requested over zero leaves
    #[error("No leaves provided")]
    EmptyInput,

    #[error("Not found: {0}")]
    NotFound(String),

    /// The set has not been fully assembled locally yet
    #[error("Set {set_id} is incomplete: {found} of {expected} files")]
    SetIncomplete {
        set_id: String,
        expected: usize,
        found: usize,
    },

    #[error("Set corrupted: {0}")]
    SetCorrupted(String),

    #[error("Root mismatch: declared {declared}, computed {computed}")]
    RootMismatch { declared: String, computed: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl Error {
    /// Check if this error only means "wait for more files"
    pub fn is_incomplete(&self) -> bool {
        matches!(self, Self::SetIncomplete { .. })
    }

    /// Check if this error indicates corrupted or inconsistent set data
    pub fn is_corrupted(&self) -> bool {
        matches!(self, Self::SetCorrupted(_) | Self::RootMismatch { .. })
    }
}

impl From<ProofError> for Error {
    fn from(err: ProofError) -> Self {
        match err {
            ProofError::EmptyInput => Self::EmptyInput,
            ProofError::NotFound => Self::NotFound("leaf not in tree".to_string()),
            ProofError::InvalidHex(msg) => Self::InvalidInput(msg),
        }
    }
}
