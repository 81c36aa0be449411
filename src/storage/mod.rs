// Storage module - PERSISTENCE
// Persisted set members (sled) behind the Persistence trait

mod persistence;
mod store;

pub use persistence::{Persistence, StoredFile};
pub use store::{FileStore, StoreError};
