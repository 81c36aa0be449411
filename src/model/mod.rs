// Model module - WHAT IS SHARED
// Files, set identifiers and node identifiers

mod file;

pub use file::{File, FileMetadata, NodeId, SetId};
