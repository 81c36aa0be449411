// fileset-mesh - Content-addressed file sets over a gossip mesh
//
// Peers upload groups of files ("sets") identified by the Merkle root of their
// contents. Sets are disseminated over gossip topics, reassembled on every
// listening peer, and any single file can be served with an inclusion proof
// that the fetcher verifies against the root it already knows.

pub mod api;
pub mod config;
pub mod error;
pub mod model;
pub mod network;
pub mod node;
pub mod proof;
pub mod protocol;
pub mod storage;

pub use error::Error;
