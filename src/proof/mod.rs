// Proof module - WHY A FILE CAN BE TRUSTED
// Merkle tree construction, inclusion proofs and tree-free verification

mod encoding;
mod tree;

pub use encoding::{decode_hash, decode_hex, encode_hex, hash, hash_pair, HashBytes, ZERO_HASH};
pub use tree::{proof_of, root_of, verify_proof, MerkleTree, Proof, ProofError};
