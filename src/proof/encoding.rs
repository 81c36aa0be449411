// Hashing and text encoding used for leaves, roots and proofs
//
// Keeping both in one place means the hash function or the hex flavour can be
// swapped without touching tree arithmetic.

use crate::proof::ProofError;
use sha3::{Digest, Keccak256};

/// A 32-byte Keccak-256 digest
pub type HashBytes = [u8; 32];

/// Hash used for padding slots of non-power-of-two trees
pub const ZERO_HASH: HashBytes = [0u8; 32];

/// Keccak-256 of raw bytes
pub fn hash(data: &[u8]) -> HashBytes {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Keccak-256 of `left ‖ right` (order matters)
pub fn hash_pair(left: &HashBytes, right: &HashBytes) -> HashBytes {
    let mut hasher = Keccak256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// Encode bytes as `0x`-prefixed lowercase hex
pub fn encode_hex(data: &[u8]) -> String {
    format!("0x{}", hex::encode(data))
}

/// Decode `0x`-prefixed (or bare) hex
pub fn decode_hex(text: &str) -> Result<Vec<u8>, ProofError> {
    let stripped = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    hex::decode(stripped).map_err(|e| ProofError::InvalidHex(e.to_string()))
}

/// Decode a hex string that must hold exactly one 32-byte hash
pub fn decode_hash(text: &str) -> Result<HashBytes, ProofError> {
    let bytes = decode_hex(text)?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| ProofError::InvalidHex(format!("expected 32 bytes, got {}", bytes.len())))
}
