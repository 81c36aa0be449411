// Merkle Tree Tests
// Roots, proofs and verification over whole leaf lists

use fileset_mesh::proof::{
    hash, hash_pair, proof_of, root_of, verify_proof, MerkleTree, ProofError, ZERO_HASH,
};

fn leaves(n: usize) -> Vec<Vec<u8>> {
    (0..n).map(|i| format!("leaf-{}", i).into_bytes()).collect()
}

fn ceil_log2(n: usize) -> usize {
    n.next_power_of_two().trailing_zeros() as usize
}

// ============================================================================
// PINNED SCENARIOS
// ============================================================================

#[test]
fn test_four_leaf_root_and_proof() {
    let list: [&[u8]; 4] = [b"foo", b"bar", b"baz", b"qux"];

    let left = hash_pair(&hash(b"foo"), &hash(b"bar"));
    let right = hash_pair(&hash(b"baz"), &hash(b"qux"));
    assert_eq!(root_of(&list).unwrap(), hash_pair(&left, &right));

    let proof = proof_of(&list, b"foo").unwrap();
    assert_eq!(proof.hashes, vec![hash(b"bar"), right]);
    assert_eq!(proof.index, 0);
}

#[test]
fn test_three_leaf_root_pads_with_zero_hash() {
    let list: [&[u8]; 3] = [b"foo", b"bar", b"baz"];

    let left = hash_pair(&hash(b"foo"), &hash(b"bar"));
    let right = hash_pair(&hash(b"baz"), &ZERO_HASH);
    assert_eq!(root_of(&list).unwrap(), hash_pair(&left, &right));

    let proof = proof_of(&list, b"baz").unwrap();
    assert_eq!(proof.hashes, vec![ZERO_HASH, left]);
    assert_eq!(proof.index, 2);
    assert!(verify_proof(b"baz", &proof.hashes, proof.index, &root_of(&list).unwrap()));
}

#[test]
fn test_single_leaf_tree() {
    let root = root_of(&[b"alone"]).unwrap();
    assert_eq!(root, hash(b"alone"));

    let proof = proof_of(&[b"alone"], b"alone").unwrap();
    assert!(proof.hashes.is_empty());
    assert!(verify_proof(b"alone", &[], 0, &root));
    assert!(!verify_proof(b"other", &[], 0, &root));
}

#[test]
fn test_empty_input_rejected() {
    let empty: [&[u8]; 0] = [];
    assert_eq!(MerkleTree::build(&empty).unwrap_err(), ProofError::EmptyInput);
    assert_eq!(root_of(&empty).unwrap_err(), ProofError::EmptyInput);
}

// ============================================================================
// PROPERTIES OVER MANY SIZES
// ============================================================================

#[test]
fn test_every_leaf_proof_verifies() {
    for n in 1..=17 {
        let list = leaves(n);
        let tree = MerkleTree::build(&list).unwrap();
        let root = tree.root();

        for leaf in &list {
            let proof = tree.proof(leaf).unwrap();
            assert!(
                verify_proof(leaf, &proof.hashes, proof.index, &root),
                "leaf {:?} of {} failed",
                String::from_utf8_lossy(leaf),
                n
            );
        }
    }
}

#[test]
fn test_proof_length_is_ceil_log2() {
    for n in 1..=33 {
        let list = leaves(n);
        let proof = proof_of(&list, &list[n - 1]).unwrap();
        assert_eq!(proof.hashes.len(), ceil_log2(n), "n = {}", n);
    }
}

#[test]
fn test_root_depends_on_order() {
    let list = leaves(5);
    let mut swapped = list.clone();
    swapped.swap(1, 3);
    assert_eq!(root_of(&list).unwrap(), root_of(&list).unwrap());
    assert_ne!(root_of(&list).unwrap(), root_of(&swapped).unwrap());
}

#[test]
fn test_any_altered_input_fails_verification() {
    let list = leaves(6);
    let tree = MerkleTree::build(&list).unwrap();
    let root = tree.root();
    let proof = tree.proof_at(3).unwrap();
    let leaf = &list[3];

    for i in 0..proof.hashes.len() {
        for byte in [0, 31] {
            let mut hashes = proof.hashes.clone();
            hashes[i][byte] ^= 0x01;
            assert!(!verify_proof(leaf, &hashes, proof.index, &root));
        }
    }

    let mut tampered = leaf.clone();
    tampered[0] ^= 0x01;
    assert!(!verify_proof(&tampered, &proof.hashes, proof.index, &root));

    for index in [0, 1, 2, 4, 7, 8, 100, u64::MAX] {
        assert!(!verify_proof(leaf, &proof.hashes, index, &root), "index {}", index);
    }
}

#[test]
fn test_duplicate_contents_resolve_by_position() {
    let list: [&[u8]; 4] = [b"same", b"other", b"same", b"last"];
    let tree = MerkleTree::build(&list).unwrap();

    assert_eq!(tree.proof(b"same").unwrap().index, 0);

    let second = tree.proof_at(2).unwrap();
    assert_eq!(second.index, 2);
    assert!(second.verify(b"same", &tree.root()));
}

#[test]
fn test_proof_for_absent_leaf() {
    let list = leaves(4);
    assert_eq!(proof_of(&list, b"missing").unwrap_err(), ProofError::NotFound);

    let tree = MerkleTree::build(&list).unwrap();
    assert_eq!(tree.proof_at(4).unwrap_err(), ProofError::NotFound);
}

#[test]
fn test_padding_is_never_a_proof_target() {
    // A zero-hash preimage is unknown, but the padding slot itself must not
    // be addressable by position either
    let list = leaves(5);
    let tree = MerkleTree::build(&list).unwrap();
    assert_eq!(tree.size(), 8);
    assert!(tree.proof_at(5).is_err());
    assert!(tree.leaf_hash(6).is_none());
}
