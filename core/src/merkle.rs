//! Merkle tree over ordered transaction-hash lists.
//!
//! The pair-hashing rule is part of the consensus contract: siblings are
//! combined by concatenating their *hex* representations as ASCII bytes,
//! not by concatenating raw digest bytes. An odd-width level duplicates its
//! last element before pairing.

use crate::crypto::sha256_hex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MerkleError {
    #[error("transaction hash not found in the leaf set")]
    NotFound,
}

/// Which side of the pair the sibling occupied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
}

/// One step of a Merkle inclusion proof: a sibling hash and which side of
/// the pair it was on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProofStep {
    pub sibling_hex: String,
    pub side: Side,
}

fn hash_pair(left: &str, right: &str) -> String {
    let mut combined = String::with_capacity(left.len() + right.len());
    combined.push_str(left);
    combined.push_str(right);
    sha256_hex(combined.as_bytes())
}

/// Computes the Merkle root of an ordered list of 64-hex transaction
/// hashes. An empty list returns the SHA-256 of the empty string.
pub fn merkle_root(hashes: &[String]) -> String {
    if hashes.is_empty() {
        return sha256_hex(b"");
    }

    let mut level: Vec<String> = hashes.to_vec();
    while level.len() > 1 {
        let mut next = Vec::with_capacity((level.len() + 1) / 2);
        let mut i = 0;
        while i < level.len() {
            let left = &level[i];
            let right = if i + 1 < level.len() {
                &level[i + 1]
            } else {
                &level[i]
            };
            next.push(hash_pair(left, right));
            i += 2;
        }
        level = next;
    }
    level.into_iter().next().unwrap()
}

/// Builds the ordered list of (sibling, side) pairs proving that
/// `target_hash` is included in `hashes`, with root `merkle_root(hashes)`.
pub fn proof(hashes: &[String], target_hash: &str) -> Result<Vec<ProofStep>, MerkleError> {
    let mut index = hashes
        .iter()
        .position(|h| h == target_hash)
        .ok_or(MerkleError::NotFound)?;

    let mut level: Vec<String> = hashes.to_vec();
    let mut steps = Vec::new();

    while level.len() > 1 {
        let is_left = index % 2 == 0;
        let sibling_index = if is_left {
            if index + 1 < level.len() {
                index + 1
            } else {
                index
            }
        } else {
            index - 1
        };

        steps.push(ProofStep {
            sibling_hex: level[sibling_index].clone(),
            side: if is_left { Side::Right } else { Side::Left },
        });

        let mut next = Vec::with_capacity((level.len() + 1) / 2);
        let mut i = 0;
        while i < level.len() {
            let left = &level[i];
            let right = if i + 1 < level.len() {
                &level[i + 1]
            } else {
                &level[i]
            };
            next.push(hash_pair(left, right));
            i += 2;
        }
        level = next;
        index /= 2;
    }

    Ok(steps)
}

/// Folds a proof left-to-right against `target_hash` and checks the result
/// equals `root`.
pub fn verify_proof(target_hash: &str, root: &str, proof: &[ProofStep]) -> bool {
    let mut current = target_hash.to_string();
    for step in proof {
        current = match step.side {
            Side::Left => hash_pair(&step.sibling_hex, &current),
            Side::Right => hash_pair(&current, &step.sibling_hex),
        };
    }
    current == root
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hashes(n: usize) -> Vec<String> {
        (0..n).map(|i| sha256_hex(format!("tx{i}").as_bytes())).collect()
    }

    #[test]
    fn empty_root_is_sha256_of_empty_string() {
        assert_eq!(merkle_root(&[]), sha256_hex(b""));
    }

    #[test]
    fn root_is_deterministic() {
        let h = hashes(5);
        assert_eq!(merkle_root(&h), merkle_root(&h));
    }

    #[test]
    fn single_leaf_is_its_own_root() {
        let h = hashes(1);
        assert_eq!(merkle_root(&h), h[0]);
    }

    #[test]
    fn proof_round_trips_for_every_leaf_odd_and_even_width() {
        for n in 1..=9 {
            let h = hashes(n);
            let root = merkle_root(&h);
            for target in &h {
                let p = proof(&h, target).unwrap();
                assert!(verify_proof(target, &root, &p), "n={n} target={target}");
            }
        }
    }

    #[test]
    fn flipping_target_hash_breaks_proof() {
        let h = hashes(4);
        let root = merkle_root(&h);
        let p = proof(&h, &h[1]).unwrap();
        let mut tampered = h[1].clone();
        tampered.replace_range(0..1, if &tampered[0..1] == "0" { "1" } else { "0" });
        assert!(!verify_proof(&tampered, &root, &p));
    }

    #[test]
    fn flipping_sibling_breaks_proof() {
        let h = hashes(4);
        let root = merkle_root(&h);
        let mut p = proof(&h, &h[1]).unwrap();
        let sib = &mut p[0].sibling_hex;
        sib.replace_range(0..1, if &sib[0..1] == "0" { "1" } else { "0" });
        assert!(!verify_proof(&h[1], &root, &p));
    }

    #[test]
    fn not_found_is_an_error() {
        let h = hashes(3);
        assert_eq!(proof(&h, "deadbeef").unwrap_err(), MerkleError::NotFound);
    }

    /// Property-style check over randomly sized, randomly ordered leaf
    /// sets, from a fixed seed so failures reproduce deterministically.
    #[test]
    fn every_leaf_proves_inclusion_for_randomly_sized_trees() {
        use rand::{Rng, SeedableRng};
        use rand_chacha::ChaCha8Rng;

        let mut rng = ChaCha8Rng::seed_from_u64(0x4d45524b4c45);
        for _ in 0..50 {
            let n = rng.gen_range(1..=40);
            let h = hashes(n);
            let root = merkle_root(&h);
            let target = &h[rng.gen_range(0..n)];
            let p = proof(&h, target).unwrap();
            assert!(verify_proof(target, &root, &p));
        }
    }
}
