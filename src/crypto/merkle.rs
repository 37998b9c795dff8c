//! Merkle tree implementation
//!
//! Used for computing transaction merkle roots in blocks.

use super::{Hash, hash_pair};

/// Compute the merkle root of a list of hashes
///
/// Returns `None` for an empty list. A single hash is its own root.
/// If a level has an odd number of elements, the last one is duplicated.
/// Pairing is positional, so reordering the input changes the root.
pub fn compute_merkle_root(hashes: &[Hash]) -> Option<Hash> {
    let (first, _) = hashes.split_first()?;

    if hashes.len() == 1 {
        return Some(*first);
    }

    let mut current_level: Vec<Hash> = hashes.to_vec();

    while current_level.len() > 1 {
        if current_level.len() % 2 == 1 {
            let last = current_level[current_level.len() - 1];
            current_level.push(last);
        }

        current_level = current_level
            .chunks(2)
            .map(|pair| hash_pair(&pair[0], &pair[1]))
            .collect();
    }

    current_level.first().copied()
}
