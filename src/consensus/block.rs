//! Block structure for the RH ledger
//!
//! A block commits to an ordered list of transactions, the previous block
//! hash, and its height. Its identity is the content hash.

use serde::{Deserialize, Serialize};

use crate::constants::GENESIS_SEED;
use crate::crypto::{compute_merkle_root, hash_bytes, Hash};
use crate::validation::Transaction;

/// Height of the genesis block
pub const GENESIS_HEIGHT: u64 = 1;

/// A complete block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Transactions in proposal order
    pub transactions: Vec<Transaction>,
    /// Merkle root over transaction hashes (none for an empty block)
    pub merkle_root: Option<Hash>,
    /// Hash of the previous block
    pub prev_hash: Hash,
    /// Content hash of this block
    pub hash: Hash,
    /// Previous height + 1, genesis = 1
    pub height: u64,
}

impl Block {
    /// Build the block following `previous`
    pub fn new(transactions: Vec<Transaction>, previous: &Block) -> Self {
        let mut block = Self {
            merkle_root: merkle_root_of(&transactions),
            transactions,
            prev_hash: previous.hash,
            hash: Hash::zero(),
            height: previous.height + 1,
        };
        block.hash = block.compute_hash();
        block
    }

    /// The deterministic first block of every chain
    pub fn genesis() -> Self {
        let mut block = Self {
            transactions: Vec::new(),
            merkle_root: None,
            prev_hash: hash_bytes(GENESIS_SEED.as_bytes()),
            hash: Hash::zero(),
            height: GENESIS_HEIGHT,
        };
        block.hash = block.compute_hash();
        block
    }

    /// Serialize every field except `hash`
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&self.height.to_le_bytes());
        bytes.extend_from_slice(&self.prev_hash.0);

        match &self.merkle_root {
            Some(root) => {
                bytes.push(1);
                bytes.extend_from_slice(&root.0);
            }
            None => bytes.push(0),
        }

        bytes.extend_from_slice(&(self.transactions.len() as u32).to_le_bytes());
        for tx in &self.transactions {
            bytes.extend_from_slice(&tx.hash().0);
            bytes.extend_from_slice(&(tx.public_key.0.len() as u32).to_le_bytes());
            bytes.extend_from_slice(&tx.public_key.0);
            bytes.extend_from_slice(&(tx.signature.len() as u32).to_le_bytes());
            bytes.extend_from_slice(&tx.signature);
        }

        bytes
    }

    /// Recompute the content hash from the block's fields
    pub fn compute_hash(&self) -> Hash {
        hash_bytes(&self.to_bytes())
    }

    /// Recompute the merkle root from the block's transactions
    pub fn compute_merkle_root(&self) -> Option<Hash> {
        merkle_root_of(&self.transactions)
    }

    /// Check if this is the genesis block
    pub fn is_genesis(&self) -> bool {
        self.height == GENESIS_HEIGHT
    }
}

fn merkle_root_of(transactions: &[Transaction]) -> Option<Hash> {
    let tx_hashes: Vec<Hash> = transactions.iter().map(|tx| tx.hash()).collect();
    compute_merkle_root(&tx_hashes)
}
