//! Memory pool of accepted but unconfirmed transactions
//!
//! Insertion ordered. Transactions are never removed one by one: the leader
//! snapshots the whole pool when assembling a block and clears it on commit.
//! Anything added between the snapshot and the clear is dropped with it.

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::validation::Transaction;

/// Thread-safe FIFO of pending transactions
#[derive(Debug, Default)]
pub struct MemPool {
    pending: Mutex<Vec<Transaction>>,
}

impl MemPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a transaction
    pub fn add(&self, tx: Transaction) {
        debug!(hash = %tx.hash(), "Add transaction to mempool");
        self.pending.lock().push(tx);
    }

    /// Copy of every pending transaction, in insertion order
    pub fn snapshot(&self) -> Vec<Transaction> {
        self.pending.lock().clone()
    }

    /// Drop every pending transaction
    pub fn clear_all(&self) {
        let mut pending = self.pending.lock();
        info!(count = pending.len(), "Remove all pending transactions from mempool");
        pending.clear();
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::PrivateKey;
    use std::sync::Arc;

    fn tx(amount: f64) -> Transaction {
        let key = PrivateKey::generate();
        Transaction::with_timestamp("alice", "bob", amount, 1, key.public_key()).unwrap()
    }

    #[test]
    fn test_snapshot_preserves_order() {
        let pool = MemPool::new();
        pool.add(tx(1.0));
        pool.add(tx(2.0));
        pool.add(tx(3.0));

        let amounts: Vec<f64> = pool.snapshot().iter().map(|t| t.amount).collect();
        assert_eq!(amounts, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let pool = MemPool::new();
        pool.add(tx(1.0));
        let snapshot = pool.snapshot();

        pool.add(tx(2.0));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_clear_all() {
        let pool = MemPool::new();
        pool.add(tx(1.0));
        pool.add(tx(2.0));
        pool.clear_all();
        assert!(pool.is_empty());
    }

    #[test]
    fn test_concurrent_adds() {
        let pool = Arc::new(MemPool::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || {
                    for j in 0..10 {
                        pool.add(tx((i * 10 + j) as f64));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(pool.len(), 80);
    }
}
