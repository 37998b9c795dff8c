//! Property-based and adversarial tests for the RH ledger
//!
//! These tests verify invariants hold under random inputs and attack scenarios.

use proptest::prelude::*;
use rh_ledger::consensus::{Block, ConsensusEngine, Vote};
use rh_ledger::crypto::{compute_merkle_root, hash_bytes, Hash, PrivateKey};
use rh_ledger::validation::Transaction;

fn hashes(seeds: &[Vec<u8>]) -> Vec<Hash> {
    seeds.iter().map(|s| hash_bytes(s)).collect()
}

fn signed(key: &PrivateKey, sender: &str, receiver: &str, amount: f64) -> Transaction {
    let mut tx = Transaction::with_timestamp(sender, receiver, amount, 1_700_000_000, key.public_key()).unwrap();
    tx.sign(key).unwrap();
    tx
}

/// Engine holding a proposal, ready to tally votes
fn voting_engine(total_validators: usize) -> ConsensusEngine {
    let engine = ConsensusEngine::new(total_validators);
    engine.set_proposal(Block::new(vec![], &Block::genesis()));
    engine
}

fn vote(voter: usize, height: u64, approve: bool) -> Vote {
    Vote {
        node_id: format!("node{}", voter),
        height,
        approve,
    }
}

// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================

proptest! {
    /// Merkle root is a pure function of the ordered leaves
    #[test]
    fn prop_merkle_deterministic(seeds in prop::collection::vec(any::<Vec<u8>>(), 1..16)) {
        let leaves = hashes(&seeds);
        prop_assert_eq!(compute_merkle_root(&leaves), compute_merkle_root(&leaves));
        prop_assert!(compute_merkle_root(&leaves).is_some());
    }

    /// Swapping two different leaves changes the root
    #[test]
    fn prop_merkle_order_sensitive(a in any::<Vec<u8>>(), b in any::<Vec<u8>>()) {
        prop_assume!(a != b);
        let (ha, hb) = (hash_bytes(&a), hash_bytes(&b));
        prop_assert_ne!(compute_merkle_root(&[ha, hb]), compute_merkle_root(&[hb, ha]));
    }

    /// An odd level pairs its last hash with itself
    #[test]
    fn prop_merkle_odd_duplicates_last(seeds in prop::collection::vec(any::<Vec<u8>>(), 1..8)) {
        let mut leaves = hashes(&seeds);
        if leaves.len() % 2 == 0 {
            leaves.pop();
        }
        prop_assume!(leaves.len() > 1);

        let mut padded = leaves.clone();
        padded.push(*leaves.last().unwrap());
        prop_assert_eq!(compute_merkle_root(&leaves), compute_merkle_root(&padded));
    }

    /// A signed transaction verifies; any change to the signed fields breaks it
    #[test]
    fn prop_sign_verify(
        sender in "[a-z]{1,12}",
        receiver in "[a-z]{1,12}",
        amount in 0.0f64..1_000_000.0,
    ) {
        let key = PrivateKey::generate();
        let tx = signed(&key, &sender, &receiver, amount);
        prop_assert!(tx.verify());

        let mut tampered = tx.clone();
        tampered.amount = amount + 1.0;
        prop_assert!(!tampered.verify());

        let mut redirected = tx;
        redirected.receiver.push('x');
        prop_assert!(!redirected.verify());
    }

    /// Blocks built on each other form a valid chain
    #[test]
    fn prop_block_linkage(length in 1usize..12) {
        let engine = ConsensusEngine::new(3);
        let mut previous = Block::genesis();

        for _ in 0..length {
            let block = Block::new(vec![], &previous);
            prop_assert_eq!(block.prev_hash, previous.hash);
            prop_assert_eq!(block.height, previous.height + 1);
            prop_assert!(engine.validate_proposal(&block, &previous));
            previous = block;
        }
    }

    /// Approvals from distinct voters reach the threshold at exactly 2N/3
    #[test]
    fn prop_vote_threshold(total in 1usize..30) {
        let engine = voting_engine(total);
        let threshold = 2 * total / 3;
        prop_assert_eq!(engine.threshold(), threshold);

        let first_ready = (0..total).find(|i| engine.record_vote(&vote(*i, 2, true)));
        // Leader counts itself, so the (i + 1)-th approval makes the tally i + 2
        prop_assert_eq!(first_ready, Some(threshold.saturating_sub(2)));
    }
}

// ============================================================================
// ADVERSARIAL TESTS
// ============================================================================

/// Repeating the same vote never inflates the tally
#[test]
fn test_duplicate_votes_count_once() {
    let engine = voting_engine(7);
    for _ in 0..10 {
        assert!(!engine.record_vote(&vote(1, 2, true)));
    }
    assert_eq!(engine.pending_votes(), 1);
}

/// Rejections never move the tally toward commit
#[test]
fn test_rejections_do_not_count() {
    let engine = voting_engine(7);
    for voter in 1..7 {
        assert!(!engine.record_vote(&vote(voter, 2, false)));
    }
}

/// A voter that changes its mind is counted by its latest vote
#[test]
fn test_vote_overwrite() {
    let engine = voting_engine(6);
    assert!(!engine.record_vote(&vote(1, 2, true)));
    assert!(!engine.record_vote(&vote(1, 2, false)));
    assert!(!engine.record_vote(&vote(2, 2, true)));
    assert!(!engine.record_vote(&vote(3, 2, true)));
    assert!(engine.record_vote(&vote(4, 2, true)));
}

/// A transaction edited after signing is caught even if the block is resealed
#[test]
fn test_tampered_transaction_in_resealed_block_rejected() {
    let key = PrivateKey::generate();
    let genesis = Block::genesis();
    let mut block = Block::new(vec![signed(&key, "alice", "bob", 5.0)], &genesis);

    block.transactions[0].amount = 500.0;
    block.merkle_root = block.compute_merkle_root();
    block.hash = block.compute_hash();

    let engine = ConsensusEngine::new(3);
    assert!(!engine.validate_proposal(&block, &genesis));
    assert!(!engine.has_proposal());
}

/// A proposal that skips a height is rejected even with a consistent hash
#[test]
fn test_height_skip_rejected() {
    let genesis = Block::genesis();
    let mut block = Block::new(vec![], &genesis);
    block.height += 1;
    block.hash = block.compute_hash();

    assert!(!ConsensusEngine::new(3).validate_proposal(&block, &genesis));
}

/// A proposal built on a stale parent is rejected
#[test]
fn test_stale_parent_rejected() {
    let genesis = Block::genesis();
    let first = Block::new(vec![], &genesis);
    let sibling = Block::new(vec![], &genesis);

    assert!(!ConsensusEngine::new(3).validate_proposal(&sibling, &first));
}

/// Independently created genesis blocks agree
#[test]
fn test_genesis_determinism() {
    let a = Block::genesis();
    let b = Block::genesis();

    assert_eq!(a, b);
    assert_eq!(a.hash, a.compute_hash());
    assert!(a.merkle_root.is_none());
}
