//! Proposal validation, vote tally, and commit
//!
//! The engine holds at most one in-flight proposal. A single lock guards the
//! proposal and the tally together.
//!
//! The commit threshold is `floor(2N/3)` counted against `1 + approvals`,
//! where the 1 is the leader's implicit approval. This is simple majority
//! counting over a fixed validator set, not a BFT quorum, and it assumes the
//! leader never appears among the recorded voters.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

use super::Block;
use crate::storage::{BlockStore, StoreError};

/// Approval the leader grants its own proposal before any vote arrives
pub const LEADER_SELF_VOTE: usize = 1;

/// A follower's verdict on a proposed block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub node_id: String,
    pub height: u64,
    pub approve: bool,
}

#[derive(Debug, Default)]
struct EngineState {
    proposal: Option<Block>,
    votes: HashMap<(String, u64), bool>,
    /// Threshold already reached for the held proposal, commit pending
    quorum_reached: bool,
}

/// Consensus engine
#[derive(Debug)]
pub struct ConsensusEngine {
    state: Mutex<EngineState>,
    total_validators: usize,
}

impl ConsensusEngine {
    pub fn new(total_validators: usize) -> Self {
        Self {
            state: Mutex::new(EngineState::default()),
            total_validators,
        }
    }

    pub fn total_validators(&self) -> usize {
        self.total_validators
    }

    /// Minimum tally needed to commit
    pub fn threshold(&self) -> usize {
        2 * self.total_validators / 3
    }

    /// Check a candidate against the latest local block.
    ///
    /// Checks run in order and stop at the first failure: previous hash,
    /// merkle root, content hash, height, then every transaction signature.
    /// An approved candidate becomes the current proposal.
    pub fn validate_proposal(&self, candidate: &Block, latest: &Block) -> bool {
        if candidate.prev_hash != latest.hash {
            info!(height = candidate.height, "Proposal rejected: previous hash mismatch");
            debug!(
                candidate_prev = %candidate.prev_hash,
                latest = %latest.hash,
                "Previous hash check"
            );
            return false;
        }

        if candidate.compute_merkle_root() != candidate.merkle_root {
            info!(height = candidate.height, "Proposal rejected: merkle root mismatch");
            return false;
        }

        if candidate.compute_hash() != candidate.hash {
            info!(height = candidate.height, "Proposal rejected: block hash mismatch");
            return false;
        }

        if candidate.height != latest.height + 1 {
            info!(
                height = candidate.height,
                latest = latest.height,
                "Proposal rejected: unexpected height"
            );
            return false;
        }

        if let Some(bad) = candidate.transactions.iter().find(|tx| !tx.verify()) {
            info!(height = candidate.height, tx = %bad.hash(), "Proposal rejected: invalid signature");
            return false;
        }

        self.set_proposal(candidate.clone());
        true
    }

    /// Record a vote; returns true once the tally reaches the threshold.
    ///
    /// A later vote from the same voter for the same height overwrites the
    /// earlier one. Reaching the threshold clears the tally for the next round.
    /// Without a held proposal, or once the held proposal has already reached
    /// the threshold, the vote is discarded and false is returned, so only one
    /// caller ever sees a given proposal become ready.
    pub fn record_vote(&self, vote: &Vote) -> bool {
        let mut state = self.state.lock();
        if state.proposal.is_none() || state.quorum_reached {
            debug!(voter = %vote.node_id, height = vote.height, "Vote discarded, nothing to ratify");
            return false;
        }

        state
            .votes
            .insert((vote.node_id.clone(), vote.height), vote.approve);

        let tally = LEADER_SELF_VOTE + state.votes.values().filter(|approve| **approve).count();
        let threshold = self.threshold();
        debug!(
            voter = %vote.node_id,
            height = vote.height,
            approve = vote.approve,
            tally,
            threshold,
            "Recorded vote"
        );

        if tally >= threshold {
            state.votes.clear();
            state.quorum_reached = true;
            return true;
        }
        false
    }

    /// Persist the current proposal and clear it.
    ///
    /// Without a proposal this is a successful no-op. On a store failure the
    /// proposal is kept so the caller can retry, and later votes may make it
    /// ready again.
    pub fn commit(&self, store: &dyn BlockStore) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        let Some(block) = state.proposal.as_ref() else {
            return Ok(());
        };

        if let Err(e) = store.put(block.height, block) {
            state.quorum_reached = false;
            return Err(e);
        }
        info!(height = block.height, hash = %block.hash, "Committed block");
        state.proposal = None;
        state.quorum_reached = false;
        Ok(())
    }

    pub fn set_proposal(&self, block: Block) {
        info!(height = block.height, hash = %block.hash, "Store proposal block");
        let mut state = self.state.lock();
        state.proposal = Some(block);
        state.quorum_reached = false;
    }

    pub fn proposal(&self) -> Option<Block> {
        self.state.lock().proposal.clone()
    }

    pub fn has_proposal(&self) -> bool {
        self.state.lock().proposal.is_some()
    }

    /// Number of votes held for the current round
    pub fn pending_votes(&self) -> usize {
        self.state.lock().votes.len()
    }
}
