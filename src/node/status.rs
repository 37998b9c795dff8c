//! Node status reported to monitoring streams
//!
//! Handlers overwrite the status as they progress. The value lives in a
//! `watch` channel: writes are atomic swaps and every stream sees the latest
//! value without polling.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::watch;

/// Protocol step a node is currently in
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeStatus {
    #[default]
    Idle,
    Syncing,
    ValidatingBlock,
    VerifyingTransaction,
    ForwardTransactionToLeader,
    WaitingNextBlock,
    SentVoteToLeader,
    ProcessingVote,
    CommitBlock,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Idle => "IDLE",
            NodeStatus::Syncing => "SYNCING",
            NodeStatus::ValidatingBlock => "VALIDATING_BLOCK",
            NodeStatus::VerifyingTransaction => "VERIFYING_TRANSACTION",
            NodeStatus::ForwardTransactionToLeader => "FORWARD_TRANSACTION_TO_LEADER",
            NodeStatus::WaitingNextBlock => "WAITING_NEXT_BLOCK",
            NodeStatus::SentVoteToLeader => "SENT_VOTE_TO_LEADER",
            NodeStatus::ProcessingVote => "PROCESSING_VOTE",
            NodeStatus::CommitBlock => "COMMIT_BLOCK",
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared, single-value status holder
#[derive(Debug)]
pub struct StatusCell {
    tx: watch::Sender<NodeStatus>,
}

impl StatusCell {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(NodeStatus::Idle);
        Self { tx }
    }

    pub fn set(&self, status: NodeStatus) {
        self.tx.send_replace(status);
    }

    pub fn get(&self) -> NodeStatus {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<NodeStatus> {
        self.tx.subscribe()
    }
}

impl Default for StatusCell {
    fn default() -> Self {
        Self::new()
    }
}
