//! RPC service handlers
//!
//! Entry points reachable by peers and clients. Each handler reports its
//! progress through the node status and drives the consensus engine, the
//! mempool, and the peer manager.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

use super::status::{NodeStatus, StatusCell};
use super::sync::{sync_with_leader, SyncOutcome};
use crate::consensus::{Block, ConsensusEngine, Vote};
use crate::mempool::MemPool;
use crate::p2p::{NodeInfo, P2pError, PeerManager, Request, Response, RpcError, RpcErrorKind};
use crate::storage::{BlockStore, StoreError};
use crate::validation::Transaction;

/// Handler errors
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),
    #[error(transparent)]
    Storage(#[from] StoreError),
    #[error(transparent)]
    Transport(#[from] P2pError),
}

impl From<ServiceError> for RpcError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::InvalidTransaction(msg) => {
                RpcError::new(RpcErrorKind::InvalidTransaction, msg)
            }
            ServiceError::Storage(e) if e.is_not_found() => {
                RpcError::new(RpcErrorKind::NotFound, e.to_string())
            }
            ServiceError::Storage(e) => RpcError::new(RpcErrorKind::Storage, e.to_string()),
            // Keep the category the leader reported
            ServiceError::Transport(P2pError::Remote(e)) => e,
            ServiceError::Transport(e) => RpcError::new(RpcErrorKind::Transport, e.to_string()),
        }
    }
}

/// Node-side implementation of every remote call
pub struct NodeService {
    node_id: String,
    is_leader: bool,
    store: Arc<dyn BlockStore>,
    mempool: Arc<MemPool>,
    consensus: Arc<ConsensusEngine>,
    peers: Arc<PeerManager>,
    status: StatusCell,
}

impl NodeService {
    pub fn new(
        node_id: impl Into<String>,
        is_leader: bool,
        store: Arc<dyn BlockStore>,
        mempool: Arc<MemPool>,
        consensus: Arc<ConsensusEngine>,
        peers: Arc<PeerManager>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            is_leader,
            store,
            mempool,
            consensus,
            peers,
            status: StatusCell::new(),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn is_leader(&self) -> bool {
        self.is_leader
    }

    pub fn store(&self) -> &dyn BlockStore {
        self.store.as_ref()
    }

    pub fn mempool(&self) -> &MemPool {
        &self.mempool
    }

    pub fn consensus(&self) -> &ConsensusEngine {
        &self.consensus
    }

    pub fn peers(&self) -> &PeerManager {
        &self.peers
    }

    pub fn status(&self) -> NodeStatus {
        self.status.get()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<NodeStatus> {
        self.status.subscribe()
    }

    pub fn node_info(&self) -> NodeInfo {
        self.node_info_with(self.status())
    }

    pub fn node_info_with(&self, status: NodeStatus) -> NodeInfo {
        NodeInfo {
            node_id: self.node_id.clone(),
            status,
        }
    }

    /// Route a request to its handler
    pub async fn dispatch(&self, request: Request) -> Response {
        let result = match request {
            Request::SendTransaction(tx) => self.send_transaction(tx).await.map(|_| Response::Empty),
            Request::ProposeBlock(block) => self.propose_block(block).await.map(|_| Response::Empty),
            Request::Vote(vote) => self.vote(vote).await.map(|_| Response::Empty),
            Request::CommitBlock => self.commit_block().await.map(|_| Response::Empty),
            Request::GetBlock(height) => self.get_block(height).map(Response::Block),
            Request::GetLatestBlock => self.get_latest_block().map(Response::Block),
            Request::StreamNodeInfo => Ok(Response::NodeInfo(self.node_info())),
        };

        result.unwrap_or_else(|e| Response::Error(e.into()))
    }

    /// Accept a transaction into the leader's mempool, or forward it there
    pub async fn send_transaction(&self, tx: Transaction) -> Result<(), ServiceError> {
        if !self.is_leader {
            self.status.set(NodeStatus::ForwardTransactionToLeader);
            warn!("Not the leader, forwarding transaction");
            self.peers.forward_transaction_to_leader(tx).await?;
            return Ok(());
        }

        info!(hash = %tx.hash(), "Received transaction");
        self.status.set(NodeStatus::VerifyingTransaction);

        if !tx.has_valid_amount() {
            return Err(ServiceError::InvalidTransaction(format!(
                "amount {} is not a non-negative number",
                tx.amount
            )));
        }
        if !tx.verify() {
            return Err(ServiceError::InvalidTransaction(
                "signature verification failed".to_string(),
            ));
        }

        self.mempool.add(tx);
        self.status.set(NodeStatus::WaitingNextBlock);
        info!(pending = self.mempool.len(), "Transaction added to mempool");
        Ok(())
    }

    /// Validate a leader proposal and send the verdict back
    pub async fn propose_block(&self, block: Block) -> Result<(), ServiceError> {
        info!(height = block.height, "Received proposal");

        let latest = self.store.latest_block()?;

        self.status.set(NodeStatus::ValidatingBlock);
        let approve = self.consensus.validate_proposal(&block, &latest);

        self.status.set(NodeStatus::SentVoteToLeader);
        self.peers
            .send_vote_to_leader(Vote {
                node_id: self.node_id.clone(),
                height: block.height,
                approve,
            })
            .await?;
        Ok(())
    }

    /// Tally a follower vote; commit and broadcast once the threshold is met
    pub async fn vote(&self, vote: Vote) -> Result<(), ServiceError> {
        if !self.is_leader {
            warn!(voter = %vote.node_id, "Not the leader, ignoring vote");
            return Ok(());
        }
        info!(voter = %vote.node_id, height = vote.height, approve = vote.approve, "Received vote");

        self.status.set(NodeStatus::ProcessingVote);

        if !self.consensus.record_vote(&vote) {
            if !self.consensus.has_proposal() {
                self.status.set(NodeStatus::Idle);
            }
            return Ok(());
        }

        self.commit_block().await?;
        self.peers.broadcast_commit().await;
        self.mempool.clear_all();
        Ok(())
    }

    /// Commit the held proposal, or catch up with the leader if there is none
    pub async fn commit_block(&self) -> Result<(), ServiceError> {
        info!("Commit block");

        let result = if !self.is_leader && !self.consensus.has_proposal() {
            self.status.set(NodeStatus::Syncing);
            sync_with_leader(&self.peers, self.store.as_ref())
                .await
                .map(|outcome| {
                    if let SyncOutcome::Diverged { height } = outcome {
                        warn!(height, "Commit sync stopped at divergent block");
                    }
                })
        } else {
            self.status.set(NodeStatus::CommitBlock);
            self.consensus
                .commit(self.store.as_ref())
                .map_err(ServiceError::from)
        };

        self.status.set(NodeStatus::Idle);
        result
    }

    pub fn get_block(&self, height: u64) -> Result<Block, ServiceError> {
        Ok(self.store.get(height)?)
    }

    pub fn get_latest_block(&self) -> Result<Block, ServiceError> {
        Ok(self.store.latest_block()?)
    }
}
