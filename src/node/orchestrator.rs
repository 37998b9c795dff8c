//! Node orchestrator
//!
//! Wires store, mempool, consensus engine, peers, and the RPC server
//! together. Followers catch up with the leader on startup; the leader runs
//! the block proposal ticker.

use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::service::NodeService;
use super::sync::{sync_with_leader, SyncOutcome};
use super::NodeConfig;
use crate::consensus::{Block, ConsensusEngine};
use crate::mempool::MemPool;
use crate::p2p::{P2pError, PeerManager, RpcServer};
use crate::rpc::{start_rpc_server, RpcState};
use crate::storage::{BlockStore, StoreError};

/// Startup errors
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
    #[error("Network error: {0}")]
    Network(#[from] P2pError),
}

/// A running node
pub struct Node {
    service: Arc<NodeService>,
    tasks: Vec<JoinHandle<()>>,
}

impl Node {
    /// Start a node on an already bound server.
    ///
    /// Creates genesis if the store is empty, dials peers, serves RPC,
    /// runs recovery on followers, then starts the proposal ticker on the leader.
    pub async fn start(
        config: NodeConfig,
        store: Arc<dyn BlockStore>,
        server: RpcServer,
    ) -> Result<Self, NodeError> {
        info!(node_id = %config.node_id, leader = config.is_leader, "Starting node");

        store.init_genesis()?;

        let peers = PeerManager::connect(&config.leader_address, &config.peers, config.rpc_timeout).await;
        let service = Arc::new(NodeService::new(
            config.node_id.clone(),
            config.is_leader,
            store,
            Arc::new(MemPool::new()),
            Arc::new(ConsensusEngine::new(config.total_validators)),
            Arc::new(peers),
        ));

        let mut tasks = vec![tokio::spawn(server.serve(Arc::clone(&service)))];

        if let Some(addr) = config.http_addr {
            let state = Arc::new(RpcState {
                service: Arc::clone(&service),
            });
            tasks.push(tokio::spawn(async move {
                if let Err(e) = start_rpc_server(state, addr).await {
                    error!(%addr, error = %e, "JSON-RPC gateway stopped");
                }
            }));
        }

        recover(&service).await;

        if service.is_leader() {
            let ticker = Arc::clone(&service);
            let interval = config.proposal_interval;
            tasks.push(tokio::spawn(async move {
                run_proposal_ticker(ticker, interval).await
            }));
        }

        info!(node_id = %config.node_id, "Node started");
        Ok(Self { service, tasks })
    }

    pub fn service(&self) -> &Arc<NodeService> {
        &self.service
    }

    /// Stop the server and ticker tasks
    pub fn shutdown(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Startup catch-up. Every failure is only logged; the next sync retries.
async fn recover(service: &NodeService) {
    if service.is_leader() {
        debug!("This node is the leader, no recovery needed");
        return;
    }

    info!(leader = %service.peers().leader_address(), "Checking sync with leader");
    match sync_with_leader(service.peers(), service.store()).await {
        Ok(SyncOutcome::UpToDate { height }) => info!(height, "Latest block matches leader"),
        Ok(SyncOutcome::Synced { from, to }) => info!(from, to, "Recovered from leader"),
        Ok(SyncOutcome::Diverged { height }) => warn!(height, "Recovery stopped at divergent block"),
        Err(e) => error!(error = %e, "Recovery failed"),
    }
}

/// Leader loop: every tick, propose the pending transactions as a new block
async fn run_proposal_ticker(service: Arc<NodeService>, period: std::time::Duration) {
    info!(?period, "Running proposal ticker");

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;
        propose_pending(&service).await;
    }
}

/// Assemble and broadcast a block from the mempool, if it holds anything
pub async fn propose_pending(service: &NodeService) {
    let pending = service.mempool().snapshot();
    if pending.is_empty() {
        debug!("No pending transactions");
        return;
    }

    let latest = match service.store().latest_block() {
        Ok(block) => block,
        Err(e) => {
            error!(error = %e, "Cannot get latest block");
            return;
        }
    };

    let block = Block::new(pending, &latest);
    info!(height = block.height, txs = block.transactions.len(), "Creating new block");

    service.consensus().set_proposal(block.clone());
    service.peers().broadcast_propose(&block).await;
}
