//! Peer management
//!
//! The peer set is fixed at startup: one connection per configured address,
//! dialed once. Peers that cannot be reached at startup are left out.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::{P2pError, RpcClient};
use crate::consensus::{Block, Vote};
use crate::validation::Transaction;

/// Connected peer
#[derive(Debug, Clone)]
pub struct Peer {
    pub address: String,
    client: Arc<RpcClient>,
}

impl Peer {
    pub fn client(&self) -> &RpcClient {
        &self.client
    }
}

/// Peer manager
#[derive(Debug)]
pub struct PeerManager {
    peers: HashMap<String, Peer>,
    leader_address: String,
    timeout: Duration,
}

impl PeerManager {
    /// Dial every address. A failed dial is logged and the peer skipped.
    pub async fn connect(leader_address: &str, addresses: &[String], timeout: Duration) -> Self {
        let mut manager = Self {
            peers: HashMap::new(),
            leader_address: leader_address.to_string(),
            timeout,
        };

        for address in addresses {
            if let Err(e) = manager.add_peer(address).await {
                error!(peer = %address, error = %e, "Cannot add peer");
            }
        }

        info!(peers = manager.peers.len(), leader = %leader_address, "Init peer manager");
        manager
    }

    /// Dial a single peer and add it to the set
    pub async fn add_peer(&mut self, address: &str) -> Result<(), P2pError> {
        let client = match tokio::time::timeout(self.timeout, RpcClient::connect(address)).await {
            Ok(client) => client?,
            Err(_) => return Err(P2pError::Timeout(self.timeout)),
        };

        debug!(peer = %address, "Added peer");
        self.peers.insert(
            address.to_string(),
            Peer {
                address: address.to_string(),
                client: Arc::new(client),
            },
        );
        Ok(())
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn leader_address(&self) -> &str {
        &self.leader_address
    }

    fn leader(&self) -> Result<&RpcClient, P2pError> {
        self.peers
            .get(&self.leader_address)
            .map(|peer| peer.client())
            .ok_or_else(|| P2pError::NoLeader(self.leader_address.clone()))
    }

    /// Send a proposal to every peer concurrently
    pub async fn broadcast_propose(&self, block: &Block) {
        info!(height = block.height, peers = self.peers.len(), "Broadcast propose block");
        let timeout = self.timeout;
        let block = block.clone();
        self.fan_out("propose_block", move |client| {
            let block = block.clone();
            async move { client.propose_block(block, timeout).await }
        })
        .await;
    }

    /// Tell every peer to commit
    pub async fn broadcast_commit(&self) {
        info!(peers = self.peers.len(), "Broadcast commit block");
        let timeout = self.timeout;
        self.fan_out("commit_block", move |client| async move {
            client.commit_block(timeout).await
        })
        .await;
    }

    /// Run `call` against every peer and wait for all of them.
    /// Each failure is logged on its own and never affects the other peers.
    async fn fan_out<F, Fut>(&self, command: &'static str, call: F)
    where
        F: Fn(Arc<RpcClient>) -> Fut,
        Fut: std::future::Future<Output = Result<(), P2pError>> + Send + 'static,
    {
        let mut tasks = JoinSet::new();
        for peer in self.peers.values() {
            let address = peer.address.clone();
            let fut = call(Arc::clone(&peer.client));
            tasks.spawn(async move { (address, fut.await) });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((address, Err(e))) => {
                    error!(peer = %address, command, error = %e, "Broadcast to peer failed")
                }
                Err(e) => warn!(command, error = %e, "Broadcast task aborted"),
            }
        }
    }

    pub async fn get_latest_block_from_leader(&self) -> Result<Block, P2pError> {
        self.leader()?.get_latest_block(self.timeout).await
    }

    pub async fn get_block_from_leader(&self, height: u64) -> Result<Block, P2pError> {
        self.leader()?.get_block(height, self.timeout).await
    }

    pub async fn forward_transaction_to_leader(&self, tx: Transaction) -> Result<(), P2pError> {
        match self.leader()?.send_transaction(tx, self.timeout).await {
            Ok(()) => {
                info!("Sent transaction to leader");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Cannot send transaction to leader");
                Err(e)
            }
        }
    }

    pub async fn send_vote_to_leader(&self, vote: Vote) -> Result<(), P2pError> {
        match self.leader()?.vote(vote, self.timeout).await {
            Ok(()) => {
                info!("Sent vote to leader");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Cannot send vote to leader");
                Err(e)
            }
        }
    }
}
