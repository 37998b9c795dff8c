//! Node startup parameters

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{DEFAULT_RPC_PORT, PROPOSAL_INTERVAL, RPC_TIMEOUT, TOTAL_VALIDATORS};

/// Everything a node needs to start
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Identity used in votes and status reports
    pub node_id: String,
    /// Address the RPC server binds
    pub listen_addr: String,
    /// RPC address of the leader
    pub leader_address: String,
    /// Whether this node proposes blocks and tallies votes
    pub is_leader: bool,
    /// RPC addresses of the other nodes
    pub peers: Vec<String>,
    /// Block store directory
    pub data_dir: PathBuf,
    /// Size of the validator set, N in the commit threshold
    pub total_validators: usize,
    /// Leader block proposal period
    pub proposal_interval: Duration,
    /// Deadline for each outbound call
    pub rpc_timeout: Duration,
    /// JSON-RPC gateway address, disabled when `None`
    pub http_addr: Option<SocketAddr>,
    /// Debug-level logging
    pub debug: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: "node".to_string(),
            listen_addr: format!("0.0.0.0:{}", DEFAULT_RPC_PORT),
            leader_address: format!("127.0.0.1:{}", DEFAULT_RPC_PORT),
            is_leader: false,
            peers: Vec::new(),
            data_dir: PathBuf::from("data"),
            total_validators: TOTAL_VALIDATORS,
            proposal_interval: PROPOSAL_INTERVAL,
            rpc_timeout: RPC_TIMEOUT,
            http_addr: None,
            debug: false,
        }
    }
}

/// A node leads when its id names the leader's host, e.g. id `node1` and
/// leader `node1:50051`.
pub fn is_leader_host(node_id: &str, leader_address: &str) -> bool {
    leader_address
        .rsplit_once(':')
        .map_or(leader_address, |(host, _)| host)
        == node_id
}
