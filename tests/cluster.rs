//! Multi-node tests over real TCP connections
//!
//! Every node binds 127.0.0.1:0 first so the full address list is known
//! before any node dials its peers.

use rh_ledger::consensus::Block;
use rh_ledger::crypto::Hash;
use rh_ledger::node::{sync_with_leader, Node, NodeConfig, NodeStatus, SyncOutcome};
use rh_ledger::p2p::{subscribe_node_info, RpcClient, RpcServer};
use rh_ledger::storage::{BlockDb, BlockStore};
use rh_ledger::wallet::KeyPair;
use std::sync::Arc;
use std::time::Duration;

const CALL_TIMEOUT: Duration = Duration::from_secs(2);
const IDLE_INTERVAL: Duration = Duration::from_secs(3600);

struct Cluster {
    nodes: Vec<Node>,
    addrs: Vec<String>,
}

impl Cluster {
    /// Node 0 leads. Nodes start in order so followers can reach the leader.
    async fn start(size: usize, proposal_interval: Duration) -> Self {
        let mut servers = Vec::new();
        let mut addrs = Vec::new();
        for _ in 0..size {
            let server = RpcServer::bind("127.0.0.1:0").await.unwrap();
            addrs.push(server.local_addr().unwrap().to_string());
            servers.push(server);
        }

        let mut nodes = Vec::new();
        for (i, server) in servers.into_iter().enumerate() {
            let config = NodeConfig {
                node_id: format!("node{}", i),
                listen_addr: addrs[i].clone(),
                leader_address: addrs[0].clone(),
                is_leader: i == 0,
                peers: addrs.iter().filter(|a| **a != addrs[i]).cloned().collect(),
                total_validators: size,
                proposal_interval,
                rpc_timeout: CALL_TIMEOUT,
                ..NodeConfig::default()
            };
            let store = Arc::new(BlockDb::temporary().unwrap());
            nodes.push(Node::start(config, store, server).await.unwrap());
        }

        Self { nodes, addrs }
    }

    fn leader(&self) -> &Node {
        &self.nodes[0]
    }

    fn heights(&self) -> Vec<u64> {
        self.nodes
            .iter()
            .map(|n| n.service().store().latest_height().unwrap())
            .collect()
    }
}

async fn wait_until(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

/// Leader store gets `count` extra blocks on top of genesis
fn extend_chain(store: &dyn BlockStore, count: usize) -> Vec<Block> {
    let keys = KeyPair::generate();
    let mut blocks = Vec::new();
    let mut previous = store.latest_block().unwrap();
    for i in 0..count {
        let tx = keys.transfer("alice", "bob", i as f64 + 1.0).unwrap();
        let block = Block::new(vec![tx], &previous);
        store.put(block.height, &block).unwrap();
        blocks.push(block.clone());
        previous = block;
    }
    blocks
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_transaction_commits_on_every_node() {
    let cluster = Cluster::start(3, Duration::from_millis(300)).await;
    assert_eq!(cluster.heights(), vec![1, 1, 1]);

    // Submitted to a follower, which forwards to the leader
    let client = RpcClient::connect(&cluster.addrs[2]).await.unwrap();
    let tx = KeyPair::generate().transfer("alice", "bob", 10.0).unwrap();
    client.send_transaction(tx.clone(), CALL_TIMEOUT).await.unwrap();

    let committed = wait_until(|| {
        cluster.heights() == vec![2, 2, 2] && cluster.leader().service().mempool().is_empty()
    })
    .await;
    assert!(committed, "heights: {:?}", cluster.heights());

    let leader_block = cluster.leader().service().get_block(2).unwrap();
    assert_eq!(leader_block.transactions, vec![tx]);
    for node in &cluster.nodes[1..] {
        assert_eq!(node.service().get_block(2).unwrap(), leader_block);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_invalid_transaction_is_rejected_remotely() {
    let cluster = Cluster::start(3, IDLE_INTERVAL).await;

    let keys = KeyPair::generate();
    let mut tx = keys.transfer("alice", "bob", 1.0).unwrap();
    tx.receiver = "mallory".into();

    let client = RpcClient::connect(&cluster.addrs[0]).await.unwrap();
    assert!(client.send_transaction(tx, CALL_TIMEOUT).await.is_err());
    assert!(cluster.leader().service().mempool().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_commit_without_proposal_syncs_from_leader() {
    let cluster = Cluster::start(3, IDLE_INTERVAL).await;
    let blocks = extend_chain(cluster.leader().service().store(), 2);

    let follower = cluster.nodes[1].service();
    follower.commit_block().await.unwrap();

    assert_eq!(follower.store().latest_height().unwrap(), 3);
    assert_eq!(follower.get_block(3).unwrap(), blocks[1]);
    assert_eq!(follower.status(), NodeStatus::Idle);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sync_stops_at_corrupted_block() {
    let cluster = Cluster::start(2, IDLE_INTERVAL).await;
    let leader_store = cluster.leader().service().store();

    let blocks = extend_chain(leader_store, 3);
    let mut corrupted = blocks[1].clone();
    corrupted.merkle_root = Some(Hash::zero());
    leader_store.put(corrupted.height, &corrupted).unwrap();

    let follower = cluster.nodes[1].service();
    let outcome = sync_with_leader(follower.peers(), follower.store()).await.unwrap();

    assert_eq!(outcome, SyncOutcome::Diverged { height: 3 });
    assert_eq!(follower.store().latest_height().unwrap(), 2);
    assert!(follower.get_block(3).is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_follower_recovers_on_startup() {
    let server = RpcServer::bind("127.0.0.1:0").await.unwrap();
    let leader_addr = server.local_addr().unwrap().to_string();
    let leader_store = Arc::new(BlockDb::temporary().unwrap());
    leader_store.init_genesis().unwrap();
    extend_chain(leader_store.as_ref(), 3);

    let leader_config = NodeConfig {
        node_id: "leader".into(),
        leader_address: leader_addr.clone(),
        is_leader: true,
        proposal_interval: IDLE_INTERVAL,
        rpc_timeout: CALL_TIMEOUT,
        ..NodeConfig::default()
    };
    let _leader = Node::start(leader_config, leader_store, server).await.unwrap();

    let follower_server = RpcServer::bind("127.0.0.1:0").await.unwrap();
    let follower_config = NodeConfig {
        node_id: "follower".into(),
        leader_address: leader_addr.clone(),
        peers: vec![leader_addr],
        proposal_interval: IDLE_INTERVAL,
        rpc_timeout: CALL_TIMEOUT,
        ..NodeConfig::default()
    };
    let follower_store = Arc::new(BlockDb::temporary().unwrap());
    let follower = Node::start(follower_config, follower_store, follower_server)
        .await
        .unwrap();

    assert_eq!(follower.service().store().latest_height().unwrap(), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_status_stream_reports_changes() {
    let cluster = Cluster::start(2, IDLE_INTERVAL).await;
    let mut stream = subscribe_node_info(&cluster.addrs[0]).await.unwrap();

    let first = tokio::time::timeout(CALL_TIMEOUT, stream.recv()).await.unwrap().unwrap();
    assert_eq!(first.node_id, "node0");
    assert_eq!(first.status, NodeStatus::Idle);

    let client = RpcClient::connect(&cluster.addrs[0]).await.unwrap();
    let tx = KeyPair::generate().transfer("alice", "bob", 2.0).unwrap();
    client.send_transaction(tx, CALL_TIMEOUT).await.unwrap();

    let next = tokio::time::timeout(CALL_TIMEOUT, stream.recv()).await.unwrap().unwrap();
    assert_ne!(next.status, NodeStatus::Idle);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_remote_block_queries() {
    let cluster = Cluster::start(2, IDLE_INTERVAL).await;
    let client = RpcClient::connect(&cluster.addrs[1]).await.unwrap();

    let latest = client.get_latest_block(CALL_TIMEOUT).await.unwrap();
    assert!(latest.is_genesis());
    assert_eq!(latest, Block::genesis());

    let err = client.get_block(7, CALL_TIMEOUT).await.unwrap_err();
    assert!(matches!(err, rh_ledger::p2p::P2pError::Remote(ref e) if e.is_not_found()));
}
