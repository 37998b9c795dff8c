//! RH Ledger Node
//!
//! Runs a ledger node, or acts as a small client against a running one.

use clap::{Args, Parser, Subcommand};
use rh_ledger::consensus::Block;
use rh_ledger::constants::{DEFAULT_RPC_PORT, RPC_TIMEOUT, TOTAL_VALIDATORS};
use rh_ledger::node::{is_leader_host, Node, NodeConfig};
use rh_ledger::p2p::{subscribe_node_info, RpcClient, RpcServer};
use rh_ledger::storage::BlockDb;
use rh_ledger::telemetry;
use rh_ledger::wallet::KeyPair;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// RH ledger node and client
#[derive(Parser, Debug)]
#[command(name = "rh-node")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a node
    Run(RunArgs),
    /// Generate a signing key
    Keygen,
    /// Sign a transfer and submit it to a node
    Send(SendArgs),
    /// Print a block, the latest one by default
    Block(BlockArgs),
    /// Stream a node's status until it goes away
    Monitor(NodeArg),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Node identity
    #[arg(long, env = "NODE_ID")]
    node_id: String,

    /// Leader RPC address, `host:port`
    #[arg(long, env = "LEADER")]
    leader: String,

    /// Comma-separated RPC addresses of the other nodes
    #[arg(long, env = "PEERS", value_delimiter = ',')]
    peers: Vec<String>,

    /// RPC listen address
    #[arg(long, env = "LISTEN_ADDR")]
    listen: Option<String>,

    /// Block store directory
    #[arg(long, env = "DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    /// Validator set size
    #[arg(long, env = "TOTAL_VALIDATORS", default_value_t = TOTAL_VALIDATORS)]
    total_validators: usize,

    /// Block proposal period in milliseconds
    #[arg(long, env = "PROPOSAL_INTERVAL_MS", default_value_t = 5000)]
    proposal_interval_ms: u64,

    /// Outbound call deadline in milliseconds
    #[arg(long, env = "RPC_TIMEOUT_MS", default_value_t = 5000)]
    rpc_timeout_ms: u64,

    /// Serve the JSON-RPC gateway on this address
    #[arg(long, env = "HTTP_ADDR")]
    http: Option<SocketAddr>,

    /// Act as leader regardless of the leader address
    #[arg(long)]
    leader_mode: bool,

    /// Debug logging
    #[arg(long, env = "LEVEL_DEBUG")]
    debug: bool,
}

#[derive(Args, Debug)]
struct NodeArg {
    /// Node RPC address
    #[arg(long, env = "NODE_ADDR", default_value_t = format!("127.0.0.1:{}", DEFAULT_RPC_PORT))]
    node: String,
}

#[derive(Args, Debug)]
struct SendArgs {
    #[command(flatten)]
    target: NodeArg,

    /// Hex private key; a fresh key is generated when omitted
    #[arg(long, env = "PRIVATE_KEY")]
    key: Option<String>,

    /// Sender, defaults to the key's address
    #[arg(long)]
    from: Option<String>,

    #[arg(long)]
    to: String,

    #[arg(long)]
    amount: f64,
}

#[derive(Args, Debug)]
struct BlockArgs {
    #[command(flatten)]
    target: NodeArg,

    height: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run(args) => run(args).await,
        Command::Keygen => {
            let keys = KeyPair::generate();
            println!("Address:     {}", keys.address);
            println!("Public key:  {}", keys.public_key.to_base58());
            println!("Private key: {}", keys.private_key_hex());
            Ok(())
        }
        Command::Send(args) => send(args).await,
        Command::Block(args) => {
            let client = RpcClient::connect(&args.target.node).await?;
            let block = match args.height {
                Some(height) => client.get_block(height, RPC_TIMEOUT).await?,
                None => client.get_latest_block(RPC_TIMEOUT).await?,
            };
            print_block(&block);
            Ok(())
        }
        Command::Monitor(args) => {
            let mut stream = subscribe_node_info(&args.node).await?;
            while let Some(info) = stream.recv().await {
                println!("{}: {}", info.node_id, info.status);
            }
            println!("Stream closed");
            Ok(())
        }
    }
}

async fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let is_leader = args.leader_mode || is_leader_host(&args.node_id, &args.leader);
    let defaults = NodeConfig::default();
    let config = NodeConfig {
        listen_addr: args.listen.unwrap_or(defaults.listen_addr),
        node_id: args.node_id,
        leader_address: args.leader,
        is_leader,
        peers: args.peers.into_iter().filter(|p| !p.is_empty()).collect(),
        data_dir: args.data_dir,
        total_validators: args.total_validators,
        proposal_interval: Duration::from_millis(args.proposal_interval_ms),
        rpc_timeout: Duration::from_millis(args.rpc_timeout_ms),
        http_addr: args.http,
        debug: args.debug,
    };
    telemetry::init_logging(config.debug);

    let store = Arc::new(BlockDb::open(&config.data_dir)?);
    let server = RpcServer::bind(&config.listen_addr).await?;
    info!(addr = %server.local_addr()?, "Listening for node RPC");

    let mut node = Node::start(config, store, server).await?;

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping node");
    node.shutdown();
    Ok(())
}

async fn send(args: SendArgs) -> Result<(), Box<dyn std::error::Error>> {
    let keys = match &args.key {
        Some(hex_key) => KeyPair::from_private_key_hex(hex_key)?,
        None => KeyPair::generate(),
    };
    let sender = args.from.unwrap_or_else(|| keys.address.clone());
    let tx = keys.transfer(sender, args.to, args.amount)?;
    let txid = tx.hash();

    let client = RpcClient::connect(&args.target.node).await?;
    client.send_transaction(tx, RPC_TIMEOUT).await?;
    println!("Submitted {}", txid);
    Ok(())
}

fn print_block(block: &Block) {
    println!("Height:      {}", block.height);
    println!("Hash:        {}", block.hash);
    println!("Prev hash:   {}", block.prev_hash);
    match &block.merkle_root {
        Some(root) => println!("Merkle root: {}", root),
        None => println!("Merkle root: -"),
    }
    println!("Transactions ({}):", block.transactions.len());
    for tx in &block.transactions {
        println!("  {} {} -> {} {}", tx.hash(), tx.sender, tx.receiver, tx.amount);
    }
}
