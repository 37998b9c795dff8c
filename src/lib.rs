//! RH Ledger Core Library
//!
//! A single-leader replicated ledger: signed transactions collect in the
//! leader's mempool, are batched into hash-linked blocks, voted on by
//! followers, and committed everywhere once enough votes arrive.
//!
//! RH is the short form used in addresses and protocol identifiers.

pub mod consensus;
pub mod crypto;
pub mod mempool;
pub mod node;
pub mod p2p;
pub mod rpc;
pub mod storage;
pub mod telemetry;
pub mod validation;
pub mod wallet;

/// Protocol constants
pub mod constants {
    use std::time::Duration;

    /// Seed hashed into the genesis block's previous hash
    pub const GENESIS_SEED: &str = "rh-ledger-genesis";

    /// Leader block proposal period
    pub const PROPOSAL_INTERVAL: Duration = Duration::from_secs(5);

    /// Deadline for every outbound node-to-node call
    pub const RPC_TIMEOUT: Duration = Duration::from_secs(5);

    /// Default validator set size, N in the commit threshold
    pub const TOTAL_VALIDATORS: usize = 3;

    /// Default node-to-node RPC port
    pub const DEFAULT_RPC_PORT: u16 = 50051;
}
