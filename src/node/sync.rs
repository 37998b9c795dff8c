//! Catch-up with the leader
//!
//! Fetches every height the follower is missing, in order, checks each block
//! and persists it. The first bad block stops the pass; nothing is rolled
//! back and the next pass restarts from whatever height is stored.

use tracing::{error, info, warn};

use super::ServiceError;
use crate::consensus::Block;
use crate::p2p::PeerManager;
use crate::storage::BlockStore;

/// How a sync pass ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Local and leader heights already matched
    UpToDate { height: u64 },
    /// Every missing height was stored
    Synced { from: u64, to: u64 },
    /// The leader served a block that failed verification at `height`
    Diverged { height: u64 },
}

/// Why a fetched block was refused
fn verify_fetched(block: &Block, height: u64, previous: &Block) -> Result<(), &'static str> {
    if block.height != height {
        return Err("height mismatch");
    }
    if block.compute_merkle_root() != block.merkle_root {
        return Err("merkle root mismatch");
    }
    if block.compute_hash() != block.hash {
        return Err("block hash mismatch");
    }
    if block.prev_hash != previous.hash {
        return Err("previous hash mismatch");
    }
    Ok(())
}

/// Bring the local store up to the leader's latest height.
///
/// Fetch and store failures are returned; a block failing verification ends
/// the pass with `SyncOutcome::Diverged`.
pub async fn sync_with_leader(
    peers: &PeerManager,
    store: &dyn BlockStore,
) -> Result<SyncOutcome, ServiceError> {
    info!("Syncing blocks with leader");

    let leader_latest = peers.get_latest_block_from_leader().await.map_err(|e| {
        error!(error = %e, "Failed to get latest block from leader");
        e
    })?;

    let mut previous = store.latest_block().map_err(|e| {
        error!(error = %e, "Failed to get latest local block");
        e
    })?;

    let from = previous.height;
    if leader_latest.height <= from {
        info!(height = from, "Up to date with leader");
        return Ok(SyncOutcome::UpToDate { height: from });
    }

    warn!(local = from, leader = leader_latest.height, "Behind leader, syncing");

    for height in (from + 1)..=leader_latest.height {
        let block = peers.get_block_from_leader(height).await.map_err(|e| {
            error!(height, error = %e, "Failed to get block from leader");
            e
        })?;

        if let Err(reason) = verify_fetched(&block, height, &previous) {
            warn!(height, reason, "Sync stopped: leader block failed verification");
            return Ok(SyncOutcome::Diverged { height });
        }

        store.put(height, &block).map_err(|e| {
            error!(height, error = %e, "Sync failed: cannot save block");
            e
        })?;
        previous = block;
    }

    info!(from, to = leader_latest.height, "Synced with leader");
    Ok(SyncOutcome::Synced {
        from,
        to: leader_latest.height,
    })
}
