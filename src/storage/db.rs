//! Block persistence layer using Sled
//!
//! Blocks are stored by height. Every write is flushed before returning.

use sled::{Db, Tree};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

use crate::consensus::Block;

/// Storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Block not found at height {0}")]
    NotFound(u64),
    #[error("Block store is empty")]
    Empty,
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),
    #[error("Codec error: {0}")]
    Codec(#[from] bincode::Error),
}

impl StoreError {
    /// Whether the error means "no such block" rather than a broken store
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_) | StoreError::Empty)
    }
}

/// Durable mapping from height to block
pub trait BlockStore: Send + Sync {
    /// Persist `block` under `height`
    fn put(&self, height: u64, block: &Block) -> Result<(), StoreError>;

    /// Load the block at `height`
    fn get(&self, height: u64) -> Result<Block, StoreError>;

    /// Highest stored height
    fn latest_height(&self) -> Result<u64, StoreError>;

    /// Load the block at the highest stored height
    fn latest_block(&self) -> Result<Block, StoreError> {
        let height = self.latest_height()?;
        self.get(height)
    }

    /// Write the genesis block if the store holds nothing yet
    fn init_genesis(&self) -> Result<Block, StoreError> {
        match self.latest_block() {
            Err(StoreError::Empty) => {
                let genesis = Block::genesis();
                self.put(genesis.height, &genesis)?;
                info!(hash = %genesis.hash, "Created genesis block");
                Ok(genesis)
            }
            other => other,
        }
    }
}

/// Database wrapper
#[derive(Debug, Clone)]
pub struct BlockDb {
    db: Db,
    blocks_tree: Tree,
    metadata_tree: Tree,
}

const LATEST_HEIGHT_KEY: &str = "latest_block_height";

impl BlockDb {
    /// Open or create the database
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        Self::from_db(sled::open(path)?)
    }

    /// In-memory database removed on drop
    pub fn temporary() -> Result<Self, StoreError> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: Db) -> Result<Self, StoreError> {
        let blocks_tree = db.open_tree("blocks")?;
        let metadata_tree = db.open_tree("metadata")?;

        Ok(Self {
            db,
            blocks_tree,
            metadata_tree,
        })
    }

    fn stored_latest_height(&self) -> Result<Option<u64>, StoreError> {
        Ok(self
            .metadata_tree
            .get(LATEST_HEIGHT_KEY)?
            .and_then(|bytes| <[u8; 8]>::try_from(bytes.as_ref()).ok())
            .map(u64::from_be_bytes))
    }
}

impl BlockStore for BlockDb {
    fn put(&self, height: u64, block: &Block) -> Result<(), StoreError> {
        debug!(height, hash = %block.hash, "Save block");

        let value = bincode::serialize(block)?;
        self.blocks_tree.insert(height.to_be_bytes(), value)?;

        if self.stored_latest_height()?.map_or(true, |latest| height > latest) {
            self.metadata_tree
                .insert(LATEST_HEIGHT_KEY, height.to_be_bytes().as_ref())?;
        }

        self.db.flush()?;
        Ok(())
    }

    fn get(&self, height: u64) -> Result<Block, StoreError> {
        match self.blocks_tree.get(height.to_be_bytes())? {
            Some(bytes) => Ok(bincode::deserialize(&bytes)?),
            None => Err(StoreError::NotFound(height)),
        }
    }

    fn latest_height(&self) -> Result<u64, StoreError> {
        self.stored_latest_height()?.ok_or(StoreError::Empty)
    }
}
