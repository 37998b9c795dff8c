//! Consensus module - Block structure, proposal validation, and vote tally

mod block;
mod engine;

pub use block::*;
pub use engine::*;
