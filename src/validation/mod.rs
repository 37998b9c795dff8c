//! Validation module - Transactions and their signature checks

mod transaction;

pub use transaction::*;
