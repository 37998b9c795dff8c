//! JSON-RPC API Module
//!
//! Optional HTTP interface for external tooling to submit transactions and
//! query blocks and node status.

mod methods;
mod server;

pub use methods::*;
pub use server::*;
