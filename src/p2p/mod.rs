//! P2P networking module - Wire protocol, peer connections, and RPC server

mod client;
mod error;
mod peer;
mod protocol;
mod server;

pub use client::*;
pub use error::*;
pub use peer::*;
pub use protocol::*;
pub use server::*;
