use std::time::Duration;
use thiserror::Error;

use super::RpcError;

/// Transport errors
#[derive(Debug, Error)]
pub enum P2pError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Call timed out after {0:?}")]
    Timeout(Duration),
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Codec error: {0}")]
    Codec(String),
    #[error("No connection to leader {0}")]
    NoLeader(String),
    #[error("Remote error: {0}")]
    Remote(#[from] RpcError),
    #[error("Unexpected response to {0}")]
    UnexpectedResponse(&'static str),
}
