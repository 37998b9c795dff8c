//! P2P protocol messages
//!
//! Defines the request/response types exchanged between nodes and the frame
//! format they travel in:
//!
//! ```text
//! [magic: 4 bytes][length: u32 LE][payload: bincode Frame]
//! ```
//!
//! Every frame carries the id of the request it belongs to, so one
//! connection can have many calls in flight.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::consensus::{Block, Vote};
use crate::node::NodeStatus;
use crate::validation::Transaction;

use super::P2pError;

/// Network magic bytes (identifies RH network)
pub const NETWORK_MAGIC: [u8; 4] = [0x52, 0x48, 0x4C, 0x47]; // "RHLG"

/// Maximum message size (4 MB)
pub const MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

/// Remote calls a node serves
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Request {
    SendTransaction(Transaction),
    ProposeBlock(Block),
    Vote(Vote),
    CommitBlock,
    GetBlock(u64),
    GetLatestBlock,
    /// Answered with a stream of `Response::NodeInfo`
    StreamNodeInfo,
}

impl Request {
    /// Get the command name for this request
    pub fn command(&self) -> &'static str {
        match self {
            Request::SendTransaction(_) => "send_transaction",
            Request::ProposeBlock(_) => "propose_block",
            Request::Vote(_) => "vote",
            Request::CommitBlock => "commit_block",
            Request::GetBlock(_) => "get_block",
            Request::GetLatestBlock => "get_latest_block",
            Request::StreamNodeInfo => "stream_node_info",
        }
    }
}

/// Identity and current status of a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub node_id: String,
    pub status: NodeStatus,
}

/// Replies to a `Request`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    Empty,
    Block(Block),
    NodeInfo(NodeInfo),
    Error(RpcError),
}

/// Category of a failed call, preserved across hops
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcErrorKind {
    NotFound,
    Storage,
    InvalidTransaction,
    Transport,
    Internal,
}

/// Error returned to a remote caller
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind:?}: {message}")]
pub struct RpcError {
    pub kind: RpcErrorKind,
    pub message: String,
}

impl RpcError {
    pub fn new(kind: RpcErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == RpcErrorKind::NotFound
    }
}

/// Frame body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Message {
    Request(Request),
    Response(Response),
}

/// Unit of transmission on a connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    /// Id chosen by the caller, echoed on every response
    pub id: u64,
    pub message: Message,
}

impl Frame {
    pub fn request(id: u64, request: Request) -> Self {
        Self {
            id,
            message: Message::Request(request),
        }
    }

    pub fn response(id: u64, response: Response) -> Self {
        Self {
            id,
            message: Message::Response(response),
        }
    }

    /// Serialize frame to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, P2pError> {
        let payload = bincode::serialize(self).map_err(|e| P2pError::Codec(e.to_string()))?;
        if payload.len() > MAX_MESSAGE_SIZE {
            return Err(P2pError::Codec("Message too large".to_string()));
        }

        let mut bytes = Vec::with_capacity(4 + 4 + payload.len());
        bytes.extend_from_slice(&NETWORK_MAGIC);
        bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&payload);

        Ok(bytes)
    }

    /// Deserialize frame from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, P2pError> {
        if bytes.len() < 8 {
            return Err(P2pError::Codec("Message too short".to_string()));
        }

        let length = parse_header(&bytes[0..8])?;

        if bytes.len() < 8 + length {
            return Err(P2pError::Codec("Incomplete message".to_string()));
        }

        bincode::deserialize(&bytes[8..8 + length])
            .map_err(|e| P2pError::Codec(format!("Deserialization error: {}", e)))
    }
}

/// Validate magic and return the payload length
fn parse_header(header: &[u8]) -> Result<usize, P2pError> {
    if header[0..4] != NETWORK_MAGIC {
        return Err(P2pError::Codec("Invalid network magic".to_string()));
    }

    let length = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;
    if length > MAX_MESSAGE_SIZE {
        return Err(P2pError::Codec("Message too large".to_string()));
    }
    Ok(length)
}

/// Read one frame from the stream
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Frame, P2pError> {
    let mut header = [0u8; 8];
    reader.read_exact(&mut header).await?;
    let length = parse_header(&header)?;

    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload).await?;

    bincode::deserialize(&payload)
        .map_err(|e| P2pError::Codec(format!("Deserialization error: {}", e)))
}

/// Write one frame to the stream
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &Frame) -> Result<(), P2pError> {
    let bytes = frame.to_bytes()?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_serialization() {
        let frame = Frame::request(7, Request::GetBlock(12345));
        let recovered = Frame::from_bytes(&frame.to_bytes().unwrap()).unwrap();

        assert_eq!(recovered.id, 7);
        match recovered.message {
            Message::Request(Request::GetBlock(n)) => assert_eq!(n, 12345),
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_network_magic() {
        let bytes = Frame::request(1, Request::CommitBlock).to_bytes().unwrap();
        assert_eq!(&bytes[0..4], &NETWORK_MAGIC);
    }

    #[test]
    fn test_invalid_magic_rejected() {
        let mut bytes = Frame::request(1, Request::CommitBlock).to_bytes().unwrap();
        bytes[0] = 0xFF;
        assert!(Frame::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_oversized_length_rejected() {
        let mut bytes = Frame::request(1, Request::CommitBlock).to_bytes().unwrap();
        bytes[4..8].copy_from_slice(&((MAX_MESSAGE_SIZE as u32) + 1).to_le_bytes());
        assert!(Frame::from_bytes(&bytes).is_err());
    }

    #[tokio::test]
    async fn test_async_frame_io() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let block = Block::genesis();

        write_frame(&mut client, &Frame::response(3, Response::Block(block.clone())))
            .await
            .unwrap();
        let frame = read_frame(&mut server).await.unwrap();

        assert_eq!(frame.id, 3);
        match frame.message {
            Message::Response(Response::Block(received)) => assert_eq!(received, block),
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_rpc_error_kind() {
        let err = RpcError::new(RpcErrorKind::NotFound, "height 9");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "NotFound: height 9");
    }
}
