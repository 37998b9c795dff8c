//! Outbound RPC connection
//!
//! One TCP connection per peer, shared by every call to that peer. Requests
//! are queued to a writer task that owns the write half, so a frame is always
//! written whole even when its caller gives up. Responses are routed back to
//! their caller by frame id. A connection that drops is not re-dialed: every
//! later call fails with `ConnectionClosed`.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::protocol::{read_frame, write_frame, Frame, Message, NodeInfo, Request, Response};
use super::P2pError;
use crate::consensus::{Block, Vote};
use crate::validation::Transaction;

/// In-flight calls; `None` once the connection is gone
type PendingCalls = Arc<Mutex<Option<HashMap<u64, oneshot::Sender<Response>>>>>;

/// Multiplexed client connection to one node
pub struct RpcClient {
    addr: String,
    frames: mpsc::Sender<Frame>,
    pending: PendingCalls,
    next_id: AtomicU64,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient").field("addr", &self.addr).finish()
    }
}

impl RpcClient {
    /// Dial `addr` and start routing responses
    pub async fn connect(addr: &str) -> Result<Self, P2pError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (read_half, write_half) = stream.into_split();

        let pending: PendingCalls = Arc::new(Mutex::new(Some(HashMap::new())));
        let (frames, queued) = mpsc::channel(64);
        let reader = tokio::spawn(route_responses(
            addr.to_string(),
            read_half,
            Arc::clone(&pending),
        ));
        let writer = tokio::spawn(write_requests(
            addr.to_string(),
            write_half,
            queued,
            Arc::clone(&pending),
        ));

        Ok(Self {
            addr: addr.to_string(),
            frames,
            pending,
            next_id: AtomicU64::new(1),
            reader,
            writer,
        })
    }

    /// Send a request and wait for its response, bounded by `timeout`.
    ///
    /// A `Response::Error` from the remote side is returned as `P2pError::Remote`.
    pub async fn call(&self, request: Request, timeout: Duration) -> Result<Response, P2pError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();

        match self.pending.lock().as_mut() {
            Some(calls) => {
                calls.insert(id, tx);
            }
            None => return Err(P2pError::ConnectionClosed),
        }

        let command = request.command();
        // A send cancelled by the deadline never reaches the socket
        let exchange = async {
            self.frames
                .send(Frame::request(id, request))
                .await
                .map_err(|_| P2pError::ConnectionClosed)?;
            rx.await.map_err(|_| P2pError::ConnectionClosed)
        };

        let result = match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(P2pError::Timeout(timeout)),
        };

        if result.is_err() {
            if let Some(calls) = self.pending.lock().as_mut() {
                calls.remove(&id);
            }
        }

        match result? {
            Response::Error(err) => {
                debug!(peer = %self.addr, command, error = %err, "Remote call failed");
                Err(P2pError::Remote(err))
            }
            response => Ok(response),
        }
    }

    async fn call_empty(&self, request: Request, timeout: Duration) -> Result<(), P2pError> {
        let command = request.command();
        match self.call(request, timeout).await? {
            Response::Empty => Ok(()),
            _ => Err(P2pError::UnexpectedResponse(command)),
        }
    }

    async fn call_block(&self, request: Request, timeout: Duration) -> Result<Block, P2pError> {
        let command = request.command();
        match self.call(request, timeout).await? {
            Response::Block(block) => Ok(block),
            _ => Err(P2pError::UnexpectedResponse(command)),
        }
    }

    pub async fn send_transaction(&self, tx: Transaction, timeout: Duration) -> Result<(), P2pError> {
        self.call_empty(Request::SendTransaction(tx), timeout).await
    }

    pub async fn propose_block(&self, block: Block, timeout: Duration) -> Result<(), P2pError> {
        self.call_empty(Request::ProposeBlock(block), timeout).await
    }

    pub async fn vote(&self, vote: Vote, timeout: Duration) -> Result<(), P2pError> {
        self.call_empty(Request::Vote(vote), timeout).await
    }

    pub async fn commit_block(&self, timeout: Duration) -> Result<(), P2pError> {
        self.call_empty(Request::CommitBlock, timeout).await
    }

    pub async fn get_block(&self, height: u64, timeout: Duration) -> Result<Block, P2pError> {
        self.call_block(Request::GetBlock(height), timeout).await
    }

    pub async fn get_latest_block(&self, timeout: Duration) -> Result<Block, P2pError> {
        self.call_block(Request::GetLatestBlock, timeout).await
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

async fn write_requests(
    addr: String,
    mut writer: OwnedWriteHalf,
    mut frames: mpsc::Receiver<Frame>,
    pending: PendingCalls,
) {
    while let Some(frame) = frames.recv().await {
        if let Err(e) = write_frame(&mut writer, &frame).await {
            debug!(peer = %addr, error = %e, "Write failed, closing connection");
            break;
        }
    }

    pending.lock().take();
}

async fn route_responses(addr: String, mut reader: OwnedReadHalf, pending: PendingCalls) {
    loop {
        let frame = match read_frame(&mut reader).await {
            Ok(frame) => frame,
            Err(e) => {
                debug!(peer = %addr, error = %e, "Connection closed");
                break;
            }
        };

        let Message::Response(response) = frame.message else {
            warn!(peer = %addr, id = frame.id, "Ignoring request frame on client connection");
            continue;
        };

        let waiter = pending.lock().as_mut().and_then(|calls| calls.remove(&frame.id));
        match waiter {
            Some(tx) => {
                let _ = tx.send(response);
            }
            None => debug!(peer = %addr, id = frame.id, "Response for unknown call"),
        }
    }

    // Dropping the senders fails every call still waiting
    pending.lock().take();
}

/// Open a dedicated connection that streams the node's status changes.
///
/// The stream ends when the node closes the connection; dropping the
/// receiver closes it from this side.
pub async fn subscribe_node_info(addr: &str) -> Result<mpsc::Receiver<NodeInfo>, P2pError> {
    let mut stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(true)?;
    write_frame(&mut stream, &Frame::request(0, Request::StreamNodeInfo)).await?;

    let (tx, rx) = mpsc::channel(16);
    let peer = addr.to_string();
    tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                _ = tx.closed() => break,
                frame = read_frame(&mut stream) => frame,
            };

            match frame {
                Ok(Frame {
                    message: Message::Response(Response::NodeInfo(info)),
                    ..
                }) => {
                    if tx.send(info).await.is_err() {
                        break;
                    }
                }
                Ok(other) => debug!(peer = %peer, id = other.id, "Unexpected frame on status stream"),
                Err(e) => {
                    debug!(peer = %peer, error = %e, "Status stream ended");
                    break;
                }
            }
        }
    });

    Ok(rx)
}
