//! Inbound RPC server
//!
//! Accepts connections and runs one task per request. Responses are written
//! back through a per-connection writer task, so slow handlers never block
//! other calls on the same connection.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::protocol::{read_frame, write_frame, Frame, Message, Request, Response};
use super::P2pError;
use crate::node::NodeService;

/// Bound listener serving a node
pub struct RpcServer {
    listener: TcpListener,
}

impl RpcServer {
    /// Bind the listen address. Peers can dial as soon as this returns.
    pub async fn bind(addr: &str) -> Result<Self, P2pError> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, P2pError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until the task is dropped
    pub async fn serve(self, service: Arc<NodeService>) {
        if let Ok(addr) = self.listener.local_addr() {
            info!(%addr, "RPC server listening");
        }

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    debug!(%addr, "Peer connected");
                    tokio::spawn(handle_connection(stream, Arc::clone(&service)));
                }
                Err(e) => error!(error = %e, "Connection error"),
            }
        }
    }
}

async fn handle_connection(stream: TcpStream, service: Arc<NodeService>) {
    let _ = stream.set_nodelay(true);
    let (mut reader, writer) = stream.into_split();
    let (out_tx, out_rx) = mpsc::channel::<Frame>(64);
    let writer_task = tokio::spawn(write_responses(writer, out_rx));

    loop {
        let frame = match read_frame(&mut reader).await {
            Ok(frame) => frame,
            Err(e) => {
                debug!(error = %e, "Connection ended");
                break;
            }
        };

        let id = frame.id;
        let Message::Request(request) = frame.message else {
            warn!(id, "Ignoring response frame on server connection");
            continue;
        };

        let service = Arc::clone(&service);
        let out = out_tx.clone();
        tokio::spawn(async move {
            match request {
                Request::StreamNodeInfo => stream_node_info(id, &service, out).await,
                request => {
                    let response = service.dispatch(request).await;
                    let _ = out.send(Frame::response(id, response)).await;
                }
            }
        });
    }

    // Stops the writer, which closes every stream task's channel
    writer_task.abort();
}

async fn write_responses(mut writer: OwnedWriteHalf, mut frames: mpsc::Receiver<Frame>) {
    while let Some(frame) = frames.recv().await {
        if let Err(e) = write_frame(&mut writer, &frame).await {
            debug!(error = %e, "Write failed, dropping connection writer");
            break;
        }
    }
}

/// Push (node id, status) whenever the status changes, until the caller goes away
async fn stream_node_info(id: u64, service: &NodeService, out: mpsc::Sender<Frame>) {
    info!("Stream node info: on");
    let mut status = service.subscribe_status();
    let mut last_sent = None;

    loop {
        let current = *status.borrow_and_update();
        if last_sent != Some(current) {
            debug!(?last_sent, new = ?current, "Status changed");
            let info = Response::NodeInfo(service.node_info_with(current));
            if out.send(Frame::response(id, info)).await.is_err() {
                break;
            }
            last_sent = Some(current);
        }

        tokio::select! {
            _ = out.closed() => break,
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    info!("Stream node info: off");
}
