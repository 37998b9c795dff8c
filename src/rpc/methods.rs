//! RPC Method Implementations
//!
//! Each method corresponds to a JSON-RPC call that external apps can make.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::consensus::Block;
use crate::node::{NodeService, ServiceError};
use crate::p2p::{P2pError, RpcErrorKind};
use crate::validation::Transaction;

/// JSON-RPC 2.0 Request
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    pub params: Option<Value>,
    pub id: Value,
}

/// JSON-RPC 2.0 Response
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub result: Option<Value>,
    pub error: Option<JsonRpcError>,
    pub id: Value,
}

/// JSON-RPC Error
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;
pub const BLOCK_NOT_FOUND: i32 = -5;
pub const TRANSACTION_REJECTED: i32 = -26;

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(id: Value, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(JsonRpcError { code, message }),
            id,
        }
    }
}

/// RPC Handler State
pub struct RpcState {
    pub service: Arc<NodeService>,
}

/// Process a JSON-RPC request and return a response
pub async fn handle_request(state: &RpcState, request: JsonRpcRequest) -> JsonRpcResponse {
    match request.method.as_str() {
        "sendtransaction" => send_transaction(state, request.id, request.params).await,
        "getblock" => get_block(state, request.id, request.params),
        "getlatestblock" => get_latest_block(state, request.id),
        "getnodeinfo" => get_node_info(state, request.id),
        _ => JsonRpcResponse::error(
            request.id,
            METHOD_NOT_FOUND,
            format!("Method not found: {}", request.method),
        ),
    }
}

/// Submits a signed transaction, given as an object or a one-element array
async fn send_transaction(state: &RpcState, id: Value, params: Option<Value>) -> JsonRpcResponse {
    let raw = match params {
        Some(Value::Array(mut arr)) if arr.len() == 1 => arr.remove(0),
        Some(obj @ Value::Object(_)) => obj,
        _ => return JsonRpcResponse::error(id, INVALID_PARAMS, "Invalid params: expected transaction".into()),
    };

    let tx: Transaction = match serde_json::from_value(raw) {
        Ok(tx) => tx,
        Err(e) => return JsonRpcResponse::error(id, INVALID_PARAMS, format!("Invalid transaction: {}", e)),
    };
    let hash = tx.hash();

    match state.service.send_transaction(tx).await {
        Ok(()) => JsonRpcResponse::success(id, json!({ "txid": hash.to_hex() })),
        Err(e) => service_error(id, e),
    }
}

/// Returns the block at a given height
fn get_block(state: &RpcState, id: Value, params: Option<Value>) -> JsonRpcResponse {
    let height = match params {
        Some(Value::Array(arr)) if !arr.is_empty() => arr[0].as_u64(),
        Some(Value::Number(n)) => n.as_u64(),
        _ => None,
    };
    let Some(height) = height else {
        return JsonRpcResponse::error(id, INVALID_PARAMS, "Invalid params: expected height".into());
    };

    match state.service.get_block(height) {
        Ok(block) => JsonRpcResponse::success(id, block_json(&block)),
        Err(e) => service_error(id, e),
    }
}

/// Returns the latest committed block
fn get_latest_block(state: &RpcState, id: Value) -> JsonRpcResponse {
    match state.service.get_latest_block() {
        Ok(block) => JsonRpcResponse::success(id, block_json(&block)),
        Err(e) => service_error(id, e),
    }
}

/// Returns node identity, role, status and height
fn get_node_info(state: &RpcState, id: Value) -> JsonRpcResponse {
    let service = &state.service;
    let info = service.node_info();
    let height = service.get_latest_block().map(|b| b.height).ok();

    JsonRpcResponse::success(
        id,
        json!({
            "node_id": info.node_id,
            "status": info.status.as_str(),
            "leader": service.is_leader(),
            "height": height,
            "pending": service.mempool().len(),
        }),
    )
}

fn block_json(block: &Block) -> Value {
    let transactions: Vec<Value> = block
        .transactions
        .iter()
        .map(|tx| {
            json!({
                "txid": tx.hash().to_hex(),
                "sender": tx.sender,
                "receiver": tx.receiver,
                "amount": tx.amount,
                "timestamp": tx.timestamp,
            })
        })
        .collect();

    json!({
        "hash": block.hash.to_hex(),
        "height": block.height,
        "previousblockhash": block.prev_hash.to_hex(),
        "merkleroot": block.merkle_root.map(|root| root.to_hex()),
        "tx_count": block.transactions.len(),
        "transactions": transactions,
    })
}

fn service_error(id: Value, err: ServiceError) -> JsonRpcResponse {
    let code = match &err {
        ServiceError::InvalidTransaction(_) => TRANSACTION_REJECTED,
        ServiceError::Storage(e) if e.is_not_found() => BLOCK_NOT_FOUND,
        ServiceError::Transport(P2pError::Remote(remote)) => match remote.kind {
            RpcErrorKind::NotFound => BLOCK_NOT_FOUND,
            RpcErrorKind::InvalidTransaction => TRANSACTION_REJECTED,
            _ => INTERNAL_ERROR,
        },
        _ => INTERNAL_ERROR,
    };
    JsonRpcResponse::error(id, code, err.to_string())
}
