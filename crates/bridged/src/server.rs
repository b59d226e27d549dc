//! Tool server - newline-delimited JSON-RPC 2.0 over stdio.
//!
//! One request per line in, one response per line out. Notifications get
//! no response. stdout carries only protocol traffic; logs go to stderr.

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use crate::rpc::{
    RpcRequest, RpcResponse, INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, JSONRPC_VERSION,
    METHOD_NOT_FOUND, PARSE_ERROR,
};
use crate::state::BridgeState;
use crate::tools;

/// Protocol revision announced in `initialize`
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Name announced in `initialize`
pub const SERVER_NAME: &str = "comfyui-dev-bridge";

/// Serve on the process's stdin/stdout until stdin closes
pub async fn serve_stdio(state: Arc<BridgeState>) -> Result<()> {
    serve(state, tokio::io::stdin(), tokio::io::stdout()).await
}

/// Serve requests read from `reader`, writing responses to `writer`
pub async fn serve<R, W>(state: Arc<BridgeState>, reader: R, mut writer: W) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader
            .read_line(&mut line)
            .await
            .context("Failed to read request")?;

        if bytes_read == 0 {
            info!("Input closed, stopping tool server");
            break;
        }

        if line.trim().is_empty() {
            continue;
        }

        let Some(response) = handle_line(&state, &line).await else {
            continue;
        };

        let response_json = serde_json::to_string(&response)? + "\n";
        writer
            .write_all(response_json.as_bytes())
            .await
            .context("Failed to write response")?;
        writer.flush().await.context("Failed to flush response")?;
    }

    Ok(())
}

/// Handle one line of input. `None` for notifications.
pub async fn handle_line(state: &BridgeState, line: &str) -> Option<RpcResponse> {
    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => {
            warn!("Invalid request JSON: {}", e);
            return Some(RpcResponse::error(
                Value::Null,
                PARSE_ERROR,
                format!("Parse error: {}", e),
            ));
        }
    };

    let id = value.get("id").cloned().unwrap_or(Value::Null);
    let request: RpcRequest = match serde_json::from_value(value) {
        Ok(request) => request,
        Err(e) => {
            return Some(RpcResponse::error(
                id,
                INVALID_REQUEST,
                format!("Invalid request: {}", e),
            ))
        }
    };

    if request.jsonrpc != JSONRPC_VERSION {
        return Some(RpcResponse::error(
            id,
            INVALID_REQUEST,
            format!("Unsupported jsonrpc version '{}'", request.jsonrpc),
        ));
    }

    if request.is_notification() {
        debug!("Notification: {}", request.method);
        return None;
    }

    Some(handle_request(state, request).await)
}

/// Handle a single request
async fn handle_request(state: &BridgeState, request: RpcRequest) -> RpcResponse {
    let id = request.id.unwrap_or(Value::Null);

    match request.method.as_str() {
        "initialize" => RpcResponse::success(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "serverInfo": {
                    "name": SERVER_NAME,
                    "version": env!("CARGO_PKG_VERSION")
                }
            }),
        ),

        "ping" => RpcResponse::success(id, json!({})),

        "tools/list" => RpcResponse::success(id, json!({ "tools": tools::list_tools() })),

        "tools/call" => {
            let params = request.params.unwrap_or(Value::Null);
            let Some(name) = params.get("name").and_then(Value::as_str) else {
                return RpcResponse::error(id, INVALID_PARAMS, "Missing tool name");
            };
            let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);

            let result = tools::call_tool(state, name, arguments).await;
            result_response(id, &result)
        }

        other => RpcResponse::error(id, METHOD_NOT_FOUND, format!("Method not found: {}", other)),
    }
}

/// Success response carrying `result`, or an internal error when it
/// cannot be encoded
fn result_response<T: Serialize>(id: Value, result: &T) -> RpcResponse {
    match serde_json::to_value(result) {
        Ok(value) => RpcResponse::success(id, value),
        Err(e) => {
            warn!("Cannot encode result: {}", e);
            RpcResponse::error(id, INTERNAL_ERROR, format!("Internal error: {}", e))
        }
    }
}
