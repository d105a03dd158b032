//! MCP bridge over stdio.
//!
//! Reads one JSON-RPC message per line from stdin and writes one response
//! per line to stdout. Session handshakes are answered locally, MCP tool
//! requests are translated to the service's direct tool methods, and
//! anything else is forwarded unchanged. Notifications produce no output.

use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info};

use mailbridge_core::rpc::LIST_TOOLS;
use mailbridge_core::{JsonRpcRequest, JsonRpcResponse};

use crate::client::{Backend, PARSE_ERROR};

/// MCP protocol revision announced on `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

enum Route {
    Reply(JsonRpcResponse),
    Silent,
    Forward,
}

fn route(request: &JsonRpcRequest) -> Route {
    let id = request.id.clone().unwrap_or(Value::Null);
    match request.method.as_str() {
        "initialize" => Route::Reply(JsonRpcResponse::success(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "serverInfo": { "name": "mailbridge", "version": env!("CARGO_PKG_VERSION") },
            }),
        )),
        "resources/list" => Route::Reply(JsonRpcResponse::success(id, json!({ "resources": [] }))),
        "prompts/list" => Route::Reply(JsonRpcResponse::success(id, json!({ "prompts": [] }))),
        method if method.starts_with("notifications/") => Route::Silent,
        _ => Route::Forward,
    }
}

async fn forward<B: Backend>(backend: &B, request: JsonRpcRequest) -> JsonRpcResponse {
    let method = request.method.clone();
    match method.as_str() {
        "tools/list" => {
            let direct = JsonRpcRequest {
                method: LIST_TOOLS.to_string(),
                params: None,
                ..request
            };
            backend.send_raw(&direct).await
        }
        "tools/call" => {
            let params = request.params.as_ref();
            let name = params
                .and_then(|p| p.get("name"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let arguments = params
                .and_then(|p| p.get("arguments"))
                .cloned()
                .unwrap_or_else(|| json!({}));

            let direct = JsonRpcRequest {
                method: name,
                params: Some(arguments),
                ..request
            };
            let response = backend.send_raw(&direct).await;

            match response.result {
                Some(result) => JsonRpcResponse::success(
                    response.id,
                    json!({
                        "content": [{ "type": "text", "text": result.to_string() }],
                    }),
                ),
                None => response,
            }
        }
        _ => backend.send_raw(&request).await,
    }
}

/// Handles one input line, returning the response to write, if any.
pub async fn handle_line<B: Backend>(backend: &B, line: &str) -> Option<JsonRpcResponse> {
    if line.trim().is_empty() {
        return None;
    }

    let request: JsonRpcRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(err) => {
            let id = serde_json::from_str::<Value>(line)
                .ok()
                .and_then(|value| value.get("id").cloned())
                .unwrap_or(Value::Null);
            return Some(JsonRpcResponse::error(
                id,
                PARSE_ERROR,
                format!("Parse error: {err}"),
            ));
        }
    };

    debug!(method = %request.method, "Bridge request");
    match route(&request) {
        Route::Reply(response) => Some(response),
        Route::Silent => None,
        Route::Forward => Some(forward(backend, request).await),
    }
}

/// Runs the bridge until stdin is closed.
///
/// # Errors
///
/// Returns an error if stdin cannot be read or stdout cannot be written.
pub async fn run<B: Backend>(backend: &B) -> anyhow::Result<()> {
    info!("MCP bridge started");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        if let Some(response) = handle_line(backend, &line).await {
            let mut bytes = serde_json::to_vec(&response)?;
            bytes.push(b'\n');
            stdout.write_all(&bytes).await?;
            stdout.flush().await?;
        }
    }

    info!("MCP bridge stopped");
    Ok(())
}
