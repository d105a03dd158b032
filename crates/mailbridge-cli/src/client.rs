//! JSON-RPC client for the `MailBridge` service.

use std::future::Future;
use std::time::Duration;

use anyhow::Context;
use serde_json::Value;
use tracing::debug;

use mailbridge_core::transport::repair_json;
use mailbridge_core::{JsonRpcRequest, JsonRpcResponse};

/// Error code for connection and read failures.
pub const TRANSPORT_ERROR: i64 = -32603;

/// Error code for unparseable responses.
pub const PARSE_ERROR: i64 = -32700;

/// Something that answers JSON-RPC requests.
pub trait Backend: Send + Sync {
    /// Sends a request. Failures are reported as error responses.
    fn send_raw(&self, request: &JsonRpcRequest) -> impl Future<Output = JsonRpcResponse> + Send;
}

/// HTTP client for the service endpoint.
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    url: String,
}

impl Client {
    /// Creates a client for `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }

    /// Calls a tool and returns its result.
    ///
    /// # Errors
    ///
    /// Returns the JSON-RPC error message if the call failed at transport or
    /// dispatch level. Operation failures come back as `{"error": ...}` results.
    pub async fn call_tool(&self, name: &str, args: Value) -> anyhow::Result<Value> {
        let request = JsonRpcRequest::new(1, name, Some(args));
        let response = self.send_raw(&request).await;

        if let Some(error) = response.error {
            anyhow::bail!("{}", error.message);
        }

        response.result.context("No result in response")
    }
}

impl Backend for Client {
    async fn send_raw(&self, request: &JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id.clone().unwrap_or(Value::Null);

        let response = match self.http.post(&self.url).json(request).send().await {
            Ok(response) => response,
            Err(err) => {
                return JsonRpcResponse::error(
                    id,
                    TRANSPORT_ERROR,
                    format!("Connection failed: {err}. Is the MailBridge service running?"),
                );
            }
        };

        let status = response.status();
        let body = match response.bytes().await {
            Ok(body) => body,
            Err(err) => {
                return JsonRpcResponse::error(
                    id,
                    TRANSPORT_ERROR,
                    format!("Failed to read response body: {err}"),
                );
            }
        };

        if !status.is_success() {
            let text = String::from_utf8_lossy(&body);
            return JsonRpcResponse::error(
                id,
                TRANSPORT_ERROR,
                format!("Service answered {status}: {}", text.trim()),
            );
        }

        parse_response(id, &body)
    }
}

/// Parses a response body, retrying once after repairing it.
#[must_use]
pub fn parse_response(id: Value, body: &[u8]) -> JsonRpcResponse {
    let text = String::from_utf8_lossy(body);
    if let Ok(response) = serde_json::from_str(&text) {
        return response;
    }

    debug!(len = text.len(), "Response is not valid JSON, repairing");
    match serde_json::from_str(&repair_json(&text)) {
        Ok(response) => response,
        Err(err) => JsonRpcResponse::error(
            id,
            PARSE_ERROR,
            format!("Invalid JSON from MailBridge: {err}"),
        ),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::routing::post;
    use serde_json::json;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{address}/")
    }

    #[test]
    fn parses_clean_responses() {
        let response = parse_response(json!(1), br#"{"jsonrpc":"2.0","id":1,"result":[1,2]}"#);
        assert_eq!(response.result, Some(json!([1, 2])));
    }

    #[test]
    fn repairs_raw_control_characters() {
        let body = b"{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{\"body\":\"one\ntwo\tthree\x01\"}}";
        let response = parse_response(json!(1), body);
        assert_eq!(response.result, Some(json!({"body": "one\ntwo\tthree"})));
    }

    #[test]
    fn unrepairable_bodies_are_parse_errors() {
        let response = parse_response(json!(9), b"<html>oops</html>");
        assert_eq!(response.id, json!(9));
        let error = response.error.unwrap();
        assert_eq!(error.code, PARSE_ERROR);
        assert!(error.message.starts_with("Invalid JSON from MailBridge"));
    }

    #[tokio::test]
    async fn connection_failures_are_error_responses() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap();
        drop(listener);

        let client = Client::new(format!("http://{address}/"), Duration::from_secs(5)).unwrap();
        let response = client
            .send_raw(&JsonRpcRequest::new(4, "listAccounts", None))
            .await;
        assert_eq!(response.id, json!(4));
        let error = response.error.unwrap();
        assert_eq!(error.code, TRANSPORT_ERROR);
        assert!(error.message.starts_with("Connection failed"));

        let err = client.call_tool("listAccounts", json!({})).await.unwrap_err();
        assert!(err.to_string().starts_with("Connection failed"));
    }

    #[tokio::test]
    async fn call_tool_returns_result() {
        let url = serve(Router::new().route(
            "/",
            post(|| async { "{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{\"note\":\"a\nb\"}}" }),
        ))
        .await;

        let client = Client::new(url, Duration::from_secs(5)).unwrap();
        let result = client.call_tool("getMessage", json!({})).await.unwrap();
        assert_eq!(result, json!({"note": "a\nb"}));
    }

    #[tokio::test]
    async fn dispatch_errors_become_client_errors() {
        let url = serve(Router::new().route(
            "/",
            post(|| async {
                axum::Json(json!({
                    "jsonrpc": "2.0", "id": 1,
                    "error": {"code": -32601, "message": "Unknown tool: nope"},
                }))
            }),
        ))
        .await;

        let client = Client::new(url, Duration::from_secs(5)).unwrap();
        let err = client.call_tool("nope", json!({})).await.unwrap_err();
        assert_eq!(err.to_string(), "Unknown tool: nope");
    }
}
