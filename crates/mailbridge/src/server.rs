//! HTTP transport.
//!
//! A single endpoint at `/` takes JSON-RPC requests by POST. Anything that
//! is not a POST, or whose body is not UTF-8 JSON, is rejected before
//! dispatch with a plain-text status. Every dispatched request is answered
//! with 200 and a sanitized JSON body.

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use tracing::{debug, error};

use mailbridge_core::transport::{decode_request, encode_response};
use mailbridge_core::{Dispatcher, MailStore};

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Builds the service router.
pub fn router<S: MailStore>(dispatcher: Dispatcher<S>) -> Router {
    Router::new()
        .route("/", any(handle::<S>))
        .with_state(dispatcher)
}

async fn handle<S: MailStore>(
    State(dispatcher): State<Dispatcher<S>>,
    method: Method,
    body: Bytes,
) -> Response {
    if method != Method::POST {
        return (StatusCode::METHOD_NOT_ALLOWED, "POST only").into_response();
    }

    let request = match decode_request(&body) {
        Ok(request) => request,
        Err(err) => {
            debug!(%err, "Rejected request body");
            return (StatusCode::BAD_REQUEST, "Invalid JSON").into_response();
        }
    };

    debug!(method = %request.method, "Dispatching request");
    let response = dispatcher.handle(request).await;

    match encode_response(&response) {
        Ok(bytes) => ([(header::CONTENT_TYPE, JSON_CONTENT_TYPE)], bytes).into_response(),
        Err(err) => {
            error!(%err, "Failed to encode response");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use mailbridge_core::{MailService, MemoryStore, ServiceSettings};
    use serde_json::{Value, json};

    fn dispatcher() -> Dispatcher<MemoryStore> {
        let store = MemoryStore::from_json(
            &json!({
                "accounts": [{
                    "key": "account1", "name": "Home", "serverType": "none",
                    "identities": [{"key": "id1", "email": "me@home.net"}],
                    "defaultIdentity": "id1",
                    "root": {"name": "Local", "uri": "mailbox://local", "children": [{
                        "name": "Inbox", "uri": "mailbox://local/Inbox",
                        "messages": [{
                            "messageId": "hello@home.net",
                            "subject": "Gr\u{fc}\u{df}e \u{1F600}",
                            "author": "friend@home.net",
                            "date": "2024-05-01T12:00:00Z",
                        }],
                    }]},
                }],
            })
            .to_string(),
        )
        .unwrap();
        let service = MailService::new(Arc::new(store), ServiceSettings::default());
        Dispatcher::new(service)
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn rejects_other_methods() {
        let response = handle(State(dispatcher()), Method::GET, Bytes::new()).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body_text(response).await, "POST only");
    }

    #[tokio::test]
    async fn rejects_malformed_bodies() {
        for body in [&b"{not json"[..], &[0xff, 0xfe, b'{', b'}'][..]] {
            let response =
                handle(State(dispatcher()), Method::POST, Bytes::copy_from_slice(body)).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            assert_eq!(body_text(response).await, "Invalid JSON");
        }
    }

    #[tokio::test]
    async fn dispatch_errors_still_answer_ok() {
        let body = json!({"jsonrpc": "2.0", "id": 3, "method": "frobnicate"}).to_string();
        let response = handle(State(dispatcher()), Method::POST, Bytes::from(body)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/json; charset=utf-8"
        );

        let value: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(value["id"], 3);
        assert_eq!(value["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn serves_over_loopback() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            axum::serve(listener, router(dispatcher())).await.unwrap();
        });

        let response = reqwest::Client::new()
            .post(format!("http://{address}/"))
            .json(&json!({
                "jsonrpc": "2.0", "id": 1,
                "method": "searchMessages", "params": {"query": "gr\u{fc}"},
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);

        let value: Value = response.json().await.unwrap();
        let hits = value["result"].as_array().unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0]["subject"], "Gr\u{fc}\u{df}e \u{1F600}");

        server.abort();
    }
}
