//! JSON-RPC dispatch.
//!
//! A request names one tool; [`ToolCall::parse`] turns the method name and
//! argument object into a typed call, and [`Dispatcher::handle`] runs it on a
//! spawned task and wraps the outcome in a response envelope. Expected
//! operation failures travel inside `result` as `{"error": ...}`; only
//! unknown methods, invalid arguments and crashed operations produce a
//! JSON-RPC `error` object.

pub mod tools;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use crate::service::{
    ContactSearchParams, CreateEventParams, ForwardParams, GetMessageParams, ListFoldersParams,
    MailService, ReplyParams, SearchParams, SendParams, ServiceError, UpdateParams,
};
use crate::store::MailStore;

/// JSON-RPC protocol version.
pub const JSONRPC_VERSION: &str = "2.0";

/// Method answered with the tool catalog.
pub const LIST_TOOLS: &str = "listTools";

/// A JSON-RPC request envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonRpcRequest {
    /// Protocol version, `"2.0"`.
    pub jsonrpc: String,
    /// Request ID echoed in the response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    /// Tool name.
    pub method: String,
    /// Argument object.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Creates a request for `method`.
    pub fn new(id: impl Into<Value>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id.into()),
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC error object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code.
    pub code: i64,
    /// Error message.
    pub message: String,
}

/// A JSON-RPC response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Protocol version, `"2.0"`.
    pub jsonrpc: String,
    /// ID of the request, `null` when it had none.
    #[serde(default)]
    pub id: Value,
    /// Result on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error on dispatch failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// A successful response.
    #[must_use]
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// An error response.
    pub fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

/// Dispatch-level failures, reported as JSON-RPC error objects.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// Method names no tool.
    #[error("Unknown tool: {0}")]
    UnknownMethod(String),

    /// Argument object does not fit the tool's parameters.
    #[error("Invalid params: {0}")]
    InvalidParams(#[source] serde_json::Error),

    /// Operation task panicked or was cancelled.
    #[error("Operation crashed: {0}")]
    Crashed(#[from] tokio::task::JoinError),

    /// Result could not be encoded.
    #[error("Internal error: {0}")]
    Internal(#[source] serde_json::Error),
}

impl RpcError {
    /// JSON-RPC error code.
    #[must_use]
    pub const fn code(&self) -> i64 {
        match self {
            Self::UnknownMethod(_) => -32601,
            Self::InvalidParams(_) => -32602,
            Self::Crashed(_) => -32000,
            Self::Internal(_) => -32603,
        }
    }
}

/// A typed tool invocation.
#[derive(Debug, Clone)]
pub enum ToolCall {
    /// `listTools`
    ListTools,
    /// `listAccounts`
    ListAccounts,
    /// `searchMessages`
    SearchMessages(SearchParams),
    /// `getMessage`
    GetMessage(GetMessageParams),
    /// `sendMail`
    SendMail(SendParams),
    /// `listCalendars`
    ListCalendars,
    /// `createEvent`
    CreateEvent(CreateEventParams),
    /// `searchContacts`
    SearchContacts(ContactSearchParams),
    /// `replyToMessage`
    ReplyToMessage(ReplyParams),
    /// `forwardMessage`
    ForwardMessage(ForwardParams),
    /// `listFolders`
    ListFolders(ListFoldersParams),
    /// `updateMessage`
    UpdateMessage(UpdateParams),
}

fn arguments<T: DeserializeOwned>(params: Value) -> Result<T, RpcError> {
    serde_json::from_value(params).map_err(RpcError::InvalidParams)
}

fn encode<T: Serialize>(value: T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(RpcError::Internal)
}

fn report<T: Serialize>(outcome: Result<T, ServiceError>) -> Result<Value, RpcError> {
    match outcome {
        Ok(value) => encode(value),
        Err(err) => {
            debug!(%err, "Operation failed");
            Ok(json!({ "error": err.to_string() }))
        }
    }
}

impl ToolCall {
    /// Builds a call from a method name and its argument object.
    ///
    /// Missing or `null` arguments are treated as an empty object.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::UnknownMethod`] for an unknown method and
    /// [`RpcError::InvalidParams`] when required arguments are missing or
    /// mistyped.
    pub fn parse(method: &str, params: Option<Value>) -> Result<Self, RpcError> {
        let params = match params {
            None | Some(Value::Null) => Value::Object(Map::new()),
            Some(params) => params,
        };
        Ok(match method {
            LIST_TOOLS => Self::ListTools,
            "listAccounts" => Self::ListAccounts,
            "searchMessages" => Self::SearchMessages(arguments(params)?),
            "getMessage" => Self::GetMessage(arguments(params)?),
            "sendMail" => Self::SendMail(arguments(params)?),
            "listCalendars" => Self::ListCalendars,
            "createEvent" => Self::CreateEvent(arguments(params)?),
            "searchContacts" => Self::SearchContacts(arguments(params)?),
            "replyToMessage" => Self::ReplyToMessage(arguments(params)?),
            "forwardMessage" => Self::ForwardMessage(arguments(params)?),
            "listFolders" => Self::ListFolders(arguments(params)?),
            "updateMessage" => Self::UpdateMessage(arguments(params)?),
            other => return Err(RpcError::UnknownMethod(other.to_string())),
        })
    }

    /// Whether `method` names a dispatchable tool.
    #[must_use]
    pub fn is_known(method: &str) -> bool {
        !matches!(
            Self::parse(method, None),
            Err(RpcError::UnknownMethod(_))
        )
    }

    /// Runs the call against `service`.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Internal`] if the result cannot be encoded.
    /// Operation failures are returned as `{"error": ...}` results.
    pub async fn execute<S: MailStore>(self, service: &MailService<S>) -> Result<Value, RpcError> {
        match self {
            Self::ListTools => Ok(json!({ "tools": tools::catalog() })),
            Self::ListAccounts => encode(service.list_accounts()),
            Self::SearchMessages(params) => encode(service.search(&params)),
            Self::GetMessage(params) => report(service.get_message(&params).await),
            Self::SendMail(params) => report(service.send(&params)),
            Self::ListCalendars => report(service.list_calendars()),
            Self::CreateEvent(params) => report(service.create_event(&params)),
            Self::SearchContacts(params) => encode(service.search_contacts(&params)),
            Self::ReplyToMessage(params) => report(service.reply(&params).await),
            Self::ForwardMessage(params) => report(service.forward(&params).await),
            Self::ListFolders(params) => encode(service.list_folders(&params)),
            Self::UpdateMessage(params) => report(service.update_message(&params).await),
        }
    }
}

/// Routes JSON-RPC requests to the mail operations.
pub struct Dispatcher<S> {
    service: MailService<S>,
}

impl<S> Clone for Dispatcher<S> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
        }
    }
}

impl<S: MailStore> Dispatcher<S> {
    /// Creates a dispatcher over `service`.
    #[must_use]
    pub const fn new(service: MailService<S>) -> Self {
        Self { service }
    }

    /// The underlying service.
    #[must_use]
    pub const fn service(&self) -> &MailService<S> {
        &self.service
    }

    /// Handles one request. Never fails: every outcome is an envelope.
    pub async fn handle(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id.unwrap_or(Value::Null);
        let method = request.method;

        let outcome = match ToolCall::parse(&method, request.params) {
            Ok(call) => {
                let service = self.service.clone();
                tokio::spawn(async move { call.execute(&service).await })
                    .await
                    .map_err(RpcError::from)
                    .and_then(|result| result)
            }
            Err(err) => Err(err),
        };

        match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(err) => {
                warn!(%method, code = err.code(), %err, "Request failed");
                JsonRpcResponse::error(id, err.code(), err.to_string())
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::service::fixtures::{self, INBOX};

    fn dispatcher() -> Dispatcher<crate::store::memory::MemoryStore> {
        let (service, _) = fixtures::service(fixtures::store());
        Dispatcher::new(service)
    }

    #[test]
    fn missing_params_mean_empty_object() {
        assert!(matches!(
            ToolCall::parse("searchMessages", None).unwrap(),
            ToolCall::SearchMessages(_)
        ));
        assert!(matches!(
            ToolCall::parse("listFolders", Some(Value::Null)).unwrap(),
            ToolCall::ListFolders(_)
        ));
    }

    #[test]
    fn required_params_are_validated() {
        let err = ToolCall::parse("getMessage", Some(json!({"messageId": "x"}))).unwrap_err();
        assert_eq!(err.code(), -32602);
        assert!(err.to_string().contains("folderPath"));
    }

    #[test]
    fn unknown_method() {
        let err = ToolCall::parse("deleteEverything", None).unwrap_err();
        assert_eq!(err.code(), -32601);
        assert_eq!(err.to_string(), "Unknown tool: deleteEverything");
        assert!(!ToolCall::is_known("deleteEverything"));
        assert!(ToolCall::is_known(LIST_TOOLS));
    }

    #[tokio::test]
    async fn list_tools_envelope() {
        let response = dispatcher()
            .handle(JsonRpcRequest::new(1, LIST_TOOLS, None))
            .await;
        assert_eq!(response.id, json!(1));
        assert!(response.error.is_none());
        let tools = &response.result.unwrap()["tools"];
        assert_eq!(tools.as_array().unwrap().len(), 11);
    }

    #[tokio::test]
    async fn operation_errors_stay_in_result() {
        let response = dispatcher()
            .handle(JsonRpcRequest::new(
                "a",
                "getMessage",
                Some(json!({"messageId": "nope", "folderPath": INBOX})),
            ))
            .await;
        assert!(response.error.is_none());
        assert_eq!(
            response.result.unwrap(),
            json!({"error": "Message not found: nope"})
        );
    }

    #[tokio::test]
    async fn dispatch_errors_use_error_object() {
        let response = dispatcher()
            .handle(JsonRpcRequest {
                method: "nope".to_string(),
                ..JsonRpcRequest::default()
            })
            .await;
        assert_eq!(response.id, Value::Null);
        assert!(response.result.is_none());
        assert_eq!(response.error.unwrap().code, -32601);
    }

    /// Store whose every capability panics.
    struct CrashingStore;

    impl MailStore for CrashingStore {
        fn accounts(&self) -> Vec<crate::store::Account> {
            panic!("store crashed")
        }
        fn default_account(&self) -> Option<crate::store::Account> {
            panic!("store crashed")
        }
        fn folder(&self, _: &str) -> Option<crate::store::Folder> {
            panic!("store crashed")
        }
        fn subfolders(&self, _: &str) -> Vec<crate::store::Folder> {
            panic!("store crashed")
        }
        fn trash_folder(&self, _: &str) -> Option<crate::store::Folder> {
            panic!("store crashed")
        }
        fn refresh_folder(&self, _: &str) -> Result<(), crate::store::StoreError> {
            panic!("store crashed")
        }
        fn headers(
            &self,
            _: &str,
        ) -> Result<Vec<crate::store::MessageHeader>, crate::store::StoreError> {
            panic!("store crashed")
        }
        fn mark_read(
            &self,
            _: &str,
            _: crate::store::MessageKey,
            _: bool,
        ) -> Result<(), crate::store::StoreError> {
            panic!("store crashed")
        }
        fn mark_flagged(
            &self,
            _: &str,
            _: crate::store::MessageKey,
            _: bool,
        ) -> Result<(), crate::store::StoreError> {
            panic!("store crashed")
        }
        fn copy_messages(
            &self,
            _: &str,
            _: &[crate::store::MessageKey],
            _: &str,
            _: bool,
            _: crate::store::CopyListener,
        ) {
            panic!("store crashed")
        }
        async fn fetch_mime(
            &self,
            _: &str,
            _: crate::store::MessageKey,
        ) -> Result<Option<crate::store::MimeMessage>, crate::store::StoreError> {
            panic!("store crashed")
        }
        async fn fetch_attachment(&self, _: &str) -> Result<Vec<u8>, crate::store::StoreError> {
            panic!("store crashed")
        }
        fn open_compose(
            &self,
            _: crate::store::ComposeRequest,
        ) -> Result<(), crate::store::StoreError> {
            panic!("store crashed")
        }
        fn address_books(&self) -> Vec<crate::store::AddressBook> {
            panic!("store crashed")
        }
        fn calendars(&self) -> Result<Vec<crate::store::Calendar>, crate::store::StoreError> {
            panic!("store crashed")
        }
        fn open_event_editor(
            &self,
            _: crate::store::CalendarEvent,
        ) -> Result<(), crate::store::StoreError> {
            panic!("store crashed")
        }
    }

    #[tokio::test]
    async fn crashed_operations_use_error_object() {
        let service = MailService::new(
            std::sync::Arc::new(CrashingStore),
            crate::service::ServiceSettings::default(),
        );
        let dispatcher = Dispatcher::new(service);

        for (id, method) in [(1, "listAccounts"), (2, "searchMessages"), (3, "listCalendars")] {
            let response = dispatcher
                .handle(JsonRpcRequest::new(id, method, Some(json!({}))))
                .await;
            assert_eq!(response.id, json!(id));
            assert!(response.result.is_none());
            let error = response.error.unwrap();
            assert_eq!(error.code, -32000);
            assert!(error.message.starts_with("Operation crashed"));
        }
    }

    #[test]
    fn response_serialization_omits_absent_members() {
        let ok = serde_json::to_value(JsonRpcResponse::success(json!(7), json!([]))).unwrap();
        assert_eq!(ok, json!({"jsonrpc": "2.0", "id": 7, "result": []}));

        let err = serde_json::to_value(JsonRpcResponse::error(Value::Null, -32601, "x")).unwrap();
        assert_eq!(
            err,
            json!({"jsonrpc": "2.0", "id": null, "error": {"code": -32601, "message": "x"}})
        );
    }
}
