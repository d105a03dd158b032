//! # mailbridge-core
//!
//! Mail operations engine behind the `MailBridge` JSON-RPC service.
//!
//! This crate provides:
//! - The [`MailStore`] gateway trait and an in-memory adapter ([`MemoryStore`])
//! - Bounded, ordered folder-tree search
//! - Message retrieval with body fallback and attachment saving
//! - Outbound compose construction for send, reply and forward
//! - Read/flag/move/trash state mutation
//! - Account, folder, contact and calendar listing
//! - The JSON-RPC dispatcher, tool catalog and transport sanitizer

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod error;
pub mod rpc;
pub mod service;
pub mod store;
pub mod text;
pub mod transport;

pub use error::{Error, Result};
pub use rpc::{Dispatcher, JsonRpcError, JsonRpcRequest, JsonRpcResponse};
pub use service::{MailService, ServiceError, ServiceSettings};
pub use store::memory::{MemoryStore, StoreSnapshot};
pub use store::{MailStore, StoreError};
