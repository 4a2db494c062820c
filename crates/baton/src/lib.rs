//! baton - Minimal MCP (Model Context Protocol) server library
//!
//! Implements the subset of MCP 2025-06-18 needed by a tool-only server
//! speaking newline-delimited JSON-RPC over stdio.
//!
//! # Features
//!
//! - **Handler**: Describe tools and execute tool calls with the `Handler` trait
//! - **Dispatch**: Route `initialize`, `ping`, `tools/list`, `tools/call`
//! - **Stdio transport**: Concurrent request handling, cancellation, progress
//!
//! # Example
//!
//! ```rust,ignore
//! use baton::{Handler, Tool, CallToolResult, Implementation};
//! use async_trait::async_trait;
//!
//! struct MyHandler;
//!
//! #[async_trait]
//! impl Handler for MyHandler {
//!     fn tools(&self) -> Vec<Tool> {
//!         vec![Tool::new("hello", "Say hello")]
//!     }
//!
//!     async fn call_tool(&self, name: &str, _args: serde_json::Value)
//!         -> Result<CallToolResult, baton::ErrorData>
//!     {
//!         Ok(CallToolResult::text("Hello!"))
//!     }
//!
//!     fn server_info(&self) -> Implementation {
//!         Implementation::new("my-server", "0.1.0")
//!     }
//! }
//!
//! let shutdown = tokio_util::sync::CancellationToken::new();
//! baton::serve_stdio(std::sync::Arc::new(MyHandler), shutdown).await?;
//! ```

pub mod protocol;
pub mod schema_helpers;
pub mod transport;
pub mod types;

// Re-export commonly used types at crate root
pub use types::content::Content;
pub use types::error::ErrorData;
pub use types::jsonrpc::{JsonRpcMessage, JsonRpcResponse, RequestId};
pub use types::progress::{ProgressNotification, ProgressToken};
pub use types::protocol::{Implementation, ServerCapabilities};
pub use types::tool::{CallToolResult, Tool, ToolAnnotations, ToolSchema};

pub use protocol::{dispatch, Handler, ProgressReporter, ToolContext};

pub use transport::{serve, serve_stdio, TransportError};

pub use schema_helpers::schema_for;
