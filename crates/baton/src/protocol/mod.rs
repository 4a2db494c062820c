//! MCP Protocol Dispatch
//!
//! Routes JSON-RPC methods to their handlers.
//!
//! Implements OpenTelemetry JSON-RPC semantic conventions for observability.
//! See: https://opentelemetry.io/docs/specs/semconv/rpc/json-rpc/

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::types::error::ErrorData;
use crate::types::jsonrpc::{JsonRpcMessage, OutboundMessage, RequestId};
use crate::types::progress::{ProgressNotification, ProgressToken, RequestMeta};
use crate::types::protocol::{
    InitializeParams, InitializeResult, Implementation, ServerCapabilities,
};
use crate::types::tool::{CallToolParams, CallToolResult, ListToolsResult, Tool};

/// Sends `notifications/progress` for one request.
#[derive(Clone)]
pub struct ProgressReporter {
    token: ProgressToken,
    outbound: mpsc::Sender<OutboundMessage>,
}

impl ProgressReporter {
    pub fn new(token: ProgressToken, outbound: mpsc::Sender<OutboundMessage>) -> Self {
        Self { token, outbound }
    }

    /// Report `progress` out of `total`. A closed channel is ignored.
    pub async fn report(&self, progress: f64, total: f64, message: impl Into<String>) {
        let notification =
            ProgressNotification::absolute(self.token.clone(), progress, total, message);
        let params = match serde_json::to_value(&notification) {
            Ok(params) => params,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize progress notification");
                return;
            }
        };

        let _ = self
            .outbound
            .send(OutboundMessage::Notification(JsonRpcMessage::notification(
                "notifications/progress",
                params,
            )))
            .await;
    }
}

/// Per-call context handed to tool implementations.
#[derive(Clone, Default)]
pub struct ToolContext {
    /// Id of the `tools/call` request, when invoked over a transport.
    pub request_id: Option<RequestId>,

    /// Present when the client asked for progress updates.
    pub progress: Option<ProgressReporter>,

    /// Cancelled when the client cancels the request or the server shuts down.
    pub cancellation: CancellationToken,
}

impl ToolContext {
    /// Build the context for an inbound request, picking the progress token
    /// out of `params._meta` if the client supplied one.
    pub fn for_request(
        message: &JsonRpcMessage,
        outbound: mpsc::Sender<OutboundMessage>,
        cancellation: CancellationToken,
    ) -> Self {
        let progress = message
            .params
            .as_ref()
            .and_then(|p| p.get("_meta"))
            .and_then(|m| serde_json::from_value::<RequestMeta>(m.clone()).ok())
            .and_then(|meta| meta.progress_token)
            .map(|token| ProgressReporter::new(token, outbound));

        Self {
            request_id: message.id.clone(),
            progress,
            cancellation,
        }
    }

    /// Send a progress update if the client asked for them.
    pub async fn report_progress(&self, progress: f64, total: f64, message: impl Into<String>) {
        if let Some(ref reporter) = self.progress {
            reporter.report(progress, total, message).await;
        }
    }

    pub fn has_progress(&self) -> bool {
        self.progress.is_some()
    }
}

/// Handler trait for MCP server implementations.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Return the list of available tools.
    fn tools(&self) -> Vec<Tool>;

    /// Execute a tool call.
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult, ErrorData>;

    /// Execute a tool call with access to progress reporting and cancellation.
    ///
    /// Default implementation calls `call_tool` (ignoring context).
    async fn call_tool_with_context(
        &self,
        name: &str,
        arguments: Value,
        _context: ToolContext,
    ) -> Result<CallToolResult, ErrorData> {
        self.call_tool(name, arguments).await
    }

    /// Return server implementation info.
    fn server_info(&self) -> Implementation;

    /// Return instructions for the LLM.
    fn instructions(&self) -> Option<String> {
        None
    }

    fn capabilities(&self) -> ServerCapabilities {
        ServerCapabilities::with_tools()
    }
}

/// Dispatch a JSON-RPC message to the appropriate handler.
///
/// Creates a span following JSON-RPC semantic conventions:
/// - `rpc.system` = "jsonrpc"
/// - `rpc.method` = the JSON-RPC method name
/// - `rpc.jsonrpc.version` = "2.0"
/// - `rpc.jsonrpc.request_id` = the request ID (if present)
///
/// Notifications resolve to `Value::Null`; the transport never answers them.
pub async fn dispatch<H: Handler + ?Sized>(
    handler: &H,
    message: &JsonRpcMessage,
    context: ToolContext,
) -> Result<Value, ErrorData> {
    let request_id_str = message
        .id
        .as_ref()
        .map(|id| id.to_string())
        .unwrap_or_default();

    let span = tracing::info_span!(
        "mcp.dispatch",
        rpc.system = "jsonrpc",
        rpc.method = %message.method,
        rpc.jsonrpc.version = "2.0",
        rpc.jsonrpc.request_id = %request_id_str,
        error.type = tracing::field::Empty,
        rpc.jsonrpc.error_code = tracing::field::Empty,
        rpc.jsonrpc.error_message = tracing::field::Empty,
    );

    async {
        let result = dispatch_inner(handler, message, context).await;

        if let Err(ref error) = result {
            record_error_on_span(error);
        }

        result
    }
    .instrument(span)
    .await
}

fn record_error_on_span(error: &ErrorData) {
    let span = tracing::Span::current();
    span.record("error.type", error_type_for_code(error.code));
    span.record("rpc.jsonrpc.error_code", error.code);
    span.record("rpc.jsonrpc.error_message", error.message.as_str());
}

/// Map JSON-RPC error codes to error.type values.
fn error_type_for_code(code: i32) -> &'static str {
    match code {
        ErrorData::PARSE_ERROR => "parse_error",
        ErrorData::INVALID_REQUEST => "invalid_request",
        ErrorData::METHOD_NOT_FOUND => "method_not_found",
        ErrorData::INVALID_PARAMS => "invalid_params",
        ErrorData::INTERNAL_ERROR => "internal_error",
        _ => "application_error",
    }
}

async fn dispatch_inner<H: Handler + ?Sized>(
    handler: &H,
    message: &JsonRpcMessage,
    context: ToolContext,
) -> Result<Value, ErrorData> {
    match message.method.as_str() {
        "initialize" => handle_initialize(handler, message),
        "ping" => Ok(serde_json::json!({})),
        "tools/list" => to_result(&ListToolsResult::all(handler.tools())),
        "tools/call" => handle_call_tool(handler, message, context).await,
        method if message.is_notification() => {
            tracing::debug!(method, "Ignoring notification");
            Ok(Value::Null)
        }
        _ => Err(ErrorData::method_not_found(&message.method)),
    }
}

fn handle_initialize<H: Handler + ?Sized>(
    handler: &H,
    request: &JsonRpcMessage,
) -> Result<Value, ErrorData> {
    let params: InitializeParams = parse_params(request, "initialize")?;

    tracing::info!(
        client.name = %params.client_info.name,
        client.version = %params.client_info.version,
        client.protocol_version = %params.protocol_version,
        "MCP client initialized"
    );

    let mut result = InitializeResult::new(handler.server_info(), handler.capabilities());
    if let Some(instructions) = handler.instructions() {
        result = result.with_instructions(instructions);
    }

    to_result(&result)
}

async fn handle_call_tool<H: Handler + ?Sized>(
    handler: &H,
    request: &JsonRpcMessage,
    context: ToolContext,
) -> Result<Value, ErrorData> {
    let params: CallToolParams = parse_params(request, "call")?;
    let arguments = params
        .arguments
        .unwrap_or_else(|| Value::Object(serde_json::Map::new()));

    let tool_span = tracing::info_span!(
        "mcp.tool.call",
        mcp.tool.name = %params.name,
        mcp.has_progress = %context.has_progress(),
    );

    async {
        let result = handler
            .call_tool_with_context(&params.name, arguments, context)
            .await?;
        to_result(&result)
    }
    .instrument(tool_span)
    .await
}

fn parse_params<T: serde::de::DeserializeOwned>(
    request: &JsonRpcMessage,
    what: &str,
) -> Result<T, ErrorData> {
    let params = request
        .params
        .clone()
        .ok_or_else(|| ErrorData::invalid_params(format!("Missing {} params", what)))?;

    serde_json::from_value(params)
        .map_err(|e| ErrorData::invalid_params(format!("Invalid {} params: {}", what, e)))
}

fn to_result<T: serde::Serialize>(result: &T) -> Result<Value, ErrorData> {
    serde_json::to_value(result)
        .map_err(|e| ErrorData::internal_error(format!("Failed to serialize result: {}", e)))
}
