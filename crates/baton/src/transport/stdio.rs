//! Stdio Transport
//!
//! One JSON-RPC message per line in each direction. Requests run as
//! independent tasks so a slow `tools/call` never blocks `ping` or a
//! `notifications/cancelled` aimed at it. All output funnels through a single
//! writer task so lines never interleave.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::TransportError;
use crate::protocol::{dispatch, Handler, ToolContext};
use crate::types::error::ErrorData;
use crate::types::jsonrpc::{JsonRpcErrorResponse, JsonRpcMessage, OutboundMessage, RequestId};

const OUTBOUND_BUFFER: usize = 64;

/// Requests that have been accepted but not yet answered.
type InFlight = Arc<DashMap<RequestId, CancellationToken>>;

/// Serve MCP on the process's stdin and stdout.
///
/// Returns when stdin closes or `shutdown` is cancelled. Either way every
/// in-flight request is cancelled and allowed to answer before returning.
pub async fn serve_stdio<H: Handler>(
    handler: Arc<H>,
    shutdown: CancellationToken,
) -> Result<(), TransportError> {
    serve(handler, tokio::io::stdin(), tokio::io::stdout(), shutdown).await
}

/// Serve MCP on an arbitrary reader/writer pair.
pub async fn serve<H, R, W>(
    handler: Arc<H>,
    reader: R,
    writer: W,
    shutdown: CancellationToken,
) -> Result<(), TransportError>
where
    H: Handler,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);
    let writer_task = tokio::spawn(write_loop(writer, outbound_rx));

    let session = shutdown.child_token();
    let in_flight: InFlight = Arc::new(DashMap::new());
    let mut tasks = JoinSet::new();
    let mut lines = BufReader::new(reader).lines();

    let read_result = loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("MCP transport shutting down");
                break Ok(());
            }
            line = lines.next_line() => line,
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                tracing::info!("MCP input closed");
                break Ok(());
            }
            Err(e) => break Err(TransportError::Io(e)),
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let message = match decode(line) {
            Ok(message) => message,
            Err(Some(reply)) => {
                let _ = outbound_tx.send(OutboundMessage::Error(reply)).await;
                continue;
            }
            Err(None) => continue,
        };

        match message.id.clone() {
            Some(id) => {
                let token = session.child_token();
                in_flight.insert(id.clone(), token.clone());

                let context = ToolContext::for_request(&message, outbound_tx.clone(), token);
                let handler = Arc::clone(&handler);
                let in_flight = Arc::clone(&in_flight);
                let outbound = outbound_tx.clone();

                tasks.spawn(async move {
                    let result = dispatch(handler.as_ref(), &message, context).await;

                    if in_flight.remove(&id).is_none() {
                        tracing::debug!(request_id = %id, "Request cancelled by client, dropping response");
                        return;
                    }

                    let _ = outbound.send(OutboundMessage::reply(id, result)).await;
                });
            }
            None if message.method == "notifications/cancelled" => {
                cancel_request(&in_flight, message.params.as_ref());
            }
            None => {
                let _ = dispatch(handler.as_ref(), &message, ToolContext::default()).await;
            }
        }

        while tasks.try_join_next().is_some() {}
    };

    // Whatever ended the read loop, nothing in flight should keep polling.
    session.cancel();
    while tasks.join_next().await.is_some() {}

    drop(outbound_tx);
    let write_result = writer_task
        .await
        .map_err(|e| TransportError::Writer(e.to_string()))?;

    read_result.and(write_result)
}

/// Decode one inbound line.
///
/// `Err(Some(_))` is an error reply to send back; `Err(None)` means the line
/// is silently ignored (responses to requests this server never makes).
fn decode(line: &str) -> Result<JsonRpcMessage, Option<JsonRpcErrorResponse>> {
    let value: Value = serde_json::from_str(line).map_err(|e| {
        tracing::warn!(error = %e, "Unparsable MCP input line");
        Some(JsonRpcErrorResponse::new(
            None,
            ErrorData::parse_error(format!("Invalid JSON: {}", e)),
        ))
    })?;

    let id = value
        .get("id")
        .and_then(|v| serde_json::from_value::<RequestId>(v.clone()).ok());

    if value.get("method").is_none() {
        if value.get("result").is_some() || value.get("error").is_some() {
            tracing::debug!("Ignoring JSON-RPC response from client");
            return Err(None);
        }
        return Err(Some(JsonRpcErrorResponse::new(
            id,
            ErrorData::invalid_request("Missing method"),
        )));
    }

    serde_json::from_value(value).map_err(|e| {
        Some(JsonRpcErrorResponse::new(
            id,
            ErrorData::invalid_request(format!("Invalid JSON-RPC: {}", e)),
        ))
    })
}

fn cancel_request(in_flight: &InFlight, params: Option<&Value>) {
    let Some(id) = params
        .and_then(|p| p.get("requestId"))
        .and_then(|v| serde_json::from_value::<RequestId>(v.clone()).ok())
    else {
        tracing::warn!("notifications/cancelled without a usable requestId");
        return;
    };

    let reason = params
        .and_then(|p| p.get("reason"))
        .and_then(|r| r.as_str())
        .unwrap_or("unspecified");

    match in_flight.remove(&id) {
        Some((_, token)) => {
            tracing::info!(request_id = %id, reason, "Client cancelled request");
            token.cancel();
        }
        None => tracing::debug!(request_id = %id, "Cancel for unknown or finished request"),
    }
}

async fn write_loop<W>(
    mut writer: W,
    mut outbound: mpsc::Receiver<OutboundMessage>,
) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = outbound.recv().await {
        let mut line = match serde_json::to_string(&message) {
            Ok(line) => line,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode outbound MCP message");
                continue;
            }
        };
        line.push('\n');

        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
    }

    Ok(())
}
