//! MCP Transports
//!
//! Only the stdio transport is provided: newline-delimited JSON-RPC on a
//! reader/writer pair, normally the process's stdin and stdout.

mod stdio;

pub use stdio::{serve, serve_stdio};

use thiserror::Error;

/// Failures that stop a transport loop.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error on MCP channel: {0}")]
    Io(#[from] std::io::Error),

    #[error("MCP writer task failed: {0}")]
    Writer(String),
}
