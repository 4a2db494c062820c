//! MCP Protocol Types
//!
//! The subset of MCP 2025-06-18 types a tool-only server exchanges:
//!
//! - `jsonrpc` - JSON-RPC 2.0 envelopes
//! - `error` - error data with standard codes
//! - `protocol` - initialize handshake and capabilities
//! - `tool` - tool definitions and call results
//! - `content` - content blocks in results
//! - `progress` - progress notifications for long-running calls

pub mod content;
pub mod error;
pub mod jsonrpc;
pub mod progress;
pub mod protocol;
pub mod tool;
