//! Wire format between the bridge and the MCP server child.
//!
//! # Architecture
//!
//! - **protocol**: JSON-RPC 2.0 message types and MCP method names
//! - **codec**: newline-delimited JSON framing for the child's stdio

pub mod codec;
pub mod protocol;
