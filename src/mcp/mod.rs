//! Model Context Protocol (MCP) server handling and JSON-RPC implementations
//!
//! Provides line framing, JSON-RPC validation and dispatch, and MCP method routing.

pub mod dispatcher;
pub mod framer;
pub mod rpc;
pub mod server;
