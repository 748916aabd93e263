//! Observation tools and resources
//!
//! Provides the memory-service behaviour exposed over the MCP protocol

pub mod resources;
pub mod tools;
pub mod utils;
