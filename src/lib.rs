use std::sync::Arc;

use serde_json::Value;

pub mod cache;
pub mod config;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod mcp;
pub mod store;
pub mod transport;

use cache::QueryCache;
use mcp::{dispatcher::Dispatcher, server::McpHandler};
use store::ObservationStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ObservationStore>,
    pub cache: Arc<QueryCache<Value>>,
}

impl AppState {
    pub fn new(store: Arc<dyn ObservationStore>, cache: Arc<QueryCache<Value>>) -> Self {
        Self { store, cache }
    }
}

/// Wires the MCP handler into a dispatcher that every transport can share.
pub fn build_dispatcher(state: AppState) -> Dispatcher {
    Dispatcher::new(Arc::new(McpHandler::new(state)))
}
