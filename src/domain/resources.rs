//! Model Context Protocol static resource providers
//!
//! Exposes recent observations and cache health as JSON documents under `resource://` URIs.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::domain::{tools::cached_search, utils::DEFAULT_SEARCH_LIMIT};
use crate::mcp::rpc::RpcError;
use crate::{errors::AppError, store::ObservationQuery, AppState};

pub const RECENT_OBSERVATIONS_URI: &str = "resource://observations/recent";
pub const CACHE_STATS_URI: &str = "resource://cache/stats";

#[derive(Debug, Deserialize)]
pub struct ReadResourceParams {
    pub uri: String,
}

pub fn build_resources_list() -> Vec<Value> {
    vec![
        json!({
            "uri": RECENT_OBSERVATIONS_URI,
            "name": "Recent Observations",
            "description": "The most recently recorded observations, newest first",
            "mimeType": "application/json",
        }),
        json!({
            "uri": CACHE_STATS_URI,
            "name": "Query Cache Statistics",
            "description": "Size, capacity and hit rate of the query cache",
            "mimeType": "application/json",
        }),
    ]
}

pub async fn handle_resources_read(
    state: &AppState,
    params: Option<Value>,
) -> Result<Value, RpcError> {
    let Some(raw_params) = params else {
        return Err(RpcError::invalid_params());
    };

    let resource_read: ReadResourceParams =
        serde_json::from_value(raw_params).map_err(|_| RpcError::invalid_params())?;

    let document = match resource_read.uri.as_str() {
        RECENT_OBSERVATIONS_URI => {
            let query = ObservationQuery {
                text: None,
                session_id: None,
                kind: None,
                limit: DEFAULT_SEARCH_LIMIT,
            };
            let observations = cached_search(state, &query).await?;
            json!({ "observations": observations })
        }
        CACHE_STATS_URI => json!({ "cache": state.cache.stats() }),
        _ => {
            return Err(AppError::not_found(
                "resource_not_found",
                format!("unknown resource uri {}", resource_read.uri),
            )
            .into())
        }
    };

    Ok(json!({
        "contents": [{
            "uri": resource_read.uri,
            "mimeType": "application/json",
            "text": document.to_string(),
        }]
    }))
}
