//! Interactive tools exposed via Model Context Protocol
//!
//! Provides `record_observation`, `search_observations`, `get_observation` and
//! `memory_stats`. Lookups are memoized in the shared query cache; recording an
//! observation drops every cached search.

use std::sync::LazyLock;

use chrono::{SecondsFormat, Utc};
use regex::Regex;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::domain::utils::{
    normalize_content, normalize_files, normalize_kind, normalize_query_text,
    normalize_search_limit, normalize_session_id, normalize_title, preview,
};
use crate::mcp::rpc::{RpcError, METHOD_NOT_FOUND};
use crate::{
    errors::AppError,
    store::{NewObservation, ObservationQuery},
    AppState,
};

static SEARCH_KEYS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^search:").expect("search key pattern is valid"));

#[derive(Debug, Deserialize)]
pub struct ToolCallParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct RecordObservationArgs {
    pub session_id: String,
    pub kind: String,
    pub title: String,
    pub content: String,
    pub files: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchObservationsArgs {
    pub query: Option<String>,
    pub session_id: Option<String>,
    pub kind: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct GetObservationArgs {
    pub id: u64,
}

pub fn build_tools_list() -> Vec<Value> {
    vec![
        json!({
            "name": "record_observation",
            "description": "Record an observation from the current coding session",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "session_id": {"type": "string"},
                    "kind": {
                        "type": "string",
                        "enum": ["decision", "bugfix", "feature", "refactor", "discovery", "change"]
                    },
                    "title": {"type": "string", "maxLength": 200},
                    "content": {"type": "string"},
                    "files": {"type": "array", "items": {"type": "string"}}
                },
                "required": ["session_id", "kind", "title", "content"]
            }
        }),
        json!({
            "name": "search_observations",
            "description": "Search recorded observations, newest first",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "session_id": {"type": "string"},
                    "kind": {"type": "string"},
                    "limit": {"type": "integer", "minimum": 1, "maximum": 100}
                }
            }
        }),
        json!({
            "name": "get_observation",
            "description": "Fetch one observation by id",
            "inputSchema": {
                "type": "object",
                "properties": {"id": {"type": "integer", "minimum": 1}},
                "required": ["id"]
            }
        }),
        json!({
            "name": "memory_stats",
            "description": "Observation count and query cache statistics",
            "inputSchema": {"type": "object", "properties": {}}
        }),
    ]
}

pub fn build_new_observation(args: RecordObservationArgs) -> Result<NewObservation, AppError> {
    Ok(NewObservation {
        session_id: normalize_session_id(&args.session_id)?,
        kind: normalize_kind(&args.kind)?,
        title: normalize_title(&args.title)?,
        content: normalize_content(&args.content)?,
        files: normalize_files(args.files)?,
    })
}

pub fn build_search_query(args: SearchObservationsArgs) -> Result<ObservationQuery, AppError> {
    Ok(ObservationQuery {
        text: normalize_query_text(args.query),
        session_id: args
            .session_id
            .as_deref()
            .map(normalize_session_id)
            .transpose()?,
        kind: args.kind.as_deref().map(normalize_kind).transpose()?,
        limit: normalize_search_limit(args.limit)?,
    })
}

pub async fn handle_tools_call(state: &AppState, params: Option<Value>) -> Result<Value, RpcError> {
    let Some(raw_params) = params else {
        return Err(RpcError::invalid_params());
    };

    let tool_call: ToolCallParams =
        serde_json::from_value(raw_params).map_err(|_| RpcError::invalid_params())?;
    let arguments = tool_call.arguments.unwrap_or_else(|| json!({}));

    let outcome = match tool_call.name.as_str() {
        "record_observation" => record_observation(state, parse_arguments(arguments)?).await,
        "search_observations" => search_observations(state, parse_arguments(arguments)?).await,
        "get_observation" => get_observation(state, parse_arguments(arguments)?).await,
        "memory_stats" => memory_stats(state).await,
        _ => {
            return Err(RpcError::with_data(
                METHOD_NOT_FOUND,
                "Method not found",
                json!({
                    "code": "tool_not_found",
                    "message": "unknown tool name",
                    "details": {
                        "name": tool_call.name,
                    },
                }),
            ))
        }
    };

    outcome.map_err(RpcError::from)
}

/// Runs `query` through the cache, keyed by its canonical JSON form.
pub async fn cached_search(state: &AppState, query: &ObservationQuery) -> Result<Value, AppError> {
    let encoded = serde_json::to_string(query)
        .map_err(|err| AppError::internal(format!("failed to encode search key: {err}")))?;
    let key = format!("search:{encoded}");

    state
        .cache
        .try_get_or_set(&key, || async move {
            let observations = state.store.search(query).await?;
            serde_json::to_value(observations)
                .map_err(|err| AppError::internal(format!("failed to encode observations: {err}")))
        })
        .await
}

fn parse_arguments<T: DeserializeOwned>(arguments: Value) -> Result<T, RpcError> {
    serde_json::from_value(arguments).map_err(|_| RpcError::invalid_params())
}

async fn record_observation(
    state: &AppState,
    args: RecordObservationArgs,
) -> Result<Value, AppError> {
    let observation = state.store.record(build_new_observation(args)?).await?;
    let invalidated = state.cache.invalidate_pattern(&SEARCH_KEYS);
    debug!(
        id = observation.id,
        invalidated, "recorded observation and invalidated cached searches"
    );

    Ok(tool_result(
        format!(
            "Recorded {} observation {}: {}",
            observation.kind,
            observation.id,
            preview(&observation.title, 80)
        ),
        json!({ "observation": observation }),
    ))
}

async fn search_observations(
    state: &AppState,
    args: SearchObservationsArgs,
) -> Result<Value, AppError> {
    let query = build_search_query(args)?;
    let observations = cached_search(state, &query).await?;
    let returned = observations.as_array().map_or(0, Vec::len);
    let generated_at_utc = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);

    Ok(tool_result(
        format!("Returned {returned} observations"),
        json!({
            "observations": observations,
            "returned": returned,
            "truncated": returned >= query.limit,
            "generated_at_utc": generated_at_utc,
        }),
    ))
}

async fn get_observation(state: &AppState, args: GetObservationArgs) -> Result<Value, AppError> {
    let id = args.id;
    let key = format!("observation:{id}");
    let observation = state
        .cache
        .try_get_or_set(&key, || async move {
            let observation = state.store.get(id).await?.ok_or_else(|| {
                AppError::not_found("observation_not_found", format!("no observation with id {id}"))
            })?;
            serde_json::to_value(observation)
                .map_err(|err| AppError::internal(format!("failed to encode observation: {err}")))
        })
        .await?;

    let title = observation
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or_default();
    Ok(tool_result(
        format!("Observation {id}: {}", preview(title, 80)),
        json!({ "observation": observation }),
    ))
}

async fn memory_stats(state: &AppState) -> Result<Value, AppError> {
    let observations = state.store.count().await?;
    let cache = state.cache.stats();

    Ok(tool_result(
        format!(
            "{observations} observations; {} of {} cache slots used",
            cache.size, cache.max_size
        ),
        json!({
            "observations": observations,
            "cache": cache,
        }),
    ))
}

fn tool_result(summary: String, structured_content: Value) -> Value {
    json!({
        "content": [{"type": "text", "text": summary}],
        "structuredContent": structured_content,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_args(kind: &str, title: &str) -> RecordObservationArgs {
        RecordObservationArgs {
            session_id: "session-1".to_string(),
            kind: kind.to_string(),
            title: title.to_string(),
            content: "framer keeps the tail between reads".to_string(),
            files: None,
        }
    }

    #[test]
    fn builds_observation_from_valid_args() {
        let observation =
            build_new_observation(record_args("Discovery", "  Framer tail  ")).expect("valid args");

        assert_eq!(observation.title, "Framer tail");
        assert_eq!(observation.kind.as_str(), "discovery");
        assert!(observation.files.is_empty());
    }

    #[test]
    fn rejects_unknown_kind() {
        let error = build_new_observation(record_args("musing", "title")).expect_err("bad kind");
        assert!(error.to_string().contains("bad request"));
    }

    #[test]
    fn rejects_blank_content() {
        let mut args = record_args("bugfix", "title");
        args.content = "  \n ".to_string();

        let error = build_new_observation(args).expect_err("blank content");
        assert!(error.to_string().contains("bad request"));
    }

    #[test]
    fn search_query_defaults() {
        let query = build_search_query(SearchObservationsArgs::default()).expect("valid query");

        assert_eq!(query.text, None);
        assert_eq!(query.kind, None);
        assert_eq!(query.limit, 20);
    }

    #[test]
    fn search_query_rejects_bad_limit() {
        let error = build_search_query(SearchObservationsArgs {
            limit: Some(500),
            ..SearchObservationsArgs::default()
        })
        .expect_err("limit too large");
        assert!(error.to_string().contains("bad request"));
    }

    #[test]
    fn tool_list_names_every_tool() {
        let names = build_tools_list()
            .iter()
            .filter_map(|tool| tool["name"].as_str().map(str::to_string))
            .collect::<Vec<_>>();

        assert_eq!(
            names,
            vec![
                "record_observation",
                "search_observations",
                "get_observation",
                "memory_stats"
            ]
        );
    }
}
