//! The central Model Context Protocol engine
//!
//! Provides MCP method routing, capabilities negotiation (`initialize`), and the
//! tool/resource integrations behind the JSON-RPC dispatcher.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use crate::domain::{
    resources::{build_resources_list, handle_resources_read},
    tools::{build_tools_list, handle_tools_call},
};
use crate::mcp::{dispatcher::RpcHandler, rpc::RpcError};
use crate::{errors::AppError, AppState};

/// Newest first; the first entry is offered when a client asks for something unknown.
pub const SUPPORTED_PROTOCOL_VERSIONS: [&str; 3] = ["2025-06-18", "2025-03-26", "2024-11-05"];

/// Routes MCP methods to the observation tools and resources.
pub struct McpHandler {
    state: AppState,
}

impl McpHandler {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    async fn route(&self, method: &str, params: Option<Value>) -> Result<Value, RpcError> {
        match method {
            "initialize" => {
                let protocol_version = negotiate_protocol_version(params.as_ref())?;
                Ok(json!({
                    "protocolVersion": protocol_version,
                    "capabilities": {
                        "tools": {"listChanged": false},
                        "resources": {"subscribe": false, "listChanged": false},
                    },
                    "serverInfo": {
                        "name": env!("CARGO_PKG_NAME"),
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                }))
            }
            "ping" | "notifications/initialized" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": build_tools_list() })),
            "tools/call" => handle_tools_call(&self.state, params).await,
            "resources/list" => Ok(json!({ "resources": build_resources_list() })),
            "resources/read" => handle_resources_read(&self.state, params).await,
            _ => Err(RpcError::method_not_found()),
        }
    }
}

#[async_trait]
impl RpcHandler for McpHandler {
    async fn handle(&self, method: &str, params: Option<Value>) -> Result<Value, RpcError> {
        let audit_params = redact_audit_params(params.as_ref());
        let outcome = self.route(method, params).await;

        info!(
            method = %method,
            params = %audit_params,
            outcome = if outcome.is_ok() { "success" } else { "failure" },
            "mcp action audited"
        );

        outcome
    }
}

pub fn negotiate_protocol_version(params: Option<&Value>) -> Result<&'static str, AppError> {
    let offered_version = params
        .and_then(Value::as_object)
        .and_then(|object| object.get("protocolVersion"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|version| !version.is_empty())
        .ok_or_else(|| {
            AppError::bad_request(
                "invalid_protocol_version",
                "initialize params.protocolVersion is required",
            )
        })?;

    Ok(SUPPORTED_PROTOCOL_VERSIONS
        .into_iter()
        .find(|supported| *supported == offered_version)
        .unwrap_or(SUPPORTED_PROTOCOL_VERSIONS[0]))
}

pub fn redact_audit_params(params: Option<&Value>) -> Value {
    params.map(redact_audit_value).unwrap_or(Value::Null)
}

pub fn redact_audit_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| {
                    if is_sensitive_key(key) {
                        (key.clone(), Value::String("[REDACTED]".to_string()))
                    } else {
                        (key.clone(), redact_audit_value(item))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_audit_value).collect()),
        _ => value.clone(),
    }
}

pub fn is_sensitive_key(key: &str) -> bool {
    let normalized = key.trim().to_ascii_lowercase();
    matches!(
        normalized.as_str(),
        "authorization" | "bearer" | "api_key" | "apikey"
    ) || normalized.contains("token")
        || normalized.contains("secret")
        || normalized.contains("password")
        || normalized.contains("credential")
}

#[cfg(test)]
mod tests {
    use super::{negotiate_protocol_version, redact_audit_params, SUPPORTED_PROTOCOL_VERSIONS};
    use serde_json::json;

    #[test]
    fn redacts_sensitive_fields_in_audit_params() {
        let params = json!({
            "name": "record_observation",
            "arguments": {
                "title": "rotate deploy key",
                "api_key": "should-not-appear",
                "nested": {
                    "github_token": "should-not-appear",
                    "secret": "should-not-appear"
                },
                "files": [{"password": "should-not-appear"}]
            }
        });

        let redacted = redact_audit_params(Some(&params));

        assert_eq!(redacted["name"], json!("record_observation"));
        assert_eq!(redacted["arguments"]["title"], json!("rotate deploy key"));
        assert_eq!(redacted["arguments"]["api_key"], json!("[REDACTED]"));
        assert_eq!(
            redacted["arguments"]["nested"]["github_token"],
            json!("[REDACTED]")
        );
        assert_eq!(
            redacted["arguments"]["nested"]["secret"],
            json!("[REDACTED]")
        );
        assert_eq!(
            redacted["arguments"]["files"][0]["password"],
            json!("[REDACTED]")
        );
    }

    #[test]
    fn negotiate_protocol_version_echoes_supported_versions() {
        for version in SUPPORTED_PROTOCOL_VERSIONS {
            let params = json!({ "protocolVersion": version });
            assert_eq!(
                negotiate_protocol_version(Some(&params)).expect("supported version"),
                version
            );
        }
    }

    #[test]
    fn negotiate_protocol_version_offers_latest_for_unknown_version() {
        let params = json!({ "protocolVersion": "2026-01-01" });

        let version = negotiate_protocol_version(Some(&params)).expect("fallback version");
        assert_eq!(version, SUPPORTED_PROTOCOL_VERSIONS[0]);
    }

    #[test]
    fn negotiate_protocol_version_requires_a_version() {
        let error = negotiate_protocol_version(Some(&json!({}))).expect_err("missing version");
        assert!(error.to_string().contains("bad request"));
        assert!(negotiate_protocol_version(None).is_err());
    }
}
