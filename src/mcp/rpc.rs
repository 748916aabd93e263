//! JSON-RPC protocol representations and formatting utilities
//!
//! Provides the request, response and error objects exchanged on the wire, plus
//! the validation that turns a decoded JSON value into a [`Request`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const JSONRPC_VERSION: &str = "2.0";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;
pub const RESOURCE_NOT_FOUND: i64 = -32002;

/// Error object carried by a failed response. Handler-reported codes, messages
/// and data are passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("{message} ({code})")]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(code: i64, message: impl Into<String>, data: Value) -> Self {
        Self {
            code,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn parse_error() -> Self {
        Self::new(PARSE_ERROR, "Parse error")
    }

    pub fn invalid_request() -> Self {
        Self::new(INVALID_REQUEST, "Invalid Request")
    }

    pub fn method_not_found() -> Self {
        Self::new(METHOD_NOT_FOUND, "Method not found")
    }

    pub fn invalid_params() -> Self {
        Self::new(INVALID_PARAMS, "Invalid params")
    }

    pub fn internal() -> Self {
        Self::new(INTERNAL_ERROR, "Internal error")
    }
}

/// A validated request. `id` is `None` for notifications and
/// `Some(Value::Null)` for an explicit null id.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub id: Option<Value>,
    pub method: String,
    pub params: Option<Value>,
}

/// A request that failed validation, with the id to echo (null when the id
/// itself was unusable).
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidRequest {
    pub id: Value,
    pub error: RpcError,
}

#[derive(Debug, Deserialize)]
struct RequestFields {
    jsonrpc: String,
    method: String,
    #[serde(default)]
    params: Option<Value>,
}

impl Request {
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    pub fn from_value(payload: Value) -> Result<Self, InvalidRequest> {
        let Value::Object(object) = payload else {
            return Err(InvalidRequest {
                id: Value::Null,
                error: RpcError::invalid_request(),
            });
        };

        let id = object.get("id").cloned();
        if id.as_ref().is_some_and(|value| !is_valid_id(value)) {
            return Err(InvalidRequest {
                id: Value::Null,
                error: RpcError::invalid_request(),
            });
        }

        let echo_id = id.clone().unwrap_or(Value::Null);
        let invalid = || InvalidRequest {
            id: echo_id.clone(),
            error: RpcError::invalid_request(),
        };

        let fields: RequestFields =
            serde_json::from_value(Value::Object(object)).map_err(|_| invalid())?;
        if fields.jsonrpc != JSONRPC_VERSION || fields.method.trim().is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            id,
            method: fields.method,
            params: fields.params,
        })
    }
}

/// Strings, null and integers that fit `i64`/`u64`. Fractional or oversized
/// numbers are refused because they could not be echoed back exactly.
pub fn is_valid_id(value: &Value) -> bool {
    match value {
        Value::Null | Value::String(_) => true,
        Value::Number(number) => number.is_i64() || number.is_u64(),
        _ => false,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Result(Value),
    Error(RpcError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl Response {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            outcome: Outcome::Result(result),
        }
    }

    pub fn failure(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            outcome: Outcome::Error(error),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, Outcome::Error(_))
    }

    pub fn error(&self) -> Option<&RpcError> {
        match &self.outcome {
            Outcome::Error(error) => Some(error),
            Outcome::Result(_) => None,
        }
    }

    pub fn result(&self) -> Option<&Value> {
        match &self.outcome {
            Outcome::Result(result) => Some(result),
            Outcome::Error(_) => None,
        }
    }
}
