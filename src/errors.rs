use serde_json::json;
use thiserror::Error;

use crate::mcp::rpc::{RpcError, INTERNAL_ERROR, INVALID_PARAMS, RESOURCE_NOT_FOUND};

/// Failures raised by the observation handlers.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("bad request: {message}")]
    BadRequest {
        code: &'static str,
        message: &'static str,
    },
    #[error("not found: {message}")]
    NotFound { code: &'static str, message: String },
    #[error("internal error")]
    Internal { code: &'static str, message: String },
}

impl AppError {
    pub fn bad_request(code: &'static str, message: &'static str) -> Self {
        Self::BadRequest { code, message }
    }

    pub fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        Self::NotFound {
            code,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            code: "internal_error",
            message: message.into(),
        }
    }
}

impl From<AppError> for RpcError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::BadRequest { code, message } => RpcError::with_data(
                INVALID_PARAMS,
                "Invalid params",
                json!({
                    "code": code,
                    "message": message,
                    "details": {}
                }),
            ),
            AppError::NotFound { code, message } => RpcError::with_data(
                RESOURCE_NOT_FOUND,
                "Not found",
                json!({
                    "code": code,
                    "message": message,
                    "details": {}
                }),
            ),
            AppError::Internal { code, message } => {
                tracing::error!(code, error = %message, "request failed with internal error");
                RpcError::new(INTERNAL_ERROR, "Internal error")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_request_maps_to_invalid_params_with_data() {
        let error = RpcError::from(AppError::bad_request("invalid_kind", "kind is not supported"));

        assert_eq!(error.code, INVALID_PARAMS);
        assert_eq!(error.message, "Invalid params");
        let data = error.data.expect("data should be present");
        assert_eq!(data["code"], "invalid_kind");
        assert_eq!(data["message"], "kind is not supported");
    }

    #[test]
    fn internal_error_hides_detail() {
        let error = RpcError::from(AppError::internal("store lock poisoned"));

        assert_eq!(error.code, INTERNAL_ERROR);
        assert_eq!(error.message, "Internal error");
        assert!(error.data.is_none());
    }

    #[test]
    fn not_found_keeps_message_in_data() {
        let error = RpcError::from(AppError::not_found("observation_not_found", "no observation 9"));

        assert_eq!(error.code, RESOURCE_NOT_FOUND);
        assert_eq!(
            error.data.expect("data should be present")["message"],
            "no observation 9"
        );
    }
}
