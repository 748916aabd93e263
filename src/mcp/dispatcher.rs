//! Transport-independent JSON-RPC dispatch
//!
//! Turns one framed line into at most one response line. Parse failures,
//! invalid requests, handler errors and handler panics all come back as
//! well-formed error responses; nothing escapes [`Dispatcher::dispatch`].

use std::{sync::Arc, time::Instant};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error};

use crate::logging::log_rpc_summary;
use crate::mcp::rpc::{Request, Response, RpcError};

const ENCODE_FAILURE_LINE: &str =
    r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32603,"message":"Internal error"}}"#;

/// Executes a parsed request. Implementations own every piece of method
/// semantics; errors they return are forwarded to the caller verbatim.
#[async_trait]
pub trait RpcHandler: Send + Sync {
    async fn handle(&self, method: &str, params: Option<Value>) -> Result<Value, RpcError>;
}

/// Stateless dispatch core shared by every transport and connection.
#[derive(Clone)]
pub struct Dispatcher {
    handler: Arc<dyn RpcHandler>,
}

impl Dispatcher {
    pub fn new(handler: Arc<dyn RpcHandler>) -> Self {
        Self { handler }
    }

    /// Returns the serialized response, or `None` when nothing must be sent
    /// back (notifications and notification-only batches).
    /// `line` is raw bytes off the wire; anything that is not valid UTF-8 JSON
    /// is a parse error.
    pub async fn dispatch(&self, line: &[u8]) -> Option<String> {
        let payload: Value = match serde_json::from_slice(line) {
            Ok(payload) => payload,
            Err(err) => {
                debug!(error = %err, "rejecting malformed json-rpc line");
                return Some(encode(&Response::failure(
                    Value::Null,
                    RpcError::parse_error(),
                )));
            }
        };

        match payload {
            Value::Array(batch) if batch.is_empty() => Some(encode(&Response::failure(
                Value::Null,
                RpcError::invalid_request(),
            ))),
            Value::Array(batch) => self.dispatch_batch(batch).await.map(|batch| encode(&batch)),
            single => self
                .dispatch_value(single)
                .await
                .map(|response| encode(&response)),
        }
    }

    pub async fn dispatch_value(&self, payload: Value) -> Option<Response> {
        let request = match Request::from_value(payload) {
            Ok(request) => request,
            Err(invalid) => return Some(Response::failure(invalid.id, invalid.error)),
        };

        let started_at = Instant::now();
        let method = request.method.clone();
        let id = request.id.clone();
        let outcome = self.invoke(request).await;

        log_rpc_summary(&method, id.as_ref(), outcome.is_ok(), started_at.elapsed());

        let id = id?;
        Some(match outcome {
            Ok(result) => Response::success(id, result),
            Err(error) => Response::failure(id, error),
        })
    }

    async fn dispatch_batch(&self, batch: Vec<Value>) -> Option<Vec<Response>> {
        let mut responses = Vec::new();
        for item in batch {
            if let Some(response) = self.dispatch_value(item).await {
                responses.push(response);
            }
        }

        (!responses.is_empty()).then_some(responses)
    }

    async fn invoke(&self, request: Request) -> Result<Value, RpcError> {
        let handler = Arc::clone(&self.handler);
        let Request { method, params, .. } = request;
        let task_method = method.clone();

        match tokio::spawn(async move { handler.handle(&task_method, params).await }).await {
            Ok(outcome) => outcome,
            Err(join_error) => {
                error!(method = %method, error = %join_error, "handler task failed");
                Err(RpcError::internal())
            }
        }
    }
}

fn encode<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|err| {
        error!(error = %err, "failed to encode json-rpc response");
        ENCODE_FAILURE_LINE.to_string()
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::mcp::rpc::{INTERNAL_ERROR, INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR};

    struct EchoHandler;

    #[async_trait]
    impl RpcHandler for EchoHandler {
        async fn handle(&self, method: &str, params: Option<Value>) -> Result<Value, RpcError> {
            match method {
                "echo" => Ok(params.unwrap_or(Value::Null)),
                "fail" => Err(RpcError::with_data(-32010, "observation store busy", json!({"retry": true}))),
                "panic" => panic!("handler bug"),
                _ => Err(RpcError::method_not_found()),
            }
        }
    }

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(Arc::new(EchoHandler))
    }

    async fn dispatch(line: &str) -> Response {
        let encoded = dispatcher()
            .dispatch(line.as_bytes())
            .await
            .expect("response expected");
        serde_json::from_str(&encoded).expect("response must be valid json")
    }

    #[tokio::test]
    async fn malformed_json_yields_parse_error_with_null_id() {
        let response = dispatch("{not json").await;

        assert_eq!(response.id, Value::Null);
        assert_eq!(response.error().map(|error| error.code), Some(PARSE_ERROR));
    }

    #[tokio::test]
    async fn echo_round_trip_keeps_id() {
        let response =
            dispatch(r#"{"jsonrpc":"2.0","id":42,"method":"echo","params":{"text":"hi"}}"#).await;

        assert_eq!(response.id, json!(42));
        assert_eq!(response.result(), Some(&json!({"text": "hi"})));
    }

    #[tokio::test]
    async fn handler_errors_pass_through_verbatim() {
        let response = dispatch(r#"{"jsonrpc":"2.0","id":"a","method":"fail"}"#).await;

        let error = response.error().expect("error response");
        assert_eq!(response.id, json!("a"));
        assert_eq!(error.code, -32010);
        assert_eq!(error.message, "observation store busy");
        assert_eq!(error.data, Some(json!({"retry": true})));
    }

    #[tokio::test]
    async fn handler_panic_becomes_internal_error() {
        let response = dispatch(r#"{"jsonrpc":"2.0","id":5,"method":"panic"}"#).await;

        assert_eq!(response.id, json!(5));
        assert_eq!(response.error().map(|error| error.code), Some(INTERNAL_ERROR));
    }

    #[tokio::test]
    async fn unknown_method_is_reported() {
        let response = dispatch(r#"{"jsonrpc":"2.0","id":9,"method":"nope"}"#).await;

        assert_eq!(response.error().map(|error| error.code), Some(METHOD_NOT_FOUND));
    }

    #[tokio::test]
    async fn non_object_payload_is_invalid_request() {
        let response = dispatch("17").await;

        assert_eq!(response.id, Value::Null);
        assert_eq!(response.error().map(|error| error.code), Some(INVALID_REQUEST));
    }

    #[tokio::test]
    async fn notifications_produce_no_output() {
        let output = dispatcher()
            .dispatch(br#"{"jsonrpc":"2.0","method":"echo","params":[1]}"#)
            .await;

        assert_eq!(output, None);
    }

    #[tokio::test]
    async fn batch_collects_responses_and_skips_notifications() {
        let encoded = dispatcher()
            .dispatch(
                br#"[{"jsonrpc":"2.0","id":1,"method":"echo","params":1},{"jsonrpc":"2.0","method":"echo"},{"jsonrpc":"2.0","id":2,"method":"nope"}]"#,
            )
            .await
            .expect("batch response");
        let responses: Vec<Response> = serde_json::from_str(&encoded).expect("json array");

        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0].result(), Some(&json!(1)));
        assert_eq!(responses[1].id, json!(2));
        assert!(responses[1].is_error());
    }

    #[tokio::test]
    async fn empty_batch_is_a_single_invalid_request() {
        let encoded = dispatcher().dispatch(b"[]").await.expect("response");
        let response: Response = serde_json::from_str(&encoded).expect("single response object");

        assert_eq!(response.id, Value::Null);
        assert_eq!(response.error().map(|error| error.code), Some(INVALID_REQUEST));
    }

    #[tokio::test]
    async fn invalid_utf8_is_a_parse_error() {
        let mut line = br#"{"jsonrpc":"2.0","id":1,"method":"echo","params":""#.to_vec();
        line.push(0xff);
        line.extend_from_slice(br#""}"#);

        let encoded = dispatcher().dispatch(&line).await.expect("response");
        let response: Response = serde_json::from_str(&encoded).expect("valid response");

        assert_eq!(response.id, Value::Null);
        assert_eq!(response.error().map(|error| error.code), Some(PARSE_ERROR));
        assert_eq!(response.result(), None);
    }

    #[tokio::test]
    async fn notification_only_batch_produces_no_output() {
        let output = dispatcher()
            .dispatch(br#"[{"jsonrpc":"2.0","method":"echo"}]"#)
            .await;

        assert_eq!(output, None);
    }
}
