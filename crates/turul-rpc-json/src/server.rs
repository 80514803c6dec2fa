//! JSON-RPC 2.0 server codec

use serde_json::Value;
use tracing::warn;
use turul_rpc_layer::{LayerOptions, ServerCodec, ServerFault, ServerResult, ValidatedCall};

use crate::JSONRPC_VERSION;
use crate::response::{JsonRpcError, JsonRpcMessage, JsonRpcResponse};
use crate::types::RequestId;

/// Basic-auth realm reported when no `realm` option is given
pub const DEFAULT_REALM: &str = "JsonRPC";

const INVALID_REQUEST_MESSAGE: &str = "Invalid JSON RPC request";

/// Check one request envelope
pub fn validate_envelope(request: &Value) -> Result<ValidatedCall, ServerFault> {
    let invalid = || ServerFault::InvalidRequest(INVALID_REQUEST_MESSAGE.to_string());

    let object = request.as_object().ok_or_else(invalid)?;
    if object.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
        return Err(invalid());
    }
    let method = object.get("method").and_then(Value::as_str).ok_or_else(invalid)?;
    let params = match object.get("params") {
        None | Some(Value::Null) => None,
        Some(params @ (Value::Array(_) | Value::Object(_))) => Some(params.clone()),
        Some(_) => return Err(invalid()),
    };

    Ok(ValidatedCall::new(method, params))
}

/// Loose emptiness: null, false, 0, "" and empty containers
fn is_empty_member(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty() || s == "0",
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

fn to_envelope(message: JsonRpcMessage) -> Value {
    serde_json::to_value(&message).unwrap_or_else(|e| {
        warn!("failed to serialize response envelope: {}", e);
        Value::Null
    })
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonServerCodec;

impl JsonServerCodec {
    pub fn new() -> Self {
        Self
    }
}

impl ServerCodec for JsonServerCodec {
    fn name(&self) -> &str {
        "JSON"
    }

    fn default_options(&self) -> LayerOptions {
        LayerOptions::new().with("realm", DEFAULT_REALM)
    }

    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn decode_request(&self, body: &[u8]) -> Option<Value> {
        serde_json::from_slice::<Value>(body)
            .ok()
            .filter(|request| self.is_structured(request))
    }

    fn split_batch(&self, request: &Value) -> Option<Vec<Value>> {
        request.as_array().cloned()
    }

    fn validate_request(&self, request: &Value) -> Result<ValidatedCall, ServerFault> {
        validate_envelope(request)
    }

    fn request_id(&self, request: &Value) -> Option<Value> {
        request
            .get("id")
            .and_then(RequestId::from_value)
            .map(Value::from)
    }

    fn assemble_response(&self, id: Option<Value>, outcome: Result<Value, ServerFault>) -> Value {
        let id = id.as_ref().and_then(RequestId::from_value);
        match outcome {
            // A callback may answer with its own error member; only the envelope fields are stamped
            Ok(Value::Object(mut response))
                if response.get("error").is_some_and(|error| !is_empty_member(error)) =>
            {
                response.insert("jsonrpc".into(), Value::from(JSONRPC_VERSION));
                response.insert("id".into(), id.map(Value::from).unwrap_or(Value::Null));
                Value::Object(response)
            }
            Ok(result) => to_envelope(JsonRpcMessage::Response(JsonRpcResponse::success(id, result))),
            Err(fault) => to_envelope(JsonRpcMessage::Error(JsonRpcError::new(id, fault.into()))),
        }
    }

    fn encode_response(&self, response: &Value) -> ServerResult<String> {
        Ok(serde_json::to_string(response)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tracing_test::traced_test;
    use turul_rpc_layer::{Environment, ExecutionFault, MethodCall, Server, ServerContext};

    #[test]
    fn test_validate_envelope() {
        let call = validate_envelope(&json!({"jsonrpc": "2.0", "method": "sum", "params": [1, 2], "id": 1})).unwrap();
        assert_eq!(call.method, "sum");
        assert_eq!(call.params, Some(json!([1, 2])));

        let call = validate_envelope(&json!({"jsonrpc": "2.0", "method": "ping", "params": null})).unwrap();
        assert_eq!(call.params, None);
    }

    #[test]
    fn test_invalid_envelopes() {
        for request in [
            json!({"method": "sum", "id": 1}),
            json!({"jsonrpc": "1.0", "method": "sum", "id": 1}),
            json!({"jsonrpc": "2.0", "method": 5, "id": 1}),
            json!({"jsonrpc": "2.0", "id": 1}),
            json!({"jsonrpc": "2.0", "method": "sum", "params": "x", "id": 1}),
            json!(17),
        ] {
            let fault = validate_envelope(&request).unwrap_err();
            assert_eq!(fault.code(), -32600, "{}", request);
        }
    }

    #[test]
    fn test_request_id_echo() {
        let codec = JsonServerCodec;
        assert_eq!(codec.request_id(&json!({"id": 7})), Some(json!(7)));
        assert_eq!(codec.request_id(&json!({"id": "abc"})), Some(json!("abc")));
        assert_eq!(codec.request_id(&json!({"id": [1]})), None);
        assert_eq!(codec.request_id(&json!({})), None);
    }

    #[test]
    fn test_assemble_success_and_error() {
        let codec = JsonServerCodec;
        assert_eq!(
            codec.assemble_response(Some(json!(1)), Ok(json!(3))),
            json!({"jsonrpc": "2.0", "id": 1, "result": 3})
        );
        assert_eq!(
            codec.assemble_response(None, Err(ServerFault::Parse)),
            json!({"jsonrpc": "2.0", "id": null, "error": {"code": -32700, "message": "Parse error, invalid JSON format"}})
        );
        assert_eq!(
            codec.assemble_response(
                Some(json!("x")),
                Err(ServerFault::Execution(ExecutionFault::new(42, "Answer rejected")))
            ),
            json!({"jsonrpc": "2.0", "id": "x", "error": {"code": 42, "message": "Answer rejected"}})
        );
    }

    #[test]
    fn test_callback_error_member_passes_through() {
        let codec = JsonServerCodec;
        let response = codec.assemble_response(
            Some(json!(4)),
            Ok(json!({"error": {"code": 9, "message": "custom"}})),
        );
        assert_eq!(
            response,
            json!({"jsonrpc": "2.0", "id": 4, "error": {"code": 9, "message": "custom"}})
        );

        let response = codec.assemble_response(Some(json!(4)), Ok(json!({"error": "", "value": 1})));
        assert_eq!(response["result"], json!({"error": "", "value": 1}));
    }

    #[test]
    fn test_decode_request() {
        let codec = JsonServerCodec;
        assert!(codec.decode_request(br#"{"jsonrpc": "2.0"}"#).is_some());
        assert!(codec.decode_request(b"[]").is_some());
        assert!(codec.decode_request(b"\"text\"").is_none());
        assert!(codec.decode_request(b"{broken").is_none());
        assert_eq!(codec.default_options().get_str("realm"), Some("JsonRPC"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_injected_request_bypasses_body() {
        let options = LayerOptions::new().with(
            "request",
            r#"{"jsonrpc":"2.0","method":"sum","params":[2,3],"id":"s"}"#,
        );
        let mut server = Server::new(
            JsonServerCodec,
            ServerContext::new("ignored", Environment::new()),
            options,
        )
        .unwrap();
        assert!(!server.options().contains_key("request"));
        server
            .bind("sum", |call: MethodCall| async move {
                let total: i64 = call.parse_params::<Vec<i64>>()?.into_iter().sum();
                Ok(json!(total))
            })
            .unwrap();

        let response = server.execute(LayerOptions::new(), false).await.unwrap();
        assert_eq!(response.envelope, json!({"jsonrpc": "2.0", "id": "s", "result": 5}));
        assert_eq!(response.content_type, "application/json");
        assert!(logs_contain("received request"));
    }
}
