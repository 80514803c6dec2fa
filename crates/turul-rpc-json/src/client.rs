//! JSON-RPC 2.0 client codec

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};
use tracing::debug;
use turul_rpc_layer::{Call, ClientCodec, ClientError, ClientResult, HttpMethod, LayerOptions};

use crate::error::JsonRpcErrorObject;
use crate::request::JsonRpcRequest;
use crate::types::RequestId;

/// Random, non-negative 31-bit request id
pub(crate) fn random_id() -> RequestId {
    RequestId::Number(i64::from(rand::random::<u32>() >> 1))
}

/// `None` and `null` both mean "no params"; scalars are rejected
pub(crate) fn normalize_params(method: &str, params: Option<Value>) -> ClientResult<Option<Value>> {
    match params {
        None | Some(Value::Null) => Ok(None),
        Some(params @ (Value::Array(_) | Value::Object(_))) => Ok(Some(params)),
        Some(other) => Err(ClientError::BadArgument(format!(
            "Params of '{}' must be an array or an object, got {}",
            method, other
        ))),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonClientCodec;

impl JsonClientCodec {
    pub fn new() -> Self {
        Self
    }

    /// Build a typed envelope carrying `extra` as top-level fields
    pub fn build_request(
        &self,
        id: RequestId,
        method: &str,
        params: Option<Value>,
        extra: Map<String, Value>,
    ) -> ClientResult<Value> {
        let params = normalize_params(method, params)?;
        let mut request = JsonRpcRequest::new(id, method, params);
        request.extra = extra;
        Ok(serde_json::to_value(&request)?)
    }

    /// Ids unique within one batch
    pub(crate) fn batch_ids(count: usize) -> Vec<RequestId> {
        let mut seen = HashSet::with_capacity(count);
        let mut ids = Vec::with_capacity(count);
        while ids.len() < count {
            let id = random_id();
            if seen.insert(id.clone()) {
                ids.push(id);
            }
        }
        ids
    }

    /// Map an `error` member onto the client taxonomy
    fn read_error_member(&self, error: &Value) -> ClientError {
        match JsonRpcErrorObject::from_value(error) {
            Some(error) => error.into_client_error(),
            None => ClientError::Protocol(format!("Malformed error member: {}", error)),
        }
    }
}

impl ClientCodec for JsonClientCodec {
    fn name(&self) -> &str {
        "JSON"
    }

    fn default_options(&self) -> LayerOptions {
        LayerOptions::new()
            .with("custom_request", "POST")
            .with("content_type", "application/json")
    }

    fn prepare_request(&self, method: &str, params: Option<Value>) -> ClientResult<Value> {
        self.build_request(random_id(), method, params, Map::new())
    }

    fn prepare_batch(&self, calls: Vec<Call>) -> ClientResult<Value> {
        let ids = Self::batch_ids(calls.len());
        let requests = calls
            .into_iter()
            .zip(ids)
            .map(|(call, id)| self.build_request(id, &call.method, call.params, Map::new()))
            .collect::<ClientResult<Vec<_>>>()?;
        Ok(Value::Array(requests))
    }

    fn encode(&self, request: &Value) -> ClientResult<String> {
        Ok(serde_json::to_string(request)?)
    }

    fn request_method(&self) -> HttpMethod {
        HttpMethod::Other
    }

    fn looks_like_envelope(&self, body: &str) -> bool {
        let body = body.trim();
        (body.starts_with('{') && body.ends_with('}'))
            || (body.starts_with('[') && body.ends_with(']'))
    }

    fn decode(&self, body: &str) -> ClientResult<Value> {
        let decoded: Value = serde_json::from_str(body)
            .map_err(|e| ClientError::Protocol(format!("Invalid JSON response: {}", e)))?;
        if decoded.is_object() || decoded.is_array() {
            Ok(decoded)
        } else {
            Err(ClientError::Protocol(format!(
                "Response is not a JSON object or array: {}",
                decoded
            )))
        }
    }

    fn validate_response(&self, decoded: &Value) -> ClientResult<()> {
        match JsonRpcErrorObject::from_value(decoded) {
            Some(error) => Err(error.into_client_error()),
            None => Ok(()),
        }
    }

    fn handle_error(&self, error: &Value) -> ClientError {
        self.read_error_member(error)
    }

    fn read_response(&self, decoded: Value) -> ClientResult<Value> {
        self.validate_response(&decoded)?;
        let Value::Object(mut response) = decoded else {
            return Err(ClientError::Protocol(
                "Expected a single response object".to_string(),
            ));
        };
        match response.remove("error") {
            None | Some(Value::Null) => {}
            Some(error) => return Err(self.handle_error(&error)),
        }
        Ok(response.remove("result").unwrap_or(Value::Null))
    }

    fn read_batch_response(
        &self,
        request: &Value,
        decoded: Value,
    ) -> ClientResult<Vec<ClientResult<Value>>> {
        let responses = match decoded {
            Value::Array(responses) => responses,
            single => {
                // One error envelope answering the whole batch
                self.read_response(single)?;
                return Err(ClientError::Protocol(
                    "Expected an array of responses to a batch request".to_string(),
                ));
            }
        };

        let mut by_id: HashMap<RequestId, Value> = HashMap::with_capacity(responses.len());
        for response in responses {
            match response.get("id").and_then(RequestId::from_value) {
                Some(id) => {
                    by_id.insert(id, response);
                }
                None => debug!("{} dropping batch response without id: {}", self.name(), response),
            }
        }

        let requests = request.as_array().map(Vec::as_slice).unwrap_or_default();
        Ok(requests
            .iter()
            .map(|request| {
                let id = request
                    .get("id")
                    .and_then(RequestId::from_value)
                    .ok_or_else(|| ClientError::Protocol("Batch request without id".to_string()))?;
                let response = by_id
                    .remove(&id)
                    .ok_or_else(|| ClientError::Protocol(format!("No response for request id {}", id)))?;
                self.read_response(response)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_prepare_request() {
        let codec = JsonClientCodec::new();
        let request = codec.prepare_request("sum", Some(json!({"a": 1}))).unwrap();
        assert_eq!(request["jsonrpc"], json!("2.0"));
        assert_eq!(request["method"], json!("sum"));
        assert_eq!(request["params"], json!({"a": 1}));
        assert!(request["id"].as_i64().is_some_and(|id| id >= 0));

        let request = codec.prepare_request("ping", None).unwrap();
        assert!(request.get("params").is_none());

        let request = codec.prepare_request("ping", Some(json!({}))).unwrap();
        assert_eq!(request["params"], json!({}));
    }

    #[test]
    fn test_scalar_params_are_rejected() {
        let codec = JsonClientCodec::new();
        assert!(matches!(
            codec.prepare_request("sum", Some(json!(5))),
            Err(ClientError::BadArgument(_))
        ));
    }

    #[test]
    fn test_default_options() {
        let options = JsonClientCodec.default_options();
        assert_eq!(options.get_str("custom_request"), Some("POST"));
        assert_eq!(options.get_str("content_type"), Some("application/json"));
        assert_eq!(JsonClientCodec.request_method(), HttpMethod::Other);
    }

    #[test]
    fn test_decode_requires_structured_data() {
        let codec = JsonClientCodec::new();
        assert!(codec.decode(r#"{"result": 1}"#).is_ok());
        assert!(codec.decode("[]").is_ok());
        assert!(matches!(codec.decode("<html>"), Err(ClientError::Protocol(_))));
        assert!(matches!(codec.decode("42"), Err(ClientError::Protocol(_))));
    }

    #[test]
    fn test_read_response() {
        let codec = JsonClientCodec::new();
        let result = codec
            .read_response(json!({"jsonrpc": "2.0", "id": 1, "result": {"sum": 3}}))
            .unwrap();
        assert_eq!(result, json!({"sum": 3}));

        let result = codec.read_response(json!({"jsonrpc": "2.0", "id": 1})).unwrap();
        assert_eq!(result, Value::Null);
    }

    #[test]
    fn test_error_mapping() {
        let codec = JsonClientCodec::new();
        let err = codec
            .read_response(json!({"id": 1, "error": {"code": -32601, "message": "Method 'x' not found"}}))
            .unwrap_err();
        assert!(matches!(err, ClientError::NoSuchMethod(ref m) if m == "Method 'x' not found"));

        let err = codec
            .read_response(json!({"id": 1, "error": {"code": -32602, "message": "Invalid params"}}))
            .unwrap_err();
        assert!(matches!(err, ClientError::BadArgument(_)));

        let err = codec
            .read_response(json!({"id": 1, "error": {"code": 42, "message": "Answer rejected", "data": "why"}}))
            .unwrap_err();
        match err {
            ClientError::Remote { code, message, .. } => {
                assert_eq!(code, 42);
                assert_eq!(message, "Answer rejected. why");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_top_level_error_object() {
        let err = JsonClientCodec
            .read_response(json!({"code": 13, "message": "bare"}))
            .unwrap_err();
        assert_eq!(err.error_code(), Some(13));
    }

    #[test]
    fn test_malformed_error_member_is_protocol_error() {
        let err = JsonClientCodec
            .read_response(json!({"id": 1, "error": "boom"}))
            .unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));

        let err = JsonClientCodec
            .read_response(json!({"id": 1, "error": {"code": 1}}))
            .unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));

        let err = JsonClientCodec
            .read_response(json!({"jsonrpc": "2.0", "id": 1, "error": {"code": "-32601", "message": "m"}}))
            .unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));

        let err = JsonClientCodec
            .read_response(json!({"id": 1, "error": {"code": 1.5, "message": "m"}}))
            .unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
    }

    #[test]
    fn test_batch_ids_are_unique() {
        let ids = JsonClientCodec::batch_ids(64);
        let unique: HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), 64);
    }

    #[test]
    fn test_batch_responses_are_reordered() {
        let codec = JsonClientCodec::new();
        let request = codec
            .prepare_batch(vec![
                Call::new("a", None),
                Call::new("b", Some(json!([1]))),
                Call::new("c", None),
            ])
            .unwrap();
        let ids: Vec<Value> = request
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["id"].clone())
            .collect();

        let decoded = json!([
            {"jsonrpc": "2.0", "id": ids[2], "result": "c"},
            {"jsonrpc": "2.0", "id": ids[0], "result": "a"},
            {"jsonrpc": "2.0", "id": ids[1], "error": {"code": -32601, "message": "Method 'b' not found"}}
        ]);

        let results = codec.read_batch_response(&request, decoded).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap(), &json!("a"));
        assert!(matches!(results[1], Err(ClientError::NoSuchMethod(_))));
        assert_eq!(results[2].as_ref().unwrap(), &json!("c"));
    }

    #[test]
    fn test_batch_missing_response_and_whole_batch_error() {
        let codec = JsonClientCodec::new();
        let request = codec
            .prepare_batch(vec![Call::no_params("a"), Call::no_params("b")])
            .unwrap();
        let first = request[0]["id"].clone();

        let results = codec
            .read_batch_response(&request, json!([{"id": first, "result": 1}]))
            .unwrap();
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(ClientError::Protocol(_))));

        let err = codec
            .read_batch_response(
                &request,
                json!({"jsonrpc": "2.0", "id": null, "error": {"code": -32600, "message": "Invalid JSON RPC request"}}),
            )
            .unwrap_err();
        assert_eq!(err.error_code(), Some(-32600));
    }
}
