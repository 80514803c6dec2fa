//! Metadata extensions
//!
//! Some deployments carry per-call metadata (tokens, tenant ids, ...) as extra
//! top-level envelope fields instead of inside `params`. The client codec moves
//! the configured names out of `params`; the server codec requires them and
//! exposes them to callbacks through [`MethodCall::meta`](turul_rpc_layer::MethodCall).

use serde_json::{Map, Value};
use turul_rpc_layer::{
    Call, ClientCodec, ClientError, ClientResult, ConfigError, HttpMethod, LayerOptions,
    ServerCodec, ServerFault, ServerResult, ValidatedCall,
};

use crate::client::{JsonClientCodec, random_id};
use crate::server::{JsonServerCodec, validate_envelope};

/// Names of the obligatory metadata fields
pub trait MetaParams: Send + Sync {
    fn meta_params(&self) -> Vec<String>;
}

impl MetaParams for Vec<String> {
    fn meta_params(&self) -> Vec<String> {
        self.clone()
    }
}

impl MetaParams for &'static [&'static str] {
    fn meta_params(&self) -> Vec<String> {
        self.iter().map(|name| name.to_string()).collect()
    }
}

impl<const N: usize> MetaParams for [&'static str; N] {
    fn meta_params(&self) -> Vec<String> {
        self.iter().map(|name| name.to_string()).collect()
    }
}

/// Envelope members a metadata field may not shadow
pub const RESERVED_MEMBERS: [&str; 4] = ["jsonrpc", "method", "params", "id"];

fn missing(name: &str) -> String {
    format!("Missing obligatory '{}' parameter", name)
}

/// Absent, `null` and `""` all count as missing
fn is_missing(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(_) => false,
    }
}

#[derive(Debug, Clone, Default)]
pub struct JsonMetaClientCodec<M> {
    inner: JsonClientCodec,
    meta: M,
}

impl<M: MetaParams> JsonMetaClientCodec<M> {
    pub fn new(meta: M) -> Self {
        Self {
            inner: JsonClientCodec,
            meta,
        }
    }

    /// Move the metadata fields out of `params`
    fn split_meta(&self, params: Option<Value>) -> ClientResult<(Option<Value>, Map<String, Value>)> {
        let names = self.meta.meta_params();
        if names.is_empty() {
            return Ok((params, Map::new()));
        }

        if let Some(name) = names.iter().find(|name| RESERVED_MEMBERS.contains(&name.as_str())) {
            return Err(ConfigError::new(format!(
                "Metadata field '{}' collides with an envelope member",
                name
            ))
            .into());
        }

        let Some(Value::Object(mut params)) = params else {
            return Err(ClientError::BadArgument(missing(&names[0])));
        };
        let mut meta = Map::with_capacity(names.len());
        for name in &names {
            if is_missing(params.get(name)) {
                return Err(ClientError::BadArgument(missing(name)));
            }
            if let Some(value) = params.remove(name) {
                meta.insert(name.clone(), value);
            }
        }
        Ok((Some(Value::Object(params)), meta))
    }
}

impl<M: MetaParams> ClientCodec for JsonMetaClientCodec<M> {
    fn name(&self) -> &str {
        "JSONMeta"
    }

    fn default_options(&self) -> LayerOptions {
        self.inner.default_options()
    }

    fn prepare_request(&self, method: &str, params: Option<Value>) -> ClientResult<Value> {
        let (params, meta) = self.split_meta(params)?;
        self.inner.build_request(random_id(), method, params, meta)
    }

    fn prepare_batch(&self, calls: Vec<Call>) -> ClientResult<Value> {
        let ids = JsonClientCodec::batch_ids(calls.len());
        let requests = calls
            .into_iter()
            .zip(ids)
            .map(|(call, id)| {
                let (params, meta) = self.split_meta(call.params)?;
                self.inner.build_request(id, &call.method, params, meta)
            })
            .collect::<ClientResult<Vec<_>>>()?;
        Ok(Value::Array(requests))
    }

    fn encode(&self, request: &Value) -> ClientResult<String> {
        self.inner.encode(request)
    }

    fn request_method(&self) -> HttpMethod {
        self.inner.request_method()
    }

    fn looks_like_envelope(&self, body: &str) -> bool {
        self.inner.looks_like_envelope(body)
    }

    fn decode(&self, body: &str) -> ClientResult<Value> {
        self.inner.decode(body)
    }

    fn validate_response(&self, decoded: &Value) -> ClientResult<()> {
        self.inner.validate_response(decoded)
    }

    fn handle_error(&self, error: &Value) -> ClientError {
        self.inner.handle_error(error)
    }

    fn read_response(&self, decoded: Value) -> ClientResult<Value> {
        self.inner.read_response(decoded)
    }

    fn read_batch_response(
        &self,
        request: &Value,
        decoded: Value,
    ) -> ClientResult<Vec<ClientResult<Value>>> {
        self.inner.read_batch_response(request, decoded)
    }
}

#[derive(Debug, Clone, Default)]
pub struct JsonMetaServerCodec<M> {
    inner: JsonServerCodec,
    meta: M,
}

impl<M: MetaParams> JsonMetaServerCodec<M> {
    pub fn new(meta: M) -> Self {
        Self {
            inner: JsonServerCodec,
            meta,
        }
    }
}

impl<M: MetaParams> ServerCodec for JsonMetaServerCodec<M> {
    fn name(&self) -> &str {
        "JSONMeta"
    }

    fn default_options(&self) -> LayerOptions {
        self.inner.default_options()
    }

    fn content_type(&self) -> &'static str {
        self.inner.content_type()
    }

    fn decode_request(&self, body: &[u8]) -> Option<Value> {
        self.inner.decode_request(body)
    }

    fn split_batch(&self, request: &Value) -> Option<Vec<Value>> {
        self.inner.split_batch(request)
    }

    fn validate_request(&self, request: &Value) -> Result<ValidatedCall, ServerFault> {
        let mut call = validate_envelope(request)?;
        for name in self.meta.meta_params() {
            let value = request.get(&name);
            if is_missing(value) {
                return Err(ServerFault::InvalidParams(missing(&name)));
            }
            if let Some(value) = value {
                call.meta.insert(name, value.clone());
            }
        }
        Ok(call)
    }

    fn request_id(&self, request: &Value) -> Option<Value> {
        self.inner.request_id(request)
    }

    fn assemble_response(&self, id: Option<Value>, outcome: Result<Value, ServerFault>) -> Value {
        self.inner.assemble_response(id, outcome)
    }

    fn encode_response(&self, response: &Value) -> ServerResult<String> {
        self.inner.encode_response(response)
    }
}
