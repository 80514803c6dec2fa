//! Server layer: access gates, method registry and the dispatch cycle
//!
//! ```text
//! inbound body -> codec.decode_request -> [gates] -> codec.validate_request
//!              -> registry dispatch -> codec.assemble_response -> codec.encode_response
//! ```
//!
//! Validation and dispatch outcomes travel as `Result<Value, ServerFault>`; every
//! fault is turned into an error envelope by the codec, so nothing wire-visible is
//! ever returned to the embedder as an `Err`.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::environment::Environment;
use crate::error::{AccessError, ConfigError, ExecutionFault, ServerFault, ServerResult};
use crate::layer::LayerBase;
use crate::options::{DEBUG_OPTION, ENVIRONMENT_OPTION, LayerOptions, REALM_OPTION, REQUEST_OPTION};
use crate::registry::{FunctionHandler, MethodCall, MethodHandler, MethodRegistry};

/// A request envelope that passed validation
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedCall {
    pub method: String,
    pub params: Option<Value>,
    /// Metadata fields captured by metadata-aware codecs
    pub meta: Map<String, Value>,
}

impl ValidatedCall {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            method: method.into(),
            params,
            meta: Map::new(),
        }
    }
}

/// Wire-format half of a server layer
pub trait ServerCodec: Send + Sync {
    /// Layer name used in logs
    fn name(&self) -> &str;

    fn default_options(&self) -> LayerOptions {
        LayerOptions::new()
    }

    /// Content type of encoded responses
    fn content_type(&self) -> &'static str;

    /// Decode a raw body; `None` when it does not yield structured data
    fn decode_request(&self, body: &[u8]) -> Option<Value>;

    /// Whether an injected, pre-parsed value counts as structured
    fn is_structured(&self, request: &Value) -> bool {
        request.is_object() || request.is_array()
    }

    /// Split a batch into its entries; `None` for a single request
    fn split_batch(&self, request: &Value) -> Option<Vec<Value>> {
        let _ = request;
        None
    }

    /// Check the envelope and extract the call
    fn validate_request(&self, request: &Value) -> Result<ValidatedCall, ServerFault>;

    /// Id to echo back, `None` when it cannot be determined
    fn request_id(&self, request: &Value) -> Option<Value>;

    /// Build one response envelope
    fn assemble_response(&self, id: Option<Value>, outcome: Result<Value, ServerFault>) -> Value;

    /// Wrap several response envelopes into one batch response
    fn assemble_batch(&self, responses: Vec<Value>) -> Value {
        Value::Array(responses)
    }

    fn encode_response(&self, response: &Value) -> ServerResult<String>;
}

/// Inbound request as received from the outer server
#[derive(Debug, Clone, Default)]
pub struct ServerContext {
    pub body: Vec<u8>,
    pub environment: Environment,
}

impl ServerContext {
    pub fn new(body: impl Into<Vec<u8>>, environment: Environment) -> Self {
        Self {
            body: body.into(),
            environment,
        }
    }
}

/// Encoded response ready for the wire
#[derive(Debug, Clone, PartialEq)]
pub struct ServerResponse {
    pub body: String,
    pub envelope: Value,
    pub content_type: &'static str,
}

/// Object-safe view of a server layer, used by layer registries
#[async_trait]
pub trait ServerLayer: Send + Sync {
    fn name(&self) -> &str;

    fn options(&self) -> &LayerOptions;

    fn bind_handler(&mut self, method: &str, handler: Arc<dyn MethodHandler>) -> ServerResult<()>;

    fn authenticate_users(&self, users: &HashMap<String, String>) -> Result<(), AccessError>;

    fn restrict_by_ips(&self, hosts: &[String]) -> Result<(), AccessError>;

    /// The already-parsed inbound envelope (or batch)
    fn request(&self) -> Option<&Value>;

    fn meta(&self) -> &Map<String, Value>;

    async fn execute(&mut self, options: LayerOptions, reset_options: bool) -> ServerResult<ServerResponse>;
}

pub struct Server<C: ServerCodec> {
    base: LayerBase,
    codec: C,
    environment: Arc<Environment>,
    registry: MethodRegistry,
    request: Option<Value>,
    meta: Map<String, Value>,
}

impl<C: ServerCodec> Server<C> {
    /// Build a server for one inbound request
    ///
    /// The `request` option, when present, replaces the body (string values are
    /// decoded, anything else is taken as already parsed). The `environment` option
    /// replaces the context environment.
    pub fn new(codec: C, context: ServerContext, options: LayerOptions) -> ServerResult<Self> {
        let mut base = LayerBase::new(codec.name(), &codec.default_options(), options)?;

        let environment = match base.options().get_as::<Environment>(ENVIRONMENT_OPTION) {
            Ok(Some(environment)) => environment,
            Ok(None) => context.environment,
            Err(e) => {
                return Err(ConfigError::new(format!(
                    "invalid '{}' option: {}",
                    ENVIRONMENT_OPTION, e
                ))
                .into());
            }
        };

        let request = match base.options().get(REQUEST_OPTION).cloned() {
            Some(Value::String(raw)) => codec.decode_request(raw.as_bytes()),
            Some(parsed) => Some(parsed).filter(|value| codec.is_structured(value)),
            None => codec.decode_request(&context.body),
        };
        // The injected request is consumed; it must not leak into later option merges
        let options = {
            let mut options = base.options().clone();
            options.remove(REQUEST_OPTION);
            options
        };
        base.apply(options, true);

        base.logger().debug(format_args!(
            "{} received request:\n{}",
            base.name(),
            request
                .as_ref()
                .map(Value::to_string)
                .unwrap_or_else(|| "<malformed>".to_string())
        ));

        Ok(Self {
            base,
            codec,
            environment: Arc::new(environment),
            registry: MethodRegistry::new(),
            request,
            meta: Map::new(),
        })
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn options(&self) -> &LayerOptions {
        self.base.options()
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// The already-parsed inbound envelope, `None` when it was malformed
    pub fn request(&self) -> Option<&Value> {
        self.request.as_ref()
    }

    /// Metadata captured while validating the last single request
    pub fn meta(&self) -> &Map<String, Value> {
        &self.meta
    }

    pub fn methods(&self) -> Vec<String> {
        self.registry.methods()
    }

    /// Bind an async closure under `method`
    pub fn bind<F, Fut>(&mut self, method: &str, callback: F) -> ServerResult<()>
    where
        F: Fn(MethodCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ExecutionFault>> + Send + 'static,
    {
        self.bind_handler(method, Arc::new(FunctionHandler::new(callback)))
    }

    pub fn bind_handler(&mut self, method: &str, handler: Arc<dyn MethodHandler>) -> ServerResult<()> {
        self.registry.bind(method, handler)?;
        self.base
            .logger()
            .debug(format_args!("{} bound method '{}'", self.base.name(), method));
        Ok(())
    }

    /// Require the environment's basic-auth pair to match `users`
    pub fn authenticate_users(&self, users: &HashMap<String, String>) -> Result<(), AccessError> {
        let authenticated = match (&self.environment.auth_user, &self.environment.auth_password) {
            (Some(user), Some(password)) => users.get(user).is_some_and(|expected| expected == password),
            _ => false,
        };
        if authenticated {
            return Ok(());
        }

        self.base.logger().warn(format_args!(
            "{} rejected credentials for user {:?}",
            self.base.name(),
            self.environment.auth_user
        ));
        Err(AccessError::Unauthorized {
            realm: self
                .base
                .options()
                .get_str(REALM_OPTION)
                .unwrap_or(self.base.name())
                .to_string(),
        })
    }

    /// Require the environment's remote address to be one of `hosts`
    pub fn restrict_by_ips<S: AsRef<str>>(&self, hosts: &[S]) -> Result<(), AccessError> {
        let allowed = self
            .environment
            .remote_addr
            .as_deref()
            .is_some_and(|addr| hosts.iter().any(|host| host.as_ref() == addr));
        if allowed {
            return Ok(());
        }

        self.base.logger().warn(format_args!(
            "{} rejected remote address {:?}",
            self.base.name(),
            self.environment.remote_addr
        ));
        Err(AccessError::Forbidden {
            remote_addr: self.environment.remote_addr.clone(),
        })
    }

    /// Look up and invoke the callback bound to `call.method`
    pub async fn execute_method(&self, call: ValidatedCall) -> Result<Value, ServerFault> {
        let handler = self
            .registry
            .get(&call.method)
            .ok_or_else(|| ServerFault::MethodNotFound(call.method.clone()))?;

        let method_call = MethodCall {
            method: call.method,
            params: call.params,
            meta: call.meta,
            environment: self.environment.clone(),
        };
        handler.call(method_call).await.map_err(ServerFault::Execution)
    }

    /// Run the dispatch cycle and produce the encoded response
    pub async fn execute(&mut self, options: LayerOptions, reset_options: bool) -> ServerResult<ServerResponse> {
        self.base.apply(options, reset_options);
        let debug = self.base.options().get_bool(DEBUG_OPTION);

        let envelope = match self.request.clone() {
            None => self.codec.assemble_response(None, Err(self.report(ServerFault::Parse, debug))),
            Some(request) => match self.codec.split_batch(&request) {
                Some(entries) if entries.is_empty() => {
                    let fault = ServerFault::InvalidRequest("Invalid JSON RPC request: empty batch".to_string());
                    self.codec.assemble_response(None, Err(self.report(fault, debug)))
                }
                Some(entries) => {
                    let mut responses = Vec::with_capacity(entries.len());
                    for entry in &entries {
                        responses.push(self.dispatch(entry, debug).await);
                    }
                    self.codec.assemble_batch(responses)
                }
                None => self.dispatch(&request, debug).await,
            },
        };

        let body = self.codec.encode_response(&envelope)?;
        self.base
            .logger()
            .debug(format_args!("{} sending response:\n{}", self.base.name(), body));

        Ok(ServerResponse {
            body,
            envelope,
            content_type: self.codec.content_type(),
        })
    }

    async fn dispatch(&mut self, request: &Value, debug: bool) -> Value {
        let id = self.codec.request_id(request);
        let outcome = match self.codec.validate_request(request) {
            Ok(call) => {
                self.meta = call.meta.clone();
                self.execute_method(call).await
            }
            Err(fault) => Err(fault),
        };
        let outcome = outcome.map_err(|fault| self.report(fault, debug));
        self.codec.assemble_response(id, outcome)
    }

    /// Log a fault and strip execution diagnostics unless debugging
    fn report(&self, fault: ServerFault, debug: bool) -> ServerFault {
        match fault {
            ServerFault::Execution(mut fault) => {
                self.base.logger().warn(format_args!(
                    "{} method execution failed: {}{}",
                    self.base.name(),
                    fault,
                    fault
                        .data
                        .as_ref()
                        .map(|data| format!("\n{}", data))
                        .unwrap_or_default()
                ));
                if !debug {
                    fault.data = None;
                }
                ServerFault::Execution(fault)
            }
            other => {
                self.base
                    .logger()
                    .debug(format_args!("{} rejected request: {}", self.base.name(), other));
                other
            }
        }
    }
}

#[async_trait]
impl<C: ServerCodec> ServerLayer for Server<C> {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn options(&self) -> &LayerOptions {
        self.base.options()
    }

    fn bind_handler(&mut self, method: &str, handler: Arc<dyn MethodHandler>) -> ServerResult<()> {
        Server::bind_handler(self, method, handler)
    }

    fn authenticate_users(&self, users: &HashMap<String, String>) -> Result<(), AccessError> {
        Server::authenticate_users(self, users)
    }

    fn restrict_by_ips(&self, hosts: &[String]) -> Result<(), AccessError> {
        Server::restrict_by_ips(self, hosts)
    }

    fn request(&self) -> Option<&Value> {
        Server::request(self)
    }

    fn meta(&self) -> &Map<String, Value> {
        Server::meta(self)
    }

    async fn execute(&mut self, options: LayerOptions, reset_options: bool) -> ServerResult<ServerResponse> {
        Server::execute(self, options, reset_options).await
    }
}
