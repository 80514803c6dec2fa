//! Method registry: name -> callback

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::environment::Environment;
use crate::error::{ConfigError, ExecutionFault};

/// Everything a bound method sees about the call it is serving
#[derive(Debug, Clone)]
pub struct MethodCall {
    pub method: String,
    /// `None` when the request carried no params at all
    pub params: Option<Value>,
    /// Metadata fields captured by metadata-aware codecs
    pub meta: Map<String, Value>,
    pub environment: Arc<Environment>,
}

impl MethodCall {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            method: method.into(),
            params,
            meta: Map::new(),
            environment: Arc::new(Environment::default()),
        }
    }

    /// Named parameter (object params only)
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.as_ref()?.as_object()?.get(name)
    }

    /// Positional parameter (array params only)
    pub fn param_index(&self, index: usize) -> Option<&Value> {
        self.params.as_ref()?.as_array()?.get(index)
    }

    pub fn meta(&self, name: &str) -> Option<&Value> {
        self.meta.get(name)
    }

    /// Deserialize the params into a typed struct, reporting -32602 on mismatch
    pub fn parse_params<T: DeserializeOwned>(&self) -> Result<T, ExecutionFault> {
        let params = self.params.clone().unwrap_or(Value::Null);
        serde_json::from_value(params)
            .map_err(|e| ExecutionFault::invalid_params(format!("Invalid params: {}", e)))
    }
}

/// Trait for callbacks bound to a method name
#[async_trait]
pub trait MethodHandler: Send + Sync {
    async fn call(&self, call: MethodCall) -> Result<Value, ExecutionFault>;
}

/// Adapts an async closure into a [`MethodHandler`]
pub struct FunctionHandler<F> {
    handler_fn: F,
}

impl<F> FunctionHandler<F> {
    pub fn new<Fut>(handler_fn: F) -> Self
    where
        F: Fn(MethodCall) -> Fut + Send + Sync,
        Fut: Future<Output = Result<Value, ExecutionFault>> + Send,
    {
        Self { handler_fn }
    }
}

#[async_trait]
impl<F, Fut> MethodHandler for FunctionHandler<F>
where
    F: Fn(MethodCall) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, ExecutionFault>> + Send,
{
    async fn call(&self, call: MethodCall) -> Result<Value, ExecutionFault> {
        (self.handler_fn)(call).await
    }
}

/// Registered methods, owned by exactly one server layer
#[derive(Default, Clone)]
pub struct MethodRegistry {
    handlers: HashMap<String, Arc<dyn MethodHandler>>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `method`; the last bind for a name wins
    pub fn bind(
        &mut self,
        method: impl Into<String>,
        handler: Arc<dyn MethodHandler>,
    ) -> Result<(), ConfigError> {
        let method = method.into();
        if method.trim().is_empty() {
            return Err(ConfigError::new("Invalid callback passed: empty method name"));
        }
        self.handlers.insert(method, handler);
        Ok(())
    }

    pub fn get(&self, method: &str) -> Option<Arc<dyn MethodHandler>> {
        self.handlers.get(method).cloned()
    }

    pub fn contains(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }

    /// Registered method names, sorted
    pub fn methods(&self) -> Vec<String> {
        let mut methods: Vec<String> = self.handlers.keys().cloned().collect();
        methods.sort();
        methods
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for MethodRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodRegistry")
            .field("methods", &self.methods())
            .finish()
    }
}
