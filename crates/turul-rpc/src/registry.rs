//! Layer registry: layer name -> client/server factories

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::debug;
use turul_rpc_json::{JsonClientCodec, JsonMetaClientCodec, JsonMetaServerCodec, JsonServerCodec};
use turul_rpc_layer::options::META_PARAMS_OPTION;
use turul_rpc_layer::{
    Client, ClientError, ClientLayer, ConfigError, LayerOptions, Server, ServerContext,
    ServerError, ServerLayer,
};

use crate::{LayerType, RpcError, RpcResult};

pub type ClientFactory =
    Arc<dyn Fn(LayerOptions) -> Result<Box<dyn ClientLayer>, ClientError> + Send + Sync>;

pub type ServerFactory = Arc<
    dyn Fn(ServerContext, LayerOptions) -> Result<Box<dyn ServerLayer>, ServerError> + Send + Sync,
>;

static GLOBAL_REGISTRY: Lazy<RwLock<LayerRegistry>> =
    Lazy::new(|| RwLock::new(LayerRegistry::with_builtins()));

/// Take the metadata field names out of the layer options
fn take_meta_params(options: &mut LayerOptions) -> Result<Vec<String>, ConfigError> {
    let raw = options.remove(META_PARAMS_OPTION).ok_or_else(|| {
        ConfigError::new(format!(
            "JSONMeta layer requires the '{}' option",
            META_PARAMS_OPTION
        ))
    })?;
    serde_json::from_value(raw).map_err(|e| {
        ConfigError::new(format!(
            "'{}' must be a list of field names: {}",
            META_PARAMS_OPTION, e
        ))
    })
}

#[derive(Clone, Default)]
pub struct LayerRegistry {
    clients: HashMap<String, ClientFactory>,
    servers: HashMap<String, ServerFactory>,
}

impl LayerRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the `JSON` and `JSONMeta` layers
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();

        registry.register_client("JSON", |options| {
            Ok(Box::new(Client::new(JsonClientCodec, options)?) as Box<dyn ClientLayer>)
        });
        registry.register_server("JSON", |context, options| {
            Ok(Box::new(Server::new(JsonServerCodec, context, options)?) as Box<dyn ServerLayer>)
        });

        registry.register_client("JSONMeta", |mut options| {
            let names = take_meta_params(&mut options)?;
            Ok(Box::new(Client::new(JsonMetaClientCodec::new(names), options)?) as Box<dyn ClientLayer>)
        });
        registry.register_server("JSONMeta", |context, mut options| {
            let names = take_meta_params(&mut options)?;
            Ok(Box::new(Server::new(JsonMetaServerCodec::new(names), context, options)?)
                as Box<dyn ServerLayer>)
        });

        registry
    }

    /// The process-wide registry used by [`Rpc`](crate::Rpc)
    pub fn global() -> &'static RwLock<LayerRegistry> {
        &GLOBAL_REGISTRY
    }

    /// Register (or replace) a client layer
    pub fn register_client<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(LayerOptions) -> Result<Box<dyn ClientLayer>, ClientError> + Send + Sync + 'static,
    {
        debug!("Registering client layer '{}'", name);
        self.clients.insert(name.to_string(), Arc::new(factory));
    }

    /// Register (or replace) a server layer
    pub fn register_server<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(ServerContext, LayerOptions) -> Result<Box<dyn ServerLayer>, ServerError>
            + Send
            + Sync
            + 'static,
    {
        debug!("Registering server layer '{}'", name);
        self.servers.insert(name.to_string(), Arc::new(factory));
    }

    pub fn client_factory(&self, name: &str) -> RpcResult<ClientFactory> {
        self.clients
            .get(name)
            .cloned()
            .ok_or_else(|| RpcError::UnknownLayer {
                name: name.to_string(),
                kind: LayerType::Client,
            })
    }

    pub fn server_factory(&self, name: &str) -> RpcResult<ServerFactory> {
        self.servers
            .get(name)
            .cloned()
            .ok_or_else(|| RpcError::UnknownLayer {
                name: name.to_string(),
                kind: LayerType::Server,
            })
    }

    pub fn client(&self, name: &str, options: LayerOptions) -> RpcResult<Box<dyn ClientLayer>> {
        let factory = self.client_factory(name)?;
        Ok(factory(options)?)
    }

    pub fn server(
        &self,
        name: &str,
        context: ServerContext,
        options: LayerOptions,
    ) -> RpcResult<Box<dyn ServerLayer>> {
        let factory = self.server_factory(name)?;
        Ok(factory(context, options)?)
    }

    pub fn contains(&self, name: &str, kind: LayerType) -> bool {
        match kind {
            LayerType::Client => self.clients.contains_key(name),
            LayerType::Server => self.servers.contains_key(name),
        }
    }

    /// Registered layer names of one kind, sorted
    pub fn layers(&self, kind: LayerType) -> Vec<String> {
        let mut names: Vec<String> = match kind {
            LayerType::Client => self.clients.keys().cloned().collect(),
            LayerType::Server => self.servers.keys().cloned().collect(),
        };
        names.sort();
        names
    }
}

impl std::fmt::Debug for LayerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayerRegistry")
            .field("clients", &self.layers(LayerType::Client))
            .field("servers", &self.layers(LayerType::Server))
            .finish()
    }
}
