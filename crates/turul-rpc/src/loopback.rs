//! In-process transport
//!
//! [`LoopbackTransport`] hands every payload to an async closure instead of the
//! network. Pair it with a server layer to run a full client/server exchange in
//! one process:
//!
//! ```rust,no_run
//! use turul_rpc::prelude::*;
//! use turul_rpc::loopback;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let factory = LoopbackTransport::factory(|request: LoopbackRequest| async move {
//!     let mut server = match JsonServer::new(JsonServerCodec, request.into_context(), LayerOptions::new()) {
//!         Ok(server) => server,
//!         Err(e) => return loopback::server_error(e),
//!     };
//!     let _ = server.bind("ping", |_call| async move { Ok(serde_json::json!("pong")) });
//!     loopback::respond(server.execute(LayerOptions::new(), false).await)
//! });
//!
//! let mut client = JsonClient::new(JsonClientCodec, LayerOptions::new())?.with_transport_factory(factory);
//! client.open("loopback://rpc")?;
//! assert_eq!(client.call("ping", None).await?, serde_json::json!("pong"));
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::json;
use tracing::debug;
use turul_rpc_layer::options::AUTH_OPTION;
use turul_rpc_layer::{
    AccessError, BoxedTransport, ClientResult, Credentials, Environment, HttpMethod, LayerOptions,
    ServerContext, ServerError, ServerResponse, Transport, TransportFactory, TransportReply,
};

/// Remote address reported to servers reached through the loopback
pub const LOOPBACK_ADDR: &str = "127.0.0.1";

/// What the closure sees for one transport call
#[derive(Debug, Clone)]
pub struct LoopbackRequest {
    pub url: String,
    pub payload: String,
    pub method: HttpMethod,
    /// Credentials stripped from this call's destination
    pub credentials: Option<Credentials>,
    pub options: LayerOptions,
}

impl LoopbackRequest {
    /// Server context as an HTTP front end would have built it
    pub fn into_context(self) -> ServerContext {
        let mut environment = Environment::new().with_remote_addr(LOOPBACK_ADDR);
        if let Some(credentials) = self.credentials {
            environment = environment.with_basic_auth(credentials.user, credentials.password);
        }
        ServerContext::new(self.payload, environment)
    }
}

type LoopbackHandler = Arc<dyn Fn(LoopbackRequest) -> BoxFuture<'static, TransportReply> + Send + Sync>;

pub struct LoopbackTransport {
    handler: LoopbackHandler,
    options: LayerOptions,
}

impl LoopbackTransport {
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(LoopbackRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TransportReply> + Send + 'static,
    {
        Self {
            handler: Arc::new(move |request| handler(request).boxed()),
            options: LayerOptions::new(),
        }
    }

    /// Transport factory for [`Client::with_transport_factory`](turul_rpc_layer::Client::with_transport_factory)
    pub fn factory<F, Fut>(handler: F) -> TransportFactory
    where
        F: Fn(LoopbackRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TransportReply> + Send + 'static,
    {
        let handler: LoopbackHandler = Arc::new(move |request| handler(request).boxed());
        Arc::new(move |options: &LayerOptions| -> ClientResult<BoxedTransport> {
            Ok(Box::new(LoopbackTransport {
                handler: handler.clone(),
                options: options.clone(),
            }))
        })
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    fn set_options(&mut self, options: LayerOptions, reset: bool) {
        self.options.overlay(options, reset);
    }

    fn options(&self) -> &LayerOptions {
        &self.options
    }

    async fn send(&mut self, url: &str, payload: String, method: HttpMethod) -> TransportReply {
        debug!("loopback {} {}", method, url);
        let request = LoopbackRequest {
            url: url.to_string(),
            payload,
            method,
            credentials: self.options.get_str(AUTH_OPTION).and_then(Credentials::parse),
            options: self.options.clone(),
        };
        (self.handler)(request).await
    }
}

/// Reply carrying an encoded server response
pub fn respond(outcome: Result<ServerResponse, ServerError>) -> TransportReply {
    match outcome {
        Ok(response) => TransportReply::ok(response.body),
        Err(e) => server_error(e),
    }
}

/// Reply for a rejected access gate (401/403 with a JSON body)
pub fn denied(error: AccessError) -> TransportReply {
    let body = json!({ "error": error.to_string() }).to_string();
    TransportReply::with_status(error.status_code(), body)
}

/// Reply for a server that failed before producing an envelope
pub fn server_error(error: ServerError) -> TransportReply {
    TransportReply::with_status(500, error.to_string())
}
