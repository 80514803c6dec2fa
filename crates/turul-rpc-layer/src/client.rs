//! Client layer: one request cycle, independent of the wire format
//!
//! ```text
//! caller -> codec.prepare_request -> codec.encode -> send (transport) -> codec.decode -> codec.read_response
//! ```
//!
//! The codec owns everything format-specific; [`Client`] owns the transport, the
//! destination, credential stripping and the transport-failure rules.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ClientError, ClientResult, ConfigError};
use crate::layer::LayerBase;
use crate::options::{AUTH_OPTION, LayerOptions};
use crate::transport::{
    BoxedTransport, HttpMethod, Transport, TransportFactory, default_transport_factory,
    split_credentials,
};

/// One entry of a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Call {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }

    pub fn no_params(method: impl Into<String>) -> Self {
        Self::new(method, None)
    }
}

/// Wire-format half of a client layer
pub trait ClientCodec: Send + Sync {
    /// Layer name used in logs
    fn name(&self) -> &str;

    fn default_options(&self) -> LayerOptions {
        LayerOptions::new()
    }

    /// Build one request envelope
    fn prepare_request(&self, method: &str, params: Option<Value>) -> ClientResult<Value>;

    /// Build a batch envelope; formats without batch support refuse
    fn prepare_batch(&self, calls: Vec<Call>) -> ClientResult<Value> {
        let _ = calls;
        Err(ConfigError::new(format!("layer '{}' does not support batch requests", self.name())).into())
    }

    /// Serialize an envelope into the transport payload
    fn encode(&self, request: &Value) -> ClientResult<String>;

    /// Verb the transport uses for this format
    fn request_method(&self) -> HttpMethod {
        HttpMethod::Post
    }

    /// Structural check used on non-2xx replies
    fn looks_like_envelope(&self, body: &str) -> bool {
        let body = body.trim();
        body.starts_with('{') && body.ends_with('}')
    }

    /// Hook to repair a raw body before decoding
    fn patch_response(&self, body: &mut String) {
        let _ = body;
    }

    /// Decode the raw body; failure to produce structured data is a protocol error
    fn decode(&self, body: &str) -> ClientResult<Value>;

    /// Raise if `decoded` is an error object
    fn validate_response(&self, decoded: &Value) -> ClientResult<()>;

    /// Map an error object onto the client taxonomy
    fn handle_error(&self, error: &Value) -> ClientError;

    /// Extract the result of a single call
    fn read_response(&self, decoded: Value) -> ClientResult<Value>;

    /// Extract batch results in submission order
    fn read_batch_response(
        &self,
        request: &Value,
        decoded: Value,
    ) -> ClientResult<Vec<ClientResult<Value>>> {
        let _ = (request, decoded);
        Err(ConfigError::new(format!("layer '{}' does not support batch requests", self.name())).into())
    }
}

/// Object-safe view of a client layer, used by layer registries
#[async_trait]
pub trait ClientLayer: Send {
    fn name(&self) -> &str;

    fn options(&self) -> &LayerOptions;

    /// Replace the factory used by the next `open()` that builds a transport
    fn set_transport_factory(&mut self, factory: TransportFactory);

    /// Bind a transport and a destination
    fn open(&mut self, destination: &str) -> ClientResult<()>;

    async fn execute(
        &mut self,
        method: &str,
        params: Option<Value>,
        options: LayerOptions,
        reset_options: bool,
        url: Option<&str>,
    ) -> ClientResult<Value>;

    async fn execute_batch(
        &mut self,
        batch: Vec<Call>,
        options: LayerOptions,
        reset_options: bool,
        url: Option<&str>,
    ) -> ClientResult<Vec<ClientResult<Value>>>;

    /// Release the transport; safe to call repeatedly
    fn close(&mut self);
}

pub struct Client<C: ClientCodec> {
    base: LayerBase,
    codec: C,
    factory: TransportFactory,
    transport: Option<BoxedTransport>,
    destination: Option<String>,
}

impl<C: ClientCodec> Client<C> {
    pub fn new(codec: C, options: LayerOptions) -> ClientResult<Self> {
        let base = LayerBase::new(codec.name(), &codec.default_options(), options)?;
        Ok(Self {
            base,
            codec,
            factory: default_transport_factory(),
            transport: None,
            destination: None,
        })
    }

    /// Replace the factory `open()` uses to build the transport
    pub fn with_transport_factory(mut self, factory: TransportFactory) -> Self {
        self.factory = factory;
        self
    }

    pub fn set_transport_factory(&mut self, factory: TransportFactory) {
        self.factory = factory;
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn options(&self) -> &LayerOptions {
        self.base.options()
    }

    pub fn transport(&self) -> Option<&dyn Transport> {
        self.transport.as_deref()
    }

    pub fn destination(&self) -> Option<&str> {
        self.destination.as_deref()
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    /// Bind a transport (built once per layer) and store the destination
    pub fn open(&mut self, destination: impl Into<String>) -> ClientResult<()> {
        if self.transport.is_none() {
            self.transport = Some((self.factory)(self.base.options())?);
        }
        let destination = destination.into();
        self.base
            .logger()
            .info(format_args!("{} opened {}", self.base.name(), redact(&destination)));
        self.destination = Some(destination);
        Ok(())
    }

    /// Execute a single remote method
    pub async fn execute(
        &mut self,
        method: &str,
        params: Option<Value>,
        options: LayerOptions,
        reset_options: bool,
        url: Option<&str>,
    ) -> ClientResult<Value> {
        let request = self.codec.prepare_request(method, params)?;
        let payload = self.codec.encode(&request)?;
        let body = self.send(payload, options, reset_options, url).await?;
        let decoded = self.codec.decode(&body)?;
        self.codec.read_response(decoded)
    }

    /// Execute with the layer's current options at the opened destination
    pub async fn call(&mut self, method: &str, params: Option<Value>) -> ClientResult<Value> {
        self.execute(method, params, LayerOptions::new(), false, None)
            .await
    }

    /// Execute several methods in one transport call; results keep submission order
    pub async fn execute_batch(
        &mut self,
        batch: Vec<Call>,
        options: LayerOptions,
        reset_options: bool,
        url: Option<&str>,
    ) -> ClientResult<Vec<ClientResult<Value>>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        let request = self.codec.prepare_batch(batch)?;
        let payload = self.codec.encode(&request)?;
        let body = self.send(payload, options, reset_options, url).await?;
        let decoded = self.codec.decode(&body)?;
        self.codec.read_batch_response(&request, decoded)
    }

    pub fn close(&mut self) {
        if self.transport.take().is_some() {
            self.base
                .logger()
                .debug(format_args!("{} closed transport", self.base.name()));
        }
    }

    async fn send(
        &mut self,
        payload: String,
        options: LayerOptions,
        reset_options: bool,
        url: Option<&str>,
    ) -> ClientResult<String> {
        let transport = self.transport.as_mut().ok_or(ClientError::NotOpen)?;
        let destination = match url {
            Some(url) if !url.is_empty() => url.to_string(),
            _ => self.destination.clone().ok_or(ClientError::NotOpen)?,
        };

        let (url, credentials) = split_credentials(&destination)?;
        // Call options never outlive the call: rebuild the full set every time
        let mut options = if reset_options {
            options
        } else {
            options.merged_over(self.base.options())
        };
        // Credentials belong to this call's destination only
        match credentials {
            Some(credentials) => {
                options.insert(AUTH_OPTION, credentials.to_string());
            }
            None => {
                options.remove(AUTH_OPTION);
            }
        }
        transport.set_options(options, true);

        let logger = self.base.logger();
        logger.debug(format_args!(
            "{} is sending request to {}",
            self.base.name(),
            url
        ));
        let reply = transport
            .send(&url, payload, self.codec.request_method())
            .await;
        logger.debug(format_args!(
            "{} received response with code {}:\n{}",
            self.base.name(),
            reply.status,
            reply.body
        ));

        if !reply.is_success() && !self.codec.looks_like_envelope(&reply.body) {
            let fault = reply.fault.unwrap_or_default();
            let code = if fault.code != 0 {
                fault.code
            } else {
                i64::from(reply.status)
            };
            return Err(ClientError::Transport {
                url,
                status: reply.status,
                code,
                message: fault.message,
                body: reply.body,
            });
        }

        let mut body = reply.body;
        self.codec.patch_response(&mut body);
        Ok(body)
    }
}

impl<C: ClientCodec> Drop for Client<C> {
    fn drop(&mut self) {
        self.close();
    }
}

#[async_trait]
impl<C: ClientCodec> ClientLayer for Client<C> {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn options(&self) -> &LayerOptions {
        self.base.options()
    }

    fn set_transport_factory(&mut self, factory: TransportFactory) {
        Client::set_transport_factory(self, factory)
    }

    fn open(&mut self, destination: &str) -> ClientResult<()> {
        Client::open(self, destination)
    }

    async fn execute(
        &mut self,
        method: &str,
        params: Option<Value>,
        options: LayerOptions,
        reset_options: bool,
        url: Option<&str>,
    ) -> ClientResult<Value> {
        Client::execute(self, method, params, options, reset_options, url).await
    }

    async fn execute_batch(
        &mut self,
        batch: Vec<Call>,
        options: LayerOptions,
        reset_options: bool,
        url: Option<&str>,
    ) -> ClientResult<Vec<ClientResult<Value>>> {
        Client::execute_batch(self, batch, options, reset_options, url).await
    }

    fn close(&mut self) {
        Client::close(self)
    }
}

/// Hide embedded credentials when logging a destination
fn redact(destination: &str) -> String {
    match split_credentials(destination) {
        Ok((url, Some(_))) => url,
        _ => destination.to_string(),
    }
}
