//! Transport contract for client layers
//!
//! A transport moves an encoded payload to a destination and hands back the raw
//! body, the HTTP status and any transport-level fault. It knows nothing about
//! envelopes; the client layer decides what a reply means.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use crate::error::{ClientError, ClientResult};
use crate::options::LayerOptions;

#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "http")]
pub use http::{HttpTransport, HttpTransportConfig};

/// How the payload travels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// Payload appended to the query string
    Get,
    /// Payload sent as a POST body
    Post,
    /// Payload sent as the body of a custom verb (`custom_request` option)
    Other,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpMethod::Get => write!(f, "GET"),
            HttpMethod::Post => write!(f, "POST"),
            HttpMethod::Other => write!(f, "OTHER"),
        }
    }
}

/// Transport-level failure (connection refused, timeout, ...)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportFault {
    /// Transport specific code, `0` when none applies
    pub code: i64,
    pub message: String,
}

impl TransportFault {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Raw outcome of one transport call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportReply {
    pub body: String,
    /// HTTP status, `0` when no response was received
    pub status: u16,
    pub fault: Option<TransportFault>,
}

impl TransportReply {
    pub fn ok(body: impl Into<String>) -> Self {
        Self::with_status(200, body)
    }

    pub fn with_status(status: u16, body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            status,
            fault: None,
        }
    }

    pub fn failed(fault: TransportFault) -> Self {
        Self {
            body: String::new(),
            status: 0,
            fault: Some(fault),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Apply call-level options; `reset` replaces rather than overlays
    fn set_options(&mut self, options: LayerOptions, reset: bool);

    /// Options currently in effect
    fn options(&self) -> &LayerOptions;

    /// Send `payload` to `url` and report what came back
    async fn send(&mut self, url: &str, payload: String, method: HttpMethod) -> TransportReply;
}

/// Type alias for a boxed transport
pub type BoxedTransport = Box<dyn Transport>;

/// Builds the transport bound by `open()` from the layer options
pub type TransportFactory = Arc<dyn Fn(&LayerOptions) -> ClientResult<BoxedTransport> + Send + Sync>;

/// The transport used when a client is not given a factory
pub fn default_transport_factory() -> TransportFactory {
    #[cfg(feature = "http")]
    {
        Arc::new(|options: &LayerOptions| -> ClientResult<BoxedTransport> {
            Ok(Box::new(HttpTransport::from_options(options)?))
        })
    }
    #[cfg(not(feature = "http"))]
    {
        Arc::new(|_: &LayerOptions| -> ClientResult<BoxedTransport> {
            Err(crate::error::ConfigError::new(
                "no transport available; enable the `http` feature or supply a transport factory",
            )
            .into())
        })
    }
}

/// Basic-auth credentials lifted out of a destination URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl Credentials {
    /// Parse the `user:password` form carried in the `auth` option
    pub fn parse(raw: &str) -> Option<Self> {
        let (user, password) = raw.split_once(':').unwrap_or((raw, ""));
        if user.is_empty() {
            return None;
        }
        Some(Self {
            user: user.to_string(),
            password: password.to_string(),
        })
    }
}

impl fmt::Display for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.user, self.password)
    }
}

/// Strip embedded `user:password@` from a destination
pub fn split_credentials(destination: &str) -> ClientResult<(String, Option<Credentials>)> {
    let mut url = Url::parse(destination)
        .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", destination, e)))?;
    if url.username().is_empty() {
        return Ok((url.to_string(), None));
    }

    let user = decode_component(url.username())?;
    let password = url.password().map(decode_component).transpose()?.unwrap_or_default();
    url.set_username("")
        .and_then(|_| url.set_password(None))
        .map_err(|_| ClientError::InvalidUrl(format!("{}: cannot strip credentials", destination)))?;

    Ok((url.to_string(), Some(Credentials { user, password })))
}

fn decode_component(raw: &str) -> ClientResult<String> {
    urlencoding::decode(raw)
        .map(|decoded| decoded.into_owned())
        .map_err(|e| ClientError::InvalidUrl(format!("bad credential encoding: {}", e)))
}
