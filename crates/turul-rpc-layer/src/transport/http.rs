//! HTTP transport backed by reqwest

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, redirect};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ClientResult, ConfigError};
use crate::options::{AUTH_OPTION, LayerOptions};
use crate::transport::{Credentials, HttpMethod, Transport, TransportFault, TransportReply};

/// Typed view over the transport-related layer options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpTransportConfig {
    pub connect_timeout_ms: u64,
    pub timeout_ms: u64,
    pub user_agent: String,
    pub follow_redirects: bool,
    /// Verb used for [`HttpMethod::Other`]
    pub custom_request: String,
    pub content_type: Option<String>,
    pub headers: HashMap<String, String>,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 20_000,
            timeout_ms: 30_000,
            user_agent: format!("turul-rpc/{}", env!("CARGO_PKG_VERSION")),
            follow_redirects: true,
            custom_request: "POST".to_string(),
            content_type: None,
            headers: HashMap::new(),
        }
    }
}

impl HttpTransportConfig {
    /// Read the known keys out of a layer option map, ignoring the rest
    pub fn from_options(options: &LayerOptions) -> Result<Self, ConfigError> {
        let config = options.to_typed::<Self>()?;
        if Method::from_bytes(config.custom_request.as_bytes()).is_err() {
            return Err(ConfigError::new(format!(
                "invalid custom_request verb '{}'",
                config.custom_request
            )));
        }
        Ok(config)
    }
}

#[derive(Debug)]
pub struct HttpTransport {
    client: Client,
    options: LayerOptions,
}

impl HttpTransport {
    pub fn from_options(options: &LayerOptions) -> ClientResult<Self> {
        let config = HttpTransportConfig::from_options(options)?;
        let redirect_policy = if config.follow_redirects {
            redirect::Policy::limited(10)
        } else {
            redirect::Policy::none()
        };
        let client = Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .user_agent(config.user_agent.clone())
            .redirect(redirect_policy)
            .build()
            .map_err(|e| ConfigError::new(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            options: options.clone(),
        })
    }

    /// Create HTTP transport with custom client
    pub fn with_client(client: Client, options: LayerOptions) -> Self {
        Self { client, options }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn set_options(&mut self, options: LayerOptions, reset: bool) {
        self.options.overlay(options, reset);
    }

    fn options(&self) -> &LayerOptions {
        &self.options
    }

    async fn send(&mut self, url: &str, payload: String, method: HttpMethod) -> TransportReply {
        let config = match HttpTransportConfig::from_options(&self.options) {
            Ok(config) => config,
            Err(e) => return TransportReply::failed(TransportFault::new(0, e.to_string())),
        };

        let mut builder = match method {
            HttpMethod::Get => {
                let mut target = url.to_string();
                if !payload.is_empty() {
                    target.push(if target.contains('?') { '&' } else { '?' });
                    target.push_str(&payload);
                }
                self.client.get(target)
            }
            HttpMethod::Post => self.client.post(url).body(payload),
            HttpMethod::Other => {
                // Verb already validated by HttpTransportConfig::from_options
                let verb = Method::from_bytes(config.custom_request.as_bytes()).unwrap_or(Method::POST);
                self.client.request(verb, url).body(payload)
            }
        };

        builder = builder.timeout(Duration::from_millis(config.timeout_ms));
        if let Some(content_type) = &config.content_type {
            builder = builder.header(reqwest::header::CONTENT_TYPE, content_type);
        }
        for (name, value) in &config.headers {
            builder = builder.header(name, value);
        }
        if let Some(credentials) = self.options.get_str(AUTH_OPTION).and_then(Credentials::parse) {
            builder = builder.basic_auth(credentials.user, Some(credentials.password));
        }

        debug!("HTTP {} {}", method, url);
        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                let kind = if e.is_timeout() { "timeout" } else { "request failed" };
                return TransportReply::failed(TransportFault::new(0, format!("{}: {}", kind, e)));
            }
        };

        let status = response.status().as_u16();
        match response.text().await {
            Ok(body) => TransportReply::with_status(status, body),
            Err(e) => TransportReply {
                body: String::new(),
                status,
                fault: Some(TransportFault::new(0, format!("failed to read body: {}", e))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_config_defaults() {
        let config = HttpTransportConfig::from_options(&LayerOptions::new()).unwrap();
        assert_eq!(config.connect_timeout_ms, 20_000);
        assert_eq!(config.timeout_ms, 30_000);
        assert_eq!(config.custom_request, "POST");
        assert!(config.follow_redirects);
    }

    #[test]
    fn test_config_ignores_unrelated_options() {
        let options = LayerOptions::new()
            .with("timeout_ms", 500)
            .with("custom_request", "PUT")
            .with("realm", "JsonRPC")
            .with("headers", json!({"X-Trace": "1"}));
        let config = HttpTransportConfig::from_options(&options).unwrap();
        assert_eq!(config.timeout_ms, 500);
        assert_eq!(config.custom_request, "PUT");
        assert_eq!(config.headers.get("X-Trace").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_invalid_verb_is_rejected() {
        let options = LayerOptions::new().with("custom_request", "NOT A VERB");
        assert!(HttpTransportConfig::from_options(&options).is_err());
    }

    #[test]
    fn test_set_options_reset() {
        let mut transport =
            HttpTransport::from_options(&LayerOptions::new().with("timeout_ms", 1000)).unwrap();
        transport.set_options(LayerOptions::new().with("auth", "bob:secret"), false);
        assert_eq!(transport.options().get_str("auth"), Some("bob:secret"));
        assert!(transport.options().contains_key("timeout_ms"));

        transport.set_options(LayerOptions::new(), true);
        assert!(transport.options().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_host_reports_fault() {
        let options = LayerOptions::new().with("connect_timeout_ms", 200).with("timeout_ms", 500);
        let mut transport = HttpTransport::from_options(&options).unwrap();
        let reply = transport
            .send("http://127.0.0.1:1/rpc", "{}".to_string(), HttpMethod::Other)
            .await;
        assert_eq!(reply.status, 0);
        assert!(reply.fault.is_some());
    }
}
