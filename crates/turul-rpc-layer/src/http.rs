//! Binding between the server layer and `http` crate requests/responses
//!
//! Outer servers (hyper, lambda adapters, ...) collect the body, build a
//! [`ServerContext`] with [`ServerContext::from_http`], run the layer, and turn
//! the outcome back into a response with the `into_http_response` helpers.

use std::net::SocketAddr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use http::header::{AUTHORIZATION, CONTENT_TYPE, HeaderValue, WWW_AUTHENTICATE};
use http::{Request, Response, StatusCode};
use http_body_util::Full;
use serde_json::json;
use tracing::debug;

use crate::environment::Environment;
use crate::error::AccessError;
use crate::server::{ServerContext, ServerResponse};

impl ServerContext {
    /// Build a context from a fully collected request
    pub fn from_http(request: Request<Bytes>, remote_addr: Option<SocketAddr>) -> Self {
        let (parts, body) = request.into_parts();

        let mut environment = Environment::new();
        if let Some(addr) = remote_addr {
            environment = environment.with_remote_addr(addr.ip().to_string());
        }
        for (name, value) in &parts.headers {
            if let Ok(value) = value.to_str() {
                environment = environment.with_header(name.as_str(), value);
            }
        }
        if let Some((user, password)) = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(decode_basic_auth)
        {
            environment = environment.with_basic_auth(user, password);
        }

        debug!(
            "{} {} from {:?}",
            parts.method,
            parts.uri,
            environment.remote_addr
        );
        Self {
            body: body.to_vec(),
            environment,
        }
    }
}

/// Decode `Basic <base64(user:password)>`
fn decode_basic_auth(header: &str) -> Option<(String, String)> {
    let encoded = header
        .strip_prefix("Basic ")
        .or_else(|| header.strip_prefix("basic "))?;
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}

fn json_response(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

impl AccessError {
    /// 401 with a basic-auth challenge, or 403
    pub fn into_http_response(self) -> Response<Full<Bytes>> {
        let body = json!({ "error": self.to_string() }).to_string();
        match self {
            AccessError::Unauthorized { realm } => {
                let mut response = json_response(StatusCode::UNAUTHORIZED, body);
                let challenge = format!("Basic realm=\"{}\"", realm.replace('"', ""));
                if let Ok(value) = HeaderValue::from_str(&challenge) {
                    response.headers_mut().insert(WWW_AUTHENTICATE, value);
                }
                response
            }
            AccessError::Forbidden { .. } => json_response(StatusCode::FORBIDDEN, body),
        }
    }
}

impl ServerResponse {
    pub fn into_http_response(self) -> Response<Full<Bytes>> {
        let mut response = json_response(StatusCode::OK, self.body);
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(self.content_type));
        response
    }
}
