//! Caller-supplied request context consumed by the access gates

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Immutable snapshot of the inbound request context
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Environment {
    /// Basic-auth user name
    pub auth_user: Option<String>,
    /// Basic-auth password
    pub auth_password: Option<String>,
    /// Remote peer address (IP without port)
    pub remote_addr: Option<String>,
    /// Request headers, lower-cased names
    pub headers: HashMap<String, String>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_basic_auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth_user = Some(user.into());
        self.auth_password = Some(password.into());
        self
    }

    pub fn with_remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = Some(addr.into());
        self
    }

    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder_and_header_lookup() {
        let env = Environment::new()
            .with_basic_auth("bob", "secret")
            .with_remote_addr("10.0.0.1")
            .with_header("X-Request-Id", "abc");

        assert_eq!(env.auth_user.as_deref(), Some("bob"));
        assert_eq!(env.remote_addr.as_deref(), Some("10.0.0.1"));
        assert_eq!(env.header("x-request-id"), Some("abc"));
        assert_eq!(env.header("X-REQUEST-ID"), Some("abc"));
    }

    #[test]
    fn test_deserializes_partial_snapshot() {
        let env: Environment = serde_json::from_value(json!({"remote_addr": "127.0.0.1"})).unwrap();
        assert_eq!(env.remote_addr.as_deref(), Some("127.0.0.1"));
        assert!(env.auth_user.is_none());
        assert!(env.headers.is_empty());
    }
}
