use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::error_codes;

/// Result type for client layer operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Result type for server layer operations
pub type ServerResult<T> = Result<T, ServerError>;

/// Programmer/configuration error; never wire-visible
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ConfigError(pub String);

impl ConfigError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self(format!("invalid option value: {}", err))
    }
}

/// Errors surfaced by a client layer
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network or status failure whose body is not a protocol envelope
    #[error("URL: {url}, HTTP code: {status}, {message} ({body})")]
    Transport {
        url: String,
        status: u16,
        /// Transport error code, or the HTTP status when the transport reported none
        code: i64,
        message: String,
        body: String,
    },

    /// Response could not be decoded as structured data
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Remote side reported -32601
    #[error("{0}")]
    NoSuchMethod(String),

    /// Remote side reported -32602, or a local argument check failed
    #[error("{0}")]
    BadArgument(String),

    /// Any other remote error envelope
    #[error("{message}")]
    Remote {
        code: i64,
        message: String,
        data: Option<Value>,
    },

    #[error("Call open() method first")]
    NotOpen,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClientError {
    /// Map a remote error object onto the client taxonomy
    pub fn from_remote(code: i64, message: impl Into<String>, data: Option<Value>) -> Self {
        let mut message = message.into();
        if let Some(data) = &data {
            match data {
                Value::String(text) => message = format!("{}. {}", message, text),
                other => message = format!("{}. {}", message, other),
            }
        }
        match code {
            error_codes::METHOD_NOT_FOUND => Self::NoSuchMethod(message),
            error_codes::INVALID_PARAMS => Self::BadArgument(message),
            _ => Self::Remote {
                code,
                message,
                data,
            },
        }
    }

    /// Numeric code carried by the error, if any
    pub fn error_code(&self) -> Option<i64> {
        match self {
            Self::Transport { code, .. } | Self::Remote { code, .. } => Some(*code),
            Self::NoSuchMethod(_) => Some(error_codes::METHOD_NOT_FOUND),
            Self::BadArgument(_) => Some(error_codes::INVALID_PARAMS),
            _ => None,
        }
    }

    /// True when the server answered with an error envelope
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Self::NoSuchMethod(_) | Self::BadArgument(_) | Self::Remote { .. }
        )
    }
}

/// Errors surfaced by a server layer to its embedder
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Access gate failures; answered at the HTTP level, never as envelopes
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    #[error("Authentication failed")]
    Unauthorized { realm: String },

    #[error("Access Forbidden")]
    Forbidden { remote_addr: Option<String> },
}

impl AccessError {
    /// HTTP status the cycle terminates with
    pub fn status_code(&self) -> u16 {
        match self {
            AccessError::Unauthorized { .. } => 401,
            AccessError::Forbidden { .. } => 403,
        }
    }
}

/// Expected, application-raised failure inside a bound method
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("{message} (code {code})")]
pub struct ExecutionFault {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ExecutionFault {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: impl Into<Value>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Fault reported as invalid params (-32602)
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(error_codes::INVALID_PARAMS, message)
    }
}

/// Wire-visible failure of one dispatch, converted into an error envelope by the codec
#[derive(Debug, Clone, PartialEq)]
pub enum ServerFault {
    /// Body did not decode to structured data (-32700)
    Parse,
    /// Structured, but not a valid request envelope (-32600)
    InvalidRequest(String),
    /// No callback bound under the name (-32601)
    MethodNotFound(String),
    /// Parameters rejected before dispatch (-32602)
    InvalidParams(String),
    /// Raised by the callback itself
    Execution(ExecutionFault),
}

impl ServerFault {
    pub fn code(&self) -> i64 {
        match self {
            ServerFault::Parse => error_codes::PARSE_ERROR,
            ServerFault::InvalidRequest(_) => error_codes::INVALID_REQUEST,
            ServerFault::MethodNotFound(_) => error_codes::METHOD_NOT_FOUND,
            ServerFault::InvalidParams(_) => error_codes::INVALID_PARAMS,
            ServerFault::Execution(fault) => fault.code,
        }
    }

    pub fn message(&self) -> String {
        match self {
            ServerFault::Parse => "Parse error, invalid JSON format".to_string(),
            ServerFault::InvalidRequest(reason) => reason.clone(),
            ServerFault::MethodNotFound(method) => format!("Method '{}' not found", method),
            ServerFault::InvalidParams(reason) => reason.clone(),
            ServerFault::Execution(fault) => fault.message.clone(),
        }
    }

    pub fn data(&self) -> Option<&Value> {
        match self {
            ServerFault::Execution(fault) => fault.data.as_ref(),
            _ => None,
        }
    }
}

impl fmt::Display for ServerFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code(), self.message())
    }
}

impl From<ExecutionFault> for ServerFault {
    fn from(fault: ExecutionFault) -> Self {
        ServerFault::Execution(fault)
    }
}
