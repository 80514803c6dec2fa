//! # RPC Layer
//!
//! A transport-decoupled client/server skeleton for remote procedure call protocols.
//! The wire format is supplied by a codec ([`ClientCodec`] / [`ServerCodec`]) and the
//! bytes are moved by a [`Transport`]; this crate owns everything in between:
//!
//! - Option merging and the per-layer logger ([`LayerBase`])
//! - The client request cycle: encode, send, decode, validate, map errors ([`Client`])
//! - The server dispatch cycle: access gates, method registry, fault conversion ([`Server`])
//! - The shared error taxonomy ([`ClientError`], [`ServerFault`], [`AccessError`])
//!
//! ## Features
//! - `http` (default): reqwest-backed [`transport::HttpTransport`] and the
//!   [`http`](crate::http) server binding built on the `http` crate.

pub mod client;
pub mod environment;
pub mod error;
pub mod layer;
pub mod logging;
pub mod options;
pub mod registry;
pub mod server;
pub mod transport;

#[cfg(feature = "http")]
pub mod http;

// Re-export main types
pub use client::{Call, Client, ClientCodec, ClientLayer};
pub use environment::Environment;
pub use error::{
    AccessError, ClientError, ClientResult, ConfigError, ExecutionFault, ServerError, ServerFault,
    ServerResult,
};
pub use layer::LayerBase;
pub use logging::{LayerLogger, LogLevel, LoggerConfig};
pub use options::LayerOptions;
pub use registry::{FunctionHandler, MethodCall, MethodHandler, MethodRegistry};
pub use server::{Server, ServerCodec, ServerContext, ServerLayer, ServerResponse, ValidatedCall};
pub use transport::{
    BoxedTransport, Credentials, HttpMethod, Transport, TransportFactory, TransportFault,
    TransportReply,
};

/// Reserved error codes shared by every wire format
pub mod error_codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;

    /// True for the codes the protocol reserves for itself
    pub fn is_reserved(code: i64) -> bool {
        matches!(
            code,
            PARSE_ERROR | INVALID_REQUEST | METHOD_NOT_FOUND | INVALID_PARAMS | INTERNAL_ERROR
        )
    }
}
