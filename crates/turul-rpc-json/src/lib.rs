//! # JSON-RPC 2.0 codecs
//!
//! Wire-format halves for [`turul_rpc_layer`]: plug [`JsonClientCodec`] into a
//! [`Client`] and [`JsonServerCodec`] into a [`Server`]. The metadata variants
//! ([`JsonMetaClientCodec`], [`JsonMetaServerCodec`]) carry a configured set of
//! fields at the top level of each envelope.
//!
//! ```rust,no_run
//! use turul_rpc_json::prelude::*;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let mut client = JsonClient::new(JsonClientCodec, LayerOptions::new())?;
//! client.open("http://localhost:8080/rpc")?;
//! let sum = client.call("add", Some(serde_json::json!({"a": 1, "b": 2}))).await?;
//! println!("sum: {}", sum);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod meta;
pub mod prelude;
pub mod request;
pub mod response;
pub mod server;
pub mod types;

// Re-export main types
pub use client::JsonClientCodec;
pub use error::{JsonRpcErrorCode, JsonRpcErrorObject};
pub use meta::{JsonMetaClientCodec, JsonMetaServerCodec, MetaParams};
pub use request::JsonRpcRequest;
pub use response::{JsonRpcError, JsonRpcMessage, JsonRpcResponse};
pub use server::{DEFAULT_REALM, JsonServerCodec};
pub use types::{JsonRpcVersion, RequestId};

use turul_rpc_layer::{Client, Server};

/// JSON-RPC 2.0 version constant
pub const JSONRPC_VERSION: &str = "2.0";

pub type JsonClient = Client<JsonClientCodec>;
pub type JsonServer = Server<JsonServerCodec>;
pub type JsonMetaClient<M> = Client<JsonMetaClientCodec<M>>;
pub type JsonMetaServer<M> = Server<JsonMetaServerCodec<M>>;
