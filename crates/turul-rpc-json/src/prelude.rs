//! Commonly used types for building JSON-RPC clients and servers
//!
//! ```rust
//! use turul_rpc_json::prelude::*;
//! ```

pub use crate::{
    JsonClient, JsonClientCodec, JsonMetaClient, JsonMetaClientCodec, JsonMetaServer,
    JsonMetaServerCodec, JsonServer, JsonServerCodec, MetaParams, RequestId,
};
pub use turul_rpc_layer::{
    Call, ClientError, ClientResult, Environment, ExecutionFault, LayerOptions, MethodCall,
    ServerContext, ServerResult,
};
