//! Prelude module for common turul-rpc imports
//!
//! ```rust
//! use turul_rpc::prelude::*;
//! ```

pub use crate::{
    LayerRegistry, LayerType, LoopbackRequest, LoopbackTransport, Rpc, RpcError, RpcResult,
};

pub use turul_rpc_json::prelude::*;

pub use turul_rpc_layer::{
    AccessError, ClientLayer, ServerError, ServerFault, ServerLayer, ServerResponse, Transport,
    TransportReply,
};

// Essential async trait for implementations
pub use async_trait::async_trait;

pub use std::sync::Arc;
