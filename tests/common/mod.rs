//! Shared helpers: an in-process JSON-RPC server reached through the loopback transport

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{Value, json};
use turul_rpc::loopback::{self, LoopbackRequest, LoopbackTransport};
use turul_rpc_json::{JsonServer, JsonServerCodec};
use turul_rpc_layer::{ExecutionFault, LayerOptions, MethodCall, TransportFactory};

/// What the loopback server observed, in arrival order
#[derive(Default)]
pub struct Recorder {
    envelopes: Mutex<Vec<Value>>,
    options: Mutex<Vec<LayerOptions>>,
    callbacks: AtomicUsize,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn record(&self, request: &LoopbackRequest) {
        if let Ok(envelope) = serde_json::from_str::<Value>(&request.payload) {
            self.envelopes.lock().unwrap().push(envelope);
        }
        self.options.lock().unwrap().push(request.options.clone());
    }

    pub fn envelopes(&self) -> Vec<Value> {
        self.envelopes.lock().unwrap().clone()
    }

    pub fn last_envelope(&self) -> Value {
        self.envelopes().pop().unwrap_or(Value::Null)
    }

    pub fn last_options(&self) -> LayerOptions {
        self.options.lock().unwrap().last().cloned().unwrap_or_default()
    }

    pub fn hit(&self) {
        self.callbacks.fetch_add(1, Ordering::SeqCst);
    }

    pub fn callbacks(&self) -> usize {
        self.callbacks.load(Ordering::SeqCst)
    }
}

/// Access gates applied by the loopback server before dispatch
#[derive(Clone, Default)]
pub struct Gates {
    pub users: Option<HashMap<String, String>>,
    pub allowed: Option<Vec<String>>,
}

impl Gates {
    pub fn open() -> Self {
        Self::default()
    }

    pub fn basic_auth() -> Self {
        Self {
            users: Some(users()),
            allowed: None,
        }
    }
}

pub fn users() -> HashMap<String, String> {
    HashMap::from([("bob".to_string(), "secret".to_string())])
}

/// Bind the methods every suite relies on
pub fn bind_methods(server: &mut JsonServer, recorder: Arc<Recorder>) {
    server
        .bind("echo", move |call: MethodCall| {
            let recorder = recorder.clone();
            async move {
                recorder.hit();
                Ok(json!({
                    "method": call.method,
                    "params": call.params.unwrap_or(Value::Null),
                }))
            }
        })
        .unwrap();
    server
        .bind("add", |call: MethodCall| async move {
            match (
                call.param("a").and_then(Value::as_i64),
                call.param("b").and_then(Value::as_i64),
            ) {
                (Some(a), Some(b)) => Ok(json!(a + b)),
                _ => Err(ExecutionFault::invalid_params("Expected integers 'a' and 'b'")),
            }
        })
        .unwrap();
    server
        .bind("fail", |_call: MethodCall| async move {
            Err(ExecutionFault::new(42, "Answer rejected").with_data("stack trace"))
        })
        .unwrap();
}

/// Transport factory that serves every payload with a fresh JSON server layer
pub fn json_loopback(recorder: Arc<Recorder>, gates: Gates, server_options: LayerOptions) -> TransportFactory {
    LoopbackTransport::factory(move |request: LoopbackRequest| {
        let recorder = recorder.clone();
        let gates = gates.clone();
        let server_options = server_options.clone();
        async move {
            recorder.record(&request);

            let mut server = match JsonServer::new(JsonServerCodec, request.into_context(), server_options) {
                Ok(server) => server,
                Err(e) => return loopback::server_error(e),
            };
            if let Some(allowed) = &gates.allowed {
                if let Err(denied) = server.restrict_by_ips(allowed.as_slice()) {
                    return loopback::denied(denied);
                }
            }
            if let Some(users) = &gates.users {
                if let Err(denied) = server.authenticate_users(users) {
                    return loopback::denied(denied);
                }
            }
            bind_methods(&mut server, recorder);
            loopback::respond(server.execute(LayerOptions::new(), false).await)
        }
    })
}
