//! Calculator Server
//!
//! JSON-RPC 2.0 calculator behind basic auth and an IP allow-list. Every HTTP
//! request gets its own server layer, exactly like a CGI-style endpoint.
//!
//! Usage:
//! ```bash
//! RUST_LOG=debug cargo run --package calculator-server -- --port 8645 --debug
//!
//! curl -u bob:secret -X POST http://127.0.0.1:8645/rpc \
//!   -d '{"jsonrpc":"2.0","method":"add","params":{"a":1,"b":2},"id":1}'
//! ```

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use clap::Parser;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tracing::{debug, error, info};
use turul_rpc::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "calculator-server")]
#[command(about = "JSON-RPC calculator server")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "8645")]
    port: u16,

    /// Basic-auth user
    #[arg(long, default_value = "bob")]
    user: String,

    /// Basic-auth password
    #[arg(long, default_value = "secret")]
    password: String,

    /// Allowed client IPs (repeatable)
    #[arg(long = "allow", default_values_t = vec!["127.0.0.1".to_string()])]
    allowed: Vec<String>,

    /// Echo execution fault details to clients
    #[arg(long)]
    debug: bool,
}

struct Settings {
    users: HashMap<String, String>,
    allowed: Vec<String>,
    debug: bool,
}

#[derive(Deserialize)]
struct Operands {
    a: f64,
    b: f64,
}

async fn add(call: MethodCall) -> Result<Value, ExecutionFault> {
    let Operands { a, b } = call.parse_params()?;
    Ok(json!(a + b))
}

async fn subtract(call: MethodCall) -> Result<Value, ExecutionFault> {
    let Operands { a, b } = call.parse_params()?;
    Ok(json!(a - b))
}

async fn divide(call: MethodCall) -> Result<Value, ExecutionFault> {
    let Operands { a, b } = call.parse_params()?;
    if b == 0.0 {
        return Err(ExecutionFault::new(1, "Division by zero").with_data(format!("{} / {}", a, b)));
    }
    Ok(json!(a / b))
}

async fn whoami(call: MethodCall) -> Result<Value, ExecutionFault> {
    Ok(json!({
        "user": call.environment.auth_user,
        "remote_addr": call.environment.remote_addr,
    }))
}

fn register_methods(server: &mut JsonServer) -> ServerResult<()> {
    server.bind("add", add)?;
    server.bind("subtract", subtract)?;
    server.bind("divide", divide)?;
    server.bind("whoami", whoami)?;
    Ok(())
}

fn plain_response(status: StatusCode, body: &str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
    *response.status_mut() = status;
    response
}

async fn dispatch(context: ServerContext, settings: &Settings) -> Response<Full<Bytes>> {
    let options = LayerOptions::new().with("debug", settings.debug);
    let mut server = match JsonServer::new(JsonServerCodec, context, options) {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to build server layer: {}", e);
            return plain_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error");
        }
    };

    let gates = server
        .restrict_by_ips(settings.allowed.as_slice())
        .and_then(|_| server.authenticate_users(&settings.users));
    if let Err(denied) = gates {
        return denied.into_http_response();
    }

    if let Err(e) = register_methods(&mut server) {
        error!("Failed to register methods: {}", e);
        return plain_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error");
    }

    match server.execute(LayerOptions::new(), false).await {
        Ok(response) => response.into_http_response(),
        Err(e) => {
            error!("Failed to encode response: {}", e);
            plain_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}

async fn handle_request(
    req: Request<Incoming>,
    peer_addr: SocketAddr,
    settings: Arc<Settings>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            debug!("Failed to read request body: {}", e);
            return Ok(plain_response(StatusCode::BAD_REQUEST, "Bad Request"));
        }
    };

    let context = ServerContext::from_http(Request::from_parts(parts, body), Some(peer_addr));
    Ok(dispatch(context, &settings).await)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let settings = Arc::new(Settings {
        users: HashMap::from([(args.user.clone(), args.password.clone())]),
        allowed: args.allowed.clone(),
        debug: args.debug,
    });

    let bind_address: SocketAddr = ([0, 0, 0, 0], args.port).into();
    let listener = TcpListener::bind(bind_address).await?;
    info!("Calculator server listening on {}", bind_address);
    info!("Allowed clients: {:?}", settings.allowed);

    loop {
        let (stream, peer_addr) = listener.accept().await?;
        debug!("New connection from {}", peer_addr);

        let settings = Arc::clone(&settings);
        tokio::spawn(async move {
            let io = TokioIo::new(stream);
            let service = service_fn(move |req| handle_request(req, peer_addr, settings.clone()));

            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                debug!("Error serving connection: {}", err);
            }
        });
    }
}
