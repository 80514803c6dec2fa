//! JSON-RPC over real HTTP: a hyper server running the server layer per request
//! and the reqwest-backed client transport.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use turul_rpc::prelude::*;

fn users() -> HashMap<String, String> {
    HashMap::from([("bob".to_string(), "secret".to_string())])
}

async fn whoami(call: MethodCall) -> Result<Value, ExecutionFault> {
    Ok(json!({
        "user": call.environment.auth_user,
        "remote_addr": call.environment.remote_addr,
        "agent": call.environment.header("user-agent"),
    }))
}

async fn add(call: MethodCall) -> Result<Value, ExecutionFault> {
    match (
        call.param("a").and_then(Value::as_i64),
        call.param("b").and_then(Value::as_i64),
    ) {
        (Some(a), Some(b)) => Ok(json!(a + b)),
        _ => Err(ExecutionFault::invalid_params("Expected integers 'a' and 'b'")),
    }
}

async fn handle(req: Request<Incoming>, peer: SocketAddr) -> Result<Response<Full<Bytes>>, Infallible> {
    if req.uri().path() == "/broken" {
        let mut response = Response::new(Full::new(Bytes::from("Internal Server Error")));
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        return Ok(response);
    }

    let (parts, body) = req.into_parts();
    let body = body.collect().await.map(|b| b.to_bytes()).unwrap_or_default();
    let context = ServerContext::from_http(Request::from_parts(parts, body), Some(peer));

    let mut server = JsonServer::new(JsonServerCodec, context, LayerOptions::new()).unwrap();
    if let Err(denied) = server
        .restrict_by_ips(&["127.0.0.1"])
        .and_then(|_| server.authenticate_users(&users()))
    {
        return Ok(denied.into_http_response());
    }
    server.bind("whoami", whoami).unwrap();
    server.bind("add", add).unwrap();

    let response = server.execute(LayerOptions::new(), false).await.unwrap();
    Ok(response.into_http_response())
}

async fn start_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((stream, peer)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let service = service_fn(move |req| handle(req, peer));
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });

    addr
}

fn client() -> JsonClient {
    JsonClient::new(JsonClientCodec, LayerOptions::new().with("timeout_ms", 5_000)).unwrap()
}

#[tokio::test]
async fn test_http_round_trip_with_basic_auth() {
    let addr = start_server().await;
    let mut client = client();
    client.open(format!("http://bob:secret@{}/rpc", addr)).unwrap();

    let sum = client.call("add", Some(json!({"a": 40, "b": 2}))).await.unwrap();
    assert_eq!(sum, json!(42));

    let me = client.call("whoami", None).await.unwrap();
    assert_eq!(me["user"], json!("bob"));
    assert_eq!(me["remote_addr"], json!("127.0.0.1"));
    assert!(me["agent"].as_str().unwrap().starts_with("turul-rpc/"));
}

#[tokio::test]
async fn test_http_batch() {
    let addr = start_server().await;
    let mut client = client();
    client.open(format!("http://bob:secret@{}/rpc", addr)).unwrap();

    let results = client
        .execute_batch(
            vec![
                Call::new("add", Some(json!({"a": 1, "b": 2}))),
                Call::new("add", Some(json!({"a": "one"}))),
                Call::no_params("whoami"),
            ],
            LayerOptions::new(),
            false,
            None,
        )
        .await
        .unwrap();

    assert_eq!(results[0].as_ref().unwrap(), &json!(3));
    assert!(matches!(results[1], Err(ClientError::BadArgument(_))));
    assert_eq!(results[2].as_ref().unwrap()["user"], json!("bob"));
}

#[tokio::test]
async fn test_http_wrong_password_is_rejected() {
    let addr = start_server().await;
    let mut client = client();
    client.open(format!("http://bob:wrong@{}/rpc", addr)).unwrap();

    let err = client.call("add", Some(json!({"a": 1, "b": 2}))).await.unwrap_err();
    assert!(matches!(err, ClientError::Protocol(ref m) if m.contains("Authentication failed")));
}

#[tokio::test]
async fn test_http_url_override_per_call() {
    let addr = start_server().await;
    let mut client = client();
    client.open(format!("http://bob:wrong@{}/rpc", addr)).unwrap();

    let url = format!("http://bob:secret@{}/rpc", addr);
    let sum = client
        .execute("add", Some(json!({"a": 2, "b": 2})), LayerOptions::new(), false, Some(&url))
        .await
        .unwrap();
    assert_eq!(sum, json!(4));
}

#[tokio::test]
async fn test_http_status_without_envelope_is_transport_error() {
    let addr = start_server().await;
    let mut client = client();
    client.open(format!("http://{}/broken", addr)).unwrap();

    match client.call("add", None).await {
        Err(ClientError::Transport { status, code, body, .. }) => {
            assert_eq!(status, 500);
            assert_eq!(code, 500);
            assert_eq!(body, "Internal Server Error");
        }
        other => panic!("expected Transport error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_http_connection_refused() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut client = client();
    client.open(format!("http://{}/rpc", addr)).unwrap();
    match client.call("add", None).await {
        Err(ClientError::Transport { status, .. }) => assert_eq!(status, 0),
        other => panic!("expected Transport error, got {:?}", other),
    }
}
