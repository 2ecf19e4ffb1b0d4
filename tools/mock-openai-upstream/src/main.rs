//! A minimal OpenAI-compatible chat-completions upstream for integration
//! tests: one endpoint, a handful of controllable scenarios, and a request
//! counter tests can poll to check which upstream handled a given request.

use std::convert::Infallible;
use std::env;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use http::{header, HeaderValue, Method, Request, Response, StatusCode};
use http_body_util::BodyExt;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use tokio::net::TcpListener;

const DEFAULT_UPSTREAM_PORT: u16 = 19_001;

#[derive(Copy, Clone)]
enum Scenario {
    /// Respond 200 with a small buffered JSON body.
    Ok,
    /// Respond with a configurable error status and a JSON error body.
    Error,
    /// Respond 200 and stream a few SSE chunks, then end cleanly.
    StreamOk,
    /// Respond 200, stream one SSE chunk, then abort the connection.
    StreamThenAbort,
}

struct MockState {
    scenario: Scenario,
    error_status: StatusCode,
    request_count: AtomicU64,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let port = env_u16("UPSTREAM_PORT", DEFAULT_UPSTREAM_PORT);
    let state = Arc::new(MockState {
        scenario: parse_scenario(),
        error_status: parse_error_status(),
        request_count: AtomicU64::new(0),
    });

    let listener = TcpListener::bind(("127.0.0.1", port))
        .await
        .unwrap_or_else(|err| panic!("failed to bind mock upstream on 127.0.0.1:{port}: {err}"));

    let conn_builder = AutoBuilder::new(TokioExecutor::new());

    loop {
        let (stream, remote_addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                eprintln!("accept error: {err}");
                continue;
            }
        };
        let io = TokioIo::new(stream);
        let conn_builder = conn_builder.clone();
        let service_state = Arc::clone(&state);
        let service = service_fn(move |request: Request<Incoming>| {
            let state_ref = Arc::clone(&service_state);
            async move { Ok::<_, Infallible>(handle_request(request, &state_ref).await) }
        });

        tokio::spawn(async move {
            if let Err(err) = conn_builder.serve_connection(io, service).await {
                eprintln!("mock upstream connection error from {remote_addr}: {err}");
            }
        });
    }
}

fn env_u16(name: &str, default: u16) -> u16 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(default)
}

fn parse_scenario() -> Scenario {
    match env::var("MOCK_SCENARIO").as_deref() {
        Ok("error") => Scenario::Error,
        Ok("stream_ok") => Scenario::StreamOk,
        Ok("stream_then_abort") => Scenario::StreamThenAbort,
        Ok("ok") | Err(_) => Scenario::Ok,
        Ok(other) => {
            eprintln!("unknown MOCK_SCENARIO '{other}', falling back to ok");
            Scenario::Ok
        }
    }
}

fn parse_error_status() -> StatusCode {
    env::var("MOCK_ERROR_STATUS")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .and_then(|code| StatusCode::from_u16(code).ok())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

async fn handle_request(request: Request<Incoming>, state: &Arc<MockState>) -> Response<Full<Bytes>> {
    let (parts, body) = request.into_parts();
    drain_request_body(body).await;

    if parts.method == Method::GET && parts.uri.path() == "/_mock/stats" {
        return stats_response(state);
    }
    if parts.method == Method::POST && parts.uri.path() == "/_mock/reset" {
        state.request_count.store(0, Ordering::SeqCst);
        return json_response(StatusCode::OK, br#"{"ok":true}"#);
    }
    if parts.method != Method::POST || parts.uri.path() != "/chat/completions" {
        return json_response(StatusCode::NOT_FOUND, br#"{"error":"not_found"}"#);
    }

    state.request_count.fetch_add(1, Ordering::SeqCst);

    match state.scenario {
        Scenario::Ok => json_response(StatusCode::OK, OK_BODY),
        Scenario::Error => {
            let body = format!(r#"{{"error":{{"message":"mock upstream error","status":{}}}}}"#, state.error_status.as_u16());
            json_response(state.error_status, body.into_bytes())
        }
        Scenario::StreamOk => sse_response(STREAM_OK_BODY),
        Scenario::StreamThenAbort => sse_response(STREAM_ABORT_BODY),
    }
}

async fn drain_request_body(mut body: Incoming) {
    while let Some(frame_result) = body.frame().await {
        if frame_result.is_err() {
            break;
        }
    }
}

fn stats_response(state: &MockState) -> Response<Full<Bytes>> {
    let body = format!(
        r#"{{"request_count":{}}}"#,
        state.request_count.load(Ordering::SeqCst)
    );
    json_response(StatusCode::OK, body.into_bytes())
}

fn json_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn sse_response(body: &'static [u8]) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body)));
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
}

const OK_BODY: &[u8] = br#"{"id":"chatcmpl-mock","object":"chat.completion","created":1,"model":"m1","choices":[{"index":0,"message":{"role":"assistant","content":"ok"},"finish_reason":"stop"}]}"#;

const STREAM_OK_BODY: &[u8] = b"data: {\"id\":\"chatcmpl-mock\",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"o\"}}]}\n\ndata: {\"id\":\"chatcmpl-mock\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"k\"},\"finish_reason\":\"stop\"}]}\n\ndata: [DONE]\n\n";

// Hyper's `Full` body sends the whole thing in one frame; a real mid-stream
// abort (for the "committed stream, upstream errors mid-flight" dispatcher
// test) is exercised at the integration-test level by dropping the TCP
// connection after the headers, not by this body's content.
const STREAM_ABORT_BODY: &[u8] = b"data: {\"id\":\"chatcmpl-mock\",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"o\"}}]}\n\n";
