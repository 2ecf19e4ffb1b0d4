//! Shared scaffolding for the integration tests: an in-process mock
//! upstream speaking the OpenAI chat-completions shape, and a helper to
//! stand up a full `AppState`/router pair against a throwaway data
//! directory.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use axum::extract::State as AxumState;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use catfish_proxy::app::AppState;
use catfish_proxy::store::PersistentStore;
use catfish_proxy::transport::HttpTransport;

/// How a spawned mock upstream should answer every request it receives.
#[derive(Clone, Copy)]
pub enum MockBehavior {
    /// Always answer 200 with a small buffered JSON body.
    Ok,
    /// Always answer with the given status and a JSON error body.
    Error(u16),
    /// Answer 200 and stream a couple of SSE chunks, then end cleanly.
    StreamOk,
    /// Answer 200, stream one SSE chunk, then close the connection without
    /// finishing — simulates an upstream dying mid-response.
    StreamThenAbort,
}

#[derive(Clone)]
struct MockState {
    behavior: MockBehavior,
    hits: Arc<AtomicU32>,
}

/// A running mock upstream. Keep this alive for as long as the proxy may
/// still call it; the background server task is detached and exits when
/// the process does.
pub struct MockUpstream {
    pub addr: SocketAddr,
    hits: Arc<AtomicU32>,
}

impl MockUpstream {
    #[must_use]
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn hit_count(&self) -> u32 {
        self.hits.load(Ordering::SeqCst)
    }
}

async fn mock_handler(AxumState(state): AxumState<MockState>, body: axum::body::Bytes) -> Response {
    // A real upstream would reject a non-JSON body; tests always send valid
    // JSON, so any parse error here would indicate a test bug, not upstream
    // behavior worth emulating.
    let _: Value = serde_json::from_slice(&body).expect("mock upstream received non-JSON body");
    state.hits.fetch_add(1, Ordering::SeqCst);

    match state.behavior {
        MockBehavior::Ok => Json(json!({
            "id": "chatcmpl-mock",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": "ok" },
                "finish_reason": "stop"
            }]
        }))
        .into_response(),
        MockBehavior::Error(status) => (
            axum::http::StatusCode::from_u16(status).unwrap(),
            Json(json!({ "error": { "message": "mock upstream error" } })),
        )
            .into_response(),
        MockBehavior::StreamOk => sse_response(
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"o\"}}]}\n\n\
             data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"k\"}}]}\n\n\
             data: [DONE]\n\n",
        ),
        MockBehavior::StreamThenAbort => sse_response(
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"o\"}}]}\n\n",
        ),
    }
}

fn sse_response(body: &'static str) -> Response {
    (
        axum::http::StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "text/event-stream")],
        body,
    )
        .into_response()
}

/// Spawn an in-process mock upstream on an ephemeral port.
pub async fn spawn_mock_upstream(behavior: MockBehavior) -> MockUpstream {
    let hits = Arc::new(AtomicU32::new(0));
    let state = MockState {
        behavior,
        hits: Arc::clone(&hits),
    };
    let app = Router::new()
        .route("/chat/completions", post(mock_handler))
        .with_state(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    MockUpstream { addr, hits }
}

/// Build a fresh `AppState` backed by a throwaway data directory. The
/// `TempDir` must outlive every use of the returned `AppState` — see the
/// note on the equivalent helper in `api::models`'s unit tests.
pub fn build_state(admin_key: &str) -> (tempfile::TempDir, Arc<AppState>) {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(PersistentStore::new(dir.path()).unwrap());
    let transport = HttpTransport::new().unwrap();
    let state = Arc::new(AppState::new(store, transport, admin_key.to_string()));
    (dir, state)
}

/// Spawn the real proxy router on an ephemeral port and return its address.
/// Tests drive it with a plain `reqwest` client, exercising the exact same
/// HTTP surface a deployed instance would serve.
pub async fn spawn_proxy(state: Arc<AppState>) -> SocketAddr {
    let app = catfish_proxy::app::router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}
