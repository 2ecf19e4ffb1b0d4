use std::sync::Arc;

use catfish_proxy::app::{router, AppState};
use catfish_proxy::observability::init_tracing;
use catfish_proxy::store::PersistentStore;
use catfish_proxy::transport::HttpTransport;

fn main() {
    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    init_tracing(&log_level);

    let runtime = build_runtime();
    runtime.block_on(run());
}

fn build_runtime() -> tokio::runtime::Runtime {
    let worker_threads = std::env::var("RUNTIME_WORKER_THREADS")
        .ok()
        .and_then(|v| v.parse::<usize>().ok());
    let max_blocking_threads = std::env::var("RUNTIME_MAX_BLOCKING_THREADS")
        .ok()
        .and_then(|v| v.parse::<usize>().ok());

    let mut builder = if worker_threads == Some(1) {
        tokio::runtime::Builder::new_current_thread()
    } else {
        let mut builder = tokio::runtime::Builder::new_multi_thread();
        if let Some(threads) = worker_threads {
            builder.worker_threads(threads);
        }
        builder
    };
    builder.enable_io();
    builder.enable_time();
    if let Some(max_blocking_threads) = max_blocking_threads {
        builder.max_blocking_threads(max_blocking_threads);
    }
    builder.build().unwrap_or_else(|err| {
        eprintln!("Failed to initialize Tokio runtime: {err}");
        std::process::exit(1);
    })
}

async fn run() {
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8080);
    let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string());
    let admin_key = std::env::var("ADMIN_KEY").unwrap_or_default();

    if admin_key.is_empty() {
        tracing::error!(
            "ADMIN_KEY is not set — the service will start, but every request will fail with a configuration error"
        );
    }

    let store = Arc::new(PersistentStore::new(&data_dir).unwrap_or_else(|err| {
        eprintln!("Failed to initialize data directory '{data_dir}': {err}");
        std::process::exit(1);
    }));
    let transport = HttpTransport::new().unwrap_or_else(|err| {
        eprintln!("Failed to initialize HTTP transport: {err}");
        std::process::exit(1);
    });
    let state = Arc::new(AppState::new(store, transport, admin_key));
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .unwrap_or_else(|err| {
            eprintln!("Failed to bind to 0.0.0.0:{port}: {err}");
            std::process::exit(1);
        });

    tracing::info!(port, "catfish-proxy is ready to accept connections");
    if let Err(err) = axum::serve(listener, app).await {
        tracing::error!(error = %err, "server loop exited");
    }
}
