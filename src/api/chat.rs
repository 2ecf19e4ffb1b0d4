use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::StreamExt;
use serde_json::Value;

use crate::app::AppState;
use crate::dispatcher::{dispatch, DispatchOutcome};
use crate::error::{into_axum_response, ProxyError};

/// `POST /v1/chat/completions`: the core proxy endpoint. Parses the body as
/// JSON, authenticates, then hands off to the dispatcher.
pub async fn handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(err) = state.authenticate(&headers) {
        return into_axum_response(&err);
    }

    let request_body: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(err) => return into_axum_response(&ProxyError::InvalidRequest(err.to_string())),
    };

    match dispatch(&state, request_body).await {
        Ok(DispatchOutcome::Buffered {
            status,
            content_type,
            body,
        }) => {
            let status = axum::http::StatusCode::from_u16(status)
                .unwrap_or(axum::http::StatusCode::OK);
            let content_type = content_type.unwrap_or_else(|| "application/json".to_string());
            (
                status,
                [(axum::http::header::CONTENT_TYPE, content_type)],
                Body::from(body),
            )
                .into_response()
        }
        Ok(DispatchOutcome::Streaming { status, body, .. }) => {
            let status = axum::http::StatusCode::from_u16(status)
                .unwrap_or(axum::http::StatusCode::OK);
            let body = Body::from_stream(body.map(|chunk| chunk.map_err(std::io::Error::other)));
            (
                status,
                [(axum::http::header::CONTENT_TYPE, "text/event-stream")],
                body,
            )
                .into_response()
        }
        Err(err) => into_axum_response(&err),
    }
}
