use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::app::AppState;
use crate::error::into_axum_response;

/// `GET /v1/models`: synthesize one OpenAI-shaped model entry per
/// configured scheme name, sorted lexicographically.
pub async fn handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Err(err) = state.authenticate(&headers) {
        return into_axum_response(&err);
    }

    let schemes = match state.config.load_schemes() {
        Ok(schemes) => schemes,
        Err(err) => return into_axum_response(&crate::error::ProxyError::Config(err.to_string())),
    };

    let mut model_ids: Vec<&str> = schemes.keys().map(String::as_str).collect();
    model_ids.sort_unstable();

    let data: Vec<_> = model_ids
        .into_iter()
        .map(|id| {
            json!({
                "id": id,
                "object": "model",
                "created": 1,
                "owned_by": "catfish-proxy",
            })
        })
        .collect();

    axum::Json(json!({ "object": "list", "data": data })).into_response()
}
