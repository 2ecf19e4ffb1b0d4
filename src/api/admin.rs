use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::app::AppState;
use crate::config::registry::UpstreamCreate;
use crate::config::{ConfigError, UpstreamInput};
use crate::error::{into_axum_response, ProxyError};

fn config_error_response(err: ConfigError) -> Response {
    match err {
        ConfigError::NotFound(id) => {
            (StatusCode::NOT_FOUND, Json(serde_json::json!({ "error": format!("upstream not found: {id}") })))
                .into_response()
        }
        other => into_axum_response(&ProxyError::Config(other.to_string())),
    }
}

/// `GET /admin/config`: every scheme and its upstreams.
pub async fn list_config(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Err(err) = state.authenticate(&headers) {
        return into_axum_response(&err);
    }
    match state.config.load_schemes() {
        Ok(schemes) => Json(schemes).into_response(),
        Err(err) => config_error_response(err),
    }
}

/// Body shape for `POST /admin/config`: an [`UpstreamCreate`] plus the
/// scheme name it should be appended to.
#[derive(serde::Deserialize)]
pub struct CreateUpstreamBody {
    pub scheme_name: String,
    #[serde(flatten)]
    pub fields: UpstreamCreate,
}

/// `POST /admin/config`: create a new upstream in the named scheme.
pub async fn create_config(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateUpstreamBody>,
) -> Response {
    if let Err(err) = state.authenticate(&headers) {
        return into_axum_response(&err);
    }
    match state.config.create(&body.scheme_name, body.fields) {
        Ok(upstream) => {
            crate::observability::log_and_record(
                &state.logs,
                &format!("created upstream {} in scheme '{}'", upstream.id, body.scheme_name),
            );
            (StatusCode::CREATED, Json(upstream)).into_response()
        }
        Err(err) => config_error_response(err),
    }
}

/// `PUT /admin/config/{id}`: merge the supplied fields into an existing
/// upstream.
pub async fn update_config(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(fields): Json<UpstreamInput>,
) -> Response {
    if let Err(err) = state.authenticate(&headers) {
        return into_axum_response(&err);
    }
    match state.config.update(&id, fields) {
        Ok(upstream) => {
            crate::observability::log_and_record(&state.logs, &format!("updated upstream {id}"));
            Json(upstream).into_response()
        }
        Err(err) => config_error_response(err),
    }
}

/// `DELETE /admin/config/{id}`.
pub async fn delete_config(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if let Err(err) = state.authenticate(&headers) {
        return into_axum_response(&err);
    }
    match state.config.delete(&id) {
        Ok(()) => {
            crate::observability::log_and_record(&state.logs, &format!("deleted upstream {id}"));
            StatusCode::NO_CONTENT.into_response()
        }
        Err(err) => config_error_response(err),
    }
}

/// `GET /admin/stats`: the full state document, with day-rollover and
/// pruning already applied.
pub async fn stats(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Err(err) = state.authenticate(&headers) {
        return into_axum_response(&err);
    }
    let schemes = match state.config.load_schemes() {
        Ok(schemes) => schemes,
        Err(err) => return config_error_response(err),
    };
    match state.state.snapshot(&schemes) {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(err) => into_axum_response(&ProxyError::Internal(err.to_string())),
    }
}

/// `GET /admin/logs`: the last 200 log lines, oldest first.
pub async fn logs(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Err(err) = state.authenticate(&headers) {
        return into_axum_response(&err);
    }
    Json(state.logs.snapshot()).into_response()
}
