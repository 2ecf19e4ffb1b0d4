use axum::body::Body;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

/// Crate-wide error type.
///
/// Every variant maps to exactly one HTTP status via [`ProxyError::status`],
/// matching the disposition table in the error handling design.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Auth error: {0}")]
    Auth(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("No backends configured")]
    NoBackends,
    #[error("All backends unavailable")]
    AllTripped,
    /// The last candidate's attempt error, forwarded verbatim after every
    /// candidate in the attempt queue has failed — rendered through
    /// [`AttemptError::into_response_parts`] so the client sees the exact
    /// bytes the upstream (or the transport failure) produced.
    #[error("upstream attempt failed: {0}")]
    Upstream(AttemptError),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProxyError {
    #[must_use]
    pub fn status(&self) -> http::StatusCode {
        match self {
            ProxyError::InvalidRequest(_) => http::StatusCode::BAD_REQUEST,
            ProxyError::Auth(_) => http::StatusCode::UNAUTHORIZED,
            ProxyError::NoBackends | ProxyError::Config(_) | ProxyError::Internal(_) => {
                http::StatusCode::INTERNAL_SERVER_ERROR
            }
            ProxyError::AllTripped => http::StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::Upstream(attempt_err) => attempt_err.clone().into_response_parts().0,
        }
    }

    #[must_use]
    pub fn body(&self) -> Value {
        match self {
            ProxyError::Upstream(attempt_err) => {
                let (_, body) = attempt_err.clone().into_response_parts();
                serde_json::from_slice(&body).unwrap_or_else(|_| {
                    json!({ "error": String::from_utf8_lossy(&body).into_owned() })
                })
            }
            other => json!({ "error": other.to_string() }),
        }
    }
}

/// Render a [`ProxyError`] as the `axum` response it should produce.
///
/// The [`ProxyError::Upstream`] variant bypasses [`ProxyError::body`]'s
/// JSON wrapping and is rendered straight from
/// [`AttemptError::into_response_parts`] so the client gets the upstream's
/// exact bytes rather than a round-tripped-through-`serde_json::Value` copy.
#[must_use]
pub fn into_axum_response(err: &ProxyError) -> Response {
    match err {
        ProxyError::Upstream(attempt_err) => {
            let (status, body) = attempt_err.clone().into_response_parts();
            (
                status,
                [(http::header::CONTENT_TYPE, "application/json")],
                Body::from(body),
            )
                .into_response()
        }
        other => (other.status(), Json(other.body())).into_response(),
    }
}

/// The outcome of a single upstream attempt that failed, kept around so the
/// exhaustion path can return the most recent error verbatim to the client.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AttemptError {
    /// The upstream answered with a status code and body before (or instead
    /// of) a successful response.
    #[error("upstream responded with HTTP {status}")]
    HttpStatus { status: u16, body: Vec<u8> },
    /// A transport-level failure: connect error, timeout, or similar. No
    /// upstream response was ever received.
    #[error("transport error: {message}")]
    Transport { message: String },
}

impl AttemptError {
    /// Render this error as the response that should be sent to the client
    /// when every candidate has been exhausted.
    #[must_use]
    pub fn into_response_parts(self) -> (http::StatusCode, Vec<u8>) {
        match self {
            AttemptError::HttpStatus { status, body } => {
                let status = http::StatusCode::from_u16(status)
                    .unwrap_or(http::StatusCode::INTERNAL_SERVER_ERROR);
                (status, body)
            }
            AttemptError::Transport { message } => {
                let body = json!({ "error": message }).to_string().into_bytes();
                (http::StatusCode::INTERNAL_SERVER_ERROR, body)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_disposition_table() {
        assert_eq!(
            ProxyError::InvalidRequest("x".into()).status(),
            http::StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ProxyError::Auth("x".into()).status(),
            http::StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ProxyError::NoBackends.status(),
            http::StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ProxyError::AllTripped.status(),
            http::StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn attempt_error_http_status_roundtrips() {
        let err = AttemptError::HttpStatus {
            status: 503,
            body: b"boom".to_vec(),
        };
        let (status, body) = err.into_response_parts();
        assert_eq!(status, http::StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body, b"boom");
    }

    #[tokio::test]
    async fn proxy_error_upstream_renders_the_attempt_error_verbatim() {
        let err = ProxyError::Upstream(AttemptError::HttpStatus {
            status: 429,
            body: br#"{"error":{"message":"rate limited"}}"#.to_vec(),
        });
        assert_eq!(err.status(), http::StatusCode::TOO_MANY_REQUESTS);

        let response = into_axum_response(&err);
        assert_eq!(response.status(), http::StatusCode::TOO_MANY_REQUESTS);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], br#"{"error":{"message":"rate limited"}}"#);
    }
}
