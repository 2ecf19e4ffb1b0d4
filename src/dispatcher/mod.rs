//! Drives the attempt queue built by [`crate::scheduler`] against real
//! upstreams, applying the streaming/non-streaming failover rules and
//! recording every outcome through [`crate::state::StateStore`].

mod stream;

use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use serde_json::Value;

use crate::app::AppState;
use crate::error::{AttemptError, ProxyError};
use crate::scheduler::{build_attempt_queue, Candidate};
use crate::state::Outcome;
use crate::util::now;

pub use stream::RecordingStream;

/// What the dispatcher hands back to the HTTP layer for it to turn into a
/// response.
pub enum DispatchOutcome {
    Buffered {
        status: u16,
        content_type: Option<String>,
        body: Bytes,
    },
    Streaming {
        status: u16,
        content_type: Option<String>,
        body: Pin<Box<dyn Stream<Item = Result<Bytes, AttemptError>> + Send>>,
    },
}

/// Run one chat-completion request through scheme selection, breaker
/// filtering, round-robin ordering, and sequential failover across the
/// resulting candidates.
///
/// `request_body` is the client's JSON body, forwarded essentially as-is;
/// only the `model` field is ever rewritten, per candidate, when that
/// candidate's configured `model` override is set.
pub async fn dispatch(state: &Arc<AppState>, request_body: Value) -> Result<DispatchOutcome, ProxyError> {
    let is_stream = request_body
        .get("stream")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let requested_scheme = request_body.get("model").and_then(Value::as_str);

    let schemes = state
        .config
        .load_schemes()
        .map_err(|err| ProxyError::Config(err.to_string()))?;
    if schemes.is_empty() {
        return Err(ProxyError::NoBackends);
    }

    let snapshot = state
        .state
        .snapshot(&schemes)
        .map_err(|err| ProxyError::Internal(err.to_string()))?;

    let queue = build_attempt_queue(requested_scheme, &schemes, &snapshot, now())
        .ok_or(ProxyError::NoBackends)?;

    if queue.candidates.is_empty() {
        return Err(ProxyError::AllTripped);
    }

    let mut last_error: Option<AttemptError> = None;

    for candidate in queue.candidates {
        let body = body_for_candidate(&request_body, &candidate);
        let body_bytes = match serde_json::to_vec(&body) {
            Ok(bytes) => bytes,
            Err(err) => return Err(ProxyError::InvalidRequest(err.to_string())),
        };

        tracing::info!(
            upstream_id = %candidate.upstream.id,
            scheme = %queue.scheme_name,
            priority = candidate.priority,
            "attempting upstream"
        );

        let attempt = if is_stream {
            attempt_streaming(state, &queue.scheme_name, &candidate, &body_bytes).await
        } else {
            attempt_buffered(state, &queue.scheme_name, &candidate, &body_bytes).await
        };

        match attempt {
            Ok(outcome) => return Ok(outcome),
            Err(err) => {
                record(state, &queue.scheme_name, &candidate, Outcome::Failure);
                tracing::warn!(
                    upstream_id = %candidate.upstream.id,
                    scheme = %queue.scheme_name,
                    error = %err,
                    "attempt failed"
                );
                last_error = Some(err);
            }
        }
    }

    tracing::warn!(scheme = %queue.scheme_name, "every candidate exhausted");
    match last_error {
        Some(err) => Err(verbatim_error(err)),
        None => Err(ProxyError::Internal(
            "attempt queue exhausted with no recorded error".to_string(),
        )),
    }
}

fn body_for_candidate(request_body: &Value, candidate: &Candidate) -> Value {
    let mut body = request_body.clone();
    if let Some(model) = &candidate.upstream.model {
        if let Value::Object(map) = &mut body {
            map.insert("model".to_string(), Value::String(model.clone()));
        }
    }
    body
}

async fn attempt_buffered(
    state: &Arc<AppState>,
    scheme: &str,
    candidate: &Candidate,
    body: &[u8],
) -> Result<DispatchOutcome, AttemptError> {
    let url = candidate.upstream.chat_completions_url();
    let response = state
        .transport
        .send_buffered(&url, &candidate.upstream.api_key, body)
        .await?;

    if response.status >= 400 {
        return Err(AttemptError::HttpStatus {
            status: response.status,
            body: response.body.to_vec(),
        });
    }

    record(state, scheme, candidate, Outcome::Success);
    Ok(DispatchOutcome::Buffered {
        status: response.status,
        content_type: response.content_type,
        body: response.body,
    })
}

async fn attempt_streaming(
    state: &Arc<AppState>,
    scheme: &str,
    candidate: &Candidate,
    body: &[u8],
) -> Result<DispatchOutcome, AttemptError> {
    let url = candidate.upstream.chat_completions_url();
    let response = state
        .transport
        .send_streaming(&url, &candidate.upstream.api_key, body)
        .await?;

    if response.status >= 400 {
        let status = response.status;
        let body = response.into_bytes().await?;
        return Err(AttemptError::HttpStatus {
            status,
            body: body.to_vec(),
        });
    }

    // Committed from here: once the client starts receiving body bytes
    // there is no further failover, only an outcome left to record against
    // the upstream that already answered with a 2xx. A clean end-of-stream
    // records success; a mid-stream error records failure, but neither
    // changes what has already been sent to the client.
    let status = response.status;
    let content_type = response.content_type.clone();
    let state = Arc::clone(state);
    let scheme = scheme.to_string();
    let candidate = candidate.clone();

    let raw = response
        .into_stream()
        .map(|chunk| chunk.map_err(|err| AttemptError::Transport { message: err.to_string() }));

    let recording = RecordingStream::new(raw, move |outcome| {
        record(&state, &scheme, &candidate, outcome);
    });

    Ok(DispatchOutcome::Streaming {
        status,
        content_type,
        body: Box::pin(recording),
    })
}

fn record(state: &Arc<AppState>, scheme: &str, candidate: &Candidate, outcome: Outcome) {
    let schemes = match state.config.load_schemes() {
        Ok(schemes) => schemes,
        Err(err) => {
            tracing::warn!(error = %err, "failed to reload schemes while recording attempt outcome");
            return;
        }
    };
    if let Err(err) = state.state.record_attempt(
        &schemes,
        &candidate.upstream.id,
        outcome,
        scheme,
        candidate.priority,
        candidate.group_size,
        candidate.cursor_in_group,
        candidate.upstream.consecutive_failure_threshold,
        candidate.upstream.disable_duration_seconds,
    ) {
        tracing::warn!(error = %err, "failed to persist attempt outcome");
    }
}

fn verbatim_error(err: AttemptError) -> ProxyError {
    match err {
        err @ AttemptError::HttpStatus { .. } => ProxyError::Upstream(err),
        AttemptError::Transport { message } => ProxyError::Internal(message),
    }
}
