//! A thin `reqwest`-based transport: one shared client, one attempt timeout.
//!
//! Retry and backoff across upstreams is the scheduler and dispatcher's job
//! (picking the next candidate); this module only makes a single HTTP call
//! per attempt and reports what happened.

use std::time::Duration;

use bytes::Bytes;
use futures_util::Stream;

use crate::error::AttemptError;

/// Ceiling on how long one upstream attempt may take before it is treated
/// as a transport failure and the next candidate is tried.
pub const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(60);

/// A non-streaming attempt's successful result: status plus the full body,
/// forwarded to the client verbatim.
pub struct BufferedResponse {
    pub status: u16,
    pub body: Bytes,
    pub content_type: Option<String>,
}

/// A streaming attempt's successful result: status, headers worth
/// forwarding, and the body as a stream of chunks the dispatcher relays to
/// the client as they arrive.
pub struct StreamingResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: reqwest::Response,
}

/// Thin wrapper around a shared [`reqwest::Client`]. Cheap to clone; the
/// underlying client owns its own connection pool.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build the shared client used for every upstream call.
    ///
    /// # Errors
    /// Returns an error if the underlying TLS/connector setup fails.
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(ATTEMPT_TIMEOUT)
            .connect_timeout(Duration::from_secs(10))
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { client })
    }

    /// Send one non-streaming request, buffering the entire body.
    ///
    /// `Ok` covers every case where the upstream answered at all — callers
    /// decide success/failure from the status code. `Err` means no response
    /// was received (timeout, connect failure, etc).
    pub async fn send_buffered(
        &self,
        url: &str,
        bearer: &str,
        body: &[u8],
    ) -> Result<BufferedResponse, AttemptError> {
        let response = self
            .client
            .post(url)
            .bearer_auth(bearer)
            .header(http::header::CONTENT_TYPE, "application/json")
            .header(http::header::ACCEPT, "application/json")
            .body(body.to_vec())
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status().as_u16();
        let content_type = content_type_of(&response);
        let body = response.bytes().await.map_err(transport_error)?;
        Ok(BufferedResponse {
            status,
            body,
            content_type,
        })
    }

    /// Send one streaming request. The response headers (status, content
    /// type) are available immediately; the body is handed back as a lazy
    /// stream so the dispatcher can start relaying bytes as soon as the
    /// first chunk arrives, without buffering the whole thing.
    pub async fn send_streaming(
        &self,
        url: &str,
        bearer: &str,
        body: &[u8],
    ) -> Result<StreamingResponse, AttemptError> {
        let response = self
            .client
            .post(url)
            .bearer_auth(bearer)
            .header(http::header::CONTENT_TYPE, "application/json")
            .header(http::header::ACCEPT, "text/event-stream")
            .body(body.to_vec())
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status().as_u16();
        let content_type = content_type_of(&response);
        Ok(StreamingResponse {
            status,
            content_type,
            body: response,
        })
    }
}

impl StreamingResponse {
    /// Consume this response into its raw byte-chunk stream.
    pub fn into_stream(self) -> impl Stream<Item = reqwest::Result<Bytes>> {
        self.body.bytes_stream()
    }

    /// Buffer the remaining body — used when a streaming attempt in fact
    /// failed (status >= 400) and its error body must be read in full to
    /// become the candidate's `AttemptError`.
    pub async fn into_bytes(self) -> Result<Bytes, AttemptError> {
        self.body.bytes().await.map_err(transport_error)
    }
}

fn content_type_of(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(http::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

fn transport_error(err: reqwest::Error) -> AttemptError {
    AttemptError::Transport {
        message: err.to_string(),
    }
}
