//! HTTP implementation of [`TransferClient`].
//!
//! Async HTTP client using `reqwest` with Bearer token authentication.
//! Endpoint arguments travel as JSON in the `Dropbox-API-Arg` header and
//! the request body is the raw payload.

use std::fmt::Write as _;
use std::time::Duration;

use bytes::Bytes;
use dbxup_protocol::constants::{API_ARG_HEADER, CONTENT_BASE_URL};
use dbxup_protocol::{ApiErrorBody, Endpoint};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue, RETRY_AFTER};
use tracing::{debug, trace};

use crate::error::{ClientError, RemoteError};
use crate::transport::{ClientFuture, TransferClient};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Time every request gets regardless of its body size.
const BASE_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Slowest upload rate tolerated before a request is abandoned, in bytes
/// per second.
const MIN_THROUGHPUT: u64 = 128 * 1024;

/// Content API client.
pub struct HttpClient {
    http: reqwest::Client,
    base_url: String,
    base_timeout: Duration,
}

impl HttpClient {
    /// Creates a new client with the given access token.
    pub fn new(access_token: &str) -> Result<Self, ClientError> {
        if access_token.trim().is_empty() {
            return Err(ClientError::InvalidToken);
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {access_token}"))
                .map_err(|_| ClientError::InvalidToken)?,
        );
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/octet-stream"),
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base_url: CONTENT_BASE_URL.to_string(),
            base_timeout: BASE_REQUEST_TIMEOUT,
        })
    }

    /// Whole-request deadline for a body of `body_len` bytes.
    ///
    /// A 150 MiB chunk gets a little over 20 minutes.
    fn request_timeout(&self, body_len: u64) -> Duration {
        self.base_timeout + Duration::from_secs(body_len / MIN_THROUGHPUT)
    }

    /// Sets a custom base URL (for testing).
    #[cfg(test)]
    pub(crate) fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    #[cfg(test)]
    pub(crate) fn with_base_timeout(mut self, timeout: Duration) -> Self {
        self.base_timeout = timeout;
        self
    }

    /// Performs an authenticated POST against a content endpoint.
    async fn send(
        &self,
        endpoint: Endpoint,
        args: &serde_json::Value,
        body: Option<Bytes>,
    ) -> Result<Vec<u8>, ClientError> {
        let url = format!("{}{}", self.base_url, endpoint.path());
        let arg_header = HeaderValue::from_str(&header_safe_json(args)?)
            .map_err(|_| ClientError::InvalidArgHeader)?;
        let body = body.unwrap_or_default();
        let timeout = self.request_timeout(body.len() as u64);

        debug!(%endpoint, body_len = body.len(), timeout_secs = timeout.as_secs(), "sending request");

        let resp = self
            .http
            .post(&url)
            .header(API_ARG_HEADER, arg_header)
            .timeout(timeout)
            .body(body)
            .send()
            .await?;
        let status = resp.status();

        if !status.is_success() {
            let retry_after = resp
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let is_plain_text = resp
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|ct| ct.contains("text/plain"));
            let text = resp.text().await.unwrap_or_default();

            let mut remote = decode_error(status.as_u16(), is_plain_text, &text);
            remote.retry_after = retry_after;
            debug!(%endpoint, status = remote.status, summary = %remote.summary, "request rejected");
            return Err(remote.into());
        }

        let bytes = resp.bytes().await?;
        trace!(%endpoint, len = bytes.len(), "response received");
        Ok(bytes.to_vec())
    }
}

impl TransferClient for HttpClient {
    fn post<'a>(
        &'a self,
        endpoint: Endpoint,
        args: &'a serde_json::Value,
        body: Option<Bytes>,
    ) -> ClientFuture<'a> {
        Box::pin(self.send(endpoint, args, body))
    }
}

/// Turns an error response into a [`RemoteError`].
///
/// Plain-text bodies become the summary verbatim. JSON bodies contribute
/// `error_summary` and, for offset rejections, the expected offset. A body
/// that is neither is kept as raw text.
fn decode_error(status: u16, is_plain_text: bool, body: &str) -> RemoteError {
    if is_plain_text {
        return RemoteError::new(status, body.trim());
    }

    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) => {
            let mut remote = RemoteError::new(status, parsed.error_summary.clone());
            remote.correct_offset = parsed.correct_offset();
            remote
        }
        Err(_) => RemoteError::new(status, body.trim()),
    }
}

/// Serializes `value` to JSON with every non-ASCII character escaped as
/// `\uXXXX`, so it is safe inside an HTTP header.
fn header_safe_json(value: &serde_json::Value) -> Result<String, ClientError> {
    let json = serde_json::to_string(value)?;
    if json.is_ascii() && !json.contains('\u{7f}') {
        return Ok(json);
    }

    let mut out = String::with_capacity(json.len() + 16);
    for c in json.chars() {
        if c.is_ascii() && c != '\u{7f}' {
            out.push(c);
        } else {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                // Writing to a String cannot fail.
                let _ = write!(out, "\\u{unit:04x}");
            }
        }
    }
    Ok(out)
}
