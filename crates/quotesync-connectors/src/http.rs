//! Shared reqwest plumbing: client construction, trace propagation and the
//! mapping of transport failures onto [`TransportError`].

use std::time::Duration;

use opentelemetry::global;
use opentelemetry::Context;
use quotesync_api::{TransportError, TransportErrorKind};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use tracing::error;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Response bodies longer than this are cut in error messages.
const MAX_ERROR_BODY: usize = 500;

pub fn build_client() -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))
}

pub fn bearer_headers(token: &str) -> anyhow::Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    let value = HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|_| anyhow::anyhow!("Invalid API key format"))?;
    headers.insert(AUTHORIZATION, value);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(headers)
}

struct HeaderInjector {
    headers: HeaderMap,
}

impl opentelemetry::propagation::Injector for HeaderInjector {
    fn set(&mut self, key: &str, value: String) {
        if let Ok(header_name) = HeaderName::from_bytes(key.as_bytes()) {
            if let Ok(header_value) = HeaderValue::from_str(&value) {
                self.headers.insert(header_name, header_value);
            }
        }
    }
}

/// Copy of `headers` carrying the current trace context.
pub fn with_trace_context(headers: &HeaderMap) -> HeaderMap {
    let mut injector = HeaderInjector {
        headers: headers.clone(),
    };
    global::get_text_map_propagator(|propagator| {
        propagator.inject_context(&Context::current(), &mut injector);
    });
    injector.headers
}

/// Classify a reqwest failure that happened before a status was received.
pub fn request_error(e: reqwest::Error, url: &str, operation: &str) -> TransportError {
    let (kind, detail) = if e.is_timeout() {
        (TransportErrorKind::Timeout, "timeout - request took too long")
    } else if e.is_connect() {
        (TransportErrorKind::Connect, "connection error - check network connectivity")
    } else if e.is_decode() {
        (TransportErrorKind::Decode, "decode error - unexpected response format")
    } else if e.is_request() {
        (TransportErrorKind::Connect, "request error - could not send request")
    } else {
        (TransportErrorKind::Client, "unexpected client error")
    };
    let err = TransportError::new(
        kind,
        format!("Failed to {} for {}: {}: {}", operation, url, detail, e),
    );
    error!("[Http] {}", err);
    err
}

/// Read the body, turning non-success statuses into typed errors.
pub async fn read_body(response: reqwest::Response, url: &str) -> Result<String, TransportError> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| request_error(e, url, "read response body"))?;

    if !status.is_success() {
        return Err(TransportError::from_status(
            status.as_u16(),
            format!("HTTP {} error from {}: {}", status.as_u16(), url, truncate(&text)),
        ));
    }
    Ok(text)
}

pub fn decode<T: DeserializeOwned>(text: &str, url: &str) -> Result<T, TransportError> {
    serde_json::from_str(text).map_err(|e| {
        TransportError::new(
            TransportErrorKind::Decode,
            format!("Failed to parse response from {}: {} - body: {}", url, e, truncate(text)),
        )
    })
}

fn truncate(text: &str) -> String {
    if text.len() > MAX_ERROR_BODY {
        let cut = (0..=MAX_ERROR_BODY)
            .rev()
            .find(|i| text.is_char_boundary(*i))
            .unwrap_or(0);
        format!("{}... (truncated)", &text[..cut])
    } else {
        text.to_string()
    }
}
