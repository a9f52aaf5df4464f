//! Shared request handling for the HTTP adapters.
//!
//! Every outbound request goes through [`send`], which maps transport failures and
//! non-success statuses into `GlueforwardError` the same way for every service.

use crate::domain::GlueforwardError;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::time::Duration;

/// Longest response body kept in an error message.
const MAX_BODY_CHARS: usize = 200;

/// Build the HTTP client shared by one adapter. The timeout bounds connect and read,
/// so a hung peer surfaces as `Unreachable` instead of blocking the loop.
pub fn build_client(timeout: Duration) -> reqwest::Result<Client> {
    Client::builder().timeout(timeout).build()
}

/// Join a configured base URL and an API path.
pub fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

/// Send a request and classify the outcome.
///
/// - connect error, timeout, or connection dropped mid-exchange -> `Unreachable`
/// - 401 / 403 -> `AuthFailed`
/// - 5xx -> `SetPortFailed`
/// - any other non-success -> `UnexpectedStatus`
pub async fn send(service: &str, request: RequestBuilder) -> Result<Response, GlueforwardError> {
    let response = request
        .send()
        .await
        .map_err(|e| transport_error(service, e))?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = error_body(response).await;
    Err(classify_status(service, status, body))
}

/// Read a success body as text. A timeout or a dropped connection while reading
/// counts as unreachable.
pub async fn read_text(service: &str, response: Response) -> Result<String, GlueforwardError> {
    response
        .text()
        .await
        .map_err(|e| transport_error(service, e))
}

pub fn classify_status(service: &str, status: StatusCode, body: String) -> GlueforwardError {
    match status.as_u16() {
        401 | 403 => GlueforwardError::AuthFailed {
            service: service.to_string(),
            status: status.as_u16(),
            body,
        },
        500..=599 => GlueforwardError::SetPortFailed {
            service: service.to_string(),
            status: status.as_u16(),
            body,
        },
        _ => GlueforwardError::UnexpectedStatus {
            service: service.to_string(),
            status: status.as_u16(),
            body,
        },
    }
}

/// Builder and redirect errors come from how the request was made. Every other
/// transport failure (refused, reset, closed early, timed out, body cut short)
/// means the peer is down or restarting.
pub fn transport_error(service: &str, err: reqwest::Error) -> GlueforwardError {
    if err.is_builder() || err.is_redirect() {
        return GlueforwardError::Http {
            service: service.to_string(),
            reason: err.to_string(),
        };
    }
    GlueforwardError::Unreachable {
        service: service.to_string(),
        target: err
            .url()
            .map(|u| u.to_string())
            .unwrap_or_else(|| "unknown".to_string()),
        reason: err.to_string(),
    }
}

/// Body of a failed response, truncated for logging.
pub async fn error_body(response: Response) -> String {
    let text = response.text().await.unwrap_or_default();
    text.chars().take(MAX_BODY_CHARS).collect()
}
