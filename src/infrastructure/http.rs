//! Shared plumbing for the Google HTTP APIs.

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

use crate::domain::DomainError;

pub const API_KEY_HEADER: &str = "x-goog-api-key";

pub fn build_client(timeout: Duration) -> Result<reqwest::Client, DomainError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| DomainError::internal(format!("failed to build HTTP client: {e}")))
}

/// Maps a transport failure. The URL is dropped so it never reaches logs or answers.
pub fn transport_error(e: reqwest::Error) -> DomainError {
    let e = e.without_url();
    if e.is_timeout() {
        DomainError::timeout(e.to_string())
    } else if e.is_decode() {
        DomainError::malformed(e.to_string())
    } else {
        DomainError::network(e.to_string())
    }
}

pub fn status_error(status: StatusCode, message: &str) -> DomainError {
    let detail = format!("HTTP {}: {}", status.as_u16(), message);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => DomainError::authentication(detail),
        StatusCode::TOO_MANY_REQUESTS => DomainError::quota(detail),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => DomainError::timeout(detail),
        _ => DomainError::external(detail),
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

/// Google APIs wrap failures as `{"error": {"message": ...}}`.
fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .map(|envelope| envelope.error.message)
        .unwrap_or_else(|_| body.chars().take(200).collect())
}

pub async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, DomainError> {
    let status = response.status();
    let body = response.text().await.map_err(transport_error)?;

    if !status.is_success() {
        return Err(status_error(status, &error_message(&body)));
    }

    serde_json::from_str(&body).map_err(|e| DomainError::malformed(e.to_string()))
}
