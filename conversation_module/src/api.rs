use std::time::Duration;

use reqwest::blocking::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::error;

/// Failures talking to the HTTP collaborators (OAuth, vector index, LLM, scheduler).
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("http error: {0}")]
    Http(String),
    #[error("{service} returned {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },
    #[error("failed to parse {service} response: {message}")]
    Parse {
        service: &'static str,
        message: String,
    },
    #[error("refresh token rejected (invalid_grant): {0}")]
    InvalidGrant(String),
    #[error("unexpected {service} response: {message}")]
    Unexpected {
        service: &'static str,
        message: String,
    },
}

impl ApiError {
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Http(_) | ApiError::Parse { .. } => true,
            ApiError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

pub(crate) fn http_client(timeout: Duration) -> Result<Client, ApiError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ApiError::Http(e.to_string()))
}

pub(crate) fn check_status(service: &'static str, response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    error!("{} request failed: {} - {}", service, status, body);
    Err(ApiError::Status {
        service,
        status: status.as_u16(),
        body,
    })
}

pub(crate) fn read_json<T: DeserializeOwned>(
    service: &'static str,
    response: Response,
) -> Result<T, ApiError> {
    check_status(service, response)?
        .json()
        .map_err(|e| ApiError::Parse {
            service,
            message: e.to_string(),
        })
}
