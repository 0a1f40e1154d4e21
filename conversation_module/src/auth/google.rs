//! OAuth 2.0 refresh-token exchange against Google's token endpoint.

use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::{debug, error, warn};

use crate::api::{http_client, ApiError};

pub const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// A freshly issued access token and its lifetime in seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenGrant {
    pub access_token: String,
    pub expires_in: f64,
}

/// Exchanges a long-lived refresh token for a short-lived access token.
pub trait IdentityProvider {
    fn exchange_refresh_token(&self, refresh_token: &str) -> Result<TokenGrant, ApiError>;
}

#[derive(Debug, Clone)]
pub struct GoogleOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub token_url: String,
}

#[derive(Debug, Deserialize)]
struct OAuthTokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: f64,
}

fn default_expires_in() -> f64 {
    3600.0
}

#[derive(Debug, Deserialize)]
struct OAuthErrorResponse {
    error: String,
}

#[derive(Debug, Clone)]
pub struct GoogleTokenClient {
    client: Client,
    config: GoogleOAuthConfig,
}

impl GoogleTokenClient {
    pub fn new(config: GoogleOAuthConfig) -> Result<Self, ApiError> {
        Ok(Self {
            client: http_client(Duration::from_secs(30))?,
            config,
        })
    }
}

impl IdentityProvider for GoogleTokenClient {
    fn exchange_refresh_token(&self, refresh_token: &str) -> Result<TokenGrant, ApiError> {
        debug!("refreshing Google OAuth access token");
        let response = self
            .client
            .post(&self.config.token_url)
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .map_err(|e| ApiError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            if is_invalid_grant(&body) {
                warn!("refresh token rejected with invalid_grant");
                return Err(ApiError::InvalidGrant(body));
            }
            error!("failed to refresh OAuth token: {} - {}", status, body);
            return Err(ApiError::Status {
                service: "oauth",
                status: status.as_u16(),
                body,
            });
        }

        let token: OAuthTokenResponse = response.json().map_err(|e| ApiError::Parse {
            service: "oauth",
            message: e.to_string(),
        })?;
        if token.access_token.trim().is_empty() {
            return Err(ApiError::Unexpected {
                service: "oauth",
                message: "token response carried an empty access_token".to_string(),
            });
        }
        Ok(TokenGrant {
            access_token: token.access_token,
            expires_in: token.expires_in,
        })
    }
}

fn is_invalid_grant(body: &str) -> bool {
    let trimmed = body.trim();
    trimmed == "invalid_grant"
        || serde_json::from_str::<OAuthErrorResponse>(trimmed)
            .map(|parsed| parsed.error == "invalid_grant")
            .unwrap_or(false)
}
