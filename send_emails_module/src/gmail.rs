use std::env;
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::errors::MailError;
use crate::message::{GmailMessage, GmailThread};
use crate::mime::OutgoingEmail;
use crate::transport::{MailTransport, SendOutcome, SentMessage};

pub const DEFAULT_GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/";

#[derive(Debug, Clone)]
pub struct GmailConfig {
    pub api_base: String,
    pub timeout: Duration,
}

impl Default for GmailConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_GMAIL_API_BASE.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl GmailConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let api_base = env::var("GMAIL_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_GMAIL_API_BASE.to_string());
        Self {
            api_base,
            ..Self::default()
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendRequest<'a> {
    raw: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    thread_id: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendResponse {
    id: String,
    #[serde(default)]
    thread_id: String,
}

/// Blocking client for the `users/me` mailbox endpoints.
#[derive(Debug, Clone)]
pub struct GmailClient {
    client: Client,
    api_base: String,
}

impl GmailClient {
    pub fn new(config: &GmailConfig) -> Result<Self, MailError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| MailError::Http(e.to_string()))?;
        let mut api_base = config.api_base.trim().to_string();
        if !api_base.ends_with('/') {
            api_base.push('/');
        }
        Ok(Self { client, api_base })
    }

    fn url(&self, path: &str) -> String {
        format!("{}me/{}", self.api_base, path)
    }

    pub fn get_thread(&self, access_token: &str, thread_id: &str) -> Result<GmailThread, MailError> {
        debug!("fetching thread {}", thread_id);
        let response = self
            .client
            .get(self.url(&format!("threads/{}", thread_id)))
            .header("Authorization", format!("Bearer {}", access_token))
            .send()
            .map_err(|e| MailError::Http(e.to_string()))?;
        let thread: GmailThread = read_json(check_status(response)?)?;
        if thread.messages.is_empty() {
            return Err(MailError::EmptyThread(thread_id.to_string()));
        }
        Ok(thread)
    }

    pub fn get_message(&self, access_token: &str, message_id: &str) -> Result<GmailMessage, MailError> {
        debug!("fetching message {}", message_id);
        let response = self
            .client
            .get(self.url(&format!("messages/{}", message_id)))
            .header("Authorization", format!("Bearer {}", access_token))
            .send()
            .map_err(|e| MailError::Http(e.to_string()))?;
        read_json(check_status(response)?)
    }

    /// Submits an already encoded message. A 429 is reported as an outcome, not an error.
    pub fn send_raw(
        &self,
        access_token: &str,
        raw: &str,
        thread_id: Option<&str>,
    ) -> Result<SendOutcome, MailError> {
        let response = self
            .client
            .post(self.url("messages/send"))
            .header("Authorization", format!("Bearer {}", access_token))
            .json(&SendRequest { raw, thread_id })
            .send()
            .map_err(|e| MailError::Http(e.to_string()))?;

        if response.status().as_u16() == 429 {
            let body = response.text().unwrap_or_default();
            warn!("gmail daily send limit reached: {}", body);
            return Ok(SendOutcome::RateLimited { body });
        }

        let sent: SendResponse = read_json(check_status(response)?)?;
        debug!("sent message {} in thread {}", sent.id, sent.thread_id);
        Ok(SendOutcome::Sent(SentMessage {
            id: sent.id,
            thread_id: sent.thread_id,
        }))
    }
}

impl MailTransport for GmailClient {
    fn get_thread(&self, access_token: &str, thread_id: &str) -> Result<GmailThread, MailError> {
        GmailClient::get_thread(self, access_token, thread_id)
    }

    fn get_message(&self, access_token: &str, message_id: &str) -> Result<GmailMessage, MailError> {
        GmailClient::get_message(self, access_token, message_id)
    }

    fn send(
        &self,
        access_token: &str,
        email: &OutgoingEmail,
        thread_id: Option<&str>,
    ) -> Result<SendOutcome, MailError> {
        let raw = email.to_raw()?;
        self.send_raw(access_token, &raw, thread_id)
    }
}

fn check_status(response: Response) -> Result<Response, MailError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    error!("gmail request failed: {} - {}", status, body);
    Err(MailError::Status {
        service: "gmail",
        status: status.as_u16(),
        body,
    })
}

fn read_json<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, MailError> {
    response.json().map_err(|e| MailError::Parse(e.to_string()))
}
