use std::env;
use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::errors::MailError;

pub const DEFAULT_POSTMARK_API_BASE: &str = "https://api.postmarkapp.com";

#[derive(Debug, Clone)]
pub struct PostmarkConfig {
    pub api_base: String,
    pub server_token: String,
    pub from: Option<String>,
}

impl PostmarkConfig {
    pub fn from_env() -> Result<Self, MailError> {
        dotenvy::dotenv().ok();
        let server_token = env::var("POSTMARK_SERVER_TOKEN")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or(MailError::MissingEnv("POSTMARK_SERVER_TOKEN"))?;
        let api_base = env::var("POSTMARK_API_BASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_POSTMARK_API_BASE.to_string());
        let from = env::var("POSTMARK_FROM_EMAIL")
            .ok()
            .filter(|v| !v.trim().is_empty());
        Ok(Self {
            api_base,
            server_token,
            from,
        })
    }
}

#[derive(Debug, Clone)]
pub struct SendEmailParams {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub html_body: String,
    pub tag: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct PostmarkRequest<'a> {
    from: &'a str,
    to: String,
    subject: &'a str,
    html_body: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    tag: Option<&'a str>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendEmailResponse {
    #[serde(rename = "To", default)]
    pub to: Option<String>,
    #[serde(rename = "SubmittedAt", default)]
    pub submitted_at: Option<String>,
    #[serde(rename = "MessageID", default)]
    pub message_id: Option<String>,
    #[serde(rename = "ErrorCode", default)]
    pub error_code: i64,
    #[serde(rename = "Message", default)]
    pub message: String,
}

pub fn send_email_with(
    config: &PostmarkConfig,
    params: &SendEmailParams,
) -> Result<SendEmailResponse, MailError> {
    let client = Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .map_err(|e| MailError::Http(e.to_string()))?;
    let request = PostmarkRequest {
        from: &params.from,
        to: params.to.join(", "),
        subject: &params.subject,
        html_body: &params.html_body,
        tag: params.tag.as_deref(),
    };

    let response = client
        .post(format!("{}/email", config.api_base.trim_end_matches('/')))
        .header("Accept", "application/json")
        .header("x-postmark-server-token", &config.server_token)
        .json(&request)
        .send()
        .map_err(|e| MailError::Http(e.to_string()))?;

    let status = response.status();
    let body = response.text().map_err(|e| MailError::Http(e.to_string()))?;
    let parsed: Result<SendEmailResponse, _> = serde_json::from_str(&body);
    match parsed {
        Ok(parsed) if status.is_success() && parsed.error_code == 0 => Ok(parsed),
        Ok(parsed) => {
            error!("postmark rejected email: {} - {}", status, body);
            Err(MailError::Postmark {
                code: parsed.error_code,
                message: parsed.message,
            })
        }
        Err(_) if !status.is_success() => {
            error!("postmark request failed: {} - {}", status, body);
            Err(MailError::Status {
                service: "postmark",
                status: status.as_u16(),
                body,
            })
        }
        Err(e) => Err(MailError::Parse(e.to_string())),
    }
}
