use std::env;
use std::str::FromStr;
use std::time::Duration;

use send_emails_module::{GmailConfig, PostmarkConfig};

use crate::auth::{GoogleOAuthConfig, DEFAULT_TOKEN_URL};
use crate::llm::{LlmConfig, DEFAULT_LLM_API_URL, DEFAULT_LLM_MODEL};
use crate::retrieval::{
    PineconeConfig, RetrievalSettings, DEFAULT_EMBED_MODEL, DEFAULT_PINECONE_API_URL,
};
use crate::retry::RetryPolicy;
use crate::runner::RunnerSettings;
use crate::schedule::ScheduleConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub default_job_id: Option<String>,
    pub supabase_db_url: String,
    pub gmail: GmailConfig,
    pub google: GoogleOAuthConfig,
    pub pinecone: PineconeConfig,
    pub llm: LlmConfig,
    pub postmark: PostmarkConfig,
    /// From address of owner notices.
    pub notify_from: String,
    pub schedule: ScheduleConfig,
    pub runner: RunnerSettings,
}

impl AgentConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let postmark = PostmarkConfig::from_env()
            .map_err(|_| ConfigError::Missing("POSTMARK_SERVER_TOKEN"))?;
        let notify_from = postmark
            .from
            .clone()
            .ok_or(ConfigError::Missing("POSTMARK_FROM_EMAIL"))?;

        let retry = RetryPolicy {
            max_attempts: parse_or("MAX_RETRIES", 3)?,
            backoff_factor: parse_or("RETRY_BACKOFF_FACTOR", 2)?,
            base_delay: Duration::from_millis(parse_or("RETRY_BASE_DELAY_MS", 1000)?),
        };
        let retrieval = RetrievalSettings {
            threshold: parse_or("RELEVANCE_THRESHOLD", 0.8)?,
            top_k: parse_or("RETRIEVAL_TOP_K", 3)?,
        };

        Ok(Self {
            default_job_id: optional("DEFAULT_JOB_ID"),
            supabase_db_url: required("SUPABASE_DB_URL")?,
            gmail: GmailConfig::from_env(),
            google: GoogleOAuthConfig {
                client_id: required("GOOGLE_CLIENT_ID")?,
                client_secret: required("GOOGLE_CLIENT_SECRET")?,
                token_url: optional("TOKEN_URL").unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string()),
            },
            pinecone: PineconeConfig {
                api_key: required("PINECONE_API_KEY")?,
                api_url: optional("PINECONE_API_URL")
                    .unwrap_or_else(|| DEFAULT_PINECONE_API_URL.to_string()),
                index_host: required("PINECONE_INDEX_HOST")?,
                embed_model: optional("PINECONE_EMBED_MODEL")
                    .unwrap_or_else(|| DEFAULT_EMBED_MODEL.to_string()),
            },
            llm: LlmConfig {
                api_url: optional("LLM_API_URL").unwrap_or_else(|| DEFAULT_LLM_API_URL.to_string()),
                api_key: optional("LLM_API_KEY")
                    .or_else(|| optional("GROQ_API_KEY"))
                    .ok_or(ConfigError::Missing("LLM_API_KEY"))?,
                model: optional("LLM_MODEL").unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
                temperature: parse_or("LLM_TEMPERATURE", 0.0)?,
                max_tokens: parse_or("LLM_MAX_TOKENS", 256)?,
            },
            postmark,
            notify_from,
            schedule: ScheduleConfig {
                delete_url: required("AGENT_DELETE_SCHEDULE")?,
                api_key: required("AGENT_API_KEY")?,
            },
            runner: RunnerSettings { retry, retrieval },
        })
    }
}

fn optional(key: &'static str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    optional(key).ok_or(ConfigError::Missing(key))
}

fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match optional(key) {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}
