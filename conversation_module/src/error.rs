use send_emails_module::MailError;

use crate::api::ApiError;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ConversationError {
    #[error("auth error: {0}")]
    Auth(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("not found: {0}")]
    NotFound(String),
    /// The mailbox hit its daily send quota; the whole run must stop.
    #[error("send limit reached: {message}")]
    RateLimitHalt { message: String },
    #[error("operation failed: {0}")]
    Operation(String),
}

impl ConversationError {
    pub fn is_rate_limit_halt(&self) -> bool {
        matches!(self, ConversationError::RateLimitHalt { .. })
    }
}

impl From<MailError> for ConversationError {
    fn from(err: MailError) -> Self {
        match err {
            MailError::Build(_) | MailError::MissingEnv(_) => {
                ConversationError::Operation(err.to_string())
            }
            other => ConversationError::Protocol(other.to_string()),
        }
    }
}

impl From<StoreError> for ConversationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => ConversationError::NotFound(what),
            other => ConversationError::Operation(other.to_string()),
        }
    }
}

impl From<ApiError> for ConversationError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::InvalidGrant(_) => ConversationError::Auth(err.to_string()),
            other => ConversationError::Protocol(other.to_string()),
        }
    }
}
