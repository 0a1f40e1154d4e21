mod google;

pub use google::{
    GoogleOAuthConfig, GoogleTokenClient, IdentityProvider, TokenGrant, DEFAULT_TOKEN_URL,
};

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::api::ApiError;
use crate::error::ConversationError;
use crate::model::Job;
use crate::notify::{OwnerNotice, OwnerNotifier};
use crate::retry::RetryPolicy;
use crate::store::RecordStore;

/// An access token known to be valid at the time it was handed out.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidToken {
    pub access_token: String,
    pub mailbox_address: String,
    pub user_id: String,
    pub expires_at: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    #[error("refresh token rejected (invalid_grant): {0}")]
    InvalidGrant(String),
    #[error("no credential entry for {0}")]
    MissingEntry(String),
    #[error(transparent)]
    Failed(#[from] ConversationError),
}

pub(crate) fn epoch_now() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

/// Keeps the sending mailbox's access token fresh.
pub struct TokenGuard<'a> {
    store: &'a dyn RecordStore,
    provider: &'a dyn IdentityProvider,
    notifier: OwnerNotifier<'a>,
    retry: RetryPolicy,
}

impl<'a> TokenGuard<'a> {
    pub fn new(
        store: &'a dyn RecordStore,
        provider: &'a dyn IdentityProvider,
        notifier: OwnerNotifier<'a>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            provider,
            notifier,
            retry,
        }
    }

    pub fn ensure_valid(&self, job_id: &str) -> Result<ValidToken, ConversationError> {
        let job = self
            .retry
            .run("store.get_job", || self.store.get_job(job_id))?
            .ok_or_else(|| ConversationError::NotFound(format!("job {}", job_id)))?;
        self.ensure_valid_for_job(&job)
    }

    pub fn ensure_valid_for_job(&self, job: &Job) -> Result<ValidToken, ConversationError> {
        let mailbox = job.mailbox_address.trim();
        if mailbox.is_empty() {
            return Err(ConversationError::Auth(format!(
                "job {} has no sending mailbox",
                job.id
            )));
        }

        let senders = self
            .retry
            .run("store.get_sender_credentials", || {
                self.store.get_sender_credentials(&job.user_id)
            })?
            .ok_or_else(|| ConversationError::NotFound(format!("profile {}", job.user_id)))?;

        let Some(entry) = senders.iter().find(|entry| entry.matches(mailbox)) else {
            return Err(self.mailbox_not_connected(job));
        };

        if let (Some(token), Some(expires_at)) =
            (entry.valid_access_token(epoch_now()), entry.access_expires_in)
        {
            debug!("access token for {} still valid", mailbox);
            return Ok(ValidToken {
                access_token: token.to_string(),
                mailbox_address: mailbox.to_string(),
                user_id: job.user_id.clone(),
                expires_at,
            });
        }

        let refresh_token = entry.refresh_token().ok_or_else(|| {
            warn!("mailbox {} has no refresh token", mailbox);
            ConversationError::Auth("refresh token missing".to_string())
        })?;

        match self.refresh(&job.user_id, mailbox, refresh_token) {
            Ok(token) => Ok(token),
            Err(RefreshError::InvalidGrant(detail)) => {
                self.notifier
                    .notify(job, OwnerNotice::Reauthorize { mailbox });
                Err(ConversationError::Auth(format!(
                    "refresh token for {} rejected: {}",
                    mailbox, detail
                )))
            }
            Err(RefreshError::MissingEntry(_)) => Err(self.mailbox_not_connected(job)),
            Err(RefreshError::Failed(err)) => Err(err),
        }
    }

    /// Exchanges `refresh_token` and stores the new access token on the
    /// `(user_id, mailbox_address)` credential entry.
    pub fn refresh(
        &self,
        user_id: &str,
        mailbox_address: &str,
        refresh_token: &str,
    ) -> Result<ValidToken, RefreshError> {
        let requested_at = epoch_now();
        let grant = self
            .retry
            .run("oauth.refresh", || {
                self.provider.exchange_refresh_token(refresh_token)
            })
            .map_err(|err| match err {
                ApiError::InvalidGrant(detail) => RefreshError::InvalidGrant(detail),
                other => RefreshError::Failed(ConversationError::Auth(format!(
                    "token refresh failed: {}",
                    other
                ))),
            })?;
        let expires_at = requested_at + grant.expires_in;

        let mut senders = self
            .retry
            .run("store.get_sender_credentials", || {
                self.store.get_sender_credentials(user_id)
            })
            .map_err(ConversationError::from)?
            .ok_or_else(|| RefreshError::MissingEntry(mailbox_address.to_string()))?;
        let entry = senders
            .iter_mut()
            .find(|entry| entry.matches(mailbox_address))
            .ok_or_else(|| RefreshError::MissingEntry(mailbox_address.to_string()))?;
        entry.access_token = Some(grant.access_token.clone());
        entry.access_expires_in = Some(expires_at);

        self.retry
            .run("store.update_sender_credentials", || {
                self.store.update_sender_credentials(user_id, &senders)
            })
            .map_err(ConversationError::from)?;
        info!("refreshed access token for {}", mailbox_address);

        Ok(ValidToken {
            access_token: grant.access_token,
            mailbox_address: mailbox_address.to_string(),
            user_id: user_id.to_string(),
            expires_at,
        })
    }

    fn mailbox_not_connected(&self, job: &Job) -> ConversationError {
        let mailbox = job.mailbox_address.trim();
        error!("no credential entry for mailbox {} (job {})", mailbox, job.id);
        self.notifier
            .notify(job, OwnerNotice::MailboxNotConnected { mailbox });
        ConversationError::Auth(format!("mailbox {} is not connected", mailbox))
    }
}
