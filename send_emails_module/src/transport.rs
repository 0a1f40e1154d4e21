use serde::{Deserialize, Serialize};

use crate::errors::MailError;
use crate::message::{GmailMessage, GmailThread};
use crate::mime::OutgoingEmail;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentMessage {
    pub id: String,
    pub thread_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Sent(SentMessage),
    /// The mailbox refused the send because its daily quota is exhausted.
    RateLimited { body: String },
}

/// Mailbox operations performed on behalf of a connected sender account.
pub trait MailTransport {
    fn get_thread(&self, access_token: &str, thread_id: &str) -> Result<GmailThread, MailError>;

    fn get_message(&self, access_token: &str, message_id: &str) -> Result<GmailMessage, MailError>;

    /// Sends `email`, attaching it to `thread_id` when one is given.
    fn send(
        &self,
        access_token: &str,
        email: &OutgoingEmail,
        thread_id: Option<&str>,
    ) -> Result<SendOutcome, MailError>;
}
