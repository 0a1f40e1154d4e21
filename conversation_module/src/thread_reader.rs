use send_emails_module::{extract_message_data, MailError, MailTransport, MessageData};
use tracing::debug;

use crate::error::ConversationError;
use crate::retry::RetryPolicy;

/// Reads the newest message of a thread. Never writes anything.
#[derive(Clone, Copy)]
pub struct ThreadReader<'a> {
    mail: &'a dyn MailTransport,
    retry: RetryPolicy,
}

impl<'a> ThreadReader<'a> {
    pub fn new(mail: &'a dyn MailTransport, retry: RetryPolicy) -> Self {
        Self { mail, retry }
    }

    pub fn latest_inbound(
        &self,
        access_token: &str,
        thread_id: &str,
    ) -> Result<MessageData, ConversationError> {
        let thread = self.retry.run("gmail.get_thread", || {
            self.mail.get_thread(access_token, thread_id)
        })?;
        let last = thread
            .messages
            .last()
            .ok_or_else(|| MailError::EmptyThread(thread_id.to_string()))?;
        let data = extract_message_data(last)?;
        debug!(
            "thread {} has {} messages, latest {}",
            thread_id,
            thread.messages.len(),
            data.message_id
        );
        Ok(data)
    }

    pub fn read_message(
        &self,
        access_token: &str,
        message_id: &str,
    ) -> Result<MessageData, ConversationError> {
        let message = self.retry.run("gmail.get_message", || {
            self.mail.get_message(access_token, message_id)
        })?;
        Ok(extract_message_data(&message)?)
    }
}
