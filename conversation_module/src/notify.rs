use send_emails_module::{send_email_with, MailError, PostmarkConfig, SendEmailParams};
use tracing::{info, warn};

use crate::model::Job;
use crate::store::RecordStore;

/// Delivery channel for operational notices to a job owner.
pub trait Notifier {
    fn send(&self, to: &str, subject: &str, html_body: &str, tag: &str) -> Result<(), MailError>;
}

#[derive(Debug, Clone)]
pub struct PostmarkNotifier {
    config: PostmarkConfig,
    from: String,
}

impl PostmarkNotifier {
    pub fn new(config: PostmarkConfig, from: &str) -> Self {
        Self {
            config,
            from: from.to_string(),
        }
    }
}

impl Notifier for PostmarkNotifier {
    fn send(&self, to: &str, subject: &str, html_body: &str, tag: &str) -> Result<(), MailError> {
        let params = SendEmailParams {
            from: self.from.clone(),
            to: vec![to.to_string()],
            subject: subject.to_string(),
            html_body: html_body.to_string(),
            tag: Some(tag.to_string()),
        };
        let response = send_email_with(&self.config, &params)?;
        info!(
            "owner notice delivered message_id={:?} submitted_at={:?}",
            response.message_id, response.submitted_at
        );
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnerNotice<'n> {
    /// The refresh token was rejected and the mailbox must be connected again.
    Reauthorize { mailbox: &'n str },
    /// No credential entry exists for the job's mailbox.
    MailboxNotConnected { mailbox: &'n str },
    OutOfScopeQuestion {
        member_email: &'n str,
        question: &'n str,
    },
    SendLimitReached { mailbox: &'n str, message: &'n str },
}

impl OwnerNotice<'_> {
    pub fn tag(&self) -> &'static str {
        match self {
            OwnerNotice::Reauthorize { .. } => "reauthorize-mailbox",
            OwnerNotice::MailboxNotConnected { .. } => "mailbox-not-connected",
            OwnerNotice::OutOfScopeQuestion { .. } => "out-of-scope-question",
            OwnerNotice::SendLimitReached { .. } => "send-limit-reached",
        }
    }

    pub fn render(&self, job: &Job) -> (String, String) {
        let job_label = escape_html(job.subject.as_deref().unwrap_or(&job.id));
        match self {
            OwnerNotice::Reauthorize { mailbox } => (
                "Action required: re-authorize your mailbox".to_string(),
                format!(
                    "<p>Your refresh token has expired. Go to settings &amp; then preference tab \
                     and then remove and re-authorize the email - {}.</p>\
                     <p>Conversations for {} are paused until the mailbox is connected again.</p>",
                    escape_html(mailbox),
                    job_label
                ),
            ),
            OwnerNotice::MailboxNotConnected { mailbox } => (
                "Action required: connect your mailbox".to_string(),
                format!(
                    "<p>The email {} is not connected to your account. Go to settings &amp; then \
                     preference tab and authorize it.</p>\
                     <p>Conversations for {} are paused until it is connected.</p>",
                    escape_html(mailbox),
                    job_label
                ),
            ),
            OwnerNotice::OutOfScopeQuestion {
                member_email,
                question,
            } => (
                format!("Unanswered question from {}", member_email),
                format!(
                    "<p>{} asked a question about {} that the knowledge base does not cover:</p>\
                     <blockquote>{}</blockquote>\
                     <p>A polite refusal was sent. You may want to follow up directly.</p>",
                    escape_html(member_email),
                    job_label,
                    escape_html(question)
                ),
            ),
            OwnerNotice::SendLimitReached { mailbox, message } => (
                "Daily email limit reached".to_string(),
                format!(
                    "<p>{}</p><p>Mailbox: {}. Sending for {} stopped for this run.</p>",
                    escape_html(message),
                    escape_html(mailbox),
                    job_label
                ),
            ),
        }
    }
}

/// Resolves a job owner's address and delivers notices without failing the caller.
#[derive(Clone, Copy)]
pub struct OwnerNotifier<'a> {
    store: &'a dyn RecordStore,
    notifier: &'a dyn Notifier,
}

impl<'a> OwnerNotifier<'a> {
    pub fn new(store: &'a dyn RecordStore, notifier: &'a dyn Notifier) -> Self {
        Self { store, notifier }
    }

    /// Returns whether the notice was handed to the transport.
    pub fn notify(&self, job: &Job, notice: OwnerNotice<'_>) -> bool {
        let owner = match self.store.get_user_email(&job.user_id) {
            Ok(Some(email)) if !email.trim().is_empty() => email,
            Ok(_) => {
                warn!(
                    "no owner email for user {}; dropping {} notice",
                    job.user_id,
                    notice.tag()
                );
                return false;
            }
            Err(err) => {
                warn!("failed to resolve owner of job {}: {}", job.id, err);
                return false;
            }
        };

        let (subject, html) = notice.render(job);
        match self.notifier.send(&owner, &subject, &html, notice.tag()) {
            Ok(()) => {
                info!("sent {} notice for job {}", notice.tag(), job.id);
                true
            }
            Err(err) => {
                warn!("failed to send {} notice for job {}: {}", notice.tag(), job.id, err);
                false
            }
        }
    }
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
