mod compose;
mod context;

pub use compose::{build_references, render_first_message, DEFAULT_RECIPIENT_NAME, DEFAULT_SUBJECT};
pub use context::MemberContext;

use send_emails_module::{
    reply_subject, BodyFormat, MailTransport, MessageData, OutgoingEmail, SendOutcome, SentMessage,
};
use tracing::{debug, error, info, warn};

use crate::error::ConversationError;
use crate::model::{ConversationTurnResult, Member, MemberUpdate, TurnOutcome};
use crate::notify::{OwnerNotice, OwnerNotifier};
use crate::retrieval::{
    ContextRetriever, QueryExtraction, GREETING_ACKNOWLEDGMENT, OUT_OF_SCOPE_REFUSAL,
};
use crate::retry::RetryPolicy;
use crate::runner::{Collaborators, RunnerSettings};
use crate::send_guard::SendGuard;
use crate::store::RecordStore;
use crate::thread_reader::ThreadReader;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationState {
    NeedsFirstMessage,
    AwaitingReplyCheck,
    HasNewInbound,
    Idle,
}

impl ConversationState {
    pub fn entry(member: &Member) -> Self {
        if member.has_thread() {
            ConversationState::AwaitingReplyCheck
        } else {
            ConversationState::NeedsFirstMessage
        }
    }

    /// A message is new only when its Message-ID differs from the watermark.
    pub fn after_read(member: &Member, latest: &MessageData) -> Self {
        if member.message_id.as_deref().map(str::trim) == Some(latest.message_id.trim()) {
            ConversationState::Idle
        } else {
            ConversationState::HasNewInbound
        }
    }
}

/// Decides and executes one member's turn: first message, reply, or nothing.
pub struct ConversationStateMachine<'a> {
    store: &'a dyn RecordStore,
    mail: &'a dyn MailTransport,
    reader: ThreadReader<'a>,
    retriever: ContextRetriever<'a>,
    notifier: OwnerNotifier<'a>,
    retry: RetryPolicy,
}

impl<'a> ConversationStateMachine<'a> {
    pub fn new(collaborators: &Collaborators<'a>, settings: &RunnerSettings) -> Self {
        Self {
            store: collaborators.store,
            mail: collaborators.mail,
            reader: ThreadReader::new(collaborators.mail, settings.retry),
            retriever: ContextRetriever::new(
                collaborators.knowledge,
                collaborators.llm,
                settings.retrieval,
                settings.retry,
            ),
            notifier: collaborators.owner_notifier(),
            retry: settings.retry,
        }
    }

    pub fn process(
        &self,
        ctx: &mut MemberContext<'_>,
    ) -> Result<ConversationTurnResult, ConversationError> {
        let state = ConversationState::entry(&ctx.member);
        debug!("member {} entering {:?}", ctx.member.id, state);
        match state {
            ConversationState::NeedsFirstMessage => self.send_first_message(ctx),
            _ => self.check_for_reply(ctx),
        }
    }

    fn send_first_message(
        &self,
        ctx: &mut MemberContext<'_>,
    ) -> Result<ConversationTurnResult, ConversationError> {
        let template = ctx
            .job
            .first_message
            .as_deref()
            .filter(|template| !template.trim().is_empty())
            .ok_or_else(|| {
                ConversationError::Operation(format!(
                    "job {} has no first message template",
                    ctx.job.id
                ))
            })?;
        let body = render_first_message(template, ctx.recipient_name());
        let subject = ctx
            .job
            .subject
            .as_deref()
            .map(str::trim)
            .filter(|subject| !subject.is_empty())
            .unwrap_or(DEFAULT_SUBJECT)
            .to_string();
        let format = if looks_like_html(&body) {
            BodyFormat::Html
        } else {
            BodyFormat::PlainText
        };

        let email = OutgoingEmail::new(
            &ctx.token.mailbox_address,
            ctx.recipient_email(),
            &subject,
            &body,
            format,
        );
        let sent = self.send_guarded(ctx, &email, None)?;
        self.persist(
            ctx,
            MemberUpdate {
                thread_id: Some(sent.thread_id.clone()),
                message_id: Some(email.message_id.clone()),
                reference_id: Some(email.message_id.clone()),
                subject: Some(subject),
                body: None,
            },
        )?;

        let data = self.reader.read_message(&ctx.token.access_token, &sent.id)?;
        self.reconcile(ctx, &data)?;

        info!(
            "first message sent to member {} in thread {}",
            ctx.member.id,
            ctx.member.thread_id.as_deref().unwrap_or_default()
        );
        Ok(
            ConversationTurnResult::new(TurnOutcome::InitialMessageSent, "first message sent")
                .with_email_data(data),
        )
    }

    fn check_for_reply(
        &self,
        ctx: &mut MemberContext<'_>,
    ) -> Result<ConversationTurnResult, ConversationError> {
        let thread_id = ctx.member.thread_id.clone().unwrap_or_default();
        let latest = self
            .reader
            .latest_inbound(&ctx.token.access_token, &thread_id)?;

        if ConversationState::after_read(&ctx.member, &latest) == ConversationState::Idle {
            debug!("member {}: no new message", ctx.member.id);
            return Ok(
                ConversationTurnResult::new(TurnOutcome::NoNewMessage, "no new message")
                    .with_email_data(latest),
            );
        }

        info!(
            "member {}: new message {} in thread {}",
            ctx.member.id, latest.message_id, thread_id
        );
        self.persist(
            ctx,
            MemberUpdate {
                body: Some(latest.body.clone()),
                ..MemberUpdate::default()
            },
        )?;

        let reply_body = self.compose_reply(ctx, &latest)?;
        let subject = reply_subject(first_non_empty(&[
            ctx.member.subject.as_deref().unwrap_or_default(),
            ctx.job.subject.as_deref().unwrap_or_default(),
            DEFAULT_SUBJECT,
        ]));
        let references = build_references(ctx.member.reference_id.as_deref(), &latest.message_id);
        let email = OutgoingEmail::new(
            &ctx.token.mailbox_address,
            ctx.recipient_email(),
            &subject,
            &reply_body,
            BodyFormat::PlainText,
        )
        .in_reply_to(&latest.message_id, &references);

        let sent = self.send_guarded(ctx, &email, Some(&thread_id))?;
        self.persist(
            ctx,
            MemberUpdate {
                message_id: Some(email.message_id.clone()),
                ..MemberUpdate::default()
            },
        )?;

        let sent_data = self.reader.read_message(&ctx.token.access_token, &sent.id)?;
        self.reconcile(ctx, &sent_data)?;

        info!("reply sent to member {}", ctx.member.id);
        Ok(ConversationTurnResult::new(TurnOutcome::ReplySent, "reply sent").with_email_data(sent_data))
    }

    fn compose_reply(
        &self,
        ctx: &MemberContext<'_>,
        inbound: &MessageData,
    ) -> Result<String, ConversationError> {
        let query = match self
            .retriever
            .extract_query(&inbound.body, ctx.recipient_name())?
        {
            QueryExtraction::Greeting => return Ok(GREETING_ACKNOWLEDGMENT.to_string()),
            QueryExtraction::Query(query) => query,
        };

        let retrieved = self.retriever.context_for(ctx.job.namespace(), &query)?;
        if !retrieved.has_relevant_matches {
            info!(
                "member {}: question outside the knowledge base, sending refusal",
                ctx.member.id
            );
            self.notifier.notify(
                ctx.job,
                OwnerNotice::OutOfScopeQuestion {
                    member_email: ctx.recipient_email(),
                    question: &query,
                },
            );
            return Ok(OUT_OF_SCOPE_REFUSAL.to_string());
        }
        self.retriever.compose_reply(&retrieved.context)
    }

    /// Sends `email`; a quota refusal notifies the owner once and halts the run.
    fn send_guarded(
        &self,
        ctx: &MemberContext<'_>,
        email: &OutgoingEmail,
        thread_id: Option<&str>,
    ) -> Result<SentMessage, ConversationError> {
        let outcome = self.retry.run("gmail.send", || {
            self.mail.send(&ctx.token.access_token, email, thread_id)
        })?;
        let check = SendGuard::after_send(&outcome);
        match outcome {
            SendOutcome::Sent(sent) => Ok(sent),
            SendOutcome::RateLimited { body } => {
                error!(
                    "mailbox {} hit its send limit: {}",
                    ctx.token.mailbox_address, body
                );
                self.notifier.notify(
                    ctx.job,
                    OwnerNotice::SendLimitReached {
                        mailbox: &ctx.token.mailbox_address,
                        message: &check.message,
                    },
                );
                Err(ConversationError::RateLimitHalt {
                    message: check.message,
                })
            }
        }
    }

    /// Corrects the ids committed after a send when the provider reports
    /// different ones for the message it stored.
    fn reconcile(
        &self,
        ctx: &mut MemberContext<'_>,
        sent: &MessageData,
    ) -> Result<(), ConversationError> {
        let differs = |stored: &Option<String>, reported: &str| {
            !reported.trim().is_empty() && stored.as_deref() != Some(reported)
        };
        let mut update = MemberUpdate::default();
        if differs(&ctx.member.message_id, &sent.message_id) {
            warn!(
                "member {}: provider stored message id {} instead of ours",
                ctx.member.id, sent.message_id
            );
            update.message_id = Some(sent.message_id.clone());
            if ctx.member.reference_id == ctx.member.message_id {
                update.reference_id = Some(sent.message_id.clone());
            }
        }
        if differs(&ctx.member.thread_id, &sent.thread_id) {
            update.thread_id = Some(sent.thread_id.clone());
        }
        if update.is_empty() {
            return Ok(());
        }
        self.persist(ctx, update)
    }

    fn persist(
        &self,
        ctx: &mut MemberContext<'_>,
        update: MemberUpdate,
    ) -> Result<(), ConversationError> {
        self.retry.run("store.update_member", || {
            self.store.update_member(&ctx.member.id, &update)
        })?;
        ctx.apply(&update);
        Ok(())
    }
}

fn first_non_empty<'s>(candidates: &[&'s str]) -> &'s str {
    candidates
        .iter()
        .map(|candidate| candidate.trim())
        .find(|candidate| !candidate.is_empty())
        .unwrap_or_default()
}

fn looks_like_html(body: &str) -> bool {
    let lower = body.to_ascii_lowercase();
    ["</", "<br", "<p>", "<div", "<html"]
        .iter()
        .any(|marker| lower.contains(marker))
}
