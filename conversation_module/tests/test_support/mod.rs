#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use conversation_module::api::ApiError;
use conversation_module::retrieval::{KnowledgeBase, RetrievalSettings, ScoredMatch};
use conversation_module::{
    Collaborators, IdentityProvider, InMemoryRecordStore, Job, JobStatus, Member, Notifier,
    RetryPolicy, RunnerSettings, ScheduleManager, SenderCredential, TextGenerator, TokenGrant,
};
use send_emails_module::message::{MessageHeader, MessagePart, PartBody};
use send_emails_module::{
    GmailMessage, GmailThread, MailError, MailTransport, OutgoingEmail, SendOutcome, SentMessage,
};

pub const JOB_ID: &str = "job-1";
pub const USER_ID: &str = "user-1";
pub const MAILBOX: &str = "recruiter@example.com";
pub const OWNER_EMAIL: &str = "owner@example.com";
pub const FAR_FUTURE: f64 = 4_102_444_800.0;

pub fn gmail_message(
    id: &str,
    thread_id: &str,
    message_id: &str,
    subject: &str,
    body: &str,
) -> GmailMessage {
    GmailMessage {
        id: id.to_string(),
        thread_id: thread_id.to_string(),
        payload: Some(MessagePart {
            mime_type: Some("text/plain".to_string()),
            headers: vec![
                MessageHeader {
                    name: "Subject".to_string(),
                    value: subject.to_string(),
                },
                MessageHeader {
                    name: "Message-ID".to_string(),
                    value: message_id.to_string(),
                },
            ],
            body: Some(PartBody {
                data: Some(URL_SAFE_NO_PAD.encode(body)),
                size: None,
            }),
            parts: Vec::new(),
        }),
    }
}

#[derive(Debug, Clone)]
pub struct SentRecord {
    pub email: OutgoingEmail,
    pub thread_id: Option<String>,
}

#[derive(Default)]
struct MailState {
    threads: HashMap<String, Vec<GmailMessage>>,
    failing_threads: HashSet<String>,
    sent: Vec<SentRecord>,
    rate_limited: bool,
    send_attempts: usize,
    failing_reads: usize,
    rewrite_message_ids: bool,
    next_id: usize,
}

/// Mailbox that keeps threads in memory and appends whatever is sent.
#[derive(Default)]
pub struct FakeMail {
    state: Mutex<MailState>,
}

impl FakeMail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_message(&self, message: GmailMessage) {
        let mut state = self.state.lock().unwrap();
        state
            .threads
            .entry(message.thread_id.clone())
            .or_default()
            .push(message);
    }

    pub fn fail_thread(&self, thread_id: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_threads
            .insert(thread_id.to_string());
    }

    pub fn set_rate_limited(&self, limited: bool) {
        self.state.lock().unwrap().rate_limited = limited;
    }

    /// The next `count` message reads answer 404, as if the sent message were not yet visible.
    pub fn fail_next_reads(&self, count: usize) {
        self.state.lock().unwrap().failing_reads = count;
    }

    /// Stores sent messages under a provider-assigned Message-ID instead of the sender's.
    pub fn rewrite_message_ids(&self) {
        self.state.lock().unwrap().rewrite_message_ids = true;
    }

    pub fn send_attempts(&self) -> usize {
        self.state.lock().unwrap().send_attempts
    }

    pub fn sent(&self) -> Vec<SentRecord> {
        self.state.lock().unwrap().sent.clone()
    }
}

impl MailTransport for FakeMail {
    fn get_thread(&self, _access_token: &str, thread_id: &str) -> Result<GmailThread, MailError> {
        let state = self.state.lock().unwrap();
        if state.failing_threads.contains(thread_id) {
            return Err(MailError::Status {
                service: "gmail",
                status: 404,
                body: "thread not found".to_string(),
            });
        }
        match state.threads.get(thread_id) {
            Some(messages) if !messages.is_empty() => Ok(GmailThread {
                id: thread_id.to_string(),
                messages: messages.clone(),
            }),
            _ => Err(MailError::EmptyThread(thread_id.to_string())),
        }
    }

    fn get_message(&self, _access_token: &str, message_id: &str) -> Result<GmailMessage, MailError> {
        let mut state = self.state.lock().unwrap();
        if state.failing_reads > 0 {
            state.failing_reads -= 1;
            return Err(MailError::Status {
                service: "gmail",
                status: 404,
                body: "not yet".to_string(),
            });
        }
        state
            .threads
            .values()
            .flatten()
            .find(|message| message.id == message_id)
            .cloned()
            .ok_or_else(|| MailError::Status {
                service: "gmail",
                status: 404,
                body: format!("message {} not found", message_id),
            })
    }

    fn send(
        &self,
        _access_token: &str,
        email: &OutgoingEmail,
        thread_id: Option<&str>,
    ) -> Result<SendOutcome, MailError> {
        let mut state = self.state.lock().unwrap();
        state.send_attempts += 1;
        if state.rate_limited {
            return Ok(SendOutcome::RateLimited {
                body: "User-rate limit exceeded".to_string(),
            });
        }
        state.next_id += 1;
        let id = format!("sent-{}", state.next_id);
        let thread = thread_id
            .map(str::to_string)
            .unwrap_or_else(|| format!("thread-{}", state.next_id));
        let message_id = if state.rewrite_message_ids {
            format!("<{}@mail.example.com>", id)
        } else {
            email.message_id.clone()
        };
        let message = gmail_message(
            &id,
            &thread,
            &message_id,
            &email.subject,
            &email.body,
        );
        state.threads.entry(thread.clone()).or_default().push(message);
        state.sent.push(SentRecord {
            email: email.clone(),
            thread_id: thread_id.map(str::to_string),
        });
        Ok(SendOutcome::Sent(SentMessage {
            id,
            thread_id: thread,
        }))
    }
}

pub enum IdentityResponse {
    Grant(TokenGrant),
    InvalidGrant,
    Unavailable,
}

pub struct FakeIdentity {
    response: IdentityResponse,
    calls: Mutex<Vec<String>>,
}

impl FakeIdentity {
    pub fn granting(access_token: &str, expires_in: f64) -> Self {
        Self {
            response: IdentityResponse::Grant(TokenGrant {
                access_token: access_token.to_string(),
                expires_in,
            }),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn rejecting() -> Self {
        Self {
            response: IdentityResponse::InvalidGrant,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            response: IdentityResponse::Unavailable,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl IdentityProvider for FakeIdentity {
    fn exchange_refresh_token(&self, refresh_token: &str) -> Result<TokenGrant, ApiError> {
        self.calls.lock().unwrap().push(refresh_token.to_string());
        match &self.response {
            IdentityResponse::Grant(grant) => Ok(grant.clone()),
            IdentityResponse::InvalidGrant => {
                Err(ApiError::InvalidGrant(r#"{"error":"invalid_grant"}"#.to_string()))
            }
            IdentityResponse::Unavailable => Err(ApiError::Http("connection refused".to_string())),
        }
    }
}

#[derive(Default)]
pub struct FakeKnowledge {
    matches: Vec<ScoredMatch>,
    embeds: Mutex<Vec<String>>,
    queries: Mutex<Vec<String>>,
}

impl FakeKnowledge {
    pub fn with_matches(matches: Vec<(f32, &str)>) -> Self {
        Self {
            matches: matches
                .into_iter()
                .enumerate()
                .map(|(idx, (score, text))| ScoredMatch {
                    id: format!("doc-{}", idx),
                    score,
                    text: Some(text.to_string()),
                })
                .collect(),
            ..Self::default()
        }
    }

    pub fn embeds(&self) -> Vec<String> {
        self.embeds.lock().unwrap().clone()
    }

    pub fn queried_namespaces(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

impl KnowledgeBase for FakeKnowledge {
    fn embed(&self, text: &str) -> Result<Vec<f32>, ApiError> {
        self.embeds.lock().unwrap().push(text.to_string());
        Ok(vec![0.1, 0.2, 0.3])
    }

    fn query(
        &self,
        namespace: &str,
        _vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredMatch>, ApiError> {
        self.queries.lock().unwrap().push(namespace.to_string());
        Ok(self.matches.iter().take(top_k).cloned().collect())
    }
}

/// Answers prompts in order from a script.
#[derive(Default)]
pub struct FakeLlm {
    responses: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

impl FakeLlm {
    pub fn scripted(responses: &[&str]) -> Self {
        Self {
            responses: Mutex::new(responses.iter().map(|r| r.to_string()).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl TextGenerator for FakeLlm {
    fn complete(&self, prompt: &str) -> Result<String, ApiError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(ApiError::Unexpected {
                service: "llm",
                message: "script exhausted".to_string(),
            })
    }
}

#[derive(Debug, Clone)]
pub struct Notice {
    pub to: String,
    pub subject: String,
    pub html_body: String,
    pub tag: String,
}

#[derive(Default)]
pub struct FakeNotifier {
    sent: Mutex<Vec<Notice>>,
    failing: bool,
}

impl FakeNotifier {
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.sent.lock().unwrap().clone()
    }
}

impl Notifier for FakeNotifier {
    fn send(&self, to: &str, subject: &str, html_body: &str, tag: &str) -> Result<(), MailError> {
        self.sent.lock().unwrap().push(Notice {
            to: to.to_string(),
            subject: subject.to_string(),
            html_body: html_body.to_string(),
            tag: tag.to_string(),
        });
        if self.failing {
            return Err(MailError::Postmark {
                code: 406,
                message: "inactive recipient".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeSchedules {
    deleted: Mutex<Vec<String>>,
}

impl FakeSchedules {
    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

impl ScheduleManager for FakeSchedules {
    fn delete(&self, job_id: &str) -> Result<bool, ApiError> {
        self.deleted.lock().unwrap().push(job_id.to_string());
        Ok(true)
    }
}

/// An open job with a valid access token and an active subscription.
pub fn seeded_store() -> InMemoryRecordStore {
    let store = InMemoryRecordStore::new();
    store.insert_job(open_job());
    store.set_subscription(USER_ID, "active");
    store.set_owner_email(USER_ID, OWNER_EMAIL);
    let mut credential = SenderCredential::new(MAILBOX);
    credential.access_token = Some("access-valid".to_string());
    credential.access_expires_in = Some(FAR_FUTURE);
    credential.refresh_token = Some("refresh-1".to_string());
    store.set_senders(USER_ID, vec![credential]);
    store
}

pub fn open_job() -> Job {
    Job {
        id: JOB_ID.to_string(),
        user_id: USER_ID.to_string(),
        mailbox_address: MAILBOX.to_string(),
        status: JobStatus::Open,
        subject: Some("Backend Engineer at Acme".to_string()),
        first_message: Some("Hi {{recipient_name}}, we would love to talk about a role.".to_string()),
        namespace: None,
        end_date: None,
    }
}

/// A member whose thread already has an exchange; the latest message is `latest_message_id`.
pub fn threaded_member(
    mail: &FakeMail,
    member_id: &str,
    watermark: &str,
    latest_message_id: &str,
    latest_body: &str,
) -> Member {
    let thread_id = format!("thread-{}", member_id);
    let email = format!("{}@example.com", member_id);
    mail.add_message(gmail_message(
        &format!("g-first-{}", member_id),
        &thread_id,
        "<first@mail.example.com>",
        "Backend Engineer at Acme",
        "Hi, we would love to talk about a role.",
    ));
    if latest_message_id != "<first@mail.example.com>" {
        mail.add_message(gmail_message(
            &format!("g-reply-{}", member_id),
            &thread_id,
            latest_message_id,
            "Re: Backend Engineer at Acme",
            latest_body,
        ));
    }
    let mut member = Member::new(member_id, JOB_ID, Some("Jane"), &email);
    member.thread_id = Some(thread_id);
    member.message_id = Some(watermark.to_string());
    member.reference_id = Some("<first@mail.example.com>".to_string());
    member.subject = Some("Backend Engineer at Acme".to_string());
    member
}

pub struct Fixture {
    pub store: InMemoryRecordStore,
    pub mail: FakeMail,
    pub identity: FakeIdentity,
    pub knowledge: FakeKnowledge,
    pub llm: FakeLlm,
    pub notifier: FakeNotifier,
    pub schedules: FakeSchedules,
}

impl Fixture {
    pub fn new(knowledge: FakeKnowledge, llm: FakeLlm) -> Self {
        Self {
            store: seeded_store(),
            mail: FakeMail::new(),
            identity: FakeIdentity::granting("access-new", 3600.0),
            knowledge,
            llm,
            notifier: FakeNotifier::default(),
            schedules: FakeSchedules::default(),
        }
    }

    pub fn collaborators(&self) -> Collaborators<'_> {
        Collaborators {
            store: &self.store,
            mail: &self.mail,
            identity: &self.identity,
            knowledge: &self.knowledge,
            llm: &self.llm,
            notifier: &self.notifier,
            schedules: &self.schedules,
        }
    }
}

pub fn settings() -> RunnerSettings {
    RunnerSettings {
        retry: RetryPolicy::without_delay(3),
        retrieval: RetrievalSettings::default(),
    }
}

pub fn start_mockito_server(test_name: &str) -> Option<mockito::ServerGuard> {
    match std::panic::catch_unwind(mockito::Server::new) {
        Ok(server) => Some(server),
        Err(_) => {
            eprintln!("Skipping {test_name}; unable to start mockito server in this environment.");
            None
        }
    }
}
