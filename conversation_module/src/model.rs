use chrono::NaiveDate;
use send_emails_module::MessageData;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Open,
    Closed,
}

impl JobStatus {
    /// `active` is the older spelling of `open`; anything unrecognised is closed.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "open" | "active" => JobStatus::Open,
            _ => JobStatus::Closed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub user_id: String,
    /// Sending mailbox; also the key of the credential entry.
    pub mailbox_address: String,
    pub status: JobStatus,
    pub subject: Option<String>,
    pub first_message: Option<String>,
    pub namespace: Option<String>,
    pub end_date: Option<NaiveDate>,
}

impl Job {
    pub fn is_open_on(&self, today: NaiveDate) -> bool {
        self.status == JobStatus::Open && self.end_date.map_or(true, |end| end >= today)
    }

    /// Knowledge-base namespace, the job id unless overridden.
    pub fn namespace(&self) -> &str {
        self.namespace
            .as_deref()
            .map(str::trim)
            .filter(|ns| !ns.is_empty())
            .unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameEmail {
    #[serde(default)]
    pub name: Option<String>,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    pub job_id: String,
    pub name_email: NameEmail,
    pub thread_id: Option<String>,
    pub message_id: Option<String>,
    pub reference_id: Option<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
}

impl Member {
    pub fn new(id: &str, job_id: &str, name: Option<&str>, email: &str) -> Self {
        Self {
            id: id.to_string(),
            job_id: job_id.to_string(),
            name_email: NameEmail {
                name: name.map(str::to_string),
                email: email.to_string(),
            },
            thread_id: None,
            message_id: None,
            reference_id: None,
            subject: None,
            body: None,
        }
    }

    pub fn has_thread(&self) -> bool {
        self.thread_id
            .as_deref()
            .map_or(false, |thread| !thread.trim().is_empty())
    }

    pub fn apply(&mut self, update: &MemberUpdate) {
        let fields = [
            (&mut self.thread_id, &update.thread_id),
            (&mut self.message_id, &update.message_id),
            (&mut self.reference_id, &update.reference_id),
            (&mut self.subject, &update.subject),
            (&mut self.body, &update.body),
        ];
        for (slot, value) in fields {
            if let Some(value) = value {
                *slot = Some(value.clone());
            }
        }
    }
}

/// Partial member update; only the fields that are set are written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberUpdate {
    pub thread_id: Option<String>,
    pub message_id: Option<String>,
    pub reference_id: Option<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
}

impl MemberUpdate {
    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }

    /// Column name and value for every field present.
    pub fn fields(&self) -> Vec<(&'static str, &str)> {
        [
            ("thread_id", &self.thread_id),
            ("message_id", &self.message_id),
            ("reference_id", &self.reference_id),
            ("subject", &self.subject),
            ("body", &self.body),
        ]
        .into_iter()
        .filter_map(|(column, value)| value.as_deref().map(|v| (column, v)))
        .collect()
    }
}

/// One entry of a profile's `sender` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SenderCredential {
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    /// Absolute expiry, epoch seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_expires_in: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl SenderCredential {
    pub fn new(email: &str) -> Self {
        Self {
            email: email.to_string(),
            access_token: None,
            access_expires_in: None,
            refresh_token: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn matches(&self, mailbox: &str) -> bool {
        self.email.trim().eq_ignore_ascii_case(mailbox.trim())
    }

    pub fn valid_access_token(&self, now: f64) -> Option<&str> {
        let token = self.access_token.as_deref().filter(|t| !t.is_empty())?;
        let expiry = self.access_expires_in?;
        (now < expiry).then_some(token)
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

pub fn is_active_subscription(status: Option<&str>) -> bool {
    status.map_or(false, |status| {
        matches!(
            status.trim().to_ascii_lowercase().as_str(),
            "active" | "trialing"
        )
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnOutcome {
    InitialMessageSent,
    ReplySent,
    NoNewMessage,
    Error,
}

impl TurnOutcome {
    pub fn is_success(self) -> bool {
        matches!(self, TurnOutcome::InitialMessageSent | TurnOutcome::ReplySent)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurnResult {
    pub outcome: TurnOutcome,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_data: Option<MessageData>,
}

impl ConversationTurnResult {
    pub fn new(outcome: TurnOutcome, message: impl Into<String>) -> Self {
        Self {
            outcome,
            message: message.into(),
            email_data: None,
        }
    }

    pub fn with_email_data(mut self, data: MessageData) -> Self {
        self.email_data = Some(data);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    ScheduleDeleted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberOutcome {
    pub member_id: String,
    pub outcome: TurnOutcome,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub job_id: String,
    pub status: RunStatus,
    pub message: String,
    pub total_members: usize,
    pub success: usize,
    pub error: usize,
    pub no_action: usize,
    pub members: Vec<MemberOutcome>,
}

impl RunSummary {
    pub fn completed(job_id: &str, total_members: usize) -> Self {
        Self {
            job_id: job_id.to_string(),
            status: RunStatus::Completed,
            message: String::new(),
            total_members,
            success: 0,
            error: 0,
            no_action: 0,
            members: Vec::with_capacity(total_members),
        }
    }

    pub fn schedule_deleted(job_id: &str, message: impl Into<String>) -> Self {
        Self {
            status: RunStatus::ScheduleDeleted,
            message: message.into(),
            ..Self::completed(job_id, 0)
        }
    }

    pub fn record(&mut self, member_id: &str, result: &ConversationTurnResult) {
        match result.outcome {
            TurnOutcome::InitialMessageSent | TurnOutcome::ReplySent => self.success += 1,
            TurnOutcome::NoNewMessage => self.no_action += 1,
            TurnOutcome::Error => self.error += 1,
        }
        self.members.push(MemberOutcome {
            member_id: member_id.to_string(),
            outcome: result.outcome,
            message: result.message.clone(),
        });
    }

    pub fn finish(&mut self) {
        self.message = format!(
            "processed {} members: {} succeeded, {} without new activity, {} failed",
            self.members.len(),
            self.success,
            self.no_action,
            self.error
        );
    }
}
