use chrono::Utc;
use send_emails_module::MailTransport;
use tracing::{error, info, warn};

use crate::auth::{IdentityProvider, TokenGuard, ValidToken};
use crate::conversation::{ConversationStateMachine, MemberContext};
use crate::error::ConversationError;
use crate::llm::TextGenerator;
use crate::model::{
    is_active_subscription, ConversationTurnResult, Job, Member, RunSummary, TurnOutcome,
};
use crate::notify::{Notifier, OwnerNotifier};
use crate::retrieval::{KnowledgeBase, RetrievalSettings};
use crate::retry::RetryPolicy;
use crate::schedule::ScheduleManager;
use crate::store::RecordStore;

/// Handles to every external collaborator of a run.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub store: &'a dyn RecordStore,
    pub mail: &'a dyn MailTransport,
    pub identity: &'a dyn IdentityProvider,
    pub knowledge: &'a dyn KnowledgeBase,
    pub llm: &'a dyn TextGenerator,
    pub notifier: &'a dyn Notifier,
    pub schedules: &'a dyn ScheduleManager,
}

impl<'a> Collaborators<'a> {
    pub fn owner_notifier(&self) -> OwnerNotifier<'a> {
        OwnerNotifier::new(self.store, self.notifier)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunnerSettings {
    pub retry: RetryPolicy,
    pub retrieval: RetrievalSettings,
}

enum Preflight {
    Ready { job: Job, token: ValidToken },
    ScheduleDeleted(RunSummary),
}

pub struct JobRunner<'a> {
    collaborators: Collaborators<'a>,
    settings: RunnerSettings,
}

impl<'a> JobRunner<'a> {
    pub fn new(collaborators: Collaborators<'a>, settings: RunnerSettings) -> Self {
        Self {
            collaborators,
            settings,
        }
    }

    /// Runs one turn for every member of `job_id`.
    ///
    /// Per-member failures are recorded in the summary. Only a send-limit halt,
    /// or a failure before member processing starts, is returned as an error.
    pub fn run(&self, job_id: &str) -> Result<RunSummary, ConversationError> {
        info!("starting run for job {}", job_id);
        let (job, token) = match self.preflight(job_id)? {
            Preflight::Ready { job, token } => (job, token),
            Preflight::ScheduleDeleted(summary) => return Ok(summary),
        };

        let members = self.settings.retry.run("store.list_members", || {
            self.collaborators.store.list_members(&job.id)
        })?;
        info!("job {}: {} members", job.id, members.len());

        let machine = ConversationStateMachine::new(&self.collaborators, &self.settings);
        let mut summary = RunSummary::completed(&job.id, members.len());
        for member in members {
            let member_id = member.id.clone();
            let result = self.process_member(&machine, &job, &token, member)?;
            summary.record(&member_id, &result);
        }
        summary.finish();
        info!("job {}: {}", job.id, summary.message);
        Ok(summary)
    }

    /// Runs one turn for a single member of `job_id`.
    pub fn run_member(&self, job_id: &str, member_id: &str) -> Result<RunSummary, ConversationError> {
        info!("starting run for member {} of job {}", member_id, job_id);
        let (job, token) = match self.preflight(job_id)? {
            Preflight::Ready { job, token } => (job, token),
            Preflight::ScheduleDeleted(summary) => return Ok(summary),
        };

        let member = self
            .settings
            .retry
            .run("store.get_member", || {
                self.collaborators.store.get_member(member_id)
            })?
            .filter(|member| member.job_id == job.id)
            .ok_or_else(|| ConversationError::NotFound(format!("member {} of job {}", member_id, job.id)))?;

        let machine = ConversationStateMachine::new(&self.collaborators, &self.settings);
        let mut summary = RunSummary::completed(&job.id, 1);
        let result = self.process_member(&machine, &job, &token, member)?;
        summary.record(member_id, &result);
        summary.finish();
        Ok(summary)
    }

    fn process_member(
        &self,
        machine: &ConversationStateMachine<'_>,
        job: &Job,
        token: &ValidToken,
        member: Member,
    ) -> Result<ConversationTurnResult, ConversationError> {
        let member_id = member.id.clone();
        let mut ctx = MemberContext::new(job, token, member);
        match machine.process(&mut ctx) {
            Ok(result) => Ok(result),
            Err(err) if err.is_rate_limit_halt() => {
                error!("halting run for job {}: {}", job.id, err);
                Err(err)
            }
            Err(err) => {
                warn!("member {} failed: {}", member_id, err);
                Ok(ConversationTurnResult::new(TurnOutcome::Error, err.to_string()))
            }
        }
    }

    fn preflight(&self, job_id: &str) -> Result<Preflight, ConversationError> {
        let store = self.collaborators.store;
        let retry = self.settings.retry;

        let Some(job) = retry.run("store.get_job", || store.get_job(job_id))? else {
            return Ok(Preflight::ScheduleDeleted(
                self.delete_schedule(job_id, "job not found"),
            ));
        };
        if !job.is_open_on(Utc::now().date_naive()) {
            return Ok(Preflight::ScheduleDeleted(
                self.delete_schedule(job_id, "job is closed"),
            ));
        }

        let status = retry.run("store.subscription_status", || {
            store.subscription_status(&job.user_id)
        })?;
        if !is_active_subscription(status.as_deref()) {
            return Ok(Preflight::ScheduleDeleted(self.delete_schedule(
                job_id,
                "owner has no active subscription",
            )));
        }

        let guard = TokenGuard::new(
            store,
            self.collaborators.identity,
            self.collaborators.owner_notifier(),
            retry,
        );
        let token = guard.ensure_valid_for_job(&job)?;
        Ok(Preflight::Ready { job, token })
    }

    fn delete_schedule(&self, job_id: &str, reason: &str) -> RunSummary {
        info!("job {}: {}; deleting schedule", job_id, reason);
        let schedules = self.collaborators.schedules;
        let message = match self
            .settings
            .retry
            .run("schedule.delete", || schedules.delete(job_id))
        {
            Ok(true) => format!("{}; schedule deleted", reason),
            Ok(false) => format!("{}; schedule deletion was refused", reason),
            Err(err) => {
                warn!("failed to delete schedule for job {}: {}", job_id, err);
                format!("{}; schedule deletion failed: {}", reason, err)
            }
        };
        RunSummary::schedule_deleted(job_id, message)
    }
}
