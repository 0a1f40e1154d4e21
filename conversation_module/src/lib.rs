//! Per-member email conversations for recruiting jobs.
//!
//! A run walks every member of a job: members without a thread get the job's
//! first message, members whose thread has a new message get a reply grounded
//! in the job's knowledge base, everyone else is left alone.

pub mod api;
pub mod auth;
pub mod config;
pub mod conversation;
pub mod error;
pub mod llm;
pub mod model;
pub mod notify;
pub mod retrieval;
pub mod retry;
pub mod runner;
pub mod schedule;
pub mod send_guard;
pub mod store;
pub mod thread_reader;

pub use auth::{GoogleTokenClient, IdentityProvider, TokenGrant, TokenGuard, ValidToken};
pub use config::{AgentConfig, ConfigError};
pub use conversation::{ConversationState, ConversationStateMachine, MemberContext};
pub use error::ConversationError;
pub use llm::{ChatCompletionClient, TextGenerator};
pub use model::{
    ConversationTurnResult, Job, JobStatus, Member, MemberOutcome, MemberUpdate, NameEmail,
    RunStatus, RunSummary, SenderCredential, TurnOutcome,
};
pub use notify::{Notifier, OwnerNotice, OwnerNotifier, PostmarkNotifier};
pub use retrieval::{ContextRetriever, KnowledgeBase, PineconeClient, RetrievedContext};
pub use retry::RetryPolicy;
pub use runner::{Collaborators, JobRunner, RunnerSettings};
pub use schedule::{HttpScheduleManager, ScheduleManager};
pub use send_guard::{SendCheck, SendGuard};
pub use store::{InMemoryRecordStore, RecordStore, StoreError, SupabaseRecordStore};
pub use thread_reader::ThreadReader;
