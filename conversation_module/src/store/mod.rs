mod memory;
mod supabase;

pub use memory::InMemoryRecordStore;
pub use supabase::SupabaseRecordStore;

use crate::model::{Job, Member, MemberUpdate, SenderCredential};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("postgres error: {0}")]
    Postgres(#[from] postgres::Error),
    #[error("pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("missing SUPABASE_DB_URL")]
    MissingDbUrl,
    #[error("invalid stored json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0} not found")]
    NotFound(String),
    #[error("member update for {0} has no fields")]
    EmptyUpdate(String),
    #[error("config error: {0}")]
    Config(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Pool(_) => true,
            StoreError::Postgres(err) => err.is_closed(),
            _ => false,
        }
    }
}

/// Persistent records the conversation agent reads and merges into.
pub trait RecordStore {
    fn get_job(&self, job_id: &str) -> Result<Option<Job>, StoreError>;

    /// Raw subscription status of the owning user, if any subscription exists.
    fn subscription_status(&self, user_id: &str) -> Result<Option<String>, StoreError>;

    fn get_user_email(&self, user_id: &str) -> Result<Option<String>, StoreError>;

    /// Members in store order.
    fn list_members(&self, job_id: &str) -> Result<Vec<Member>, StoreError>;

    fn get_member(&self, member_id: &str) -> Result<Option<Member>, StoreError>;

    /// Merges the set fields of `update`; an empty update is rejected.
    fn update_member(&self, member_id: &str, update: &MemberUpdate) -> Result<(), StoreError>;

    /// `None` when the user has no profile row.
    fn get_sender_credentials(
        &self,
        user_id: &str,
    ) -> Result<Option<Vec<SenderCredential>>, StoreError>;

    fn update_sender_credentials(
        &self,
        user_id: &str,
        senders: &[SenderCredential],
    ) -> Result<(), StoreError>;
}
