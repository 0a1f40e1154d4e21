use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::{RecordStore, StoreError};
use crate::model::{Job, Member, MemberUpdate, SenderCredential};

#[derive(Debug, Default)]
struct State {
    jobs: HashMap<String, Job>,
    members: Vec<Member>,
    subscriptions: HashMap<String, String>,
    owner_emails: HashMap<String, String>,
    senders: HashMap<String, Vec<SenderCredential>>,
    member_updates: Vec<(String, MemberUpdate)>,
    credential_writes: usize,
}

/// Record store held in memory, for fixtures and tests.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    state: Mutex<State>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Config("in-memory store lock poisoned".to_string()))
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        match self.state.lock() {
            Ok(mut guard) => f(&mut *guard),
            Err(poisoned) => f(&mut *poisoned.into_inner()),
        }
    }

    pub fn insert_job(&self, job: Job) {
        self.with_state(|state| {
            state.jobs.insert(job.id.clone(), job);
        });
    }

    pub fn insert_member(&self, member: Member) {
        self.with_state(|state| state.members.push(member));
    }

    pub fn set_subscription(&self, user_id: &str, status: &str) {
        self.with_state(|state| {
            state
                .subscriptions
                .insert(user_id.to_string(), status.to_string());
        });
    }

    pub fn set_owner_email(&self, user_id: &str, email: &str) {
        self.with_state(|state| {
            state
                .owner_emails
                .insert(user_id.to_string(), email.to_string());
        });
    }

    pub fn set_senders(&self, user_id: &str, senders: Vec<SenderCredential>) {
        self.with_state(|state| {
            state.senders.insert(user_id.to_string(), senders);
        });
    }

    pub fn member(&self, member_id: &str) -> Option<Member> {
        self.with_state(|state| state.members.iter().find(|m| m.id == member_id).cloned())
    }

    pub fn senders(&self, user_id: &str) -> Option<Vec<SenderCredential>> {
        self.with_state(|state| state.senders.get(user_id).cloned())
    }

    /// Every accepted member update, oldest first.
    pub fn member_updates(&self) -> Vec<(String, MemberUpdate)> {
        self.with_state(|state| state.member_updates.clone())
    }

    pub fn credential_writes(&self) -> usize {
        self.with_state(|state| state.credential_writes)
    }
}

impl RecordStore for InMemoryRecordStore {
    fn get_job(&self, job_id: &str) -> Result<Option<Job>, StoreError> {
        Ok(self.state()?.jobs.get(job_id).cloned())
    }

    fn subscription_status(&self, user_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self.state()?.subscriptions.get(user_id).cloned())
    }

    fn get_user_email(&self, user_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self.state()?.owner_emails.get(user_id).cloned())
    }

    fn list_members(&self, job_id: &str) -> Result<Vec<Member>, StoreError> {
        Ok(self
            .state()?
            .members
            .iter()
            .filter(|member| member.job_id == job_id)
            .cloned()
            .collect())
    }

    fn get_member(&self, member_id: &str) -> Result<Option<Member>, StoreError> {
        Ok(self
            .state()?
            .members
            .iter()
            .find(|member| member.id == member_id)
            .cloned())
    }

    fn update_member(&self, member_id: &str, update: &MemberUpdate) -> Result<(), StoreError> {
        if update.is_empty() {
            return Err(StoreError::EmptyUpdate(member_id.to_string()));
        }
        let mut state = self.state()?;
        let member = state
            .members
            .iter_mut()
            .find(|member| member.id == member_id)
            .ok_or_else(|| StoreError::NotFound(format!("member {}", member_id)))?;
        member.apply(update);
        state
            .member_updates
            .push((member_id.to_string(), update.clone()));
        Ok(())
    }

    fn get_sender_credentials(
        &self,
        user_id: &str,
    ) -> Result<Option<Vec<SenderCredential>>, StoreError> {
        Ok(self.state()?.senders.get(user_id).cloned())
    }

    fn update_sender_credentials(
        &self,
        user_id: &str,
        senders: &[SenderCredential],
    ) -> Result<(), StoreError> {
        let mut state = self.state()?;
        state.senders.insert(user_id.to_string(), senders.to_vec());
        state.credential_writes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_update_is_rejected() {
        let store = InMemoryRecordStore::new();
        store.insert_member(Member::new("m1", "job-1", None, "a@example.com"));
        let err = store
            .update_member("m1", &MemberUpdate::default())
            .expect_err("empty update");
        assert!(matches!(err, StoreError::EmptyUpdate(id) if id == "m1"));
        assert!(store.member_updates().is_empty());
    }

    #[test]
    fn members_are_listed_in_insertion_order() {
        let store = InMemoryRecordStore::new();
        for id in ["c", "a", "b"] {
            store.insert_member(Member::new(id, "job-1", None, "x@example.com"));
        }
        store.insert_member(Member::new("other", "job-2", None, "y@example.com"));
        let ids: Vec<String> = store
            .list_members("job-1")
            .expect("list")
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }
}
