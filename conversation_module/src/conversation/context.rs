use crate::auth::ValidToken;
use crate::model::{Job, Member, MemberUpdate};

/// Everything one member's turn needs, threaded through the state machine.
#[derive(Debug)]
pub struct MemberContext<'a> {
    pub job: &'a Job,
    pub token: &'a ValidToken,
    pub member: Member,
}

impl<'a> MemberContext<'a> {
    pub fn new(job: &'a Job, token: &'a ValidToken, member: Member) -> Self {
        Self { job, token, member }
    }

    pub fn recipient_name(&self) -> Option<&str> {
        self.member.name_email.name.as_deref()
    }

    pub fn recipient_email(&self) -> &str {
        &self.member.name_email.email
    }

    pub fn apply(&mut self, update: &MemberUpdate) {
        self.member.apply(update);
    }
}
