mod test_support;

use conversation_module::auth::RefreshError;
use conversation_module::{ConversationError, SenderCredential, TokenGuard};
use serde_json::json;
use test_support::*;

fn guard(fixture: &Fixture) -> TokenGuard<'_> {
    let collaborators = fixture.collaborators();
    TokenGuard::new(
        collaborators.store,
        collaborators.identity,
        collaborators.owner_notifier(),
        settings().retry,
    )
}

fn fixture_with(identity: FakeIdentity, senders: Vec<SenderCredential>) -> Fixture {
    let mut fixture = Fixture::new(FakeKnowledge::default(), FakeLlm::default());
    fixture.identity = identity;
    fixture.store.set_senders(USER_ID, senders);
    fixture
}

fn expired(email: &str) -> SenderCredential {
    let mut credential = SenderCredential::new(email);
    credential.access_token = Some("access-old".to_string());
    credential.access_expires_in = Some(1_000.0);
    credential.refresh_token = Some("refresh-1".to_string());
    credential
}

#[test]
fn valid_token_is_returned_without_refresh() {
    let fixture = Fixture::new(FakeKnowledge::default(), FakeLlm::default());
    let token = guard(&fixture).ensure_valid(JOB_ID).expect("token");

    assert_eq!(token.access_token, "access-valid");
    assert_eq!(token.mailbox_address, MAILBOX);
    assert_eq!(token.user_id, USER_ID);
    assert_eq!(token.expires_at, FAR_FUTURE);
    assert!(fixture.identity.calls().is_empty());
    assert_eq!(fixture.store.credential_writes(), 0);
}

#[test]
fn expired_token_is_refreshed_and_persisted() {
    let mut other = SenderCredential::new("other@example.com");
    other.access_token = Some("other-token".to_string());
    let mut entry = expired(MAILBOX);
    entry.extra.insert("provider".to_string(), json!("google"));
    let fixture = fixture_with(
        FakeIdentity::granting("access-new", 3600.0),
        vec![other.clone(), entry],
    );

    let token = guard(&fixture).ensure_valid(JOB_ID).expect("token");

    assert_eq!(token.access_token, "access-new");
    assert!(token.expires_at > 1_000.0);
    assert_eq!(fixture.identity.calls(), vec!["refresh-1".to_string()]);
    assert_eq!(fixture.store.credential_writes(), 1);

    let senders = fixture.store.senders(USER_ID).expect("senders");
    assert_eq!(senders.len(), 2);
    assert_eq!(senders[0], other);
    assert_eq!(senders[1].access_token.as_deref(), Some("access-new"));
    assert_eq!(senders[1].access_expires_in, Some(token.expires_at));
    assert_eq!(senders[1].refresh_token.as_deref(), Some("refresh-1"));
    assert_eq!(senders[1].extra.get("provider"), Some(&json!("google")));
}

#[test]
fn mailbox_match_ignores_case() {
    let fixture = fixture_with(
        FakeIdentity::granting("access-new", 3600.0),
        vec![expired("Recruiter@Example.com")],
    );
    let token = guard(&fixture).ensure_valid(JOB_ID).expect("token");
    assert_eq!(token.access_token, "access-new");
}

#[test]
fn token_without_expiry_is_refreshed() {
    let mut entry = SenderCredential::new(MAILBOX);
    entry.access_token = Some("access-unknown".to_string());
    entry.refresh_token = Some("refresh-1".to_string());
    let fixture = fixture_with(FakeIdentity::granting("access-new", 3600.0), vec![entry]);

    let token = guard(&fixture).ensure_valid(JOB_ID).expect("token");
    assert_eq!(token.access_token, "access-new");
    assert_eq!(fixture.identity.calls().len(), 1);
}

#[test]
fn missing_refresh_token_is_an_auth_error() {
    let mut entry = expired(MAILBOX);
    entry.refresh_token = Some("  ".to_string());
    let fixture = fixture_with(FakeIdentity::granting("access-new", 3600.0), vec![entry]);

    let err = guard(&fixture).ensure_valid(JOB_ID).expect_err("no refresh token");
    assert!(matches!(err, ConversationError::Auth(ref msg) if msg == "refresh token missing"));
    assert!(fixture.identity.calls().is_empty());
    assert!(fixture.notifier.notices().is_empty());
}

#[test]
fn rejected_refresh_token_notifies_owner() {
    let fixture = fixture_with(FakeIdentity::rejecting(), vec![expired(MAILBOX)]);

    let err = guard(&fixture).ensure_valid(JOB_ID).expect_err("invalid grant");
    assert!(matches!(err, ConversationError::Auth(_)));
    assert_eq!(fixture.identity.calls().len(), 1);
    assert_eq!(fixture.store.credential_writes(), 0);

    let notices = fixture.notifier.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].to, OWNER_EMAIL);
    assert_eq!(notices[0].tag, "reauthorize-mailbox");
    assert!(notices[0].html_body.contains("re-authorize the email - recruiter@example.com"));
}

#[test]
fn unknown_mailbox_fails_without_creating_an_entry() {
    let fixture = fixture_with(
        FakeIdentity::granting("access-new", 3600.0),
        vec![expired("someone-else@example.com")],
    );

    let err = guard(&fixture).ensure_valid(JOB_ID).expect_err("not connected");
    assert!(matches!(err, ConversationError::Auth(_)));
    assert!(fixture.identity.calls().is_empty());
    assert_eq!(fixture.store.credential_writes(), 0);
    assert_eq!(fixture.store.senders(USER_ID).expect("senders").len(), 1);

    let notices = fixture.notifier.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].tag, "mailbox-not-connected");
}

#[test]
fn unreachable_provider_is_retried() {
    let fixture = fixture_with(FakeIdentity::unavailable(), vec![expired(MAILBOX)]);

    let err = guard(&fixture).ensure_valid(JOB_ID).expect_err("unavailable");
    assert!(matches!(err, ConversationError::Auth(_)));
    assert_eq!(fixture.identity.calls().len(), 3);
    assert!(fixture.notifier.notices().is_empty());
}

#[test]
fn unknown_job_is_not_found() {
    let fixture = Fixture::new(FakeKnowledge::default(), FakeLlm::default());
    let err = guard(&fixture).ensure_valid("job-404").expect_err("missing job");
    assert!(matches!(err, ConversationError::NotFound(_)));
}

#[test]
fn refresh_updates_the_named_entry() {
    let fixture = fixture_with(
        FakeIdentity::granting("access-new", 120.0),
        vec![expired("first@example.com"), expired(MAILBOX)],
    );

    let token = guard(&fixture)
        .refresh(USER_ID, "first@example.com", "refresh-7")
        .expect("refresh");
    assert_eq!(token.mailbox_address, "first@example.com");
    assert_eq!(fixture.identity.calls(), vec!["refresh-7".to_string()]);

    let senders = fixture.store.senders(USER_ID).expect("senders");
    assert_eq!(senders[0].access_token.as_deref(), Some("access-new"));
    assert_eq!(senders[1].access_token.as_deref(), Some("access-old"));

    let err = guard(&fixture)
        .refresh(USER_ID, "nobody@example.com", "refresh-7")
        .expect_err("missing entry");
    assert!(matches!(err, RefreshError::MissingEntry(_)));
}
