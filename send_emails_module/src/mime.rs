use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use lettre::message::header::ContentType;
use lettre::message::{Mailbox, Message};
use uuid::Uuid;

use crate::errors::MailError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFormat {
    PlainText,
    Html,
}

/// A message to be submitted through the mailbox API as a raw RFC 2822 document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub format: BodyFormat,
    pub in_reply_to: Option<String>,
    pub references: Option<String>,
    /// Message-ID stamped on the outgoing message, known before it is sent.
    pub message_id: String,
}

impl OutgoingEmail {
    pub fn new(from: &str, to: &str, subject: &str, body: &str, format: BodyFormat) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            format,
            in_reply_to: None,
            references: None,
            message_id: new_message_id(from),
        }
    }

    pub fn in_reply_to(mut self, message_id: &str, references: &str) -> Self {
        self.in_reply_to = Some(message_id.to_string()).filter(|v| !v.trim().is_empty());
        self.references = Some(references.to_string()).filter(|v| !v.trim().is_empty());
        self
    }

    pub fn to_rfc2822(&self) -> Result<Vec<u8>, MailError> {
        let from: Mailbox = self
            .from
            .parse()
            .map_err(|e| MailError::Build(format!("invalid sender {}: {}", self.from, e)))?;
        let to: Mailbox = self
            .to
            .parse()
            .map_err(|e| MailError::Build(format!("invalid recipient {}: {}", self.to, e)))?;

        let mut builder = Message::builder()
            .from(from)
            .to(to)
            .subject(self.subject.as_str())
            .message_id(Some(self.message_id.clone()))
            .header(match self.format {
                BodyFormat::PlainText => ContentType::TEXT_PLAIN,
                BodyFormat::Html => ContentType::TEXT_HTML,
            });
        if let Some(message_id) = &self.in_reply_to {
            builder = builder.in_reply_to(message_id.clone());
        }
        if let Some(references) = &self.references {
            builder = builder.references(references.clone());
        }

        let message = builder
            .body(self.body.clone())
            .map_err(|e| MailError::Build(e.to_string()))?;
        Ok(message.formatted())
    }

    /// The `raw` field expected by `messages/send`.
    pub fn to_raw(&self) -> Result<String, MailError> {
        Ok(URL_SAFE.encode(self.to_rfc2822()?))
    }
}

/// A fresh `<uuid@domain>` id, using the sender's domain.
pub fn new_message_id(from: &str) -> String {
    let domain = from
        .rsplit_once('@')
        .map(|(_, domain)| domain.trim().trim_end_matches('>'))
        .filter(|domain| !domain.is_empty())
        .unwrap_or("localhost");
    format!("<{}@{}>", Uuid::new_v4().simple(), domain)
}

/// Prefixes `Re: ` unless the subject already carries it.
pub fn reply_subject(subject: &str) -> String {
    let trimmed = subject.trim();
    if trimmed
        .get(..3)
        .map_or(false, |prefix| prefix.eq_ignore_ascii_case("re:"))
    {
        trimmed.to_string()
    } else {
        format!("Re: {}", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_message_carries_threading_headers() {
        let email = OutgoingEmail::new(
            "recruiter@example.com",
            "Jane <jane@example.com>",
            "Re: Role",
            "Thanks for asking.",
            BodyFormat::PlainText,
        )
        .in_reply_to("<inbound@mail>", "<first@mail> <inbound@mail>");

        let raw = email.to_raw().expect("raw");
        let decoded = URL_SAFE.decode(raw).expect("decode");
        let text = String::from_utf8(decoded).expect("utf8");
        assert!(text.contains("In-Reply-To: <inbound@mail>"));
        assert!(text.contains("References: <first@mail> <inbound@mail>"));
        assert!(text.contains("Subject: Re: Role"));
        assert!(text.contains(&format!("Message-ID: {}", email.message_id)));
        assert!(text.contains("Thanks for asking."));
    }

    #[test]
    fn message_ids_use_sender_domain_and_are_unique() {
        let first = new_message_id("Recruiter <recruiter@example.com>");
        let second = new_message_id("recruiter@example.com");
        assert!(first.starts_with('<'));
        assert!(first.ends_with("@example.com>"));
        assert_ne!(first, second);
        assert!(new_message_id("no-domain").ends_with("@localhost>"));
    }

    #[test]
    fn invalid_recipient_is_a_build_error() {
        let email = OutgoingEmail::new("a@example.com", "not an address", "s", "b", BodyFormat::Html);
        assert!(matches!(email.to_raw(), Err(MailError::Build(_))));
    }

    #[test]
    fn reply_subject_is_not_doubled() {
        assert_eq!(reply_subject("Role update"), "Re: Role update");
        assert_eq!(reply_subject("RE: Role update"), "RE: Role update");
        assert_eq!(reply_subject("re: x"), "re: x");
    }
}
