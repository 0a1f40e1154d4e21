use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::errors::MailError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GmailThread {
    pub id: String,
    #[serde(default)]
    pub messages: Vec<GmailMessage>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GmailMessage {
    pub id: String,
    #[serde(default)]
    pub thread_id: String,
    #[serde(default)]
    pub payload: Option<MessagePart>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePart {
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub headers: Vec<MessageHeader>,
    #[serde(default)]
    pub body: Option<PartBody>,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartBody {
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageHeader {
    pub name: String,
    pub value: String,
}

/// The fields of a mailbox message the conversation agent works with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageData {
    pub id: String,
    pub thread_id: String,
    pub subject: String,
    pub message_id: String,
    pub references: String,
    pub body: String,
}

impl GmailMessage {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.payload
            .as_ref()?
            .headers
            .iter()
            .find(|header| header.name.eq_ignore_ascii_case(name))
            .map(|header| header.value.as_str())
    }
}

/// Pulls subject, Message-ID, References and the decoded text body out of a message.
///
/// Multipart payloads are walked depth-first and the first part carrying data wins.
pub fn extract_message_data(message: &GmailMessage) -> Result<MessageData, MailError> {
    let payload = message
        .payload
        .as_ref()
        .ok_or_else(|| MailError::Malformed(format!("message {} has no payload", message.id)))?;
    let encoded = first_body_data(payload)
        .ok_or_else(|| MailError::Malformed(format!("message {} has no body data", message.id)))?;

    Ok(MessageData {
        id: message.id.clone(),
        thread_id: message.thread_id.clone(),
        subject: message.header("Subject").unwrap_or_default().to_string(),
        message_id: message.header("Message-ID").unwrap_or_default().trim().to_string(),
        references: message.header("References").unwrap_or_default().trim().to_string(),
        body: decode_body(encoded)?,
    })
}

fn first_body_data(part: &MessagePart) -> Option<&str> {
    if !part.parts.is_empty() {
        return part.parts.iter().find_map(first_body_data);
    }
    part.body
        .as_ref()
        .and_then(|body| body.data.as_deref())
        .filter(|data| !data.is_empty())
}

/// Gmail base64url encodes bodies with or without padding depending on the endpoint.
pub fn decode_body(encoded: &str) -> Result<String, MailError> {
    let cleaned: String = encoded
        .chars()
        .filter(|ch| !ch.is_whitespace())
        .collect();
    let bytes = URL_SAFE_NO_PAD
        .decode(cleaned.trim_end_matches('='))
        .map_err(|e| MailError::Malformed(format!("invalid body encoding: {}", e)))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

pub fn encode_body(text: &str) -> String {
    URL_SAFE_NO_PAD.encode(text.as_bytes())
}
