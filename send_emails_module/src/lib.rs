//! Outbound mail plumbing: the Gmail mailbox API used to hold conversations
//! and Postmark for operational notices to account owners.

mod errors;
pub mod gmail;
pub mod message;
pub mod mime;
pub mod postmark;
pub mod transport;

pub use errors::MailError;
pub use gmail::{GmailClient, GmailConfig};
pub use message::{extract_message_data, GmailMessage, GmailThread, MessageData};
pub use mime::{new_message_id, reply_subject, BodyFormat, OutgoingEmail};
pub use postmark::{send_email_with, PostmarkConfig, SendEmailParams, SendEmailResponse};
pub use transport::{MailTransport, SendOutcome, SentMessage};
