use send_emails_module::SendOutcome;

pub const SEND_LIMIT_MESSAGE: &str =
    "You have reached the limit of emails you can send per day. Please try again tomorrow.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendCheck {
    pub exceeded: bool,
    pub message: String,
}

pub struct SendGuard;

impl SendGuard {
    pub fn after_send(outcome: &SendOutcome) -> SendCheck {
        match outcome {
            SendOutcome::Sent(_) => SendCheck {
                exceeded: false,
                message: String::new(),
            },
            SendOutcome::RateLimited { .. } => SendCheck {
                exceeded: true,
                message: SEND_LIMIT_MESSAGE.to_string(),
            },
        }
    }
}
