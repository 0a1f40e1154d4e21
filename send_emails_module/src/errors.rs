#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("http error: {0}")]
    Http(String),
    #[error("{service} returned {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },
    #[error("failed to parse response: {0}")]
    Parse(String),
    #[error("malformed message: {0}")]
    Malformed(String),
    #[error("thread {0} contains no messages")]
    EmptyThread(String),
    #[error("failed to build message: {0}")]
    Build(String),
    #[error("missing environment variable: {0}")]
    MissingEnv(&'static str),
    #[error("postmark error {code}: {message}")]
    Postmark { code: i64, message: String },
}

impl MailError {
    /// Network and decode failures are worth another attempt; 4xx responses are not.
    pub fn is_transient(&self) -> bool {
        match self {
            MailError::Http(_) | MailError::Parse(_) => true,
            MailError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
