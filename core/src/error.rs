use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("authentication failed against {host}: {details}")]
    Auth { host: String, details: String },

    #[error("rate limited by remote API")]
    RateLimited,

    #[error("remote API error (status {status}): {details}")]
    Service { status: u16, details: String },

    #[error("corrupt checkpoint at {path}: {details}")]
    CorruptCheckpoint { path: String, details: String },

    #[error("invalid input identity {identity:?}: {details}")]
    InvalidIdentity { identity: String, details: String },

    #[error("secret resolution failed for {input}: {details}")]
    Secret { input: String, details: String },

    #[error("invalid timestamp {value:?}: expected YYYY-MM-DDTHH:MM:SS+00:00")]
    Timestamp { value: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Retryable within a single page fetch. Everything else is fatal for
    /// the input being polled and is handled at the orchestrator boundary.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::RateLimited)
    }

    pub fn is_fatal(&self) -> bool {
        !self.is_retryable()
    }
}
