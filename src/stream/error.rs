use thiserror::Error;

use crate::core::WorkflowIdError;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid workflow id: {0}")]
    InvalidWorkflowId(#[from] WorkflowIdError),
}

impl StreamError {
    /// Invalid identifiers can never connect; everything else is worth
    /// another attempt while the retry budget lasts.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, StreamError::InvalidWorkflowId(_))
    }
}

impl From<reqwest::Error> for StreamError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() {
            StreamError::Connection(e.to_string())
        } else {
            StreamError::Transport(e.to_string())
        }
    }
}
