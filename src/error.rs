//! Error taxonomy shared by the pipeline stages.
//!
//! Only `PipelineError` aborts a run. Everything below it is caught at the
//! item boundary and recorded as a failed outcome.
use thiserror::Error;

use crate::batch::TaskPanicked;
use crate::config::ConfigError;

/// Failure talking to a remote collaborator (document database or image API).
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("http {status}: {body}")]
    Status { status: u16, body: String },
    #[error("request timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid response: {0}")]
    Decode(String),
}

impl RemoteError {
    /// 429, any 5xx and timeouts are worth another attempt; nothing else is.
    pub fn is_transient(&self) -> bool {
        match self {
            RemoteError::Status { status, .. } => *status == 429 || (500..600).contains(status),
            RemoteError::Timeout => true,
            RemoteError::Transport(_) | RemoteError::Decode(_) => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            RemoteError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RemoteError::Timeout
        } else if err.is_decode() {
            RemoteError::Decode(err.to_string())
        } else {
            RemoteError::Transport(err.to_string())
        }
    }
}

/// Per-item failure. Converted into a `Failure` outcome, never escalated.
#[derive(Debug, Error)]
pub enum ItemError {
    #[error("empty prompt: description is empty")]
    EmptyPrompt,
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("no_url_returned")]
    NoUrl,
    #[error("write-back failed for {url}: {source}")]
    WriteBack {
        url: String,
        #[source]
        source: RemoteError,
    },
    #[error("item task panicked: {0}")]
    Panicked(String),
}

impl ItemError {
    /// URL that was generated before the failure, if any.
    pub fn generated_url(&self) -> Option<&str> {
        match self {
            ItemError::WriteBack { url, .. } => Some(url),
            _ => None,
        }
    }
}

impl From<TaskPanicked> for ItemError {
    fn from(panic: TaskPanicked) -> Self {
        ItemError::Panicked(panic.0)
    }
}

/// Fatal, run-level failure.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Configuration(#[from] ConfigError),
    #[error("upstream query failed: {0}")]
    UpstreamQuery(#[source] RemoteError),
    #[error("failed to build http client: {0}")]
    Client(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_transient_statuses() {
        let status = |s| RemoteError::Status {
            status: s,
            body: String::new(),
        };
        assert!(status(429).is_transient());
        assert!(status(500).is_transient());
        assert!(status(503).is_transient());
        assert!(status(599).is_transient());
        assert!(RemoteError::Timeout.is_transient());

        assert!(!status(400).is_transient());
        assert!(!status(401).is_transient());
        assert!(!status(404).is_transient());
        assert!(!RemoteError::Transport("refused".into()).is_transient());
        assert!(!RemoteError::Decode("eof".into()).is_transient());
    }

    #[test]
    fn write_back_failure_keeps_generated_url() {
        let err = ItemError::WriteBack {
            url: "http://x/1.png".into(),
            source: RemoteError::Status {
                status: 400,
                body: "validation_error".into(),
            },
        };
        assert_eq!(err.generated_url(), Some("http://x/1.png"));
        assert!(err.to_string().contains("validation_error"));
        assert_eq!(ItemError::NoUrl.to_string(), "no_url_returned");
        assert_eq!(ItemError::NoUrl.generated_url(), None);
    }
}
