use std::fmt;

use thiserror::Error;

/// Which external system produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Tracker,
    JobQueue,
    StateStore,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tracker => "tracker",
            Self::JobQueue => "job queue",
            Self::StateStore => "state store",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Backend failure taxonomy. Only `Transient` is worth retrying; everything
/// else aborts the run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("{backend} temporarily unavailable: {message}")]
    Transient { backend: Backend, message: String },
    /// Credentials rejected or missing. Retrying cannot fix this.
    #[error("{backend} authentication failure: {message}")]
    Auth { backend: Backend, message: String },
    #[error("{backend} failure: {message}")]
    Fatal { backend: Backend, message: String },
    /// A transient failure that survived every retry.
    #[error("{backend} still failing after {attempts} attempts: {message}")]
    RetriesExhausted { backend: Backend, attempts: u32, message: String },
}

impl SyncError {
    /// Classify an HTTP status: auth failures are never retried, rate limits
    /// and server errors are.
    pub fn from_status(backend: Backend, status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => Self::Auth { backend, message },
            408 | 429 => Self::Transient { backend, message },
            500.. => Self::Transient { backend, message },
            _ => Self::Fatal { backend, message },
        }
    }

    pub fn is_transient(&self) -> bool { matches!(self, Self::Transient { .. }) }

    /// Escalate a transient error once its retries are spent.
    pub fn exhausted(self, attempts: u32) -> Self {
        match self {
            Self::Transient { backend, message } => {
                Self::RetriesExhausted { backend, attempts, message }
            }
            other => other,
        }
    }

    /// Failure description safe for tracker comments: names the backend and
    /// the failure class, never credential material.
    pub fn describe(&self) -> String {
        match self {
            Self::Transient { backend, .. } => format!("{backend} temporarily unavailable"),
            Self::Auth { backend, .. } => {
                format!("{backend} authentication failure (credentials rejected or missing)")
            }
            Self::Fatal { backend, message } => format!("{backend} failure: {message}"),
            Self::RetriesExhausted { backend, attempts, .. } => {
                format!("{backend} still failing after {attempts} attempts")
            }
        }
    }
}

/// An invocation that could not be classified. Recovered by downgrading to the
/// default action, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed trigger: {0}")]
pub struct MalformedTrigger(pub String);
