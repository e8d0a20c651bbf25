//! Job model error types.

use thiserror::Error;

/// Result type used by the job model.
pub type JobResult<T> = Result<T, JobError>;

/// Failure to build, encode, or resolve a job.
///
/// Every variant is fatal for the single job it concerns: retrying cannot fix a
/// renamed target or a corrupt payload, so consumers park these instead of
/// requeueing them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JobError {
    /// An identifier is not a fully-qualified dotted name.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// No target is registered under this identifier.
    #[error("unresolvable target identifier: {0}")]
    UnresolvableTarget(String),

    /// No model is registered under this identifier.
    #[error("unresolvable model identifier: {0}")]
    UnresolvableModel(String),

    /// The job names a known model, but not the one its target consumes.
    #[error("target {target} consumes model {expected}, job carries {found}")]
    ModelMismatch {
        target: String,
        expected: String,
        found: String,
    },

    /// The queued value does not have the wire shape of a job.
    #[error("malformed job payload: {0}")]
    Malformed(String),
}

impl JobError {
    pub fn invalid_identifier(msg: impl Into<String>) -> Self {
        Self::InvalidIdentifier(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }
}

/// Rejection of a target at registration time.
///
/// Raised while the registry is being populated at startup, never during a
/// drain.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    /// The target or model name is not a stable, qualified identifier.
    #[error("invalid identifier for registration: {0}")]
    InvalidIdentifier(String),

    /// Another target already uses this identifier.
    #[error("target already registered: {0}")]
    DuplicateTarget(String),

    /// The model identifier is already bound to a different Rust type.
    #[error("model identifier {0} is bound to a different type")]
    ModelConflict(String),
}

impl From<JobError> for RegistrationError {
    fn from(value: JobError) -> Self {
        match value {
            JobError::InvalidIdentifier(msg) => RegistrationError::InvalidIdentifier(msg),
            other => RegistrationError::InvalidIdentifier(other.to_string()),
        }
    }
}
