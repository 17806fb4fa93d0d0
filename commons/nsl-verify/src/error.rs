use std::time::Duration;

use nsl_client::{ClientError, ResourceKind};

pub type VerifyResult<T> = Result<T, VerifyError>;

/// Why the bulk-delete phase of a lifecycle run failed.
#[derive(Debug, thiserror::Error)]
pub enum DeleteFailure {
    #[error("expected {expected} matching namespaces, found {matched}")]
    CountMismatch { expected: usize, matched: usize },

    #[error("listing namespaces failed: {0}")]
    List(#[source] ClientError),

    #[error("delete request for {name} failed: {source}")]
    Request {
        name: String,
        #[source]
        source: ClientError,
    },
}

/// Terminal failure of a verification run. Each variant names the
/// operation and the identity it was acting on.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("creating namespace {name} (worker {index}) failed after {elapsed:?}: {cause}")]
    CreateFailed {
        index: usize,
        name: String,
        elapsed: Duration,
        #[source]
        cause: ClientError,
    },

    #[error("bulk delete of namespaces matching '{prefix}' failed after {elapsed:?}: {reason}")]
    DeleteFailed {
        prefix: String,
        elapsed: Duration,
        #[source]
        reason: DeleteFailure,
    },

    #[error(
        "{remaining} namespaces matching '{prefix}' remain after {elapsed:?} \
         ({attempts} polls); at most {max_allowed} allowed"
    )]
    ConvergenceTimeout {
        prefix: String,
        remaining: usize,
        max_allowed: usize,
        attempts: u32,
        elapsed: Duration,
    },

    #[error("{op} on {target} failed after {elapsed:?} ({attempts} polls): {source}")]
    ConditionError {
        op: &'static str,
        target: String,
        attempts: u32,
        elapsed: Duration,
        #[source]
        source: ClientError,
    },

    #[error("{op} on {target} cancelled after {elapsed:?}")]
    Cancelled {
        op: &'static str,
        target: String,
        elapsed: Duration,
    },

    #[error("{kind} {namespace}/{name} outlived its namespace after {elapsed:?}: {observed}")]
    CascadeIncomplete {
        kind: ResourceKind,
        namespace: String,
        name: String,
        elapsed: Duration,
        observed: String,
    },

    #[error("{op} on {target} timed out after {elapsed:?}; last observed: {last_observed}")]
    Timeout {
        op: &'static str,
        target: String,
        elapsed: Duration,
        last_observed: String,
    },

    #[error("{op} on {target} failed after {elapsed:?}: {source}")]
    Step {
        op: &'static str,
        target: String,
        elapsed: Duration,
        #[source]
        source: ClientError,
    },

    #[error(
        "namespace {namespace} label {key}: expected {expected:?}, observed {observed:?} \
         after {elapsed:?}"
    )]
    PatchNotApplied {
        namespace: String,
        key: String,
        expected: String,
        observed: Option<String>,
        elapsed: Duration,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl VerifyError {
    pub fn step(
        op: &'static str,
        target: impl Into<String>,
        elapsed: Duration,
        source: ClientError,
    ) -> Self {
        VerifyError::Step {
            op,
            target: target.into(),
            elapsed,
            source,
        }
    }

    /// Short machine-friendly name of the variant, used in run summaries.
    pub fn code(&self) -> &'static str {
        match self {
            VerifyError::CreateFailed { .. } => "CreateFailed",
            VerifyError::DeleteFailed { .. } => "DeleteFailed",
            VerifyError::ConvergenceTimeout { .. } => "ConvergenceTimeout",
            VerifyError::ConditionError { .. } => "ConditionError",
            VerifyError::Cancelled { .. } => "Cancelled",
            VerifyError::CascadeIncomplete { .. } => "CascadeIncomplete",
            VerifyError::Timeout { .. } => "Timeout",
            VerifyError::Step { .. } => "StepFailed",
            VerifyError::PatchNotApplied { .. } => "PatchNotApplied",
            VerifyError::InvalidConfig(_) => "InvalidConfig",
        }
    }
}
