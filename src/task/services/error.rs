//! Service-level error type and its coarse classification.

use crate::task::{
    domain::{EdgeId, ProjectId, TaskDomainError, TaskId},
    ports::TaskRepositoryError,
};
use thiserror::Error;

/// Service-level errors for workflow operations.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Domain validation failed.
    #[error(transparent)]
    Domain(#[from] TaskDomainError),

    /// Repository operation failed.
    #[error(transparent)]
    Repository(#[from] TaskRepositoryError),

    /// The referenced project does not exist.
    #[error("unknown project: {0}")]
    UnknownProject(ProjectId),

    /// The task cannot leave `ready` while blocking edges are unresolved.
    #[error("task {task_id} is blocked by {} unresolved dependencies", blockers.len())]
    Blocked {
        /// Gated task.
        task_id: TaskId,
        /// Unresolved blocking edges.
        blockers: Vec<EdgeId>,
    },

    /// A completion was recorded for a task that has not terminated.
    #[error("task {0} has not reached a terminal state")]
    NotTerminal(TaskId),
}

/// Result type for workflow service operations.
pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Caller-facing error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad input shape or a value outside its domain.
    Validation,
    /// Unknown identifier.
    NotFound,
    /// Illegal workflow or git state edge.
    Transition,
    /// Blocked by an unresolved dependency.
    Dependency,
    /// The change would close a cycle.
    Cycle,
    /// An edge from a task to itself.
    SelfReference,
    /// Lost a concurrent-write race; re-read and retry.
    Conflict,
    /// Storage unavailable; nothing was written.
    Storage,
}

impl WorkflowError {
    /// Classifies the error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Domain(err) => domain_kind(err),
            Self::Repository(err) => repository_kind(err),
            Self::UnknownProject(_) | Self::NotTerminal(_) => ErrorKind::Validation,
            Self::Blocked { .. } => ErrorKind::Dependency,
        }
    }

    /// Returns `true` when retrying against fresh state may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Conflict | ErrorKind::Storage)
    }
}

const fn domain_kind(err: &TaskDomainError) -> ErrorKind {
    match err {
        TaskDomainError::InvalidStateTransition { .. } | TaskDomainError::InvalidGitEvent { .. } => {
            ErrorKind::Transition
        }
        TaskDomainError::DependencyCycle { .. } | TaskDomainError::HierarchyCycle(_) => {
            ErrorKind::Cycle
        }
        TaskDomainError::SelfReference(_) => ErrorKind::SelfReference,
        _ => ErrorKind::Validation,
    }
}

const fn repository_kind(err: &TaskRepositoryError) -> ErrorKind {
    match err {
        TaskRepositoryError::NotFound(_)
        | TaskRepositoryError::ProjectNotFound(_)
        | TaskRepositoryError::EdgeNotFound(_) => ErrorKind::NotFound,
        TaskRepositoryError::Conflict { .. }
        | TaskRepositoryError::GraphConflict(_)
        | TaskRepositoryError::DuplicateTask(_)
        | TaskRepositoryError::DuplicateProject(_)
        | TaskRepositoryError::DuplicateEvent(_) => ErrorKind::Conflict,
        TaskRepositoryError::Persistence(_) => ErrorKind::Storage,
    }
}
