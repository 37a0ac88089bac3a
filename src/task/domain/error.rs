//! Error types for task domain validation and parsing.

use super::{DependencyType, EdgeId, ExtensionKey, GitStatus, TaskId, WorkflowState};
use thiserror::Error;

/// Errors returned while constructing or mutating domain values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskDomainError {
    /// The task title is empty after trimming.
    #[error("task title must not be empty")]
    EmptyTitle,

    /// The task title exceeds the maximum length.
    #[error("task title exceeds {max} characters")]
    TitleTooLong {
        /// Maximum permitted title length.
        max: usize,
    },

    /// The project name is empty after trimming.
    #[error("project name must not be empty")]
    EmptyProjectName,

    /// Priority outside `1..=5`.
    #[error("invalid priority {0}, expected 1 to 5")]
    InvalidPriority(u8),

    /// Completion percentage above 100.
    #[error("invalid completion percentage {0}, expected 0 to 100")]
    InvalidCompletionPercentage(u8),

    /// Complexity score outside `1..=5`.
    #[error("invalid complexity score {0}, expected 1 to 5")]
    InvalidComplexityScore(u8),

    /// Story points off the 1, 2, 3, 5, 8, 13 scale.
    #[error("invalid story points {0}")]
    InvalidStoryPoints(u8),

    /// Hours, cost, or tokens were negative or not finite.
    #[error("invalid {field}: expected a finite, non-negative value")]
    InvalidActuals {
        /// Name of the offending field.
        field: &'static str,
    },

    /// The actor name is empty after trimming.
    #[error("actor must not be empty")]
    EmptyActor,

    /// Unsupported task type.
    #[error("unsupported task type: {0}")]
    InvalidTaskType(String),

    /// The requested workflow edge is not in the transition table.
    #[error("task {task_id} cannot transition from {from} to {to}")]
    InvalidStateTransition {
        /// Task whose transition was rejected.
        task_id: TaskId,
        /// Current state.
        from: WorkflowState,
        /// Requested state.
        to: WorkflowState,
    },

    /// The task is terminal and only accepts metadata edits.
    #[error("task {0} is terminal and only accepts metadata edits")]
    TaskTerminal(TaskId),

    /// The task's completion is derived from its children.
    #[error("completion of task {0} is derived from its children")]
    ProgressDerivedFromChildren(TaskId),

    /// A parent lives in a different project from its child.
    #[error("task {0} belongs to a different project")]
    CrossProjectReference(TaskId),

    /// Hierarchy exceeds the hard depth bound.
    #[error("hierarchy above task {task_id} exceeds the depth limit of {limit}")]
    HierarchyTooDeep {
        /// Task whose ancestor chain is too long.
        task_id: TaskId,
        /// Depth limit that was exceeded.
        limit: usize,
    },

    /// The parent chain revisits a task.
    #[error("parent chain of task {0} contains a cycle")]
    HierarchyCycle(TaskId),

    /// An edge would link a task to itself.
    #[error("task {0} cannot depend on itself")]
    SelfReference(TaskId),

    /// An edge would close a cycle in the blocking sub-graph.
    #[error("{dependency_type} edge {source_id} -> {target_id} would create a cycle")]
    DependencyCycle {
        /// Edge source.
        source_id: TaskId,
        /// Edge target.
        target_id: TaskId,
        /// Edge type.
        dependency_type: DependencyType,
    },

    /// The same typed edge already exists.
    #[error("{dependency_type} edge {source_id} -> {target_id} already exists")]
    DuplicateDependency {
        /// Edge source.
        source_id: TaskId,
        /// Edge target.
        target_id: TaskId,
        /// Edge type.
        dependency_type: DependencyType,
    },

    /// Edge resolution was attempted on an edge that is not blocking.
    #[error("edge {0} is not a blocking edge")]
    NonBlockingEdge(EdgeId),

    /// A patch tried to set a field owned by a dedicated operation.
    #[error("field '{0}' cannot be set through a field update")]
    ForbiddenPatchField(String),

    /// A patch named a field that does not exist.
    #[error("unknown task field '{0}'")]
    UnknownPatchField(String),

    /// A patch payload was malformed.
    #[error("malformed task patch: {0}")]
    MalformedPatch(String),

    /// An extension value does not match the key's declared kind.
    #[error("extension '{key}' expects a {expected} value")]
    InvalidExtension {
        /// Offending key.
        key: ExtensionKey,
        /// Expected value kind.
        expected: &'static str,
    },

    /// Unsupported version control provider.
    #[error("unsupported vcs provider: {0}")]
    InvalidVcsProvider(String),

    /// Empty provider delivery identifier.
    #[error("git event delivery id must not be empty")]
    EmptyDeliveryId,

    /// Invalid branch name.
    #[error("invalid branch name: {0}")]
    InvalidBranchName(String),

    /// Invalid pull request number.
    #[error("invalid pull request number {0}, expected a positive integer")]
    InvalidPullRequestNumber(u64),

    /// Invalid commit hash.
    #[error("invalid commit sha: {0}")]
    InvalidCommitSha(String),

    /// The git event is not legal for the current git status.
    #[error("git event '{event}' is not valid for task {task_id} in status {status}")]
    InvalidGitEvent {
        /// Task the event targeted.
        task_id: TaskId,
        /// Current git status.
        status: GitStatus,
        /// Event kind name.
        event: &'static str,
    },
}

/// Error returned while parsing enumerations from persistence or input.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {kind}: {value}")]
pub struct ParseEnumError {
    /// Enumeration name.
    pub kind: &'static str,
    /// Rejected input.
    pub value: String,
}

impl ParseEnumError {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_owned(),
        }
    }
}
