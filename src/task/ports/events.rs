//! Observer port for committed workflow changes.
//!
//! Listeners are invoked synchronously after a commit succeeds, in
//! registration order. A listener never sees uncommitted state.

use crate::task::domain::{
    CompletionId, CompletionPercentage, DependencyType, EdgeId, EstimateId, GitStatus, ProjectId,
    StoryPoints, TaskId, TriggerKind, WorkflowState,
};

/// A committed change to the workflow engine's state.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowEvent {
    /// A task was created.
    TaskCreated {
        /// New task.
        task_id: TaskId,
        /// Owning project.
        project_id: ProjectId,
        /// Parent task, if any.
        parent_id: Option<TaskId>,
    },
    /// A workflow transition was committed.
    TransitionCommitted {
        /// Transitioned task.
        task_id: TaskId,
        /// Previous state.
        from: WorkflowState,
        /// New state.
        to: WorkflowState,
        /// Cause.
        trigger: TriggerKind,
    },
    /// A requested transition was rejected and recorded in the audit trail.
    TransitionRejected {
        /// Task the request targeted.
        task_id: TaskId,
        /// State at the time of the request.
        from: WorkflowState,
        /// Requested state.
        to: WorkflowState,
        /// Cause.
        trigger: TriggerKind,
        /// Rejection reason.
        reason: String,
    },
    /// A parent's completion was re-derived from its children.
    RollupRecomputed {
        /// Parent task.
        task_id: TaskId,
        /// Previous completion.
        previous: CompletionPercentage,
        /// New completion.
        completion: CompletionPercentage,
    },
    /// A dependency edge was added.
    DependencyAdded {
        /// New edge.
        edge_id: EdgeId,
        /// Edge source.
        source_task_id: TaskId,
        /// Edge target.
        target_task_id: TaskId,
        /// Relationship type.
        dependency_type: DependencyType,
    },
    /// The last unresolved blocking edge of a task was resolved.
    DependencyResolved {
        /// Resolved edge.
        edge_id: EdgeId,
        /// Task that may now proceed.
        dependent: TaskId,
        /// `true` when the dependent left `blocked` in the same commit.
        unblocked: bool,
    },
    /// A new estimate version was stored.
    EstimateRecorded {
        /// Estimated task.
        task_id: TaskId,
        /// Estimate row.
        estimate_id: EstimateId,
        /// Estimate version.
        version: u32,
        /// Derived story points.
        story_points: StoryPoints,
    },
    /// A completion record joined the learning pool.
    CompletionRecorded {
        /// Completed task.
        task_id: TaskId,
        /// Completion row.
        completion_id: CompletionId,
        /// Variance against the estimate, when known.
        variance: Option<f64>,
    },
    /// A task's git status changed.
    GitStatusChanged {
        /// Affected task.
        task_id: TaskId,
        /// Previous status.
        from: GitStatus,
        /// New status.
        to: GitStatus,
    },
}

impl WorkflowEvent {
    /// Short machine-readable event name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::TaskCreated { .. } => "task_created",
            Self::TransitionCommitted { .. } => "transition_committed",
            Self::TransitionRejected { .. } => "transition_rejected",
            Self::RollupRecomputed { .. } => "rollup_recomputed",
            Self::DependencyAdded { .. } => "dependency_added",
            Self::DependencyResolved { .. } => "dependency_resolved",
            Self::EstimateRecorded { .. } => "estimate_recorded",
            Self::CompletionRecorded { .. } => "completion_recorded",
            Self::GitStatusChanged { .. } => "git_status_changed",
        }
    }
}

/// Receives committed workflow events.
pub trait WorkflowEventListener: Send + Sync {
    /// Handles one event. Must not block for long; it runs inline with the
    /// operation that produced it.
    fn on_event(&self, event: &WorkflowEvent);
}
