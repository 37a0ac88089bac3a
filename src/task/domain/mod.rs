//! Domain model for task workflow, dependencies, and estimation.
//!
//! The domain owns validation, the workflow transition table, dependency
//! cycle detection, completion rollup arithmetic, and the estimation model.
//! Persistence and event delivery stay outside the domain boundary.

mod dependency;
mod error;
mod estimate;
mod extensions;
mod git;
mod hierarchy;
mod ids;
mod learning;
mod patch;
mod project;
mod state;
mod task;
mod values;

pub use dependency::{DependencyEdge, DependencyGraph, DependencyType, PersistedEdgeData};
pub use error::{ParseEnumError, TaskDomainError};
pub use estimate::{
    CompletionRecord, ComplexityFactors, ComplexityScore, ConfidenceBand, Effort, Estimate,
    EstimateNote, EstimateSnapshot, EstimateSuggestion, SampleProfile, StoryPoints,
    relative_variance,
};
pub use extensions::{ExtensionKey, ExtensionValue, Extensions};
pub use git::{
    BranchName, CommitSha, GitEvent, GitEventId, GitEventKind, GitLink, GitStatus,
    PullRequestNumber, VcsProvider,
};
pub use hierarchy::{AncestorWalk, MAX_HIERARCHY_DEPTH, recompute_completion};
pub use ids::{CompletionId, EdgeId, EstimateId, ProjectId, TaskId, TransitionId};
pub use learning::{
    EstimationModel, LearningInsights, WeeklyAccuracy, accuracy, latest_per_task, select_similar,
};
pub use patch::TaskPatch;
pub use project::Project;
pub use state::{TransitionValidation, TriggerKind, WorkflowState, WorkflowTransition};
pub use task::{NewTask, Task};
pub use values::{
    Actor, CompletionPercentage, MAX_TITLE_LENGTH, Priority, Tags, TaskType, Title,
};
