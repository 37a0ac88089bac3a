//! Workflow lifecycle states, the transition table, and audit records.

use super::{Actor, ParseEnumError, TaskId, TransitionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Task workflow state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    /// Task is being scoped.
    Planning,
    /// Task is being sized.
    Estimation,
    /// Task is ready to be picked up.
    Ready,
    /// Task is being implemented.
    Implementing,
    /// Implementation is under code review.
    CodeReview,
    /// Change is being tested.
    Testing,
    /// Change is being validated against acceptance criteria.
    Validation,
    /// Pull request is under review.
    PrReview,
    /// Pull request is being merged.
    Merging,
    /// Work has shipped.
    Deployed,
    /// Work was closed without shipping.
    Closed,
    /// Work is paused until an impediment clears.
    Blocked,
}

impl WorkflowState {
    /// Every state, in lifecycle order.
    pub const ALL: [Self; 12] = [
        Self::Planning,
        Self::Estimation,
        Self::Ready,
        Self::Implementing,
        Self::CodeReview,
        Self::Testing,
        Self::Validation,
        Self::PrReview,
        Self::Merging,
        Self::Deployed,
        Self::Closed,
        Self::Blocked,
    ];

    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::Estimation => "estimation",
            Self::Ready => "ready",
            Self::Implementing => "implementing",
            Self::CodeReview => "code_review",
            Self::Testing => "testing",
            Self::Validation => "validation",
            Self::PrReview => "pr_review",
            Self::Merging => "merging",
            Self::Deployed => "deployed",
            Self::Closed => "closed",
            Self::Blocked => "blocked",
        }
    }

    /// Returns `true` for states that end the lifecycle.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Deployed | Self::Closed)
    }

    /// Returns `true` when the fixed table permits `self -> target`.
    ///
    /// Leaving [`Self::Blocked`] depends on the state the task was blocked
    /// from, so it is never permitted by the table alone; see
    /// [`super::Task::transition_to`].
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        if matches!(target, Self::Blocked) {
            return !self.is_terminal() && !matches!(self, Self::Blocked);
        }
        if matches!(target, Self::Closed) {
            return !self.is_terminal() && !matches!(self, Self::Blocked);
        }
        matches!(
            (self, target),
            (Self::Planning, Self::Estimation)
                | (Self::Estimation, Self::Ready | Self::Planning)
                | (Self::Ready, Self::Implementing | Self::Estimation)
                | (Self::Implementing, Self::CodeReview | Self::Ready)
                | (Self::CodeReview, Self::Testing | Self::Implementing)
                | (Self::Testing, Self::Validation | Self::Implementing)
                | (Self::Validation, Self::PrReview | Self::Implementing)
                | (Self::PrReview, Self::Merging | Self::Implementing)
                | (Self::Merging, Self::Deployed | Self::PrReview)
        )
    }
}

impl TryFrom<&str> for WorkflowState {
    type Error = ParseEnumError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == normalized)
            .ok_or_else(|| ParseEnumError::new("workflow state", value))
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What caused a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// Explicit user request.
    Manual,
    /// Engine-initiated change.
    Automatic,
    /// Source-control event.
    GitEvent,
    /// A blocking dependency was resolved.
    DependencyResolved,
    /// Scheduled or deadline-driven change.
    TimeBased,
}

impl TriggerKind {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Automatic => "automatic",
            Self::GitEvent => "git_event",
            Self::DependencyResolved => "dependency_resolved",
            Self::TimeBased => "time_based",
        }
    }
}

impl TryFrom<&str> for TriggerKind {
    type Error = ParseEnumError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "manual" => Ok(Self::Manual),
            "automatic" => Ok(Self::Automatic),
            "git_event" => Ok(Self::GitEvent),
            "dependency_resolved" => Ok(Self::DependencyResolved),
            "time_based" => Ok(Self::TimeBased),
            _ => Err(ParseEnumError::new("trigger kind", value)),
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome recorded with a transition attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum TransitionValidation {
    /// The transition was committed.
    Accepted,
    /// The transition was refused; the task state did not change.
    Rejected {
        /// Human-readable refusal reason.
        reason: String,
    },
}

impl TransitionValidation {
    /// Returns `true` for accepted transitions.
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Append-only audit record of a workflow transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowTransition {
    /// Record identifier.
    pub id: TransitionId,
    /// Task the record belongs to.
    pub task_id: TaskId,
    /// State before the transition; `None` for the initial record.
    pub from_state: Option<WorkflowState>,
    /// Requested or reached state.
    pub to_state: WorkflowState,
    /// What caused the transition.
    pub trigger: TriggerKind,
    /// Who requested the transition.
    pub actor: Actor,
    /// Validation outcome.
    pub validation: TransitionValidation,
    /// When the transition was recorded.
    pub occurred_at: DateTime<Utc>,
}

impl WorkflowTransition {
    /// Builds an accepted transition record.
    #[must_use]
    pub fn accepted(
        task_id: TaskId,
        from_state: Option<WorkflowState>,
        to_state: WorkflowState,
        trigger: TriggerKind,
        actor: Actor,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TransitionId::new(),
            task_id,
            from_state,
            to_state,
            trigger,
            actor,
            validation: TransitionValidation::Accepted,
            occurred_at,
        }
    }

    /// Builds a rejected transition record.
    #[must_use]
    pub fn rejected(
        task_id: TaskId,
        from_state: WorkflowState,
        to_state: WorkflowState,
        trigger: TriggerKind,
        actor: Actor,
        reason: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TransitionId::new(),
            task_id,
            from_state: Some(from_state),
            to_state,
            trigger,
            actor,
            validation: TransitionValidation::Rejected {
                reason: reason.into(),
            },
            occurred_at,
        }
    }
}
