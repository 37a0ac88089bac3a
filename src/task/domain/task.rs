//! Task aggregate root.

use super::{
    CompletionPercentage, Effort, Estimate, EstimateSnapshot, Extensions, GitEventKind, GitLink,
    GitStatus, Priority, ProjectId, Tags, TaskDomainError, TaskId, TaskPatch, TaskType, Title,
    WorkflowState,
};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};

/// Validated inputs for a new task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    /// Owning project.
    pub project_id: ProjectId,
    /// Parent task, if any.
    pub parent_id: Option<TaskId>,
    /// Title.
    pub title: Title,
    /// Free-form description.
    pub description: Option<String>,
    /// Kind of work.
    pub task_type: TaskType,
    /// Priority.
    pub priority: Priority,
    /// Technology tags.
    pub tags: Tags,
    /// Due date.
    pub due_at: Option<DateTime<Utc>>,
    /// Typed extensions.
    pub extensions: Extensions,
}

/// Task aggregate root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    id: TaskId,
    project_id: ProjectId,
    parent_id: Option<TaskId>,
    title: Title,
    description: Option<String>,
    task_type: TaskType,
    priority: Priority,
    tags: Tags,
    workflow_state: WorkflowState,
    blocked_from: Option<WorkflowState>,
    git_status: GitStatus,
    git_link: GitLink,
    completion: CompletionPercentage,
    estimate: Option<EstimateSnapshot>,
    actuals: Effort,
    extensions: Extensions,
    revision: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    due_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Creates a task in [`WorkflowState::Planning`] with no estimate.
    #[must_use]
    pub fn new(params: NewTask, clock: &impl Clock) -> Self {
        let timestamp = clock.utc();
        Self {
            id: TaskId::new(),
            project_id: params.project_id,
            parent_id: params.parent_id,
            title: params.title,
            description: normalize_description(params.description),
            task_type: params.task_type,
            priority: params.priority,
            tags: params.tags,
            workflow_state: WorkflowState::Planning,
            blocked_from: None,
            git_status: GitStatus::NotStarted,
            git_link: GitLink::default(),
            completion: CompletionPercentage::ZERO,
            estimate: None,
            actuals: Effort::default(),
            extensions: params.extensions,
            revision: 0,
            created_at: timestamp,
            updated_at: timestamp,
            started_at: None,
            completed_at: None,
            due_at: params.due_at,
        }
    }

    /// Returns the task identifier.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Returns the owning project.
    #[must_use]
    pub const fn project_id(&self) -> ProjectId {
        self.project_id
    }

    /// Returns the parent task, if any.
    #[must_use]
    pub const fn parent_id(&self) -> Option<TaskId> {
        self.parent_id
    }

    /// Returns the title.
    #[must_use]
    pub const fn title(&self) -> &Title {
        &self.title
    }

    /// Returns the description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns the task type.
    #[must_use]
    pub const fn task_type(&self) -> TaskType {
        self.task_type
    }

    /// Returns the priority.
    #[must_use]
    pub const fn priority(&self) -> Priority {
        self.priority
    }

    /// Returns the technology tags.
    #[must_use]
    pub const fn tags(&self) -> &Tags {
        &self.tags
    }

    /// Returns the workflow state.
    #[must_use]
    pub const fn workflow_state(&self) -> WorkflowState {
        self.workflow_state
    }

    /// Returns the state a blocked task resumes to.
    #[must_use]
    pub const fn blocked_from(&self) -> Option<WorkflowState> {
        self.blocked_from
    }

    /// Returns the source-control status.
    #[must_use]
    pub const fn git_status(&self) -> GitStatus {
        self.git_status
    }

    /// Returns the linked branch and pull request.
    #[must_use]
    pub const fn git_link(&self) -> &GitLink {
        &self.git_link
    }

    /// Returns the stored completion percentage.
    #[must_use]
    pub const fn completion(&self) -> CompletionPercentage {
        self.completion
    }

    /// Completion used by parent rollups: terminal tasks count as complete.
    #[must_use]
    pub const fn effective_completion(&self) -> CompletionPercentage {
        if self.workflow_state.is_terminal() {
            CompletionPercentage::COMPLETE
        } else {
            self.completion
        }
    }

    /// Returns the current estimate snapshot.
    #[must_use]
    pub const fn estimate(&self) -> Option<&EstimateSnapshot> {
        self.estimate.as_ref()
    }

    /// Returns the logged actual effort.
    #[must_use]
    pub const fn actuals(&self) -> Effort {
        self.actuals
    }

    /// Returns the typed extensions.
    #[must_use]
    pub const fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    /// Returns the optimistic-concurrency revision.
    #[must_use]
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the latest modification timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns when implementation first started.
    #[must_use]
    pub const fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Returns when the task reached a terminal state.
    #[must_use]
    pub const fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Returns the due date.
    #[must_use]
    pub const fn due_at(&self) -> Option<DateTime<Utc>> {
        self.due_at
    }

    /// Returns `true` once the task reached a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.workflow_state.is_terminal()
    }

    /// Moves the task to `target`, returning the previous state.
    ///
    /// [`WorkflowState::Blocked`] is reachable from any non-terminal state and
    /// only returns to the state it was entered from.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidStateTransition`] for edges outside
    /// the table; the task is left untouched.
    pub fn transition_to(
        &mut self,
        target: WorkflowState,
        clock: &impl Clock,
    ) -> Result<WorkflowState, TaskDomainError> {
        let current = self.workflow_state;
        if !self.can_transition_to(target) {
            return Err(TaskDomainError::InvalidStateTransition {
                task_id: self.id,
                from: current,
                to: target,
            });
        }

        let now = clock.utc();
        self.blocked_from = match target {
            WorkflowState::Blocked => Some(current),
            _ => None,
        };
        self.workflow_state = target;
        if target == WorkflowState::Implementing && self.started_at.is_none() {
            self.started_at = Some(now);
        }
        if target.is_terminal() {
            self.completed_at = Some(now);
        }
        self.updated_at = now;
        Ok(current)
    }

    /// Returns `true` when [`Self::transition_to`] would accept `target`.
    #[must_use]
    pub fn can_transition_to(&self, target: WorkflowState) -> bool {
        match self.workflow_state {
            WorkflowState::Blocked => self.blocked_from == Some(target),
            current => current.can_transition_to(target),
        }
    }

    /// Applies a field update.
    ///
    /// Terminal tasks only accept title, description, and extension edits.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::TaskTerminal`] when a terminal task receives
    /// a priority or due-date change.
    pub fn apply_patch(&mut self, patch: &TaskPatch, clock: &impl Clock) -> Result<(), TaskDomainError> {
        if self.is_terminal() && (patch.priority.is_some() || patch.due_at.is_some()) {
            return Err(TaskDomainError::TaskTerminal(self.id));
        }
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(description) = &patch.description {
            self.description = normalize_description(description.clone());
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(due_at) = patch.due_at {
            self.due_at = due_at;
        }
        if let Some(extensions) = &patch.extensions {
            self.extensions.merge(extensions);
        }
        self.touch(clock);
        Ok(())
    }

    /// Sets leaf progress reported by the assignee.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::TaskTerminal`] for terminal tasks and
    /// [`TaskDomainError::ProgressDerivedFromChildren`] when `has_children`.
    pub fn report_progress(
        &mut self,
        completion: CompletionPercentage,
        has_children: bool,
        clock: &impl Clock,
    ) -> Result<(), TaskDomainError> {
        if self.is_terminal() {
            return Err(TaskDomainError::TaskTerminal(self.id));
        }
        if has_children {
            return Err(TaskDomainError::ProgressDerivedFromChildren(self.id));
        }
        self.set_completion(completion, clock);
        Ok(())
    }

    /// Overwrites the stored completion; used by rollups.
    ///
    /// Returns `true` when the value changed.
    pub(crate) fn set_completion(&mut self, completion: CompletionPercentage, clock: &impl Clock) -> bool {
        if self.completion == completion {
            return false;
        }
        self.completion = completion;
        self.touch(clock);
        true
    }

    /// Accumulates logged effort.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::TaskTerminal`] for terminal tasks.
    pub fn log_work(&mut self, effort: Effort, clock: &impl Clock) -> Result<(), TaskDomainError> {
        if self.is_terminal() {
            return Err(TaskDomainError::TaskTerminal(self.id));
        }
        self.actuals = self.actuals.plus(effort);
        self.touch(clock);
        Ok(())
    }

    /// Makes `estimate` the current estimate snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::TaskTerminal`] for terminal tasks.
    pub fn record_estimate(&mut self, estimate: &Estimate, clock: &impl Clock) -> Result<(), TaskDomainError> {
        if self.is_terminal() {
            return Err(TaskDomainError::TaskTerminal(self.id));
        }
        self.estimate = Some(EstimateSnapshot::from(estimate));
        self.touch(clock);
        Ok(())
    }

    /// Advances the git status, returning the previous one.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidGitEvent`] when the event is not
    /// legal for the current status.
    pub fn apply_git_event(
        &mut self,
        event: &GitEventKind,
        clock: &impl Clock,
    ) -> Result<GitStatus, TaskDomainError> {
        let previous = self.git_status;
        let next = previous
            .apply(event)
            .ok_or(TaskDomainError::InvalidGitEvent {
                task_id: self.id,
                status: previous,
                event: event.name(),
            })?;
        self.git_status = next;
        self.git_link.absorb(event);
        self.touch(clock);
        Ok(previous)
    }

    /// Records a committed write; called by repositories.
    pub(crate) const fn advance_revision(&mut self) {
        self.revision += 1;
    }

    /// Updates the `updated_at` timestamp to the current clock time.
    fn touch(&mut self, clock: &impl Clock) {
        self.updated_at = clock.utc();
    }
}

fn normalize_description(description: Option<String>) -> Option<String> {
    description
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}
