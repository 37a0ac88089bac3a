//! Service layer for task creation, field edits, progress, and workflow
//! transitions.

use super::{
    context::EngineContext,
    error::{WorkflowError, WorkflowResult},
    planning::RollupStep,
};
use crate::task::{
    domain::{
        Actor, CompletionPercentage, Effort, EstimateSnapshot, Extensions, GitStatus,
        MAX_TITLE_LENGTH, NewTask, Priority, Project, ProjectId, Tags, Task, TaskDomainError,
        TaskId, TaskPatch, TaskType, Title, TriggerKind, WorkflowState, WorkflowTransition,
    },
    ports::{ChangeSet, TaskRepository, TaskRepositoryError, WorkflowEvent},
};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde_json::Value;
use tracing::info;

/// Request payload for creating a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTaskRequest {
    project_id: ProjectId,
    parent_id: Option<TaskId>,
    title: String,
    description: Option<String>,
    task_type: TaskType,
    priority: u8,
    tags: Vec<String>,
    due_at: Option<DateTime<Utc>>,
    extensions: Extensions,
}

impl CreateTaskRequest {
    /// Creates a request with required fields and normal priority.
    #[must_use]
    pub fn new(project_id: ProjectId, title: impl Into<String>, task_type: TaskType) -> Self {
        Self {
            project_id,
            parent_id: None,
            title: title.into(),
            description: None,
            task_type,
            priority: Priority::NORMAL.value(),
            tags: Vec::new(),
            due_at: None,
            extensions: Extensions::new(),
        }
    }

    /// Places the task under `parent_id`.
    #[must_use]
    pub const fn with_parent(mut self, parent_id: TaskId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the priority, validated on creation.
    #[must_use]
    pub const fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Sets technology tags.
    #[must_use]
    pub fn with_tags<S: Into<String>>(mut self, tags: impl IntoIterator<Item = S>) -> Self {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the due date.
    #[must_use]
    pub const fn with_due_at(mut self, due_at: DateTime<Utc>) -> Self {
        self.due_at = Some(due_at);
        self
    }

    /// Sets typed extensions.
    #[must_use]
    pub fn with_extensions(mut self, extensions: Extensions) -> Self {
        self.extensions = extensions;
        self
    }

    fn into_new_task(self) -> Result<NewTask, TaskDomainError> {
        self.extensions.validate()?;
        Ok(NewTask {
            project_id: self.project_id,
            parent_id: self.parent_id,
            title: Title::new(self.title)?,
            description: self.description,
            task_type: self.task_type,
            priority: Priority::new(self.priority)?,
            tags: Tags::new(self.tags),
            due_at: self.due_at,
            extensions: self.extensions,
        })
    }
}

/// Request to move a task to another workflow state.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionRequest {
    pub(crate) task_id: TaskId,
    pub(crate) to_state: WorkflowState,
    pub(crate) trigger: TriggerKind,
    pub(crate) actor: Actor,
    pub(crate) actuals: Option<Effort>,
}

impl TransitionRequest {
    /// Creates a manual transition request.
    #[must_use]
    pub const fn new(task_id: TaskId, to_state: WorkflowState, actor: Actor) -> Self {
        Self {
            task_id,
            to_state,
            trigger: TriggerKind::Manual,
            actor,
            actuals: None,
        }
    }

    /// Sets what caused the transition.
    #[must_use]
    pub const fn with_trigger(mut self, trigger: TriggerKind) -> Self {
        self.trigger = trigger;
        self
    }

    /// Supplies actual effort for the completion record of a terminal
    /// transition; otherwise logged work is used.
    #[must_use]
    pub const fn with_actuals(mut self, actuals: Effort) -> Self {
        self.actuals = Some(actuals);
        self
    }

    /// Returns the target task.
    #[must_use]
    pub const fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Returns the requested state.
    #[must_use]
    pub const fn to_state(&self) -> WorkflowState {
        self.to_state
    }
}

/// Read-only projection of a task for dashboards and link previews.
///
/// Consumers must treat the snapshot as possibly stale.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSnapshot {
    /// Task identifier.
    pub id: TaskId,
    /// Workflow state.
    pub workflow_state: WorkflowState,
    /// Git status.
    pub git_status: GitStatus,
    /// Completion percentage.
    pub completion_percentage: CompletionPercentage,
    /// Current estimate.
    pub estimate: Option<EstimateSnapshot>,
    /// Revision the snapshot was taken at.
    pub revision: u64,
}

impl From<&Task> for TaskSnapshot {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id(),
            workflow_state: task.workflow_state(),
            git_status: task.git_status(),
            completion_percentage: task.completion(),
            estimate: task.estimate().cloned(),
            revision: task.revision(),
        }
    }
}

/// Task lifecycle orchestration service.
pub struct TaskLifecycleService<R, C>
where
    R: TaskRepository,
    C: Clock + Send + Sync,
{
    context: EngineContext<R, C>,
}

impl<R, C> Clone for TaskLifecycleService<R, C>
where
    R: TaskRepository,
    C: Clock + Send + Sync,
{
    fn clone(&self) -> Self {
        Self {
            context: self.context.clone(),
        }
    }
}

impl<R, C> TaskLifecycleService<R, C>
where
    R: TaskRepository,
    C: Clock + Send + Sync,
{
    /// Creates a new task lifecycle service.
    #[must_use]
    pub const fn new(context: EngineContext<R, C>) -> Self {
        Self { context }
    }

    /// Registers a project that tasks can belong to.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError`] for a blank name or when persistence fails.
    pub async fn register_project(&self, name: impl Into<String>) -> WorkflowResult<Project> {
        let project = Project::new(name, &*self.context.clock)?;
        self.context.repository.store_project(&project).await?;
        info!(project_id = %project.id(), name = project.name(), "project registered");
        Ok(project)
    }

    /// Creates a task in `planning`.
    ///
    /// Child tasks trigger a rollup of their ancestors in the same commit.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::UnknownProject`] for an unknown project,
    /// domain errors for invalid fields or an invalid parent, and repository
    /// errors when persistence fails.
    pub async fn create(&self, request: CreateTaskRequest) -> WorkflowResult<Task> {
        let draft = request.into_new_task()?;
        if self
            .context
            .repository
            .find_project(draft.project_id)
            .await?
            .is_none()
        {
            return Err(WorkflowError::UnknownProject(draft.project_id));
        }
        let parent_task = match draft.parent_id {
            Some(parent_id) => Some(self.context.require_task(parent_id).await?),
            None => None,
        };

        let task = Task::new(draft, &*self.context.clock);
        if let Some(parent) = &parent_task {
            if parent.project_id() != task.project_id() {
                return Err(TaskDomainError::CrossProjectReference(parent.id()).into());
            }
            if parent.is_terminal() {
                return Err(TaskDomainError::TaskTerminal(parent.id()).into());
            }
            self.context.check_ancestry(task.id(), parent.id()).await?;
        }

        let task_id = task.id();
        let mut changes = ChangeSet::new();
        let mut events = vec![WorkflowEvent::TaskCreated {
            task_id,
            project_id: task.project_id(),
            parent_id: task.parent_id(),
        }];
        changes.append_transition(WorkflowTransition::accepted(
            task_id,
            None,
            WorkflowState::Planning,
            TriggerKind::Manual,
            Actor::system(),
            task.created_at(),
        ));
        changes.insert_task(task);
        if let Some(parent) = parent_task {
            self.context
                .plan_rollup(&mut changes, &mut events, task_id, parent.id())
                .await?;
        }

        let receipt = self.context.commit(changes, &events).await?;
        let created = receipt
            .into_task(task_id)
            .ok_or(TaskRepositoryError::NotFound(task_id))?;
        info!(%task_id, project_id = %created.project_id(), "task created");
        Ok(created)
    }

    /// Creates a child task from free-form content, inheriting the parent's
    /// project, type, priority, and tags.
    ///
    /// The first non-empty line becomes the title; the full content becomes
    /// the description.
    ///
    /// # Errors
    ///
    /// As [`Self::create`]; blank content fails title validation.
    pub async fn spawn_child_task(&self, parent_id: TaskId, content: &str) -> WorkflowResult<Task> {
        let parent = self.context.require_task(parent_id).await?;
        let first_line = content
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or_default();
        let title: String = first_line.chars().take(MAX_TITLE_LENGTH).collect();
        let mut request = CreateTaskRequest::new(parent.project_id(), &title, parent.task_type())
            .with_parent(parent_id)
            .with_priority(parent.priority().value())
            .with_tags(parent.tags().as_slice().iter().cloned());
        if content.trim() != title.trim_end() {
            request = request.with_description(content);
        }
        self.create(request).await
    }

    /// Retrieves a task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskRepositoryError::NotFound`] for unknown identifiers.
    pub async fn get(&self, task_id: TaskId) -> WorkflowResult<Task> {
        self.context.require_task(task_id).await
    }

    /// Returns the read-only projection of a task.
    ///
    /// # Errors
    ///
    /// As [`Self::get`].
    pub async fn snapshot(&self, task_id: TaskId) -> WorkflowResult<TaskSnapshot> {
        let task = self.get(task_id).await?;
        Ok(TaskSnapshot::from(&task))
    }

    /// Returns the direct children of a task, oldest first.
    ///
    /// # Errors
    ///
    /// Returns not-found for an unknown parent.
    pub async fn list_children(&self, parent_id: TaskId) -> WorkflowResult<Vec<Task>> {
        self.context.require_task(parent_id).await?;
        Ok(self.context.repository.find_children(parent_id).await?)
    }

    /// Applies a descriptive field update.
    ///
    /// # Errors
    ///
    /// Returns domain errors for edits a terminal task refuses, not-found for
    /// unknown tasks, and [`TaskRepositoryError::Conflict`] when the task
    /// changed concurrently.
    pub async fn update_fields(&self, task_id: TaskId, patch: TaskPatch) -> WorkflowResult<Task> {
        let mut task = self.context.require_task(task_id).await?;
        if patch.is_empty() {
            return Ok(task);
        }
        if let Some(extensions) = &patch.extensions {
            extensions.validate()?;
        }
        task.apply_patch(&patch, &*self.context.clock)?;
        self.commit_task(task).await
    }

    /// Applies a field update supplied as a JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::ForbiddenPatchField`] for workflow,
    /// estimate, git, or completion keys, and otherwise as
    /// [`Self::update_fields`].
    pub async fn update_fields_json(&self, task_id: TaskId, document: &Value) -> WorkflowResult<Task> {
        let patch = TaskPatch::from_json(document)?;
        self.update_fields(task_id, patch).await
    }

    /// Adds logged effort to a task's actuals.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::TaskTerminal`] for terminal tasks and
    /// repository errors as [`Self::update_fields`].
    pub async fn log_work(&self, task_id: TaskId, effort: Effort) -> WorkflowResult<Task> {
        let mut task = self.context.require_task(task_id).await?;
        task.log_work(effort, &*self.context.clock)?;
        self.commit_task(task).await
    }

    /// Sets a leaf task's completion and rolls it up its parent chain.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::ProgressDerivedFromChildren`] for tasks
    /// with children and [`TaskDomainError::TaskTerminal`] for terminal tasks.
    pub async fn report_progress(
        &self,
        task_id: TaskId,
        completion: CompletionPercentage,
    ) -> WorkflowResult<Task> {
        let mut task = self.context.require_task(task_id).await?;
        let mut changes = ChangeSet::new();
        let has_children = !self
            .context
            .children_of(&changes, task_id)
            .await?
            .is_empty();
        task.report_progress(completion, has_children, &*self.context.clock)?;
        let parent_id = task.parent_id();
        changes.update_task(task);

        let mut events = Vec::new();
        if let Some(parent) = parent_id {
            self.context
                .plan_rollup(&mut changes, &mut events, task_id, parent)
                .await?;
        }
        let receipt = self.context.commit(changes, &events).await?;
        Ok(receipt
            .into_task(task_id)
            .ok_or(TaskRepositoryError::NotFound(task_id))?)
    }

    /// Moves a task to another workflow state.
    ///
    /// The audit record, completion record, dependency releases, and parent
    /// rollups commit together with the state change.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidStateTransition`] for edges outside
    /// the transition table, [`WorkflowError::Blocked`] when leaving `ready`
    /// with unresolved blockers, and [`TaskRepositoryError::Conflict`] when
    /// another writer committed first. The task is unchanged on error.
    pub async fn transition(&self, request: TransitionRequest) -> WorkflowResult<Task> {
        let task_id = request.task_id;
        let mut changes = ChangeSet::new();
        let mut events = Vec::new();
        self.context
            .plan_transition(&mut changes, &mut events, &request)
            .await?;
        let receipt = self.context.commit(changes, &events).await?;
        let task = receipt
            .into_task(task_id)
            .ok_or(TaskRepositoryError::NotFound(task_id))?;
        info!(
            %task_id,
            to = %task.workflow_state(),
            trigger = request.trigger.as_str(),
            actor = %request.actor,
            "transition committed"
        );
        Ok(task)
    }

    /// Returns a task's audit trail in the order it was written.
    ///
    /// # Errors
    ///
    /// Returns not-found for unknown tasks.
    pub async fn transition_history(
        &self,
        task_id: TaskId,
    ) -> WorkflowResult<Vec<WorkflowTransition>> {
        self.context.require_task(task_id).await?;
        Ok(self.context.repository.transitions_for(task_id).await?)
    }

    /// Re-derives a parent's completion from its children and propagates
    /// any change to its ancestors.
    ///
    /// Idempotent: repeated calls over the same children change nothing.
    ///
    /// # Errors
    ///
    /// Returns not-found for unknown tasks, hierarchy errors for corrupted
    /// parent chains, and repository errors when persistence fails.
    pub async fn recompute(&self, parent_id: TaskId) -> WorkflowResult<Task> {
        let mut changes = ChangeSet::new();
        let mut events = Vec::new();
        let step = self
            .context
            .refresh_parent(&mut changes, &mut events, parent_id)
            .await?;
        match step {
            RollupStep::Unchanged => return self.context.require_task(parent_id).await,
            RollupStep::Changed(Some(grandparent)) => {
                self.context
                    .plan_rollup(&mut changes, &mut events, parent_id, grandparent)
                    .await?;
            }
            RollupStep::Changed(None) => {}
        }
        let receipt = self.context.commit(changes, &events).await?;
        Ok(receipt
            .into_task(parent_id)
            .ok_or(TaskRepositoryError::NotFound(parent_id))?)
    }

    async fn commit_task(&self, task: Task) -> WorkflowResult<Task> {
        let task_id = task.id();
        let mut changes = ChangeSet::new();
        changes.update_task(task);
        let receipt = self.context.commit(changes, &[]).await?;
        Ok(receipt
            .into_task(task_id)
            .ok_or(TaskRepositoryError::NotFound(task_id))?)
    }
}
