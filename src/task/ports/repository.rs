//! Repository port for task, dependency, estimate, and audit persistence.
//!
//! Reads are snapshot reads. Every write goes through [`TaskRepository::commit`],
//! which applies a [`ChangeSet`] atomically: either every row lands or none
//! does.

use crate::task::domain::{
    CompletionRecord, DependencyEdge, EdgeId, Estimate, GitEventId, Project, ProjectId, Task,
    TaskId, WorkflowTransition,
};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for task repository operations.
pub type TaskRepositoryResult<T> = Result<T, TaskRepositoryError>;

/// Expected dependency-graph revision of a project.
///
/// A commit carrying a guard fails with [`TaskRepositoryError::GraphConflict`]
/// when another commit changed the project's edges since the guard was read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphGuard {
    /// Guarded project.
    pub project_id: ProjectId,
    /// Revision observed when the graph was read.
    pub expected_revision: u64,
}

/// Consistent read of a project's dependency graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectGraph {
    /// Revision the edges belong to; bumped by every edge insert.
    pub revision: u64,
    /// All edges of the project, resolved ones included.
    pub edges: Vec<DependencyEdge>,
}

impl ProjectGraph {
    /// Guard that pins this revision for a later commit.
    #[must_use]
    pub const fn guard(&self, project_id: ProjectId) -> GraphGuard {
        GraphGuard {
            project_id,
            expected_revision: self.revision,
        }
    }
}

/// Writes applied by one atomic commit.
///
/// Updated tasks carry the revision they were read at; the store rejects the
/// whole commit with [`TaskRepositoryError::Conflict`] if any row moved on.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    /// New tasks.
    pub inserted_tasks: Vec<Task>,
    /// Modified tasks, each at the revision it was read.
    pub updated_tasks: Vec<Task>,
    /// Audit records to append.
    pub transitions: Vec<WorkflowTransition>,
    /// Estimate rows to append.
    pub estimates: Vec<Estimate>,
    /// Completion records to append.
    pub completions: Vec<CompletionRecord>,
    /// New dependency edges.
    pub inserted_edges: Vec<DependencyEdge>,
    /// Modified dependency edges.
    pub updated_edges: Vec<DependencyEdge>,
    /// Graph revision precondition.
    pub graph_guard: Option<GraphGuard>,
    /// Git deliveries to mark as applied.
    pub git_events: Vec<GitEventId>,
}

impl ChangeSet {
    /// Creates an empty change set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a new task.
    pub fn insert_task(&mut self, task: Task) -> &mut Self {
        self.inserted_tasks.push(task);
        self
    }

    /// Adds or replaces a modified task.
    ///
    /// A later write of the same task supersedes the earlier one so one commit
    /// never carries two versions of a row.
    pub fn update_task(&mut self, task: Task) -> &mut Self {
        if let Some(existing) = self
            .inserted_tasks
            .iter_mut()
            .chain(self.updated_tasks.iter_mut())
            .find(|existing| existing.id() == task.id())
        {
            *existing = task;
        } else {
            self.updated_tasks.push(task);
        }
        self
    }

    /// Returns the pending version of a task, if this change set writes it.
    #[must_use]
    pub fn pending_task(&self, task_id: TaskId) -> Option<&Task> {
        self.inserted_tasks
            .iter()
            .chain(&self.updated_tasks)
            .find(|task| task.id() == task_id)
    }

    /// Appends an audit record.
    pub fn append_transition(&mut self, transition: WorkflowTransition) -> &mut Self {
        self.transitions.push(transition);
        self
    }

    /// Appends an estimate row.
    pub fn append_estimate(&mut self, estimate: Estimate) -> &mut Self {
        self.estimates.push(estimate);
        self
    }

    /// Appends a completion record.
    pub fn append_completion(&mut self, record: CompletionRecord) -> &mut Self {
        self.completions.push(record);
        self
    }

    /// Adds a new edge.
    pub fn insert_edge(&mut self, edge: DependencyEdge) -> &mut Self {
        self.inserted_edges.push(edge);
        self
    }

    /// Adds a modified edge.
    pub fn update_edge(&mut self, edge: DependencyEdge) -> &mut Self {
        self.updated_edges.push(edge);
        self
    }

    /// Pins the project's graph revision.
    pub const fn guard_graph(&mut self, guard: GraphGuard) -> &mut Self {
        self.graph_guard = Some(guard);
        self
    }

    /// Marks a git delivery as applied.
    pub fn record_git_event(&mut self, event_id: GitEventId) -> &mut Self {
        self.git_events.push(event_id);
        self
    }

    /// Returns `true` when nothing would be written.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.inserted_tasks.is_empty()
            && self.updated_tasks.is_empty()
            && self.transitions.is_empty()
            && self.estimates.is_empty()
            && self.completions.is_empty()
            && self.inserted_edges.is_empty()
            && self.updated_edges.is_empty()
            && self.git_events.is_empty()
    }
}

/// Tasks as stored by a successful commit, at their new revisions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitReceipt {
    tasks: Vec<Task>,
}

impl CommitReceipt {
    /// Creates a receipt over committed tasks.
    #[must_use]
    pub const fn new(tasks: Vec<Task>) -> Self {
        Self { tasks }
    }

    /// Returns the committed version of `task_id`.
    #[must_use]
    pub fn task(&self, task_id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id() == task_id)
    }

    /// Consumes the receipt, returning the committed version of `task_id`.
    #[must_use]
    pub fn into_task(self, task_id: TaskId) -> Option<Task> {
        self.tasks.into_iter().find(|task| task.id() == task_id)
    }

    /// Returns every committed task.
    #[must_use]
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }
}

/// Task persistence contract.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Stores a new project.
    ///
    /// # Errors
    ///
    /// Returns [`TaskRepositoryError::DuplicateProject`] when the identifier
    /// already exists.
    async fn store_project(&self, project: &Project) -> TaskRepositoryResult<()>;

    /// Finds a project by identifier.
    async fn find_project(&self, id: ProjectId) -> TaskRepositoryResult<Option<Project>>;

    /// Finds a task by identifier.
    ///
    /// Returns `None` when the task does not exist.
    async fn find_by_id(&self, id: TaskId) -> TaskRepositoryResult<Option<Task>>;

    /// Returns the direct children of `parent_id`, oldest first.
    async fn find_children(&self, parent_id: TaskId) -> TaskRepositoryResult<Vec<Task>>;

    /// Returns the project's edges together with the graph revision.
    ///
    /// # Errors
    ///
    /// Returns [`TaskRepositoryError::ProjectNotFound`] for unknown projects.
    async fn project_graph(&self, project_id: ProjectId) -> TaskRepositoryResult<ProjectGraph>;

    /// Returns every edge touching `task_id`.
    async fn edges_for_task(&self, task_id: TaskId) -> TaskRepositoryResult<Vec<DependencyEdge>>;

    /// Finds an edge by identifier.
    async fn find_edge(&self, id: EdgeId) -> TaskRepositoryResult<Option<DependencyEdge>>;

    /// Returns the audit trail of a task in insertion order.
    async fn transitions_for(
        &self,
        task_id: TaskId,
    ) -> TaskRepositoryResult<Vec<WorkflowTransition>>;

    /// Returns every estimate of a task ordered by version.
    async fn estimates_for(&self, task_id: TaskId) -> TaskRepositoryResult<Vec<Estimate>>;

    /// Returns every completion record of a task in insertion order.
    async fn completions_for(
        &self,
        task_id: TaskId,
    ) -> TaskRepositoryResult<Vec<CompletionRecord>>;

    /// Returns every completion record of a project in insertion order.
    async fn completions_for_project(
        &self,
        project_id: ProjectId,
    ) -> TaskRepositoryResult<Vec<CompletionRecord>>;

    /// Returns `true` when the git delivery has already been applied.
    async fn git_event_seen(&self, event_id: &GitEventId) -> TaskRepositoryResult<bool>;

    /// Applies `changes` atomically.
    ///
    /// Each committed task has its revision advanced by one.
    ///
    /// # Errors
    ///
    /// Returns [`TaskRepositoryError::Conflict`] or
    /// [`TaskRepositoryError::GraphConflict`] when a precondition no longer
    /// holds, [`TaskRepositoryError::DuplicateEvent`] for a replayed git
    /// delivery, and not-found or duplicate errors for dangling references.
    /// Nothing is written on error.
    async fn commit(&self, changes: ChangeSet) -> TaskRepositoryResult<CommitReceipt>;
}

/// Errors returned by task repository implementations.
#[derive(Debug, Clone, Error)]
pub enum TaskRepositoryError {
    /// A task with the same identifier already exists.
    #[error("duplicate task identifier: {0}")]
    DuplicateTask(TaskId),

    /// A project with the same identifier already exists.
    #[error("duplicate project identifier: {0}")]
    DuplicateProject(ProjectId),

    /// The task was not found.
    #[error("task not found: {0}")]
    NotFound(TaskId),

    /// The project was not found.
    #[error("project not found: {0}")]
    ProjectNotFound(ProjectId),

    /// The dependency edge was not found.
    #[error("dependency edge not found: {0}")]
    EdgeNotFound(EdgeId),

    /// The task changed since it was read.
    #[error("task {task_id} was modified concurrently (expected revision {expected}, found {actual})")]
    Conflict {
        /// Contended task.
        task_id: TaskId,
        /// Revision the writer read.
        expected: u64,
        /// Revision currently stored.
        actual: u64,
    },

    /// The project's dependency graph changed since it was read.
    #[error("dependency graph of project {0} was modified concurrently")]
    GraphConflict(ProjectId),

    /// The git delivery was already applied.
    #[error("git event already applied: {0}")]
    DuplicateEvent(GitEventId),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl TaskRepositoryError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }

    /// Returns `true` for lost optimistic-concurrency races.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::GraphConflict(_))
    }
}
