//! In-memory repository for task workflow state.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::task::{
    domain::{
        CompletionRecord, DependencyEdge, EdgeId, Estimate, GitEventId, Project, ProjectId, Task,
        TaskId, WorkflowTransition,
    },
    ports::{
        ChangeSet, CommitReceipt, ProjectGraph, TaskRepository, TaskRepositoryError,
        TaskRepositoryResult,
    },
};

/// Thread-safe in-memory task repository.
///
/// A commit holds the write lock for its whole validation and apply phase, so
/// concurrent commits serialize and readers never observe a partial write.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTaskRepository {
    state: Arc<RwLock<InMemoryTaskState>>,
}

#[derive(Debug, Default)]
struct InMemoryTaskState {
    projects: HashMap<ProjectId, StoredProject>,
    tasks: HashMap<TaskId, Task>,
    children: HashMap<TaskId, Vec<TaskId>>,
    edges: HashMap<EdgeId, DependencyEdge>,
    edge_order: Vec<EdgeId>,
    transitions: Vec<WorkflowTransition>,
    estimates: Vec<Estimate>,
    completions: Vec<CompletionRecord>,
    git_events: HashSet<GitEventId>,
}

#[derive(Debug)]
struct StoredProject {
    project: Project,
    graph_revision: u64,
}

impl InMemoryTaskRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> TaskRepositoryResult<RwLockReadGuard<'_, InMemoryTaskState>> {
        self.state.read().map_err(|err| {
            TaskRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })
    }

    fn write(&self) -> TaskRepositoryResult<RwLockWriteGuard<'_, InMemoryTaskState>> {
        self.state.write().map_err(|err| {
            TaskRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })
    }
}

impl InMemoryTaskState {
    /// Checks every precondition of `changes` without mutating anything.
    fn validate(&self, changes: &ChangeSet) -> TaskRepositoryResult<()> {
        if let Some(guard) = changes.graph_guard {
            let stored = self
                .projects
                .get(&guard.project_id)
                .ok_or(TaskRepositoryError::ProjectNotFound(guard.project_id))?;
            if stored.graph_revision != guard.expected_revision {
                return Err(TaskRepositoryError::GraphConflict(guard.project_id));
            }
        }

        let mut inserted = HashSet::new();
        for task in &changes.inserted_tasks {
            if self.tasks.contains_key(&task.id()) || !inserted.insert(task.id()) {
                return Err(TaskRepositoryError::DuplicateTask(task.id()));
            }
            if !self.projects.contains_key(&task.project_id()) {
                return Err(TaskRepositoryError::ProjectNotFound(task.project_id()));
            }
        }

        for task in &changes.updated_tasks {
            let stored = self
                .tasks
                .get(&task.id())
                .ok_or(TaskRepositoryError::NotFound(task.id()))?;
            if stored.revision() != task.revision() {
                return Err(TaskRepositoryError::Conflict {
                    task_id: task.id(),
                    expected: task.revision(),
                    actual: stored.revision(),
                });
            }
        }

        let known_task = |id: TaskId| self.tasks.contains_key(&id) || inserted.contains(&id);
        for edge in &changes.inserted_edges {
            for task_id in [edge.source_task_id(), edge.target_task_id()] {
                if !known_task(task_id) {
                    return Err(TaskRepositoryError::NotFound(task_id));
                }
            }
            if !self.projects.contains_key(&edge.project_id()) {
                return Err(TaskRepositoryError::ProjectNotFound(edge.project_id()));
            }
        }
        for edge in &changes.updated_edges {
            if !self.edges.contains_key(&edge.id()) {
                return Err(TaskRepositoryError::EdgeNotFound(edge.id()));
            }
        }

        for event_id in &changes.git_events {
            if self.git_events.contains(event_id) {
                return Err(TaskRepositoryError::DuplicateEvent(event_id.clone()));
            }
        }
        Ok(())
    }

    fn apply(&mut self, changes: ChangeSet) -> CommitReceipt {
        let ChangeSet {
            inserted_tasks,
            updated_tasks,
            transitions,
            estimates,
            completions,
            inserted_edges,
            updated_edges,
            git_events,
            ..
        } = changes;

        let mut committed = Vec::with_capacity(inserted_tasks.len() + updated_tasks.len());
        for mut task in inserted_tasks {
            task.advance_revision();
            if let Some(parent_id) = task.parent_id() {
                self.children.entry(parent_id).or_default().push(task.id());
            }
            self.tasks.insert(task.id(), task.clone());
            committed.push(task);
        }
        for mut task in updated_tasks {
            task.advance_revision();
            self.tasks.insert(task.id(), task.clone());
            committed.push(task);
        }

        for edge in inserted_edges {
            if let Some(stored) = self.projects.get_mut(&edge.project_id()) {
                stored.graph_revision += 1;
            }
            self.edge_order.push(edge.id());
            self.edges.insert(edge.id(), edge);
        }
        for edge in updated_edges {
            self.edges.insert(edge.id(), edge);
        }

        self.transitions.extend(transitions);
        self.estimates.extend(estimates);
        self.completions.extend(completions);
        self.git_events.extend(git_events);
        CommitReceipt::new(committed)
    }

    fn ordered_edges(&self) -> impl Iterator<Item = &DependencyEdge> {
        self.edge_order.iter().filter_map(|id| self.edges.get(id))
    }
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn store_project(&self, project: &Project) -> TaskRepositoryResult<()> {
        let mut state = self.write()?;
        if state.projects.contains_key(&project.id()) {
            return Err(TaskRepositoryError::DuplicateProject(project.id()));
        }
        state.projects.insert(
            project.id(),
            StoredProject {
                project: project.clone(),
                graph_revision: 0,
            },
        );
        Ok(())
    }

    async fn find_project(&self, id: ProjectId) -> TaskRepositoryResult<Option<Project>> {
        let state = self.read()?;
        Ok(state.projects.get(&id).map(|stored| stored.project.clone()))
    }

    async fn find_by_id(&self, id: TaskId) -> TaskRepositoryResult<Option<Task>> {
        let state = self.read()?;
        Ok(state.tasks.get(&id).cloned())
    }

    async fn find_children(&self, parent_id: TaskId) -> TaskRepositoryResult<Vec<Task>> {
        let state = self.read()?;
        let mut children: Vec<Task> = state
            .children
            .get(&parent_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.tasks.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default();
        children.sort_by_key(|child| (child.created_at(), child.id()));
        Ok(children)
    }

    async fn project_graph(&self, project_id: ProjectId) -> TaskRepositoryResult<ProjectGraph> {
        let state = self.read()?;
        let stored = state
            .projects
            .get(&project_id)
            .ok_or(TaskRepositoryError::ProjectNotFound(project_id))?;
        let edges = state
            .ordered_edges()
            .filter(|edge| edge.project_id() == project_id)
            .cloned()
            .collect();
        Ok(ProjectGraph {
            revision: stored.graph_revision,
            edges,
        })
    }

    async fn edges_for_task(&self, task_id: TaskId) -> TaskRepositoryResult<Vec<DependencyEdge>> {
        let state = self.read()?;
        Ok(state
            .ordered_edges()
            .filter(|edge| edge.touches(task_id))
            .cloned()
            .collect())
    }

    async fn find_edge(&self, id: EdgeId) -> TaskRepositoryResult<Option<DependencyEdge>> {
        let state = self.read()?;
        Ok(state.edges.get(&id).cloned())
    }

    async fn transitions_for(
        &self,
        task_id: TaskId,
    ) -> TaskRepositoryResult<Vec<WorkflowTransition>> {
        let state = self.read()?;
        Ok(state
            .transitions
            .iter()
            .filter(|record| record.task_id == task_id)
            .cloned()
            .collect())
    }

    async fn estimates_for(&self, task_id: TaskId) -> TaskRepositoryResult<Vec<Estimate>> {
        let state = self.read()?;
        let mut estimates: Vec<Estimate> = state
            .estimates
            .iter()
            .filter(|estimate| estimate.task_id == task_id)
            .cloned()
            .collect();
        estimates.sort_by_key(|estimate| estimate.version);
        Ok(estimates)
    }

    async fn completions_for(
        &self,
        task_id: TaskId,
    ) -> TaskRepositoryResult<Vec<CompletionRecord>> {
        let state = self.read()?;
        Ok(state
            .completions
            .iter()
            .filter(|record| record.task_id == task_id)
            .cloned()
            .collect())
    }

    async fn completions_for_project(
        &self,
        project_id: ProjectId,
    ) -> TaskRepositoryResult<Vec<CompletionRecord>> {
        let state = self.read()?;
        Ok(state
            .completions
            .iter()
            .filter(|record| record.project_id == project_id)
            .cloned()
            .collect())
    }

    async fn git_event_seen(&self, event_id: &GitEventId) -> TaskRepositoryResult<bool> {
        let state = self.read()?;
        Ok(state.git_events.contains(event_id))
    }

    async fn commit(&self, changes: ChangeSet) -> TaskRepositoryResult<CommitReceipt> {
        let mut state = self.write()?;
        state.validate(&changes)?;
        Ok(state.apply(changes))
    }
}
