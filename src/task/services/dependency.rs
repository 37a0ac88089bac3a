//! Service layer for dependency edges between tasks.

use super::{
    context::EngineContext,
    error::{WorkflowError, WorkflowResult},
};
use crate::task::{
    domain::{DependencyEdge, DependencyGraph, DependencyType, EdgeId, TaskDomainError, TaskId},
    ports::{ChangeSet, TaskRepository, TaskRepositoryError, WorkflowEvent},
};
use mockable::Clock;
use tracing::{info, warn};

/// Outcome of resolving an edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// The edge as stored after the call.
    pub edge: DependencyEdge,
    /// Task the edge gated.
    pub dependent: Option<TaskId>,
    /// `true` when the dependent left `blocked` as part of this call.
    pub unblocked: bool,
}

/// Dependency graph orchestration service.
pub struct DependencyService<R, C>
where
    R: TaskRepository,
    C: Clock + Send + Sync,
{
    context: EngineContext<R, C>,
}

impl<R, C> Clone for DependencyService<R, C>
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

impl<R, C> DependencyService<R, C>
where
    R: TaskRepository,
    C: Clock + Send + Sync,
{
    /// Creates a new dependency service.
    #[must_use]
    pub const fn new(context: EngineContext<R, C>) -> Self {
        Self { context }
    }

    /// Adds an edge from `source_id` to `target_id`.
    ///
    /// For blocking types the cycle check and the insert commit atomically
    /// against the project's graph revision. A concurrent insert forces a
    /// re-read and re-check, up to the configured retry count.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::SelfReference`],
    /// [`TaskDomainError::DependencyCycle`],
    /// [`TaskDomainError::DuplicateDependency`],
    /// [`TaskDomainError::CrossProjectReference`], not-found for unknown
    /// tasks, and [`TaskRepositoryError::GraphConflict`] once retries are
    /// exhausted.
    pub async fn add_dependency(
        &self,
        source_id: TaskId,
        target_id: TaskId,
        dependency_type: DependencyType,
    ) -> WorkflowResult<DependencyEdge> {
        if source_id == target_id {
            return Err(TaskDomainError::SelfReference(source_id).into());
        }
        let source = self.context.require_task(source_id).await?;
        let target = self.context.require_task(target_id).await?;
        if source.project_id() != target.project_id() {
            return Err(TaskDomainError::CrossProjectReference(target_id).into());
        }
        let project_id = source.project_id();

        let max_retries = self.context.config.dependencies.max_commit_retries;
        let mut attempt = 0;
        loop {
            let graph = self.context.repository.project_graph(project_id).await?;
            let edge = DependencyEdge::new(
                project_id,
                source_id,
                target_id,
                dependency_type,
                &*self.context.clock,
            )?;
            if graph.edges.iter().any(|existing| existing.duplicates(&edge)) {
                return Err(TaskDomainError::DuplicateDependency {
                    source_id,
                    target_id,
                    dependency_type,
                }
                .into());
            }
            DependencyGraph::from_edges(&graph.edges).check_insert(&edge)?;

            let mut changes = ChangeSet::new();
            changes.insert_edge(edge.clone()).guard_graph(graph.guard(project_id));
            let events = [WorkflowEvent::DependencyAdded {
                edge_id: edge.id(),
                source_task_id: source_id,
                target_task_id: target_id,
                dependency_type,
            }];
            match self.context.commit(changes, &events).await {
                Ok(_) => {
                    info!(
                        edge_id = %edge.id(),
                        source = %source_id,
                        target = %target_id,
                        %dependency_type,
                        "dependency added"
                    );
                    return Ok(edge);
                }
                Err(WorkflowError::Repository(TaskRepositoryError::GraphConflict(_)))
                    if attempt < max_retries =>
                {
                    attempt += 1;
                    warn!(%project_id, attempt, "dependency graph changed concurrently; retrying");
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Marks a blocking edge resolved.
    ///
    /// Idempotent: resolving an already-resolved edge returns it unchanged.
    /// When no other blocker remains, a dependent sitting in `blocked` is
    /// returned to the state it was blocked from in the same commit.
    ///
    /// # Errors
    ///
    /// Returns [`TaskRepositoryError::EdgeNotFound`] for unknown edges and
    /// [`TaskDomainError::NonBlockingEdge`] for informational edges.
    pub async fn resolve(&self, edge_id: EdgeId) -> WorkflowResult<Resolution> {
        let mut edge = self
            .context
            .repository
            .find_edge(edge_id)
            .await?
            .ok_or(TaskRepositoryError::EdgeNotFound(edge_id))?;
        let dependent = edge.dependent();
        if !edge.resolve(&*self.context.clock)? {
            return Ok(Resolution {
                edge,
                dependent,
                unblocked: false,
            });
        }

        let mut changes = ChangeSet::new();
        let mut events = Vec::new();
        changes.update_edge(edge.clone());
        let unblocked = self
            .context
            .plan_release(&mut changes, &mut events, &edge)
            .await?;
        self.context.commit(changes, &events).await?;
        info!(%edge_id, dependent = ?dependent, unblocked, "dependency resolved");
        Ok(Resolution {
            edge,
            dependent,
            unblocked,
        })
    }

    /// Unresolved blocking edges gating `task_id`.
    ///
    /// # Errors
    ///
    /// Returns not-found for unknown tasks.
    pub async fn blocking_edges_for(&self, task_id: TaskId) -> WorkflowResult<Vec<DependencyEdge>> {
        Ok(self
            .dependencies_of(task_id)
            .await?
            .into_iter()
            .filter(|edge| edge.blocks_task(task_id))
            .collect())
    }

    /// Every edge touching `task_id`, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns not-found for unknown tasks.
    pub async fn dependencies_of(&self, task_id: TaskId) -> WorkflowResult<Vec<DependencyEdge>> {
        self.context.require_task(task_id).await?;
        Ok(self.context.repository.edges_for_task(task_id).await?)
    }
}
