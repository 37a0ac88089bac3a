//! Dependencies shared by every workflow service.

use super::{error::WorkflowResult, events::EventDispatcher};
use crate::config::EngineConfig;
use crate::task::{
    domain::{Task, TaskId},
    ports::{ChangeSet, CommitReceipt, TaskRepository, TaskRepositoryError, WorkflowEvent},
};
use mockable::Clock;
use std::sync::Arc;

/// Repository, clock, configuration, and event dispatcher injected into the
/// services.
///
/// Cloning is cheap; every clone shares the same repository and listeners.
pub struct EngineContext<R, C>
where
    R: TaskRepository,
    C: Clock + Send + Sync,
{
    pub(crate) repository: Arc<R>,
    pub(crate) clock: Arc<C>,
    pub(crate) config: Arc<EngineConfig>,
    pub(crate) events: EventDispatcher,
}

impl<R, C> Clone for EngineContext<R, C>
where
    R: TaskRepository,
    C: Clock + Send + Sync,
{
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
            clock: Arc::clone(&self.clock),
            config: Arc::clone(&self.config),
            events: self.events.clone(),
        }
    }
}

impl<R, C> EngineContext<R, C>
where
    R: TaskRepository,
    C: Clock + Send + Sync,
{
    /// Creates a context with default configuration and no listeners.
    #[must_use]
    pub fn new(repository: Arc<R>, clock: Arc<C>) -> Self {
        Self {
            repository,
            clock,
            config: Arc::new(EngineConfig::default()),
            events: EventDispatcher::new(),
        }
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = Arc::new(config);
        self
    }

    /// Replaces the event dispatcher.
    #[must_use]
    pub fn with_events(mut self, events: EventDispatcher) -> Self {
        self.events = events;
        self
    }

    /// Returns the repository.
    #[must_use]
    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Loads a task, preferring the version pending in `changes`.
    pub(crate) async fn load_task(
        &self,
        changes: &ChangeSet,
        task_id: TaskId,
    ) -> WorkflowResult<Task> {
        if let Some(task) = changes.pending_task(task_id) {
            return Ok(task.clone());
        }
        self.require_task(task_id).await
    }

    /// Loads a stored task or fails with not-found.
    pub(crate) async fn require_task(&self, task_id: TaskId) -> WorkflowResult<Task> {
        self.repository
            .find_by_id(task_id)
            .await?
            .ok_or_else(|| TaskRepositoryError::NotFound(task_id).into())
    }

    /// Commits `changes` and dispatches `events` once the commit succeeded.
    pub(crate) async fn commit(
        &self,
        changes: ChangeSet,
        events: &[WorkflowEvent],
    ) -> WorkflowResult<CommitReceipt> {
        let receipt = self.repository.commit(changes).await?;
        self.events.dispatch(events);
        Ok(receipt)
    }
}
