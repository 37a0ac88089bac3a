//! Service layer translating source-control events into git status and
//! workflow changes.

use super::{
    context::EngineContext,
    error::{WorkflowError, WorkflowResult},
    lifecycle::TransitionRequest,
};
use crate::task::{
    domain::{
        Actor, GitEvent, GitEventKind, GitStatus, Task, TriggerKind, WorkflowState,
        WorkflowTransition,
    },
    ports::{ChangeSet, TaskRepository, TaskRepositoryError, WorkflowEvent},
};
use mockable::Clock;
use tracing::{info, warn};

/// Git integration orchestration service.
pub struct GitIntegrationService<R, C>
where
    R: TaskRepository,
    C: Clock + Send + Sync,
{
    context: EngineContext<R, C>,
}

impl<R, C> Clone for GitIntegrationService<R, C>
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

impl<R, C> GitIntegrationService<R, C>
where
    R: TaskRepository,
    C: Clock + Send + Sync,
{
    /// Creates a new git integration service.
    #[must_use]
    pub const fn new(context: EngineContext<R, C>) -> Self {
        Self { context }
    }

    /// Applies a provider event to its task and returns the resulting status.
    ///
    /// Deliveries are deduplicated on their provider-scoped id; a replay
    /// returns the current status without applying anything. A merge also
    /// requests a `deployed` transition: when the workflow table forbids it,
    /// the git status still commits and a rejected audit record is written.
    ///
    /// # Errors
    ///
    /// Returns [`crate::task::domain::TaskDomainError::InvalidGitEvent`] when
    /// the event is not legal for the current git status, not-found for
    /// unknown tasks, and repository errors when persistence fails.
    pub async fn apply_git_event(&self, event: GitEvent) -> WorkflowResult<GitStatus> {
        let task_id = event.task_id;
        if self.context.repository.git_event_seen(&event.id).await? {
            info!(%task_id, event_id = %event.id, "duplicate git event ignored");
            return Ok(self.context.require_task(task_id).await?.git_status());
        }

        let mut task = self.context.require_task(task_id).await?;
        let previous = task.apply_git_event(&event.kind, &*self.context.clock)?;
        let status = task.git_status();
        let workflow_state = task.workflow_state();
        let can_deploy = task.can_transition_to(WorkflowState::Deployed);

        let mut changes = ChangeSet::new();
        let mut events = Vec::new();
        changes.record_git_event(event.id.clone());
        changes.update_task(task);
        if previous != status {
            events.push(WorkflowEvent::GitStatusChanged {
                task_id,
                from: previous,
                to: status,
            });
        }

        if matches!(event.kind, GitEventKind::PullRequestMerged) {
            let actor = Actor::new(format!("git:{}", event.id.provider()))?;
            if can_deploy {
                let request = TransitionRequest::new(task_id, WorkflowState::Deployed, actor)
                    .with_trigger(TriggerKind::GitEvent);
                self.context
                    .plan_transition(&mut changes, &mut events, &request)
                    .await?;
            } else {
                let reason =
                    format!("merge cannot deploy task from workflow state {workflow_state}");
                warn!(%task_id, from = %workflow_state, %reason, "git-triggered transition rejected");
                changes.append_transition(WorkflowTransition::rejected(
                    task_id,
                    workflow_state,
                    WorkflowState::Deployed,
                    TriggerKind::GitEvent,
                    actor,
                    reason.clone(),
                    self.context.clock.utc(),
                ));
                events.push(WorkflowEvent::TransitionRejected {
                    task_id,
                    from: workflow_state,
                    to: WorkflowState::Deployed,
                    trigger: TriggerKind::GitEvent,
                    reason,
                });
            }
        }

        match self.context.commit(changes, &events).await {
            Ok(receipt) => {
                let committed = receipt
                    .task(task_id)
                    .map_or(status, Task::git_status);
                info!(%task_id, from = %previous, to = %committed, event = event.kind.name(), "git event applied");
                Ok(committed)
            }
            Err(WorkflowError::Repository(TaskRepositoryError::DuplicateEvent(id))) => {
                info!(%task_id, event_id = %id, "git event applied concurrently");
                Ok(self.context.require_task(task_id).await?.git_status())
            }
            Err(err) => Err(err),
        }
    }
}
