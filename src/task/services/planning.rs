//! Change-set planning shared by the workflow services.
//!
//! Planning reads committed state, layers the writes already queued in the
//! [`ChangeSet`] on top, and appends the follow-on writes a change implies:
//! audit records, completion records, automatic unblocking, and parent
//! rollups. Nothing is visible until the caller commits.

use super::{
    context::EngineContext,
    error::{WorkflowError, WorkflowResult},
    lifecycle::TransitionRequest,
};
use crate::task::{
    domain::{
        Actor, AncestorWalk, CompletionId, CompletionPercentage, CompletionRecord, DependencyEdge,
        EdgeId, Effort, SampleProfile, Task, TaskId, TriggerKind, WorkflowState,
        WorkflowTransition, recompute_completion, relative_variance,
    },
    ports::{ChangeSet, TaskRepository, WorkflowEvent},
};
use chrono::{DateTime, Utc};
use mockable::Clock;
use tracing::debug;

/// Outcome of re-deriving one parent.
pub(crate) enum RollupStep {
    /// The stored value already matched, or the task has no children.
    Unchanged,
    /// The value changed; the walk continues with the returned grandparent.
    Changed(Option<TaskId>),
}

impl<R, C> EngineContext<R, C>
where
    R: TaskRepository,
    C: Clock + Send + Sync,
{
    /// Unresolved blocking edges gating `task_id`, honouring pending edge
    /// updates.
    pub(crate) async fn unresolved_blockers(
        &self,
        changes: &ChangeSet,
        task_id: TaskId,
    ) -> WorkflowResult<Vec<EdgeId>> {
        let edges = self.repository.edges_for_task(task_id).await?;
        Ok(edges
            .into_iter()
            .map(|edge| pending_edge(changes, edge))
            .filter(|edge| edge.blocks_task(task_id))
            .map(|edge| edge.id())
            .collect())
    }

    /// Children of `parent_id` as they will look after `changes` commits.
    pub(crate) async fn children_of(
        &self,
        changes: &ChangeSet,
        parent_id: TaskId,
    ) -> WorkflowResult<Vec<Task>> {
        let mut children = self.repository.find_children(parent_id).await?;
        for child in &mut children {
            if let Some(pending) = changes.pending_task(child.id()) {
                *child = pending.clone();
            }
        }
        for pending in &changes.inserted_tasks {
            if pending.parent_id() == Some(parent_id)
                && !children.iter().any(|child| child.id() == pending.id())
            {
                children.push(pending.clone());
            }
        }
        Ok(children)
    }

    /// Queues a validated workflow transition and everything it triggers.
    ///
    /// Validation happens before anything is queued, so on error `changes`
    /// and `events` are untouched.
    pub(crate) async fn plan_transition(
        &self,
        changes: &mut ChangeSet,
        events: &mut Vec<WorkflowEvent>,
        request: &TransitionRequest,
    ) -> WorkflowResult<()> {
        let mut task = self.load_task(changes, request.task_id).await?;
        let from = task.workflow_state();
        let to = request.to_state;
        if from == WorkflowState::Ready && to == WorkflowState::Implementing {
            let blockers = self.unresolved_blockers(changes, task.id()).await?;
            if !blockers.is_empty() {
                return Err(WorkflowError::Blocked {
                    task_id: task.id(),
                    blockers,
                });
            }
        }
        let is_leaf = self.children_of(changes, task.id()).await?.is_empty();
        task.transition_to(to, &*self.clock)?;

        let now = self.clock.utc();
        changes.append_transition(WorkflowTransition::accepted(
            task.id(),
            Some(from),
            to,
            request.trigger,
            request.actor.clone(),
            now,
        ));
        events.push(WorkflowEvent::TransitionCommitted {
            task_id: task.id(),
            from,
            to,
            trigger: request.trigger,
        });

        if to == WorkflowState::Deployed && is_leaf {
            task.set_completion(CompletionPercentage::COMPLETE, &*self.clock);
        }
        if to.is_terminal() {
            let actuals = request.actuals.unwrap_or_else(|| task.actuals());
            let record = completion_record(&task, actuals, now);
            events.push(WorkflowEvent::CompletionRecorded {
                task_id: task.id(),
                completion_id: record.id,
                variance: record.variance,
            });
            changes.append_completion(record);
        }

        let task_id = task.id();
        let parent_id = task.parent_id();
        changes.update_task(task);

        if to == WorkflowState::Deployed && self.config.dependencies.auto_resolve_on_deploy {
            self.plan_auto_resolve(changes, events, task_id).await?;
        }
        if let Some(parent) = parent_id {
            self.plan_rollup(changes, events, task_id, parent).await?;
        }
        Ok(())
    }

    /// Resolves every open blocking edge whose prerequisite is `prerequisite`.
    async fn plan_auto_resolve(
        &self,
        changes: &mut ChangeSet,
        events: &mut Vec<WorkflowEvent>,
        prerequisite: TaskId,
    ) -> WorkflowResult<()> {
        let edges = self.repository.edges_for_task(prerequisite).await?;
        for edge in edges {
            let mut edge = pending_edge(changes, edge);
            if edge.prerequisite() != Some(prerequisite) || edge.is_resolved() {
                continue;
            }
            edge.resolve(&*self.clock)?;
            debug!(edge_id = %edge.id(), %prerequisite, "auto-resolving dependency");
            changes.update_edge(edge.clone());
            self.plan_release(changes, events, &edge).await?;
        }
        Ok(())
    }

    /// Releases the dependent of a just-resolved edge when nothing else gates
    /// it, returning `true` when it left `blocked`.
    pub(crate) async fn plan_release(
        &self,
        changes: &mut ChangeSet,
        events: &mut Vec<WorkflowEvent>,
        edge: &DependencyEdge,
    ) -> WorkflowResult<bool> {
        let Some(dependent) = edge.dependent() else {
            return Ok(false);
        };
        if !self.unresolved_blockers(changes, dependent).await?.is_empty() {
            return Ok(false);
        }

        let mut task = self.load_task(changes, dependent).await?;
        let unblocked = match (task.workflow_state(), task.blocked_from()) {
            (WorkflowState::Blocked, Some(previous)) => {
                task.transition_to(previous, &*self.clock)?;
                changes.append_transition(WorkflowTransition::accepted(
                    dependent,
                    Some(WorkflowState::Blocked),
                    previous,
                    TriggerKind::DependencyResolved,
                    Actor::system(),
                    self.clock.utc(),
                ));
                events.push(WorkflowEvent::TransitionCommitted {
                    task_id: dependent,
                    from: WorkflowState::Blocked,
                    to: previous,
                    trigger: TriggerKind::DependencyResolved,
                });
                changes.update_task(task);
                true
            }
            _ => false,
        };
        events.push(WorkflowEvent::DependencyResolved {
            edge_id: edge.id(),
            dependent,
            unblocked,
        });
        Ok(unblocked)
    }

    /// Re-derives `parent_id` from its children.
    ///
    /// The parent is queued even when its value is unchanged: its revision
    /// then pins the sibling snapshot the value was derived from, so a
    /// concurrent sibling writer loses with a conflict.
    pub(crate) async fn refresh_parent(
        &self,
        changes: &mut ChangeSet,
        events: &mut Vec<WorkflowEvent>,
        parent_id: TaskId,
    ) -> WorkflowResult<RollupStep> {
        let mut parent = self.load_task(changes, parent_id).await?;
        let children = self.children_of(changes, parent_id).await?;
        let Some(completion) = recompute_completion(&children) else {
            return Ok(RollupStep::Unchanged);
        };
        let previous = parent.completion();
        if !parent.set_completion(completion, &*self.clock) {
            changes.update_task(parent);
            return Ok(RollupStep::Unchanged);
        }
        events.push(WorkflowEvent::RollupRecomputed {
            task_id: parent_id,
            previous,
            completion,
        });
        let next = parent.parent_id();
        changes.update_task(parent);
        Ok(RollupStep::Changed(next))
    }

    /// Walks from `first_parent` upwards, re-deriving each ancestor of
    /// `origin` until a value is unchanged or the root is reached.
    pub(crate) async fn plan_rollup(
        &self,
        changes: &mut ChangeSet,
        events: &mut Vec<WorkflowEvent>,
        origin: TaskId,
        first_parent: TaskId,
    ) -> WorkflowResult<()> {
        let mut walk = AncestorWalk::new(origin);
        let mut next = Some(first_parent);
        while let Some(parent_id) = next {
            walk.step(parent_id)?;
            next = match self.refresh_parent(changes, events, parent_id).await? {
                RollupStep::Unchanged => None,
                RollupStep::Changed(grandparent) => grandparent,
            };
        }
        Ok(())
    }

    /// Verifies that a child under `parent_id` stays within the depth bound.
    pub(crate) async fn check_ancestry(
        &self,
        child_id: TaskId,
        parent_id: TaskId,
    ) -> WorkflowResult<()> {
        let mut walk = AncestorWalk::new(child_id);
        let mut next = Some(parent_id);
        while let Some(ancestor_id) = next {
            walk.step(ancestor_id)?;
            next = self.require_task(ancestor_id).await?.parent_id();
        }
        Ok(())
    }
}

/// Builds the completion record of a terminated task.
pub(crate) fn completion_record(
    task: &Task,
    actuals: Effort,
    recorded_at: DateTime<Utc>,
) -> CompletionRecord {
    let estimated_hours = task.estimate().map(|estimate| estimate.hours);
    CompletionRecord {
        id: CompletionId::new(),
        task_id: task.id(),
        project_id: task.project_id(),
        actuals,
        estimated_hours,
        variance: estimated_hours.and_then(|estimated| relative_variance(actuals.hours, estimated)),
        profile: SampleProfile {
            task_type: task.task_type(),
            tags: task.tags().clone(),
            story_points: task.estimate().map(|estimate| estimate.story_points),
            terminal_state: task.workflow_state(),
        },
        completed_at: task.completed_at().unwrap_or(recorded_at),
        recorded_at,
    }
}

fn pending_edge(changes: &ChangeSet, edge: DependencyEdge) -> DependencyEdge {
    changes
        .updated_edges
        .iter()
        .find(|pending| pending.id() == edge.id())
        .cloned()
        .unwrap_or(edge)
}
