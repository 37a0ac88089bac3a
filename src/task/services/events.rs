//! Synchronous in-process dispatch of committed workflow events.

use crate::task::ports::{WorkflowEvent, WorkflowEventListener};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Fans committed events out to registered listeners in registration order.
#[derive(Clone, Default)]
pub struct EventDispatcher {
    listeners: Vec<Arc<dyn WorkflowEventListener>>,
}

impl EventDispatcher {
    /// Creates a dispatcher without listeners.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a listener.
    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn WorkflowEventListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Number of registered listeners.
    #[must_use]
    pub const fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Delivers `events` to every listener.
    pub fn dispatch(&self, events: &[WorkflowEvent]) {
        for event in events {
            debug!(event = event.name(), listeners = self.listeners.len(), "dispatching");
            for listener in &self.listeners {
                listener.on_event(event);
            }
        }
    }
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// Listener that writes each event to the tracing subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventListener;

impl WorkflowEventListener for TracingEventListener {
    fn on_event(&self, event: &WorkflowEvent) {
        match event {
            WorkflowEvent::TaskCreated {
                task_id, parent_id, ..
            } => info!(%task_id, parent_id = ?parent_id, "task created"),
            WorkflowEvent::TransitionCommitted {
                task_id,
                from,
                to,
                trigger,
            } => info!(%task_id, %from, %to, trigger = trigger.as_str(), "transition committed"),
            WorkflowEvent::TransitionRejected {
                task_id,
                from,
                to,
                reason,
                ..
            } => info!(%task_id, %from, %to, %reason, "transition rejected"),
            WorkflowEvent::RollupRecomputed {
                task_id,
                previous,
                completion,
            } => info!(%task_id, %previous, %completion, "rollup recomputed"),
            WorkflowEvent::DependencyAdded {
                edge_id,
                source_task_id,
                target_task_id,
                dependency_type,
            } => info!(
                %edge_id,
                source = %source_task_id,
                target = %target_task_id,
                dependency_type = dependency_type.as_str(),
                "dependency added"
            ),
            WorkflowEvent::DependencyResolved {
                edge_id,
                dependent,
                unblocked,
            } => info!(%edge_id, %dependent, unblocked, "dependency resolved"),
            WorkflowEvent::EstimateRecorded {
                task_id,
                version,
                story_points,
                ..
            } => info!(%task_id, version, %story_points, "estimate recorded"),
            WorkflowEvent::CompletionRecorded {
                task_id, variance, ..
            } => info!(%task_id, variance = ?variance, "completion recorded"),
            WorkflowEvent::GitStatusChanged { task_id, from, to } => {
                info!(%task_id, %from, %to, "git status changed");
            }
        }
    }
}
