//! Facade wiring every workflow service over one shared context.

use super::{
    context::EngineContext, dependency::DependencyService, estimation::EstimationService,
    git::GitIntegrationService, lifecycle::TaskLifecycleService,
};
use crate::task::ports::TaskRepository;
use mockable::Clock;

/// All workflow services sharing one repository, clock, configuration, and
/// event dispatcher.
pub struct WorkflowEngine<R, C>
where
    R: TaskRepository,
    C: Clock + Send + Sync,
{
    /// Task creation, edits, and transitions.
    pub lifecycle: TaskLifecycleService<R, C>,
    /// Dependency edges.
    pub dependencies: DependencyService<R, C>,
    /// Estimates and the feedback loop.
    pub estimation: EstimationService<R, C>,
    /// Source-control events.
    pub git: GitIntegrationService<R, C>,
}

impl<R, C> WorkflowEngine<R, C>
where
    R: TaskRepository,
    C: Clock + Send + Sync,
{
    /// Builds every service over `context`.
    #[must_use]
    pub fn new(context: &EngineContext<R, C>) -> Self {
        Self {
            lifecycle: TaskLifecycleService::new(context.clone()),
            dependencies: DependencyService::new(context.clone()),
            estimation: EstimationService::new(context.clone()),
            git: GitIntegrationService::new(context.clone()),
        }
    }
}
