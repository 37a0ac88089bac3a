//! Shared test helpers for in-memory engine integration tests.

use std::sync::Arc;

use mockable::DefaultClock;
use rstest::fixture;
use workloom::{
    config::EngineConfig,
    task::{
        adapters::memory::InMemoryTaskRepository,
        domain::{Actor, Project, Task, TaskId, TaskType, WorkflowState},
        services::{
            CreateTaskRequest, EngineContext, TransitionRequest, WorkflowEngine, WorkflowResult,
        },
    },
};

/// Engine type used by the integration tests.
pub type TestEngine = WorkflowEngine<InMemoryTaskRepository, DefaultClock>;

/// Engine and the project every test works in.
pub struct Workspace {
    pub engine: Arc<TestEngine>,
    pub project: Project,
}

impl Workspace {
    /// Creates an engine over a fresh store and registers one project.
    ///
    /// # Errors
    ///
    /// Returns an error if project registration fails.
    pub async fn open(config: EngineConfig) -> WorkflowResult<Self> {
        let context = EngineContext::new(
            Arc::new(InMemoryTaskRepository::new()),
            Arc::new(DefaultClock),
        )
        .with_config(config);
        let engine = Arc::new(WorkflowEngine::new(&context));
        let project = engine.lifecycle.register_project("integration").await?;
        Ok(Self { engine, project })
    }

    /// Creates a task of `task_type`, optionally under `parent`.
    ///
    /// # Errors
    ///
    /// Returns an error if creation fails.
    pub async fn create(
        &self,
        title: &str,
        task_type: TaskType,
        parent: Option<TaskId>,
    ) -> WorkflowResult<Task> {
        let mut request = CreateTaskRequest::new(self.project.id(), title, task_type);
        if let Some(parent_id) = parent {
            request = request.with_parent(parent_id);
        }
        self.engine.lifecycle.create(request).await
    }

    /// Walks a task through `states` in order.
    ///
    /// # Errors
    ///
    /// Returns the first failed transition.
    pub async fn walk(&self, task_id: TaskId, states: &[WorkflowState]) -> WorkflowResult<Task> {
        let mut task = self.engine.lifecycle.get(task_id).await?;
        for state in states {
            task = self
                .engine
                .lifecycle
                .transition(TransitionRequest::new(task_id, *state, operator()))
                .await?;
        }
        Ok(task)
    }
}

/// Provides default engine configuration.
#[fixture]
pub fn config() -> EngineConfig {
    EngineConfig::default()
}

/// Actor used for manual transitions.
///
/// # Panics
///
/// Never; the name is a non-empty literal.
#[must_use]
pub fn operator() -> Actor {
    Actor::new("operator").expect("literal actor name is valid")
}

/// Forward path from `planning` to `deployed`.
pub const DELIVERY: [WorkflowState; 9] = [
    WorkflowState::Estimation,
    WorkflowState::Ready,
    WorkflowState::Implementing,
    WorkflowState::CodeReview,
    WorkflowState::Testing,
    WorkflowState::Validation,
    WorkflowState::PrReview,
    WorkflowState::Merging,
    WorkflowState::Deployed,
];

/// Forward path from `planning` up to and including `target`.
#[must_use]
pub fn delivery_until(target: WorkflowState) -> Vec<WorkflowState> {
    let mut path = Vec::new();
    for state in DELIVERY {
        path.push(state);
        if state == target {
            break;
        }
    }
    path
}
