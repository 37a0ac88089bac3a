//! Shared world state for workflow BDD scenarios.

use std::collections::HashMap;
use std::sync::Arc;

use mockable::DefaultClock;
use rstest::fixture;
use workloom::task::{
    adapters::memory::InMemoryTaskRepository,
    domain::{Actor, EdgeId, ProjectId, Task, TaskId, TaskType},
    services::{CreateTaskRequest, EngineContext, WorkflowEngine, WorkflowError},
};

/// Engine type used by the BDD world.
pub type TestEngine = WorkflowEngine<InMemoryTaskRepository, DefaultClock>;

/// Scenario world for workflow behaviour tests.
pub struct WorkflowWorld {
    pub engine: TestEngine,
    pub project_id: Option<ProjectId>,
    pub tasks: HashMap<String, TaskId>,
    pub last_edge: Option<EdgeId>,
    pub last_error: Option<WorkflowError>,
}

impl WorkflowWorld {
    /// Creates a world over an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        let context = EngineContext::new(
            Arc::new(InMemoryTaskRepository::new()),
            Arc::new(DefaultClock),
        );
        Self {
            engine: WorkflowEngine::new(&context),
            project_id: None,
            tasks: HashMap::new(),
            last_edge: None,
            last_error: None,
        }
    }

    /// Returns the scenario project, registering it on first use.
    pub fn project(&mut self) -> Result<ProjectId, eyre::Report> {
        if let Some(project_id) = self.project_id {
            return Ok(project_id);
        }
        let project = run_async(self.engine.lifecycle.register_project("scenario"))?;
        self.project_id = Some(project.id());
        Ok(project.id())
    }

    /// Creates a named task, optionally under a named parent.
    pub fn create(&mut self, name: &str, parent: Option<&str>) -> Result<Task, eyre::Report> {
        let mut request = CreateTaskRequest::new(self.project()?, name, TaskType::Feature);
        if let Some(parent_name) = parent {
            request = request.with_parent(self.task_id(parent_name)?);
        }
        let task = run_async(self.engine.lifecycle.create(request))?;
        self.tasks.insert(name.to_owned(), task.id());
        Ok(task)
    }

    /// Resolves a scenario task name to its identifier.
    pub fn task_id(&self, name: &str) -> Result<TaskId, eyre::Report> {
        self.tasks
            .get(name)
            .copied()
            .ok_or_else(|| eyre::eyre!("unknown task {name} in scenario world"))
    }

    /// Looks up the stored version of a named task.
    pub fn task(&self, name: &str) -> Result<Task, eyre::Report> {
        Ok(run_async(self.engine.lifecycle.get(self.task_id(name)?))?)
    }

    /// Records the outcome of an operation whose failure a later step checks.
    pub fn remember<T>(&mut self, result: Result<T, WorkflowError>) -> Option<T> {
        match result {
            Ok(value) => {
                self.last_error = None;
                Some(value)
            }
            Err(err) => {
                self.last_error = Some(err);
                None
            }
        }
    }
}

impl Default for WorkflowWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixture that creates a new scenario world.
#[fixture]
pub fn world() -> WorkflowWorld {
    WorkflowWorld::default()
}

/// Actor used by scenario steps.
pub fn scenario_actor() -> Result<Actor, eyre::Report> {
    Ok(Actor::new("scenario")?)
}

/// Runs an async operation within sync step definitions.
pub fn run_async<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}
