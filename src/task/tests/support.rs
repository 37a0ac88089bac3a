//! Shared fixtures for the task unit tests.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Local, TimeZone, Utc};
use mockable::Clock;

use crate::config::EngineConfig;
use crate::task::{
    adapters::memory::InMemoryTaskRepository,
    domain::{
        Actor, CompletionId, CompletionRecord, Effort, Extensions, NewTask, Priority, Project,
        ProjectId, SampleProfile, StoryPoints, Tags, Task, TaskId, TaskType, Title,
        WorkflowState,
    },
    ports::{WorkflowEvent, WorkflowEventListener},
    services::{
        CreateTaskRequest, EngineContext, EventDispatcher, TransitionRequest, WorkflowEngine,
    },
};

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().expect("clock lock");
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::starting_at(epoch())
    }
}

impl Clock for ManualClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock lock")
    }
}

pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

/// Listener that keeps every event it receives.
#[derive(Debug, Default)]
pub struct RecordingListener {
    events: Mutex<Vec<WorkflowEvent>>,
}

impl RecordingListener {
    pub fn events(&self) -> Vec<WorkflowEvent> {
        self.events.lock().expect("listener lock").clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(WorkflowEvent::name).collect()
    }

    pub fn clear(&self) {
        self.events.lock().expect("listener lock").clear();
    }
}

impl WorkflowEventListener for RecordingListener {
    fn on_event(&self, event: &WorkflowEvent) {
        self.events.lock().expect("listener lock").push(event.clone());
    }
}

/// Engine over an in-memory store with one registered project.
pub struct Harness {
    pub engine: WorkflowEngine<InMemoryTaskRepository, ManualClock>,
    pub context: EngineContext<InMemoryTaskRepository, ManualClock>,
    pub repository: Arc<InMemoryTaskRepository>,
    pub clock: Arc<ManualClock>,
    pub listener: Arc<RecordingListener>,
    pub project: Project,
}

impl Harness {
    pub async fn start() -> Self {
        Self::with_config(EngineConfig::default()).await
    }

    pub async fn with_config(config: EngineConfig) -> Self {
        Self::over(Arc::new(InMemoryTaskRepository::new()), config).await
    }

    /// Builds a second engine over an existing store and clock.
    pub fn sharing(&self, config: EngineConfig) -> WorkflowEngine<InMemoryTaskRepository, ManualClock> {
        let context = EngineContext::new(Arc::clone(&self.repository), Arc::clone(&self.clock))
            .with_config(config);
        WorkflowEngine::new(&context)
    }

    async fn over(repository: Arc<InMemoryTaskRepository>, config: EngineConfig) -> Self {
        let clock = Arc::new(ManualClock::default());
        let listener = Arc::new(RecordingListener::default());
        let context = EngineContext::new(Arc::clone(&repository), Arc::clone(&clock))
            .with_config(config)
            .with_events(EventDispatcher::new().with_listener(listener.clone()));
        let engine = WorkflowEngine::new(&context);
        let project = engine
            .lifecycle
            .register_project("workloom")
            .await
            .expect("project registration should succeed");
        Self {
            engine,
            context,
            repository,
            clock,
            listener,
            project,
        }
    }

    pub fn request(&self, title: &str) -> CreateTaskRequest {
        CreateTaskRequest::new(self.project.id(), title, TaskType::Feature)
    }

    pub async fn task(&self, title: &str) -> Task {
        self.engine
            .lifecycle
            .create(self.request(title))
            .await
            .expect("task creation should succeed")
    }

    pub async fn child(&self, parent: TaskId, title: &str) -> Task {
        self.engine
            .lifecycle
            .create(self.request(title).with_parent(parent))
            .await
            .expect("child creation should succeed")
    }

    /// Walks `task_id` through `states` in order.
    pub async fn advance(&self, task_id: TaskId, states: &[WorkflowState]) -> Task {
        let mut task = self.engine.lifecycle.get(task_id).await.expect("task exists");
        for state in states {
            task = self
                .engine
                .lifecycle
                .transition(TransitionRequest::new(task_id, *state, alice()))
                .await
                .unwrap_or_else(|err| panic!("transition to {state} should succeed: {err}"));
        }
        task
    }

    /// Moves a fresh task all the way to `deployed`.
    pub async fn deploy(&self, task_id: TaskId) -> Task {
        self.advance(task_id, &path_to(WorkflowState::Deployed)).await
    }
}

pub fn alice() -> Actor {
    Actor::new("alice").expect("valid actor")
}

/// States visited from `planning` to `target` along the forward path.
pub fn path_to(target: WorkflowState) -> Vec<WorkflowState> {
    const FORWARD: [WorkflowState; 9] = [
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
    let mut path = Vec::new();
    for state in FORWARD {
        path.push(state);
        if state == target {
            break;
        }
    }
    path
}

pub fn new_task(project_id: ProjectId, title: &str) -> NewTask {
    NewTask {
        project_id,
        parent_id: None,
        title: Title::new(title).expect("valid title"),
        description: None,
        task_type: TaskType::Feature,
        priority: Priority::NORMAL,
        tags: Tags::default(),
        due_at: None,
        extensions: Extensions::new(),
    }
}

/// Deployed learning sample with the given hours against a 4-hour estimate.
pub fn sample(task_type: TaskType, tags: &[&str], actual_hours: f64, completed_at: DateTime<Utc>) -> CompletionRecord {
    let estimated = 4.0;
    CompletionRecord {
        id: CompletionId::new(),
        task_id: TaskId::new(),
        project_id: ProjectId::new(),
        actuals: Effort::from_hours(actual_hours).expect("valid hours"),
        estimated_hours: Some(estimated),
        variance: Some((actual_hours - estimated) / estimated),
        profile: SampleProfile {
            task_type,
            tags: Tags::new(tags),
            story_points: Some(StoryPoints::try_from(1).expect("valid points")),
            terminal_state: WorkflowState::Deployed,
        },
        completed_at,
        recorded_at: completed_at,
    }
}
