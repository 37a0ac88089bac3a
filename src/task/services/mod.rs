//! Application services for task workflow orchestration.
//!
//! Each operation plans its writes into one change set, commits it
//! atomically, and only then dispatches the resulting events.

mod context;
mod dependency;
mod engine;
mod error;
mod estimation;
mod events;
mod git;
mod lifecycle;
mod planning;

pub use context::EngineContext;
pub use dependency::{DependencyService, Resolution};
pub use engine::WorkflowEngine;
pub use error::{ErrorKind, WorkflowError, WorkflowResult};
pub use estimation::EstimationService;
pub use events::{EventDispatcher, TracingEventListener};
pub use git::GitIntegrationService;
pub use lifecycle::{CreateTaskRequest, TaskLifecycleService, TaskSnapshot, TransitionRequest};
