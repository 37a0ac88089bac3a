//! Port contracts for task workflow management.
//!
//! Ports define infrastructure-agnostic interfaces used by task services.

pub mod events;
pub mod repository;

pub use events::{WorkflowEvent, WorkflowEventListener};
pub use repository::{
    ChangeSet, CommitReceipt, GraphGuard, ProjectGraph, TaskRepository, TaskRepositoryError,
    TaskRepositoryResult,
};
