//! In-memory adapters for task workflow persistence.

mod task;

pub use task::InMemoryTaskRepository;
