//! Unit tests for the task workflow bounded context.

mod dependency_tests;
mod service_tests;
mod support;
