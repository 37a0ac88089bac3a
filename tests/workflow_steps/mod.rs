//! Step definitions for workflow BDD scenarios.

mod given;
mod then;
mod when;
pub mod world;
