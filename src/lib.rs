//! Workloom: task workflow and estimation engine.
//!
//! This crate tracks work items through a multi-stage development lifecycle,
//! enforces dependency constraints between them, propagates completion
//! through parent/child hierarchies, and learns from completed work to
//! improve time and cost estimates.
//!
//! # Architecture
//!
//! Workloom follows hexagonal architecture principles:
//!
//! - **Domain**: Pure business logic with no infrastructure dependencies
//! - **Ports**: Abstract trait interfaces for persistence and event delivery
//! - **Adapters**: Concrete implementations of ports (in-memory, `PostgreSQL`)
//!
//! # Modules
//!
//! - [`task`]: Task store, workflow state machine, dependency graph, rollup,
//!   estimation, and git integration
//! - [`config`]: TOML engine configuration
//! - [`telemetry`]: Structured logging setup

pub mod config;
pub mod task;
pub mod telemetry;
