//! Adapter implementations for task workflow ports.
//!
//! - [`memory::InMemoryTaskRepository`]: thread-safe in-memory storage for
//!   tests and embedded use
//! - [`postgres::PostgresTaskRepository`]: `PostgreSQL` persistence using
//!   Diesel

pub mod memory;
pub mod postgres;
