//! Task workflow and estimation engine.
//!
//! Tasks move through a fixed development lifecycle, gate each other through
//! typed dependency edges, roll completion up their parent chains, and feed
//! actual effort back into future estimates. The module follows hexagonal
//! architecture:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Orchestration services in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
