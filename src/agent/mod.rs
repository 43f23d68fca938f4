//! # Agent Module
//!
//! Rebalancing core: allocation math, the rebalance policy, recommendation
//! sourcing, trade execution and the automation loop that ties them together.

pub mod ai_client;
pub mod allocation;
pub mod automation;
pub mod executor;
pub mod orchestrator;
pub mod recommendation;
pub mod strategy;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use automation::{AutomationConfig, AutomationService};
pub use types::*;
