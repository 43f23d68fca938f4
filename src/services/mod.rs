//! # Services Module
//!
//! HTTP clients for the external services the rebalancer depends on: the
//! Privy wallet service and the Stargate bridge quoting API.

pub mod privy;
pub mod stargate;
