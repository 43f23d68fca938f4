//! # Authentication Module
//!
//! Shared-secret protection for the automation and wallet endpoints.

pub mod middleware;
