//! # Stable Rebalancer
//!
//! Keeps a wallet's holdings split between EURC on Base and USDC on Flow EVM
//! at an AI-recommended ratio, moving funds through the Stargate bridge when
//! the split drifts past a threshold.
//!
//! ## Architecture
//! - `agent`: allocation math, rebalance policy, AI advisors, trade execution
//!   and the automation loop
//! - `onchain`: ERC-20 balance reads, Aave/Aerodrome calldata and
//!   transaction submission
//! - `services`: Privy wallet service and Stargate bridge clients
//! - `routes`: HTTP handlers
//! - `server`: collaborator wiring and the HTTP server
//! - `config`: environment configuration
//!
//! ## Running the Server
//! ```bash
//! cp .env.example .env
//! cargo run
//! ```
//!
//! The server listens on `http://0.0.0.0:3000` by default.

mod agent;
mod auth;
mod config;
mod onchain;
mod routes;
mod server;
mod services;
mod state_structs;

use anyhow::Result;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine; the process environment may carry everything.
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false).compact())
        .init();

    tracing::info!("Starting {} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    let config = config::Config::from_env()?;

    server::start(config).await
}
