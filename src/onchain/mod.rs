//! # Onchain Module
//!
//! EVM access for the two chains the rebalancer spans: ERC-20 balance reads
//! and submission of bridge and lending transactions signed with the local
//! key.

pub mod client;
pub mod lending;
pub mod tokens;

use alloy::primitives::{Address, Bytes, TxHash, U256};
use async_trait::async_trait;

use crate::agent::types::{AgentError, Chain};

pub use client::ChainClient;
pub use lending::{LendingConfig, LendingLeg, Route};
pub use tokens::TokenRegistry;

/// Unsigned call produced by a bridge quote or the lending leg.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedTransaction {
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
}

/// Outcome of a broadcast transaction once its receipt is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmittedTransaction {
    pub hash: TxHash,
    pub succeeded: bool,
}

#[async_trait]
pub trait BalanceReader: Send + Sync {
    async fn token_balance(
        &self,
        chain: Chain,
        token: Address,
        owner: Address,
    ) -> Result<U256, AgentError>;
}

#[async_trait]
pub trait TransactionSubmitter: Send + Sync {
    /// Address of the local signing key, if one is configured.
    fn sender(&self) -> Option<Address>;

    /// Signs, broadcasts and waits for the receipt. A broadcast transaction
    /// cannot be recalled, so a timeout here leaves its outcome unknown.
    async fn submit(
        &self,
        chain: Chain,
        transaction: PreparedTransaction,
    ) -> Result<SubmittedTransaction, AgentError>;
}

#[async_trait]
pub trait SwapQuoter: Send + Sync {
    /// Output of the final hop for `amount_in` along `routes`.
    async fn amounts_out(
        &self,
        chain: Chain,
        router: Address,
        amount_in: U256,
        routes: Vec<Route>,
    ) -> Result<U256, AgentError>;
}
