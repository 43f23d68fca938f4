use std::fmt;

use alloy::primitives::{Address, U256};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Assets held by a managed wallet. EURC is the primary axis the policy
/// compares on; USDC is its counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Asset {
    #[serde(rename = "EURC")]
    Eurc,
    #[serde(rename = "USDC")]
    Usdc,
}

impl Asset {
    pub const PRIMARY: Asset = Asset::Eurc;

    pub fn symbol(&self) -> &'static str {
        match self {
            Asset::Eurc => "EURC",
            Asset::Usdc => "USDC",
        }
    }

    /// Chain the asset is held on.
    pub fn home_chain(&self) -> Chain {
        match self {
            Asset::Eurc => Chain::Base,
            Asset::Usdc => Chain::Flow,
        }
    }

    pub fn counterpart(&self) -> Asset {
        match self {
            Asset::Eurc => Asset::Usdc,
            Asset::Usdc => Asset::Eurc,
        }
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Base,
    Flow,
}

impl Chain {
    /// Chain key used by the bridge quoting API.
    pub fn key(&self) -> &'static str {
        match self {
            Chain::Base => "base",
            Chain::Flow => "flow",
        }
    }

    pub fn chain_id(&self) -> u64 {
        match self {
            Chain::Base => 8453,
            Chain::Flow => 747,
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key.to_ascii_lowercase().as_str() {
            "base" => Some(Chain::Base),
            "flow" => Some(Chain::Flow),
            _ => None,
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Fractional split of portfolio value. Fractions sum to one within
/// [`crate::agent::allocation::ALLOCATION_TOLERANCE`], except for the
/// all-zero allocation of an empty wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    #[serde(rename = "EURC", with = "rust_decimal::serde::float")]
    pub eurc: Decimal,
    #[serde(rename = "USDC", with = "rust_decimal::serde::float")]
    pub usdc: Decimal,
}

impl Allocation {
    pub const ZERO: Allocation = Allocation {
        eurc: Decimal::ZERO,
        usdc: Decimal::ZERO,
    };

    pub fn new(eurc: Decimal, usdc: Decimal) -> Self {
        Self { eurc, usdc }
    }

    pub fn share(&self, asset: Asset) -> Decimal {
        match asset {
            Asset::Eurc => self.eurc,
            Asset::Usdc => self.usdc,
        }
    }

    pub fn total(&self) -> Decimal {
        self.eurc + self.usdc
    }
}

/// A single derived movement of portfolio value. `amount_fraction` is
/// applied to the current balance of `from`, not to the portfolio total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeAction {
    pub from: Asset,
    pub to: Asset,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount_fraction: Decimal,
    pub source_chain: Chain,
    pub destination_chain: Chain,
}

/// Wallet identity as reported by the wallet service. Safe to cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletDetails {
    pub id: String,
    pub address: Address,
    pub chain_type: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceSnapshot {
    pub asset: Asset,
    pub chain: Chain,
    pub amount: String,
}

impl BalanceSnapshot {
    pub fn new(asset: Asset, amount: U256) -> Self {
        Self {
            asset,
            chain: asset.home_chain(),
            amount: amount.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    Executed,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeResult {
    pub status: TradeStatus,
    pub action: TradeAction,
    pub transfer_amount: Option<String>,
    pub route: Option<String>,
    pub transaction_hashes: Vec<String>,
    pub final_balances: Vec<BalanceSnapshot>,
    pub message: Option<String>,
}

impl TradeResult {
    pub fn skipped(action: TradeAction, message: impl Into<String>) -> Self {
        Self {
            status: TradeStatus::Skipped,
            action,
            transfer_amount: None,
            route: None,
            transaction_hashes: Vec::new(),
            final_balances: Vec::new(),
            message: Some(message.into()),
        }
    }

    pub fn failed(action: TradeAction, error: &AgentError) -> Self {
        let transaction_hashes = match error {
            AgentError::TransferFailed {
                transaction_hashes, ..
            } => transaction_hashes.clone(),
            _ => Vec::new(),
        };

        Self {
            status: TradeStatus::Failed,
            action,
            transfer_amount: None,
            route: None,
            transaction_hashes,
            final_balances: Vec::new(),
            message: Some(error.to_string()),
        }
    }
}

/// Target allocation together with where it came from.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetAllocation {
    pub allocation: Allocation,
    pub is_fallback: bool,
    pub source: String,
    pub reasoning: Option<String>,
}

impl TargetAllocation {
    pub fn from_api(allocation: Allocation) -> Self {
        Self {
            allocation,
            is_fallback: false,
            source: "api".to_string(),
            reasoning: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RebalanceStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RebalanceResult {
    pub id: Uuid,
    pub wallet_id: String,
    pub status: RebalanceStatus,
    pub message: String,
    pub current_allocation: Allocation,
    pub target: TargetAllocation,
    pub actions: Vec<TradeAction>,
    pub results: Vec<TradeResult>,
    /// Swap and Aave supply steps that parked idle Base funds first.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub lending_transactions: Vec<String>,
    pub evaluated_at: DateTime<Utc>,
}

impl RebalanceResult {
    pub fn executed_trades(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.status == TradeStatus::Executed)
            .count()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationStatus {
    pub is_running: bool,
    pub last_rebalance: Option<DateTime<Utc>>,
    #[serde(with = "rust_decimal::serde::float")]
    pub rebalance_threshold: Decimal,
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Malformed recommendation: {0}")]
    MalformedRecommendation(String),

    #[error("AI analysis failed: {0}")]
    AIAnalysis(String),

    #[error("Quote unavailable: {0}")]
    QuoteUnavailable(String),

    #[error("Insufficient {asset} balance: quote needs {required}, wallet holds {available}")]
    InsufficientBalance {
        asset: Asset,
        required: U256,
        available: U256,
    },

    #[error("Transfer failed: {reason}")]
    TransferFailed {
        reason: String,
        transaction_hashes: Vec<String>,
    },

    #[error("Wallet service error: {0}")]
    Wallet(String),

    #[error("Wallet {0} not found")]
    WalletNotFound(String),

    #[error("Chain error: {0}")]
    Chain(String),

    #[error("Automation service is not running")]
    NotRunning,

    #[error("Rebalance already in progress for wallet {0}")]
    WalletBusy(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl AgentError {
    pub fn transfer_failed(reason: impl Into<String>, transaction_hashes: Vec<String>) -> Self {
        AgentError::TransferFailed {
            reason: reason.into(),
            transaction_hashes,
        }
    }
}
