// Request and response bodies of the HTTP API.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::agent::recommendation::RecommendationInput;
use crate::agent::types::{Allocation, AutomationStatus, BalanceSnapshot};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationRequest {
    pub recommendation: RecommendationInput,
    pub wallet_id: String,
    #[serde(default)]
    pub force_rebalance: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigureRequest {
    #[serde(with = "rust_decimal::serde::float")]
    pub rebalance_threshold: Decimal,
}

/// Reply to start, stop and configure. `success` is false when the call
/// changed nothing, e.g. starting an already running loop.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlResponse {
    pub success: bool,
    pub message: String,
    pub status: AutomationStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceQuery {
    pub chain_id: String,
    pub token_address: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletResponse {
    pub id: String,
    pub address: String,
    pub chain_type: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationResponse {
    pub wallet_id: String,
    pub address: String,
    pub allocation: Allocation,
    pub balances: Vec<BalanceSnapshot>,
}

#[derive(Debug, Serialize)]
pub struct ServersResponse {
    pub servers: Vec<String>,
}
