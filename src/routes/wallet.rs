//! # Wallet Routes
//!
//! Wallet details from the wallet service and the on-chain allocation the
//! rebalancer sees for a wallet.

use axum::{
    Router,
    extract::{Path, Query, State},
    response::Json,
    routing::get,
};
use serde_json::Value;
use tracing::debug;

use crate::agent::allocation::compute_allocation;
use crate::agent::types::{Asset, BalanceSnapshot};
use crate::routes::{ApiError, api_error};
use crate::server::AppState;
use crate::services::privy::validate_wallet_id;
use crate::state_structs::{AllocationResponse, BalanceQuery, WalletResponse};

/// Wallet details from the wallet service.
///
/// # Route
/// - **Method**: GET
/// - **Path**: `/api/wallets/{wallet_id}`
///
/// # Response Format
/// ```json
/// { "id": "w_1", "address": "0x5228...9c8E", "chainType": "ethereum" }
/// ```
///
/// # Status Codes
/// - `200 OK`: wallet found
/// - `400 Bad Request`: the id is not a wallet id
/// - `404 Not Found`: the wallet service does not know the id
pub async fn get_wallet(
    State(state): State<AppState>,
    Path(wallet_id): Path<String>,
) -> Result<Json<WalletResponse>, ApiError> {
    let wallet = state
        .automation
        .wallet_details(&wallet_id)
        .await
        .map_err(api_error)?;

    Ok(Json(WalletResponse {
        id: wallet.id,
        address: wallet.address.to_string(),
        chain_type: wallet.chain_type,
    }))
}

/// Balance as reported by the wallet service, passed through unchanged.
///
/// # Route
/// - **Method**: GET
/// - **Path**: `/api/wallets/{wallet_id}/balance?chainId=8453&tokenAddress=0x...`
///
/// `tokenAddress` is optional; without it the wallet service answers with
/// the native balance.
pub async fn get_wallet_balance(
    State(state): State<AppState>,
    Path(wallet_id): Path<String>,
    Query(query): Query<BalanceQuery>,
) -> Result<Json<Value>, ApiError> {
    validate_wallet_id(&wallet_id).map_err(api_error)?;
    debug!("Balance lookup for wallet {} on chain {}", wallet_id, query.chain_id);

    let balance = state
        .automation
        .wallets()
        .balance(&wallet_id, &query.chain_id, query.token_address.as_deref())
        .await
        .map_err(api_error)?;

    Ok(Json(balance))
}

/// Current EURC/USDC split, read fresh from both chains.
///
/// # Route
/// - **Method**: GET
/// - **Path**: `/api/wallets/{wallet_id}/allocation`
///
/// # Response Format
/// ```json
/// {
///   "walletId": "w_1",
///   "address": "0x5228...9c8E",
///   "allocation": { "EURC": 0.4, "USDC": 0.6 },
///   "balances": [ ... ]
/// }
/// ```
///
/// When Aave lending is enabled the EURC figure includes the aEURC deposit.
pub async fn get_wallet_allocation(
    State(state): State<AppState>,
    Path(wallet_id): Path<String>,
) -> Result<Json<AllocationResponse>, ApiError> {
    let wallet = state
        .automation
        .wallet_details(&wallet_id)
        .await
        .map_err(api_error)?;

    let executor = state.automation.executor();
    let (eurc, usdc) = tokio::try_join!(
        executor.balance_of(&wallet, Asset::Eurc),
        executor.balance_of(&wallet, Asset::Usdc),
    )
    .map_err(api_error)?;

    Ok(Json(AllocationResponse {
        wallet_id: wallet.id,
        address: wallet.address.to_string(),
        allocation: compute_allocation(eurc, usdc),
        balances: vec![
            BalanceSnapshot::new(Asset::Eurc, eurc),
            BalanceSnapshot::new(Asset::Usdc, usdc),
        ],
    }))
}

pub fn create_routes() -> Router<AppState> {
    Router::new()
        .route("/api/wallets/{wallet_id}", get(get_wallet))
        .route("/api/wallets/{wallet_id}/balance", get(get_wallet_balance))
        .route("/api/wallets/{wallet_id}/allocation", get(get_wallet_allocation))
}
