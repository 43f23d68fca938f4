//! # Trade Routes
//!
//! Bridge quotes and transfer status, straight from the bridge API.

use axum::{
    Router,
    extract::{Path, Query, State},
    response::Json,
    routing::get,
};
use serde_json::Value;

use crate::routes::{ApiError, api_error};
use crate::server::AppState;
use crate::services::stargate::{Quote, QuoteRequest};

/// Bridge quotes for a transfer between the two chains.
///
/// # Route
/// - **Method**: GET
/// - **Path**: `/api/trades/quotes`
///
/// # Query Parameters
/// `srcToken`, `dstToken`, `srcChainKey`, `dstChainKey`, `srcAmount`,
/// `srcAddress` and `dstAddress`, all required.
///
/// # Status Codes
/// - `200 OK`: quotes as returned by the bridge API
/// - `400 Bad Request`: a parameter is missing
/// - `502 Bad Gateway`: the bridge API failed
pub async fn get_quotes(
    State(state): State<AppState>,
    Query(request): Query<QuoteRequest>,
) -> Result<Json<Vec<Quote>>, ApiError> {
    let quotes = state.bridge.quotes(&request).await.map_err(api_error)?;
    Ok(Json(quotes))
}

/// Delivery status of a bridge transfer, keyed by its source transaction hash.
///
/// A hash that is not 32 bytes of hex is a `400`.
pub async fn get_transfer_status(
    State(state): State<AppState>,
    Path(tx_hash): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let status = state
        .bridge
        .transfer_status(&tx_hash)
        .await
        .map_err(api_error)?;
    Ok(Json(status))
}

pub fn create_routes() -> Router<AppState> {
    Router::new()
        .route("/api/trades/quotes", get(get_quotes))
        .route("/api/trades/status/{tx_hash}", get(get_transfer_status))
}
