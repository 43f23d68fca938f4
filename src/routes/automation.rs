//! # Automation Routes
//!
//! Control surface of the rebalancing loop:
//! - start, stop and status of the scheduler
//! - one-off evaluation of a wallet against a supplied target
//! - runtime threshold changes and on-demand ticks
//!
//! All endpoints sit behind the `x-api-key` check when a key is configured.

use axum::{
    Router,
    extract::{Json, State, rejection::JsonRejection},
    response::Json as ResponseJson,
    routing::{get, post},
};
use tracing::info;

use crate::agent::automation::TickReport;
use crate::agent::types::{AutomationStatus, RebalanceResult, TargetAllocation};
use crate::routes::{ApiError, api_error, json_request};
use crate::server::AppState;
use crate::state_structs::{ConfigureRequest, ControlResponse, RecommendationRequest};

/// Start the automation loop
///
/// Starting an already running loop is not an error; `success` is then
/// `false` and the status is returned unchanged.
///
/// # Route
/// `POST /automation/start`
pub async fn start_automation(State(state): State<AppState>) -> ResponseJson<ControlResponse> {
    let success = state.automation.start().await;
    let message = if success {
        "Automation started"
    } else {
        "Automation is already running"
    };

    ResponseJson(ControlResponse {
        success,
        message: message.to_string(),
        status: state.automation.status().await,
    })
}

/// Stop the automation loop
///
/// A tick that is already running finishes; no new tick starts.
///
/// # Route
/// `POST /automation/stop`
pub async fn stop_automation(State(state): State<AppState>) -> ResponseJson<ControlResponse> {
    let success = state.automation.stop().await;
    let message = if success {
        "Automation stopped"
    } else {
        "Automation is not running"
    };

    ResponseJson(ControlResponse {
        success,
        message: message.to_string(),
        status: state.automation.status().await,
    })
}

/// `GET /automation/status` -> `{isRunning, lastRebalance, rebalanceThreshold}`
pub async fn get_status(State(state): State<AppState>) -> ResponseJson<AutomationStatus> {
    ResponseJson(state.automation.status().await)
}

/// Evaluate one wallet against a supplied target allocation
///
/// # Route
/// `POST /automation/recommendation`
///
/// # Request Body
/// ```json
/// {
///   "recommendation": { "EUR": "60%", "USD": "40%" },
///   "walletId": "wallet-id",
///   "forceRebalance": false
/// }
/// ```
/// The recommendation may also be given as fractions (`{"EURC": 0.6, "USDC": 0.4}`).
///
/// # Response Format
/// A `RebalanceResult`: current and target allocation, derived actions and
/// one result per executed, skipped or failed trade.
///
/// # Status Codes
/// - `200`: evaluated, including evaluations whose trades failed
/// - `400`: malformed body, recommendation or wallet id
/// - `404`: unknown wallet
/// - `409`: loop not running, or the wallet is already being evaluated
pub async fn process_recommendation(
    State(state): State<AppState>,
    body: Result<Json<RecommendationRequest>, JsonRejection>,
) -> Result<ResponseJson<RebalanceResult>, ApiError> {
    let request = json_request(body)?;
    info!(
        "Recommendation received for wallet {} (force: {})",
        request.wallet_id, request.force_rebalance
    );

    let allocation = request.recommendation.into_allocation().map_err(api_error)?;
    let result = state
        .automation
        .process_recommendation(
            TargetAllocation::from_api(allocation),
            &request.wallet_id,
            request.force_rebalance,
        )
        .await
        .map_err(api_error)?;

    Ok(ResponseJson(result))
}

/// Change the rebalance threshold at runtime
///
/// # Route
/// `POST /automation/configure` with `{"rebalanceThreshold": 0.05}`
///
/// # Status Codes
/// - `200`: threshold applied, read by the next evaluation
/// - `400`: missing, non-numeric or outside (0, 1); never clamped
pub async fn configure(
    State(state): State<AppState>,
    body: Result<Json<ConfigureRequest>, JsonRejection>,
) -> Result<ResponseJson<ControlResponse>, ApiError> {
    let request = json_request(body)?;
    state
        .automation
        .configure(request.rebalance_threshold)
        .await
        .map_err(api_error)?;

    Ok(ResponseJson(ControlResponse {
        success: true,
        message: format!("Rebalance threshold set to {}", request.rebalance_threshold),
        status: state.automation.status().await,
    }))
}

/// Run one tick over the managed wallets now
///
/// # Route
/// `POST /automation/run`
///
/// # Status Codes
/// - `200`: a `TickReport`; `skipped` is true when a tick was already running
/// - `409`: loop not running
pub async fn run_now(State(state): State<AppState>) -> Result<ResponseJson<TickReport>, ApiError> {
    let report = state.automation.run_now().await.map_err(api_error)?;
    Ok(ResponseJson(report))
}

pub fn create_routes() -> Router<AppState> {
    Router::new()
        .route("/automation/start", post(start_automation))
        .route("/automation/stop", post(stop_automation))
        .route("/automation/status", get(get_status))
        .route("/automation/recommendation", post(process_recommendation))
        .route("/automation/configure", post(configure))
        .route("/automation/run", post(run_now))
}
