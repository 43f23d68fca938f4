//! # Advisor Routes
//!
//! The AI currency recommendation and the health of the advisory sources
//! behind it.

use std::collections::BTreeMap;

use axum::{Router, extract::State, response::Json as ResponseJson, routing::get};
use tracing::info;

use crate::agent::orchestrator::AdvisorHealth;
use crate::agent::recommendation::{CurrencyRecommendation, resolve_recommendation};
use crate::server::AppState;
use crate::state_structs::ServersResponse;

/// Current recommendation. Always answers; when the source fails the
/// response is the fallback allocation with `isFallback: true`.
///
/// # Route
/// - **Method**: GET
/// - **Path**: `/ai-currency`
///
/// # Response Format
/// ```json
/// {
///   "EUR": "70%",
///   "USD": "30%",
///   "reasoning": "...",
///   "confidenceLevel": 8,
///   "source": "claude",
///   "isFallback": false
/// }
/// ```
pub async fn get_recommendation(
    State(state): State<AppState>,
) -> ResponseJson<CurrencyRecommendation> {
    info!("Fetching currency recommendation");

    let resolved = resolve_recommendation(
        state.recommendations.as_ref(),
        state.fallback_allocation,
        state.recommendation_timeout,
    )
    .await;

    ResponseJson(resolved.recommendation)
}

/// Per-advisor health, keyed by advisor name.
///
/// # Route
/// - **Method**: GET
/// - **Path**: `/ai-currency/health`
///
/// An unhealthy advisor carries its last error; the endpoint itself always
/// answers `200`.
pub async fn get_advisor_health(
    State(state): State<AppState>,
) -> ResponseJson<BTreeMap<String, AdvisorHealth>> {
    ResponseJson(state.orchestrator.health_check().await)
}

/// Names of the registered advisors, in query order.
pub async fn get_servers(State(state): State<AppState>) -> ResponseJson<ServersResponse> {
    ResponseJson(ServersResponse {
        servers: state.orchestrator.servers(),
    })
}

pub fn create_routes() -> Router<AppState> {
    Router::new()
        .route("/ai-currency", get(get_recommendation))
        .route("/ai-currency/health", get(get_advisor_health))
        .route("/ai-currency/servers", get(get_servers))
}
