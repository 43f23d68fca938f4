// # Routes Module
//
// - HTTP route handlers, grouped by API area.
// - Each module exposes `create_routes()` which `server.rs` merges into the app.
//
// ## Available Route Modules
// - `health`: liveness check
// - `advisor`: AI currency recommendation and advisor health
// - `automation`: rebalancing loop control
// - `wallet`: wallet details, balances and allocation
// - `trades`: bridge quotes and transfer status

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use tracing::{error, warn};

use crate::agent::types::AgentError;

pub mod advisor;
pub mod automation;
pub mod health;
pub mod trades;
pub mod wallet;

pub type ApiError = (StatusCode, String);

/// Maps a domain error onto the status code the API reports for it.
pub fn api_error(err: AgentError) -> ApiError {
    let status = match &err {
        AgentError::MalformedRecommendation(_)
        | AgentError::InvalidInput(_)
        | AgentError::Serialization(_) => StatusCode::BAD_REQUEST,
        AgentError::WalletNotFound(_) => StatusCode::NOT_FOUND,
        AgentError::NotRunning | AgentError::WalletBusy(_) => StatusCode::CONFLICT,
        AgentError::InsufficientBalance { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        AgentError::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
        AgentError::Http(_)
        | AgentError::AIAnalysis(_)
        | AgentError::QuoteUnavailable(_)
        | AgentError::TransferFailed { .. }
        | AgentError::Wallet(_)
        | AgentError::Chain(_) => StatusCode::BAD_GATEWAY,
    };

    if status.is_server_error() {
        error!("Request failed: {}", err);
    } else {
        warn!("Request rejected: {}", err);
    }

    (status, err.to_string())
}

/// Unwraps a JSON request body. Syntax errors, missing fields and wrong types
/// are all reported as 400 rather than axum's default 422.
pub fn json_request<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(request)| request)
        .map_err(|rejection| api_error(AgentError::InvalidInput(rejection.body_text())))
}

#[cfg(test)]
pub(crate) mod test_app {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::Router;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, Response};
    use rust_decimal_macros::dec;
    use serde_json::Value;

    use crate::agent::executor::TradeExecutor;
    use crate::agent::orchestrator::ClaudeOrchestrator;
    use crate::agent::test_support::{
        StubAdvisor, StubBalances, StubBridge, StubRecommendationSource, StubSubmitter,
        StubWallets, executable_quote, test_wallet,
    };
    use crate::agent::types::Allocation;
    use crate::agent::{AutomationConfig, AutomationService};
    use crate::onchain::TokenRegistry;
    use crate::server::AppState;

    pub fn state_with(balances: StubBalances, source: StubRecommendationSource) -> AppState {
        let wallet = test_wallet();
        let bridge = Arc::new(StubBridge::with_quotes(vec![executable_quote("1000000", 2)]));
        let source = Arc::new(source);
        let executor = TradeExecutor::new(
            Arc::new(balances),
            bridge.clone(),
            Arc::new(StubSubmitter::signing_for(wallet.address)),
            TokenRegistry::default(),
        );

        let automation = AutomationService::new(
            Arc::new(StubWallets::new(vec![wallet.clone()])),
            executor,
            source.clone(),
            AutomationConfig {
                rebalance_threshold: dec!(0.05),
                interval: Duration::ZERO,
                managed_wallets: vec![wallet.id],
                fallback_allocation: Allocation::new(dec!(0.4), dec!(0.6)),
                recommendation_timeout: Duration::from_secs(1),
            },
        );

        let orchestrator = ClaudeOrchestrator::new(None, Duration::from_secs(1))
            .expect("orchestrator")
            .with_advisor(Arc::new(StubAdvisor::ok("perplexity", 60, 40)))
            .with_advisor(Arc::new(StubAdvisor::failing("chatgpt")));

        AppState {
            automation: Arc::new(automation),
            orchestrator: Arc::new(orchestrator),
            recommendations: source,
            bridge,
            fallback_allocation: Allocation::new(dec!(0.4), dec!(0.6)),
            recommendation_timeout: Duration::from_secs(1),
        }
    }

    pub fn state() -> AppState {
        state_with(
            StubBalances::new(5_000_000, 5_000_000),
            StubRecommendationSource::percentages("70%", "30%"),
        )
    }

    pub fn router(state: AppState) -> Router {
        crate::server::api_router(state, None)
    }

    pub fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    pub fn post(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    pub async fn json_body(response: Response<Body>) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    pub async fn text_body(response: Response<Body>) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }
}
