//! # Server Module
//!
//! Wires the collaborators together and serves the HTTP API.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::http::{HeaderValue, Method, header};
use axum::{Router, middleware, routing::get};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::agent::ai_client::ChatCompletionClient;
use crate::agent::executor::TradeExecutor;
use crate::agent::orchestrator::ClaudeOrchestrator;
use crate::agent::recommendation::{HttpRecommendationSource, RecommendationSource};
use crate::agent::types::Allocation;
use crate::agent::{AutomationConfig, AutomationService};
use crate::auth::middleware::{ApiKey, AuthMiddleware};
use crate::config::Config;
use crate::onchain::{ChainClient, LendingLeg, TokenRegistry};
use crate::routes::{advisor, automation, health::ping, trades, wallet};
use crate::services::privy::PrivyClient;
use crate::services::stargate::{BridgeRouter, StargateClient};

/// Timeout for the wallet service and bridge API.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Application state shared across all route handlers
#[derive(Clone)]
pub struct AppState {
    pub automation: Arc<AutomationService>,
    pub orchestrator: Arc<ClaudeOrchestrator>,
    pub recommendations: Arc<dyn RecommendationSource>,
    pub bridge: Arc<dyn BridgeRouter>,
    pub fallback_allocation: Allocation,
    pub recommendation_timeout: Duration,
}

impl AppState {
    pub fn build(config: &Config) -> Result<Self> {
        let privy = PrivyClient::new(
            config.privy.api_url.clone(),
            config.privy.app_id.clone(),
            &config.privy.app_secret,
            HTTP_TIMEOUT,
        )
        .context("Failed to build Privy client")?;

        let bridge: Arc<dyn BridgeRouter> = Arc::new(
            StargateClient::new(config.stargate_api_url.clone(), HTTP_TIMEOUT)
                .context("Failed to build Stargate client")?,
        );

        let chain = Arc::new(
            ChainClient::connect(
                &config.chain.base_rpc_url,
                &config.chain.flow_rpc_url,
                config.chain.wallet_private_key.as_deref(),
                config.chain.confirmation_timeout,
            )
            .context("Failed to connect chain clients")?,
        );

        let mut executor = TradeExecutor::new(
            chain.clone(),
            bridge.clone(),
            chain.clone(),
            TokenRegistry::new(config.chain.eurc_token, config.chain.usdc_token),
        );
        if let Some(lending) = config.chain.lending {
            tracing::info!("Aave deposit leg enabled (pool {})", lending.pool);
            executor = executor.with_lending(LendingLeg::new(lending, config.chain.eurc_token), chain);
        }

        let mut orchestrator = ClaudeOrchestrator::new(config.ai.anthropic_api_key.clone(), config.ai.timeout)
            .context("Failed to build Claude orchestrator")?;
        if let Some(key) = &config.ai.perplexity_api_key {
            orchestrator = orchestrator.with_advisor(Arc::new(ChatCompletionClient::perplexity(key.clone(), config.ai.timeout)?));
        }
        if let Some(key) = &config.ai.openai_api_key {
            orchestrator = orchestrator.with_advisor(Arc::new(ChatCompletionClient::openai(key.clone(), config.ai.timeout)?));
        }
        let orchestrator = Arc::new(orchestrator);

        let recommendations: Arc<dyn RecommendationSource> = match &config.ai.recommendation_url {
            Some(url) => {
                tracing::info!("Using remote recommendation endpoint {}", url);
                Arc::new(HttpRecommendationSource::new(url.clone(), config.ai.timeout)?)
            }
            None => orchestrator.clone() as Arc<dyn RecommendationSource>,
        };

        // The Claude call runs after the advisors, so allow for both.
        let recommendation_timeout = config.ai.timeout * 2;

        let automation = AutomationService::new(
            Arc::new(privy),
            executor,
            recommendations.clone(),
            AutomationConfig {
                rebalance_threshold: config.automation.rebalance_threshold,
                interval: config.automation.interval,
                managed_wallets: config.automation.managed_wallet_ids.clone(),
                fallback_allocation: config.automation.fallback_allocation,
                recommendation_timeout,
            },
        );

        Ok(Self {
            automation: Arc::new(automation),
            orchestrator,
            recommendations,
            bridge,
            fallback_allocation: config.automation.fallback_allocation,
            recommendation_timeout,
        })
    }
}

/// Every route, with `/automation/*` and `/api/*` behind the API key check.
pub fn api_router(state: AppState, api_key: Option<String>) -> Router {
    let protected = Router::new()
        .merge(automation::create_routes())
        .merge(wallet::create_routes())
        .merge(trades::create_routes())
        .layer(middleware::from_fn_with_state(
            ApiKey::new(api_key),
            AuthMiddleware::validate_api_key,
        ));

    Router::new()
        .route("/ping", get(ping))
        .merge(advisor::create_routes())
        .merge(protected)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> Result<CorsLayer> {
    let origins = origins
        .iter()
        .map(|origin| {
            origin
                .parse::<HeaderValue>()
                .with_context(|| format!("Invalid CORS origin {}", origin))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::ORIGIN,
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::AUTHORIZATION,
            header::HeaderName::from_static("x-api-key"),
        ]))
}

/// Builds the application and serves it until Ctrl-C. The automation loop is
/// stopped and any tick in flight is awaited before the server returns.
pub async fn start(config: Config) -> Result<()> {
    let state = AppState::build(&config)?;
    let automation = state.automation.clone();

    if config.server.internal_api_key.is_none() {
        tracing::warn!("INTERNAL_API_KEY not set, automation endpoints are unauthenticated");
    }

    let app = api_router(state, config.server.internal_api_key.clone()).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors_layer(&config.server.cors_allowed_origins)?),
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    tracing::info!("Rebalancer listening on http://{}", addr);
    tracing::info!("Health check available at http://{}/ping", addr);
    tracing::info!(
        "Managing {} wallet(s), threshold {}, interval {:?}",
        config.automation.managed_wallet_ids.len(),
        config.automation.rebalance_threshold,
        config.automation.interval
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    automation.shutdown().await;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    tracing::info!("Shutdown signal received");
}
