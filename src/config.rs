//! Configuration module for environment variables and application settings

use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::Address;
use anyhow::{Context, Result, anyhow, bail};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::agent::types::Allocation;
use crate::onchain::LendingConfig;
use crate::onchain::tokens::{EURC_BASE, USDC_FLOW};
use crate::services::privy::PRIVY_API_URL;
use crate::services::stargate::STARGATE_API_URL;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub privy: PrivyConfig,
    pub stargate_api_url: String,
    pub chain: ChainConfig,
    pub ai: AiConfig,
    pub automation: AutomationSettings,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
    /// When set, `/automation/*` and `/api/*` require a matching `x-api-key`.
    pub internal_api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PrivyConfig {
    pub app_id: String,
    pub app_secret: String,
    pub api_url: String,
}

#[derive(Clone)]
pub struct ChainConfig {
    pub base_rpc_url: String,
    pub flow_rpc_url: String,
    pub eurc_token: Address,
    pub usdc_token: Address,
    pub wallet_private_key: Option<String>,
    pub confirmation_timeout: Duration,
    /// Aave deposit and Aerodrome swap leg on Base; off unless enabled.
    pub lending: Option<LendingConfig>,
}

// Hand-written so the signing key never ends up in a log line.
impl std::fmt::Debug for ChainConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainConfig")
            .field("base_rpc_url", &self.base_rpc_url)
            .field("flow_rpc_url", &self.flow_rpc_url)
            .field("eurc_token", &self.eurc_token)
            .field("usdc_token", &self.usdc_token)
            .field("wallet_private_key", &self.wallet_private_key.as_ref().map(|_| "<redacted>"))
            .field("confirmation_timeout", &self.confirmation_timeout)
            .field("lending", &self.lending)
            .finish()
    }
}

#[derive(Clone)]
pub struct AiConfig {
    pub anthropic_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub perplexity_api_key: Option<String>,
    pub timeout: Duration,
    /// Remote recommendation endpoint; the in-process orchestrator is used
    /// when unset.
    pub recommendation_url: Option<String>,
}

impl std::fmt::Debug for AiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AiConfig")
            .field("anthropic_api_key", &self.anthropic_api_key.is_some())
            .field("openai_api_key", &self.openai_api_key.is_some())
            .field("perplexity_api_key", &self.perplexity_api_key.is_some())
            .field("timeout", &self.timeout)
            .field("recommendation_url", &self.recommendation_url)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct AutomationSettings {
    pub rebalance_threshold: Decimal,
    pub interval: Duration,
    pub managed_wallet_ids: Vec<String>,
    pub fallback_allocation: Allocation,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from any variable source. Empty values count
    /// as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let server = ServerConfig {
            host: var("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&var, "PORT", 3000)?,
            cors_allowed_origins: split_list(
                &var("CORS_ALLOWED_ORIGINS").unwrap_or_else(|| "http://localhost:3001".to_string()),
            ),
            internal_api_key: var("INTERNAL_API_KEY"),
        };

        let privy = PrivyConfig {
            app_id: var("PRIVY_APP_ID")
                .ok_or_else(|| anyhow!("PRIVY_APP_ID environment variable is required"))?,
            app_secret: var("PRIVY_APP_SECRET")
                .ok_or_else(|| anyhow!("PRIVY_APP_SECRET environment variable is required"))?,
            api_url: var("PRIVY_API_URL").unwrap_or_else(|| PRIVY_API_URL.to_string()),
        };

        let lending = if parse_or(&var, "LENDING_ENABLED", false)? {
            let defaults = LendingConfig::default();
            let slippage_bps: u32 = parse_or(&var, "SWAP_SLIPPAGE_BPS", defaults.slippage_bps)?;
            if slippage_bps >= 10_000 {
                bail!("SWAP_SLIPPAGE_BPS must be below 10000, got {}", slippage_bps);
            }
            Some(LendingConfig {
                pool: parse_or(&var, "AAVE_POOL_ADDRESS", defaults.pool)?,
                a_token: parse_or(&var, "AAVE_EURC_ATOKEN_ADDRESS", defaults.a_token)?,
                router: parse_or(&var, "AERODROME_ROUTER_ADDRESS", defaults.router)?,
                factory: parse_or(&var, "AERODROME_FACTORY_ADDRESS", defaults.factory)?,
                base_usdc: parse_or(&var, "BASE_USDC_TOKEN_ADDRESS", defaults.base_usdc)?,
                slippage_bps,
            })
        } else {
            None
        };

        let chain = ChainConfig {
            base_rpc_url: var("BASE_RPC_URL").unwrap_or_else(|| "https://mainnet.base.org".to_string()),
            flow_rpc_url: var("FLOW_RPC_URL")
                .unwrap_or_else(|| "https://mainnet.evm.nodes.onflow.org".to_string()),
            eurc_token: parse_or(&var, "EURC_TOKEN_ADDRESS", EURC_BASE)?,
            usdc_token: parse_or(&var, "USDC_TOKEN_ADDRESS", USDC_FLOW)?,
            wallet_private_key: var("WALLET_PRIVATE_KEY"),
            confirmation_timeout: Duration::from_secs(parse_or(&var, "TX_CONFIRMATION_TIMEOUT_SECS", 120)?),
            lending,
        };

        let ai = AiConfig {
            anthropic_api_key: var("ANTHROPIC_API_KEY"),
            openai_api_key: var("OPENAI_API_KEY"),
            perplexity_api_key: var("PERPLEXITY_API_KEY"),
            timeout: Duration::from_secs(parse_or(&var, "AI_TIMEOUT_SECS", 45)?),
            recommendation_url: var("RECOMMENDATION_URL"),
        };

        let rebalance_threshold: Decimal = parse_or(&var, "REBALANCE_THRESHOLD", dec!(0.05))?;
        if rebalance_threshold <= Decimal::ZERO || rebalance_threshold >= Decimal::ONE {
            bail!(
                "REBALANCE_THRESHOLD must be between 0 and 1 (exclusive), got {}",
                rebalance_threshold
            );
        }

        let fallback_eur: Decimal = parse_or(&var, "FALLBACK_EUR_PERCENT", dec!(40))?;
        if fallback_eur < Decimal::ZERO || fallback_eur > dec!(100) {
            bail!("FALLBACK_EUR_PERCENT must be between 0 and 100, got {}", fallback_eur);
        }
        let eurc = fallback_eur / dec!(100);

        let automation = AutomationSettings {
            rebalance_threshold,
            interval: Duration::from_secs(parse_or(&var, "REBALANCE_INTERVAL_SECS", 3600)?),
            managed_wallet_ids: var("MANAGED_WALLET_IDS")
                .map(|ids| split_list(&ids))
                .unwrap_or_default(),
            fallback_allocation: Allocation::new(eurc, Decimal::ONE - eurc),
        };

        Ok(Self {
            server,
            privy,
            stargate_api_url: var("STARGATE_API_URL").unwrap_or_else(|| STARGATE_API_URL.to_string()),
            chain,
            ai,
            automation,
        })
    }
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match var(name) {
        Some(raw) => raw
            .parse()
            .map_err(|e| anyhow!("{}", e))
            .with_context(|| format!("Invalid value for {}: {}", name, raw)),
        None => Ok(default),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
