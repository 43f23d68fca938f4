//! Target allocations from untrusted recommendation sources.
//!
//! Anything coming back from an advisor is parsed into typed values here.
//! When a source fails or returns garbage, the caller gets the configured
//! fallback allocation, tagged so it can be told apart from an AI decision.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::agent::allocation::normalize_fractions;
use crate::agent::types::{AgentError, Allocation, TargetAllocation};

pub const FALLBACK_SOURCE: &str = "fallback";

/// Payload of the recommendation endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrencyRecommendation {
    #[serde(rename = "EUR")]
    pub eur: String,
    #[serde(rename = "USD")]
    pub usd: String,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub confidence_level: Option<f64>,
    #[serde(default)]
    pub risk_assessment: Option<String>,
    #[serde(default)]
    pub alternative_scenarios: Vec<String>,
    #[serde(default)]
    pub time_horizon: Option<String>,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub is_fallback: bool,
}

impl CurrencyRecommendation {
    pub fn fallback(allocation: &Allocation, reason: &str) -> Self {
        Self {
            eur: format_percentage(allocation.eurc),
            usd: format_percentage(allocation.usdc),
            reasoning: Some(format!(
                "Recommendation unavailable ({}), using the conservative fallback allocation",
                reason
            )),
            confidence_level: None,
            risk_assessment: None,
            alternative_scenarios: Vec::new(),
            time_horizon: None,
            source: FALLBACK_SOURCE.to_string(),
            is_fallback: true,
        }
    }

    pub fn allocation(&self) -> Result<Allocation, AgentError> {
        normalize_recommendation(&self.eur, &self.usd)
    }
}

/// Recommendation as accepted by the automation API: either fractions
/// (`{"EURC": 0.7, "USDC": 0.3}`) or percentage strings
/// (`{"EUR": "70%", "USD": "30%"}`).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RecommendationInput {
    Fractions {
        #[serde(rename = "EURC", alias = "EUR")]
        eurc: f64,
        #[serde(rename = "USDC", alias = "USD")]
        usdc: f64,
    },
    Percentages {
        #[serde(rename = "EUR", alias = "EURC")]
        eur: String,
        #[serde(rename = "USD", alias = "USDC")]
        usd: String,
    },
}

impl RecommendationInput {
    pub fn into_allocation(self) -> Result<Allocation, AgentError> {
        match self {
            RecommendationInput::Fractions { eurc, usdc } => {
                normalize_fractions(float_to_decimal(eurc)?, float_to_decimal(usdc)?)
            }
            RecommendationInput::Percentages { eur, usd } => normalize_recommendation(&eur, &usd),
        }
    }
}

/// Parses two percentage strings (`"NN%"` or `"NN.N%"`) into an allocation,
/// renormalizing when they do not sum to 100% within tolerance.
pub fn normalize_recommendation(raw_eur: &str, raw_usd: &str) -> Result<Allocation, AgentError> {
    let eur = parse_percentage(raw_eur)?;
    let usd = parse_percentage(raw_usd)?;
    normalize_fractions(eur, usd)
}

/// Parses a percentage string into a fraction.
pub fn parse_percentage(raw: &str) -> Result<Decimal, AgentError> {
    let trimmed = raw.trim();
    let number = trimmed.strip_suffix('%').unwrap_or(trimmed).trim();

    let value = Decimal::from_str(number).map_err(|_| {
        AgentError::MalformedRecommendation(format!("'{}' is not a percentage", raw))
    })?;

    if value < Decimal::ZERO {
        return Err(AgentError::MalformedRecommendation(format!(
            "'{}' is negative",
            raw
        )));
    }

    Ok(value / dec!(100))
}

pub fn format_percentage(fraction: Decimal) -> String {
    format!("{}%", (fraction * dec!(100)).round_dp(2).normalize())
}

fn float_to_decimal(value: f64) -> Result<Decimal, AgentError> {
    Decimal::try_from(value).map_err(|_| {
        AgentError::MalformedRecommendation(format!("{} is not a valid fraction", value))
    })
}

#[async_trait]
pub trait RecommendationSource: Send + Sync {
    fn name(&self) -> &str;

    async fn recommend(&self) -> Result<CurrencyRecommendation, AgentError>;
}

/// Reads recommendations from a remote `/ai-currency` endpoint.
pub struct HttpRecommendationSource {
    client: Client,
    url: String,
}

impl HttpRecommendationSource {
    pub fn new(url: String, timeout: Duration) -> Result<Self, AgentError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl RecommendationSource for HttpRecommendationSource {
    fn name(&self) -> &str {
        "http"
    }

    async fn recommend(&self) -> Result<CurrencyRecommendation, AgentError> {
        let response = self.client.get(&self.url).send().await?;

        if !response.status().is_success() {
            return Err(AgentError::AIAnalysis(format!(
                "recommendation endpoint returned {}",
                response.status()
            )));
        }

        let body = response.text().await?;
        let recommendation: CurrencyRecommendation = serde_json::from_str(&body)?;
        Ok(recommendation)
    }
}

/// A recommendation that has been validated, or replaced by the fallback.
#[derive(Debug, Clone)]
pub struct ResolvedRecommendation {
    pub recommendation: CurrencyRecommendation,
    pub allocation: Allocation,
}

impl ResolvedRecommendation {
    pub fn into_target(self) -> TargetAllocation {
        TargetAllocation {
            allocation: self.allocation,
            is_fallback: self.recommendation.is_fallback,
            source: self.recommendation.source,
            reasoning: self.recommendation.reasoning,
        }
    }
}

/// Asks `source` for a recommendation, bounded by `timeout`. Failures,
/// timeouts and unparseable payloads all resolve to `fallback`.
pub async fn resolve_recommendation(
    source: &dyn RecommendationSource,
    fallback: Allocation,
    timeout: Duration,
) -> ResolvedRecommendation {
    let reason = match tokio::time::timeout(timeout, source.recommend()).await {
        Ok(Ok(recommendation)) => match recommendation.allocation() {
            Ok(allocation) => {
                info!(
                    "Recommendation from {}: EUR {} / USD {}",
                    source.name(),
                    recommendation.eur,
                    recommendation.usd
                );
                return ResolvedRecommendation {
                    recommendation,
                    allocation,
                };
            }
            Err(e) => e.to_string(),
        },
        Ok(Err(e)) => e.to_string(),
        Err(_) => format!("{} timed out after {:?}", source.name(), timeout),
    };

    warn!("Falling back to default allocation: {}", reason);

    ResolvedRecommendation {
        recommendation: CurrencyRecommendation::fallback(&fallback, &reason),
        allocation: fallback,
    }
}
