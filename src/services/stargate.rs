//! Stargate bridge quoting.
//!
//! A quote carries every transaction needed for the transfer, in execution
//! order. This module only fetches and validates quotes; submission happens in
//! the trade executor.

use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::{Address, B256, Bytes, U256};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::agent::types::{AgentError, Chain};
use crate::onchain::PreparedTransaction;

pub const STARGATE_API_URL: &str = "https://stargate.finance/api/v1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    pub src_token: String,
    pub dst_token: String,
    pub src_chain_key: String,
    pub dst_chain_key: String,
    pub src_amount: String,
    pub src_address: String,
    pub dst_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    #[serde(default)]
    pub route: Option<String>,
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default)]
    pub src_amount: Option<String>,
    #[serde(default)]
    pub dst_amount: Option<String>,
    #[serde(default)]
    pub steps: Vec<QuoteStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteStep {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub chain_key: Option<String>,
    #[serde(default)]
    pub transaction: Option<StepTransaction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepTransaction {
    pub to: Address,
    #[serde(default)]
    pub data: Bytes,
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QuotesResponse {
    #[serde(default)]
    quotes: Vec<Quote>,
}

impl Quote {
    /// A quote is usable when it reports no error and every step carries a
    /// transaction.
    pub fn is_executable(&self) -> bool {
        let has_error = !matches!(self.error, None | Some(Value::Null));
        !has_error
            && !self.steps.is_empty()
            && self.steps.iter().all(|step| step.transaction.is_some())
    }

    pub fn src_amount(&self) -> Option<U256> {
        self.src_amount.as_deref().and_then(parse_amount)
    }

    pub fn route_name(&self) -> String {
        self.route.clone().unwrap_or_else(|| "stargate".to_string())
    }

    /// Transactions in the order they must be executed. Every step must run
    /// on `chain`, the chain the funds leave from.
    pub fn transactions(&self, chain: Chain) -> Result<Vec<PreparedTransaction>, AgentError> {
        self.steps
            .iter()
            .enumerate()
            .map(|(index, step)| {
                if let Some(key) = &step.chain_key
                    && !key.eq_ignore_ascii_case(chain.key())
                {
                    return Err(AgentError::QuoteUnavailable(format!(
                        "step {} runs on {}, expected {}",
                        index + 1,
                        key,
                        chain
                    )));
                }

                let tx = step.transaction.as_ref().ok_or_else(|| {
                    AgentError::QuoteUnavailable(format!("step {} has no transaction", index + 1))
                })?;

                let value = match tx.value.as_deref().map(str::trim) {
                    None | Some("") => U256::ZERO,
                    Some(raw) => parse_amount(raw).ok_or_else(|| {
                        AgentError::QuoteUnavailable(format!(
                            "step {} has invalid value {}",
                            index + 1,
                            raw
                        ))
                    })?,
                };

                Ok(PreparedTransaction {
                    to: tx.to,
                    data: tx.data.clone(),
                    value,
                })
            })
            .collect()
    }
}

/// First quote without an error, as ordered by the bridge.
pub fn first_executable(quotes: Vec<Quote>) -> Option<Quote> {
    quotes.into_iter().find(Quote::is_executable)
}

fn parse_amount(raw: &str) -> Option<U256> {
    U256::from_str(raw.trim()).ok()
}

#[async_trait]
pub trait BridgeRouter: Send + Sync {
    async fn quotes(&self, request: &QuoteRequest) -> Result<Vec<Quote>, AgentError>;

    async fn transfer_status(&self, tx_hash: &str) -> Result<Value, AgentError>;
}

pub struct StargateClient {
    client: Client,
    base_url: String,
}

impl StargateClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, AgentError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl BridgeRouter for StargateClient {
    async fn quotes(&self, request: &QuoteRequest) -> Result<Vec<Quote>, AgentError> {
        debug!(
            "Requesting Stargate quotes {} {} -> {} {}",
            request.src_chain_key, request.src_token, request.dst_chain_key, request.dst_token
        );

        let response = self
            .client
            .get(format!("{}/quotes", self.base_url))
            .query(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("Stargate quotes returned {}: {}", status, body);
            return Err(AgentError::QuoteUnavailable(format!(
                "Stargate returned {}: {}",
                status, body
            )));
        }

        let body: QuotesResponse = response.json().await?;
        Ok(body.quotes)
    }

    async fn transfer_status(&self, tx_hash: &str) -> Result<Value, AgentError> {
        let tx_hash: B256 = tx_hash
            .parse()
            .map_err(|_| AgentError::InvalidInput(format!("invalid transaction hash {:?}", tx_hash)))?;

        let response = self
            .client
            .get(format!("{}/transactions/{}", self.base_url, tx_hash))
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }
}
