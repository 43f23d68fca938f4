//! In-memory doubles for the service seams, shared by the unit tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use serde_json::{Value, json};

use crate::agent::ai_client::{Advisor, AdvisorOpinion};
use crate::agent::recommendation::{CurrencyRecommendation, RecommendationSource};
use crate::agent::types::{AgentError, Chain, WalletDetails};
use crate::onchain::lending::{AEURC_BASE, USDC_BASE};
use crate::onchain::{
    BalanceReader, PreparedTransaction, Route, SubmittedTransaction, SwapQuoter,
    TransactionSubmitter,
};
use crate::services::privy::WalletDirectory;
use crate::services::stargate::{BridgeRouter, Quote, QuoteRequest};

pub fn test_wallet() -> WalletDetails {
    WalletDetails {
        id: "wallet-1".to_string(),
        address: "0x5228062c16A5c023ae598F0326D5f806Aa6a9c8E"
            .parse()
            .unwrap(),
        chain_type: "ethereum".to_string(),
    }
}

/// Quote with `step_count` transactions and no chain keys, so it is valid on
/// either source chain.
pub fn executable_quote(src_amount: &str, step_count: usize) -> Quote {
    let steps: Vec<Value> = (0..step_count)
        .map(|i| {
            let kind = if i + 1 == step_count { "bridge" } else { "approve" };
            json!({
                "type": kind,
                "transaction": {
                    "to": "0x45f1A95A4D3f3836523F5c83673c797f4d4d263B",
                    "data": "0x",
                }
            })
        })
        .collect();

    serde_json::from_value(json!({
        "route": "stargate/v2/taxi",
        "srcAmount": src_amount,
        "dstAmount": src_amount,
        "steps": steps,
    }))
    .unwrap()
}

/// EURC balance on Base and USDC balance on Flow, in token base units. The
/// aEURC deposit and Base USDC default to zero.
pub struct StubBalances {
    eurc: Option<U256>,
    usdc: Option<U256>,
    deposited: U256,
    base_usdc: U256,
}

impl StubBalances {
    pub fn new(eurc: u64, usdc: u64) -> Self {
        Self {
            eurc: Some(U256::from(eurc)),
            usdc: Some(U256::from(usdc)),
            deposited: U256::ZERO,
            base_usdc: U256::ZERO,
        }
    }

    pub fn failing() -> Self {
        Self {
            eurc: None,
            usdc: None,
            deposited: U256::ZERO,
            base_usdc: U256::ZERO,
        }
    }

    pub fn with_aave(mut self, deposited: u64, base_usdc: u64) -> Self {
        self.deposited = U256::from(deposited);
        self.base_usdc = U256::from(base_usdc);
        self
    }
}

#[async_trait]
impl BalanceReader for StubBalances {
    async fn token_balance(
        &self,
        chain: Chain,
        token: Address,
        _owner: Address,
    ) -> Result<U256, AgentError> {
        let balance = match chain {
            Chain::Base if token == AEURC_BASE => self.eurc.map(|_| self.deposited),
            Chain::Base if token == USDC_BASE => self.eurc.map(|_| self.base_usdc),
            Chain::Base => self.eurc,
            Chain::Flow => self.usdc,
        };
        balance.ok_or_else(|| AgentError::Chain(format!("{} RPC unreachable", chain)))
    }
}

/// Prices every swap at a fixed EUR/USD rate, in basis points.
pub struct StubSwapQuoter {
    rate_bps: u64,
}

impl StubSwapQuoter {
    pub fn at_rate(rate_bps: u64) -> Self {
        Self { rate_bps }
    }
}

#[async_trait]
impl SwapQuoter for StubSwapQuoter {
    async fn amounts_out(
        &self,
        _chain: Chain,
        _router: Address,
        amount_in: U256,
        _routes: Vec<Route>,
    ) -> Result<U256, AgentError> {
        Ok(amount_in * U256::from(self.rate_bps) / U256::from(10_000u64))
    }
}

pub struct StubBridge {
    quotes: Vec<Quote>,
    requests: Mutex<Vec<QuoteRequest>>,
}

impl StubBridge {
    pub fn with_quotes(quotes: Vec<Quote>) -> Self {
        Self {
            quotes,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<QuoteRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl BridgeRouter for StubBridge {
    async fn quotes(&self, request: &QuoteRequest) -> Result<Vec<Quote>, AgentError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(self.quotes.clone())
    }

    async fn transfer_status(&self, tx_hash: &str) -> Result<Value, AgentError> {
        Ok(json!({ "txHash": tx_hash, "status": "DELIVERED" }))
    }
}

pub struct StubSubmitter {
    sender: Address,
    fail_at: Option<usize>,
    revert_at: Option<usize>,
    delay: Option<Duration>,
    submitted: Mutex<Vec<PreparedTransaction>>,
}

impl StubSubmitter {
    pub fn signing_for(sender: Address) -> Self {
        Self {
            sender,
            fail_at: None,
            revert_at: None,
            delay: None,
            submitted: Mutex::new(Vec::new()),
        }
    }

    /// Fails the `step`-th submission (1-based) before it is broadcast.
    pub fn failing_at(sender: Address, step: usize) -> Self {
        Self {
            fail_at: Some(step),
            ..Self::signing_for(sender)
        }
    }

    /// Mines the `step`-th submission (1-based) with a failed receipt.
    pub fn reverting_at(sender: Address, step: usize) -> Self {
        Self {
            revert_at: Some(step),
            ..Self::signing_for(sender)
        }
    }

    /// Waits `delay` for every receipt.
    pub fn slow(sender: Address, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::signing_for(sender)
        }
    }

    pub fn submitted(&self) -> Vec<PreparedTransaction> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl TransactionSubmitter for StubSubmitter {
    fn sender(&self) -> Option<Address> {
        Some(self.sender)
    }

    async fn submit(
        &self,
        _chain: Chain,
        transaction: PreparedTransaction,
    ) -> Result<SubmittedTransaction, AgentError> {
        let step = {
            let mut submitted = self.submitted.lock().unwrap();
            submitted.push(transaction);
            submitted.len()
        };

        if self.fail_at == Some(step) {
            return Err(AgentError::Chain("nonce too low".to_string()));
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        Ok(SubmittedTransaction {
            hash: B256::with_last_byte(step as u8),
            succeeded: self.revert_at != Some(step),
        })
    }
}

pub struct StubWallets {
    wallets: Vec<WalletDetails>,
    lookups: AtomicUsize,
}

impl StubWallets {
    pub fn new(wallets: Vec<WalletDetails>) -> Self {
        Self {
            wallets,
            lookups: AtomicUsize::new(0),
        }
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WalletDirectory for StubWallets {
    async fn wallet(&self, wallet_id: &str) -> Result<WalletDetails, AgentError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.wallets
            .iter()
            .find(|w| w.id == wallet_id)
            .cloned()
            .ok_or_else(|| AgentError::WalletNotFound(wallet_id.to_string()))
    }

    async fn balance(
        &self,
        wallet_id: &str,
        chain_id: &str,
        token_address: Option<&str>,
    ) -> Result<Value, AgentError> {
        self.wallet(wallet_id).await?;
        Ok(json!({
            "chain_id": chain_id,
            "token_address": token_address,
            "balance": "1000000",
        }))
    }
}

enum Behavior {
    Respond { eur: String, usd: String },
    Fail,
    Slow(Duration),
}

pub struct StubRecommendationSource {
    behavior: Behavior,
}

impl StubRecommendationSource {
    pub fn percentages(eur: &str, usd: &str) -> Self {
        Self {
            behavior: Behavior::Respond {
                eur: eur.to_string(),
                usd: usd.to_string(),
            },
        }
    }

    pub fn failing() -> Self {
        Self {
            behavior: Behavior::Fail,
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            behavior: Behavior::Slow(delay),
        }
    }

    fn answer(eur: &str, usd: &str) -> CurrencyRecommendation {
        CurrencyRecommendation {
            eur: eur.to_string(),
            usd: usd.to_string(),
            reasoning: Some("stubbed".to_string()),
            confidence_level: Some(8.0),
            risk_assessment: None,
            alternative_scenarios: Vec::new(),
            time_horizon: None,
            source: "stub".to_string(),
            is_fallback: false,
        }
    }
}

#[async_trait]
impl RecommendationSource for StubRecommendationSource {
    fn name(&self) -> &str {
        "stub"
    }

    async fn recommend(&self) -> Result<CurrencyRecommendation, AgentError> {
        match &self.behavior {
            Behavior::Respond { eur, usd } => Ok(Self::answer(eur, usd)),
            Behavior::Fail => Err(AgentError::AIAnalysis("upstream unavailable".to_string())),
            Behavior::Slow(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(Self::answer("50%", "50%"))
            }
        }
    }
}

pub struct StubAdvisor {
    name: String,
    split: Option<(u32, u32)>,
}

impl StubAdvisor {
    pub fn ok(name: &str, eur_percent: u32, usd_percent: u32) -> Self {
        Self {
            name: name.to_string(),
            split: Some((eur_percent, usd_percent)),
        }
    }

    pub fn failing(name: &str) -> Self {
        Self {
            name: name.to_string(),
            split: None,
        }
    }
}

#[async_trait]
impl Advisor for StubAdvisor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn advise(&self) -> Result<AdvisorOpinion, AgentError> {
        let (eur_percent, usd_percent) = self
            .split
            .ok_or_else(|| AgentError::AIAnalysis(format!("{} is down", self.name)))?;

        Ok(AdvisorOpinion {
            source: self.name.clone(),
            eur_percent,
            usd_percent,
            reasoning: format!("EUR: {}%, USD: {}%", eur_percent, usd_percent),
        })
    }
}
