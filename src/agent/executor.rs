use std::sync::Arc;

use alloy::primitives::U256;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::agent::allocation::apply_fraction;
use crate::agent::types::{
    AgentError, Asset, BalanceSnapshot, Chain, TradeAction, TradeResult, TradeStatus,
    WalletDetails,
};
use crate::onchain::lending::SWAP_DEADLINE_SECS;
use crate::onchain::{
    BalanceReader, LendingLeg, PreparedTransaction, SwapQuoter, TokenRegistry,
    TransactionSubmitter,
};
use crate::services::stargate::{BridgeRouter, QuoteRequest, first_executable};

/// Aave and Aerodrome on Base, with the router read used to price swaps.
struct Lending {
    leg: LendingLeg,
    quoter: Arc<dyn SwapQuoter>,
}

/// Turns a [`TradeAction`] into on-chain transactions.
///
/// Quote or submission failures are returned to the caller as errors. Nothing
/// is retried here and a partially executed quote is never rolled back; the
/// error carries the hashes that did land so an operator can reconcile.
pub struct TradeExecutor {
    balances: Arc<dyn BalanceReader>,
    bridge: Arc<dyn BridgeRouter>,
    submitter: Arc<dyn TransactionSubmitter>,
    tokens: TokenRegistry,
    lending: Option<Lending>,
}

impl TradeExecutor {
    pub fn new(
        balances: Arc<dyn BalanceReader>,
        bridge: Arc<dyn BridgeRouter>,
        submitter: Arc<dyn TransactionSubmitter>,
        tokens: TokenRegistry,
    ) -> Self {
        Self {
            balances,
            bridge,
            submitter,
            tokens,
            lending: None,
        }
    }

    /// Keeps the EUR side deposited in Aave. EURC balances then count the
    /// aEURC position and EURC leaving Base is withdrawn first.
    pub fn with_lending(mut self, leg: LendingLeg, quoter: Arc<dyn SwapQuoter>) -> Self {
        self.lending = Some(Lending { leg, quoter });
        self
    }

    pub fn lending_enabled(&self) -> bool {
        self.lending.is_some()
    }

    pub fn tokens(&self) -> &TokenRegistry {
        &self.tokens
    }

    /// Position in `asset`, including EURC lent out to Aave.
    pub async fn balance_of(&self, wallet: &WalletDetails, asset: Asset) -> Result<U256, AgentError> {
        let held = self.held_balance(wallet, asset).await?;
        match (&self.lending, asset) {
            (Some(lending), Asset::Eurc) => {
                let deposited = self
                    .balances
                    .token_balance(Chain::Base, lending.leg.config().a_token, wallet.address)
                    .await?;
                Ok(held + deposited)
            }
            _ => Ok(held),
        }
    }

    /// Tokens sitting in the wallet itself.
    async fn held_balance(&self, wallet: &WalletDetails, asset: Asset) -> Result<U256, AgentError> {
        let (chain, token) = self.tokens.location(asset);
        self.balances.token_balance(chain, token, wallet.address).await
    }

    fn check_signer(&self, wallet: &WalletDetails) -> Result<(), AgentError> {
        match self.submitter.sender() {
            None => Err(AgentError::transfer_failed(
                "no signing key configured",
                Vec::new(),
            )),
            Some(sender) if sender != wallet.address => Err(AgentError::Wallet(format!(
                "signing key {} does not control wallet {}",
                sender, wallet.address
            ))),
            Some(_) => Ok(()),
        }
    }

    pub async fn execute(
        &self,
        action: &TradeAction,
        wallet: &WalletDetails,
    ) -> Result<TradeResult, AgentError> {
        let balance = self.balance_of(wallet, action.from).await?;
        if balance.is_zero() {
            info!("Wallet {} holds no {}, skipping trade", wallet.id, action.from);
            return Ok(TradeResult::skipped(
                action.clone(),
                format!("no {} balance on {}", action.from, action.source_chain),
            ));
        }

        // The fraction applies to the source balance, not the portfolio total.
        let amount = apply_fraction(balance, action.amount_fraction);
        if amount.is_zero() {
            return Ok(TradeResult::skipped(
                action.clone(),
                format!("{} of {} {} rounds to zero", action.amount_fraction, balance, action.from),
            ));
        }

        self.check_signer(wallet)?;

        let request = QuoteRequest {
            src_token: self.tokens.address(action.from).to_string(),
            dst_token: self.tokens.address(action.to).to_string(),
            src_chain_key: action.source_chain.key().to_string(),
            dst_chain_key: action.destination_chain.key().to_string(),
            src_amount: amount.to_string(),
            src_address: wallet.address.to_string(),
            dst_address: wallet.address.to_string(),
        };

        let quote = first_executable(self.bridge.quotes(&request).await?).ok_or_else(|| {
            AgentError::QuoteUnavailable(format!(
                "no executable quote for {} {} -> {}",
                amount, action.from, action.to
            ))
        })?;

        if let Some(required) = quote.src_amount()
            && required > balance
        {
            return Err(AgentError::InsufficientBalance {
                asset: action.from,
                required,
                available: balance,
            });
        }

        let mut transactions = quote.transactions(action.source_chain)?;
        if let (Some(lending), Asset::Eurc) = (&self.lending, action.from) {
            let needed = quote.src_amount().unwrap_or(amount);
            let held = self.held_balance(wallet, Asset::Eurc).await?;
            if needed > held {
                let shortfall = needed - held;
                info!("Withdrawing {} EURC from Aave before bridging", shortfall);
                transactions.insert(0, lending.leg.withdraw(wallet.address, shortfall));
            }
        }

        let route = quote.route_name();
        info!(
            "Executing {} {} -> {} via {} ({} steps)",
            amount,
            action.from,
            action.to,
            route,
            transactions.len()
        );

        let hashes = self
            .submit_steps(action.source_chain, &route, transactions, Vec::new())
            .await?;

        Ok(TradeResult {
            status: TradeStatus::Executed,
            action: action.clone(),
            transfer_amount: Some(amount.to_string()),
            route: Some(route),
            transaction_hashes: hashes,
            final_balances: self.final_balances(wallet).await,
            message: None,
        })
    }

    /// Moves idle value on Base into Aave: stray Base USDC is swapped to EURC
    /// on Aerodrome, then all EURC in the wallet is supplied. Returns the
    /// hashes of every submitted step.
    pub async fn park_idle_funds(&self, wallet: &WalletDetails) -> Result<Vec<String>, AgentError> {
        let Some(lending) = &self.lending else {
            return Ok(Vec::new());
        };
        self.check_signer(wallet)?;

        let owner = wallet.address;
        let config = lending.leg.config();
        let mut hashes = Vec::new();

        let stray_usdc = self
            .balances
            .token_balance(Chain::Base, config.base_usdc, owner)
            .await?;
        if !stray_usdc.is_zero() {
            let quoted = lending
                .quoter
                .amounts_out(Chain::Base, config.router, stray_usdc, lending.leg.usdc_to_eurc_route())
                .await?;
            let min_out = lending.leg.min_out(quoted);
            if min_out.is_zero() {
                debug!("Swap of {} Base USDC quotes to zero, leaving it", stray_usdc);
            } else {
                info!("Swapping {} Base USDC for at least {} EURC", stray_usdc, min_out);
                let deadline = Utc::now().timestamp().max(0) as u64 + SWAP_DEADLINE_SECS;
                let swap = lending.leg.swap_usdc_to_eurc(owner, stray_usdc, min_out, deadline);
                hashes = self.submit_steps(Chain::Base, "aerodrome", swap, hashes).await?;
            }
        }

        let idle = self.held_balance(wallet, Asset::Eurc).await?;
        if !idle.is_zero() {
            info!("Supplying {} EURC to Aave for wallet {}", idle, wallet.id);
            let supply = lending.leg.supply(owner, idle);
            hashes = self.submit_steps(Chain::Base, "aave", supply, hashes).await?;
        }

        Ok(hashes)
    }

    /// Submits `transactions` in order, stopping at the first failure. The
    /// error carries every hash that landed, including `hashes` passed in.
    async fn submit_steps(
        &self,
        chain: Chain,
        route: &str,
        transactions: Vec<PreparedTransaction>,
        mut hashes: Vec<String>,
    ) -> Result<Vec<String>, AgentError> {
        for (index, transaction) in transactions.into_iter().enumerate() {
            let step = index + 1;
            match self.submitter.submit(chain, transaction).await {
                Ok(submitted) => {
                    hashes.push(submitted.hash.to_string());
                    if !submitted.succeeded {
                        warn!("Step {} of {} reverted", step, route);
                        return Err(AgentError::transfer_failed(
                            format!("step {} of {} reverted", step, route),
                            hashes,
                        ));
                    }
                }
                Err(AgentError::TransferFailed {
                    reason,
                    transaction_hashes,
                }) => {
                    hashes.extend(transaction_hashes);
                    return Err(AgentError::transfer_failed(
                        format!("step {}: {}", step, reason),
                        hashes,
                    ));
                }
                Err(e) => {
                    return Err(AgentError::transfer_failed(
                        format!("step {}: {}", step, e),
                        hashes,
                    ));
                }
            }
        }

        Ok(hashes)
    }

    // Best effort: the transfer already happened, a failed read must not turn
    // it into an error.
    async fn final_balances(&self, wallet: &WalletDetails) -> Vec<BalanceSnapshot> {
        let mut snapshots = Vec::new();
        for asset in [Asset::Eurc, Asset::Usdc] {
            match self.balance_of(wallet, asset).await {
                Ok(amount) => snapshots.push(BalanceSnapshot::new(asset, amount)),
                Err(e) => debug!("Final {} balance unavailable: {}", asset, e),
            }
        }
        snapshots
    }
}
