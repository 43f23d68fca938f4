//! Automation loop: evaluates managed wallets against a target allocation
//! and executes the resulting trades.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::join_all;
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock, watch};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::agent::allocation::compute_allocation;
use crate::agent::executor::TradeExecutor;
use crate::agent::recommendation::{RecommendationSource, resolve_recommendation};
use crate::agent::strategy::{derive_trade_actions, should_rebalance};
use crate::agent::types::{
    AgentError, Allocation, Asset, AutomationStatus, RebalanceResult, RebalanceStatus,
    TargetAllocation, TradeResult, TradeStatus, WalletDetails,
};
use crate::services::privy::{WalletDirectory, validate_wallet_id};

#[derive(Debug, Clone)]
pub struct AutomationConfig {
    pub rebalance_threshold: Decimal,
    /// Zero disables the scheduler; ticks can still be triggered over HTTP.
    pub interval: Duration,
    pub managed_wallets: Vec<String>,
    pub fallback_allocation: Allocation,
    pub recommendation_timeout: Duration,
}

/// Outcome of one pass over the managed wallets.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickReport {
    pub skipped: bool,
    pub target: Option<TargetAllocation>,
    pub results: Vec<RebalanceResult>,
    pub errors: Vec<WalletFailure>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletFailure {
    pub wallet_id: String,
    pub error: String,
}

pub struct AutomationService {
    wallets: Arc<dyn WalletDirectory>,
    executor: TradeExecutor,
    recommendations: Arc<dyn RecommendationSource>,
    config: AutomationConfig,

    is_running: RwLock<bool>,
    threshold: RwLock<Decimal>,
    last_rebalance: RwLock<Option<DateTime<Utc>>>,
    wallet_cache: DashMap<String, WalletDetails>,
    wallet_locks: DashMap<String, Arc<Mutex<()>>>,
    tick_guard: Mutex<()>,
    // Bumped on every start/stop so a stale scheduler loop can tell it has
    // been superseded.
    generation: watch::Sender<u64>,
}

impl AutomationService {
    pub fn new(
        wallets: Arc<dyn WalletDirectory>,
        executor: TradeExecutor,
        recommendations: Arc<dyn RecommendationSource>,
        config: AutomationConfig,
    ) -> Self {
        let (generation, _) = watch::channel(0);

        Self {
            wallets,
            executor,
            recommendations,
            threshold: RwLock::new(config.rebalance_threshold),
            config,
            is_running: RwLock::new(false),
            last_rebalance: RwLock::new(None),
            wallet_cache: DashMap::new(),
            wallet_locks: DashMap::new(),
            tick_guard: Mutex::new(()),
            generation,
        }
    }

    pub fn executor(&self) -> &TradeExecutor {
        &self.executor
    }

    pub fn wallets(&self) -> &Arc<dyn WalletDirectory> {
        &self.wallets
    }

    /// Returns false when the service was already running.
    pub async fn start(self: &Arc<Self>) -> bool {
        {
            let mut is_running = self.is_running.write().await;
            if *is_running {
                return false;
            }
            *is_running = true;
        }

        self.generation.send_modify(|g| *g += 1);
        info!(
            "Automation started (threshold {}, interval {:?})",
            *self.threshold.read().await,
            self.config.interval
        );

        if !self.config.interval.is_zero() {
            self.spawn_scheduler();
        }

        true
    }

    /// Returns false when the service was already stopped. A tick that is
    /// in flight runs to completion.
    pub async fn stop(&self) -> bool {
        {
            let mut is_running = self.is_running.write().await;
            if !*is_running {
                return false;
            }
            *is_running = false;
        }

        self.generation.send_modify(|g| *g += 1);
        info!("Automation stopped");
        true
    }

    /// Stops the service and waits for the tick and wallet evaluations in
    /// flight to finish.
    pub async fn shutdown(&self) {
        self.stop().await;

        let _tick = self.tick_guard.lock().await;
        let locks: Vec<Arc<Mutex<()>>> = self
            .wallet_locks
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        for lock in locks {
            let _wallet = lock.lock().await;
        }

        info!("Automation shut down, no evaluation in flight");
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    pub async fn status(&self) -> AutomationStatus {
        AutomationStatus {
            is_running: self.is_running().await,
            last_rebalance: *self.last_rebalance.read().await,
            rebalance_threshold: *self.threshold.read().await,
        }
    }

    pub async fn configure(&self, threshold: Decimal) -> Result<(), AgentError> {
        if threshold <= Decimal::ZERO || threshold >= Decimal::ONE {
            return Err(AgentError::InvalidInput(format!(
                "rebalance threshold must be between 0 and 1, got {}",
                threshold
            )));
        }

        *self.threshold.write().await = threshold;
        info!("Rebalance threshold set to {}", threshold);
        Ok(())
    }

    /// Evaluates one wallet against an externally supplied target.
    pub async fn process_recommendation(
        &self,
        target: TargetAllocation,
        wallet_id: &str,
        force_rebalance: bool,
    ) -> Result<RebalanceResult, AgentError> {
        if !self.is_running().await {
            return Err(AgentError::NotRunning);
        }

        self.evaluate_wallet(wallet_id, target, force_rebalance).await
    }

    /// Runs a tick on demand. Fails fast while stopped.
    pub async fn run_now(&self) -> Result<TickReport, AgentError> {
        if !self.is_running().await {
            return Err(AgentError::NotRunning);
        }

        Ok(self.run_tick().await)
    }

    /// One pass over the managed wallets with a freshly resolved target.
    /// Never overlaps with another tick.
    pub async fn run_tick(&self) -> TickReport {
        let Ok(_guard) = self.tick_guard.try_lock() else {
            warn!("Previous rebalance tick still running, skipping");
            return TickReport {
                skipped: true,
                target: None,
                results: Vec::new(),
                errors: Vec::new(),
            };
        };

        if self.config.managed_wallets.is_empty() {
            debug!("No managed wallets configured");
        }

        let target = resolve_recommendation(
            self.recommendations.as_ref(),
            self.config.fallback_allocation,
            self.config.recommendation_timeout,
        )
        .await
        .into_target();

        let evaluations = self.config.managed_wallets.iter().map(|wallet_id| {
            let target = target.clone();
            async move {
                (
                    wallet_id.clone(),
                    self.evaluate_wallet(wallet_id, target, false).await,
                )
            }
        });

        let outcomes = join_all(evaluations).await;

        let mut report = TickReport {
            skipped: false,
            target: Some(target),
            results: Vec::new(),
            errors: Vec::new(),
        };

        for (wallet_id, outcome) in outcomes {
            match outcome {
                Ok(result) => report.results.push(result),
                Err(e) => {
                    error!("Rebalance of wallet {} failed: {}", wallet_id, e);
                    report.errors.push(WalletFailure {
                        wallet_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        report
    }

    pub async fn wallet_details(&self, wallet_id: &str) -> Result<WalletDetails, AgentError> {
        validate_wallet_id(wallet_id)?;
        if let Some(cached) = self.wallet_cache.get(wallet_id).map(|w| w.clone()) {
            return Ok(cached);
        }

        let details = self.wallets.wallet(wallet_id).await?;
        self.wallet_cache
            .insert(wallet_id.to_string(), details.clone());
        Ok(details)
    }

    /// Current on-chain allocation. Balances are always read fresh.
    pub async fn current_allocation(
        &self,
        wallet: &WalletDetails,
    ) -> Result<Allocation, AgentError> {
        let (eurc, usdc) = tokio::try_join!(
            self.executor.balance_of(wallet, Asset::Eurc),
            self.executor.balance_of(wallet, Asset::Usdc),
        )?;

        debug!("Wallet {} holds {} EURC, {} USDC", wallet.id, eurc, usdc);
        Ok(compute_allocation(eurc, usdc))
    }

    async fn evaluate_wallet(
        &self,
        wallet_id: &str,
        target: TargetAllocation,
        force: bool,
    ) -> Result<RebalanceResult, AgentError> {
        // Resolve first so unknown ids never get a lock entry.
        let wallet = self.wallet_details(wallet_id).await?;

        let lock = self
            .wallet_locks
            .entry(wallet_id.to_string())
            .or_default()
            .clone();
        let Ok(_guard) = lock.try_lock() else {
            return Err(AgentError::WalletBusy(wallet_id.to_string()));
        };

        // Idle Base funds are parked before the allocation is read. A failure
        // here only costs yield, so the evaluation goes on.
        let lending_transactions = match self.executor.park_idle_funds(&wallet).await {
            Ok(hashes) => hashes,
            Err(e) => {
                warn!("Wallet {}: parking idle funds failed: {}", wallet_id, e);
                Vec::new()
            }
        };

        let current = self.current_allocation(&wallet).await?;
        let threshold = *self.threshold.read().await;

        let mut result = RebalanceResult {
            id: Uuid::new_v4(),
            wallet_id: wallet_id.to_string(),
            status: RebalanceStatus::Success,
            message: String::new(),
            current_allocation: current,
            target,
            actions: Vec::new(),
            results: Vec::new(),
            lending_transactions,
            evaluated_at: Utc::now(),
        };

        if !should_rebalance(&current, &result.target.allocation, threshold, force) {
            result.message = format!(
                "Allocation within threshold ({}), no rebalance needed",
                threshold
            );
            info!("Wallet {}: {}", wallet_id, result.message);
            return Ok(result);
        }

        // Forcing skips the decision only. Drift inside the threshold still
        // produces no trades.
        result.actions = derive_trade_actions(&current, &result.target.allocation, threshold);

        if result.actions.is_empty() {
            result.message = format!(
                "Forced rebalance: allocation within threshold ({}), no trades",
                threshold
            );
            info!("Wallet {}: {}", wallet_id, result.message);
            return Ok(result);
        }

        for action in &result.actions {
            let trade = match self.executor.execute(action, &wallet).await {
                Ok(trade) => trade,
                Err(e @ AgentError::InsufficientBalance { .. }) => {
                    warn!("Wallet {}: {}", wallet_id, e);
                    TradeResult::skipped(action.clone(), e.to_string())
                }
                Err(e) => {
                    error!("Wallet {} trade {} -> {} failed: {}", wallet_id, action.from, action.to, e);
                    TradeResult::failed(action.clone(), &e)
                }
            };
            result.results.push(trade);
        }

        let executed = result.executed_trades();
        let failed = result
            .results
            .iter()
            .filter(|r| r.status == TradeStatus::Failed)
            .count();

        if executed > 0 {
            *self.last_rebalance.write().await = Some(Utc::now());
        }

        if failed > 0 {
            result.status = RebalanceStatus::Error;
            result.message = format!("{} of {} trades failed", failed, result.results.len());
        } else if executed > 0 {
            result.message = format!("Executed {} trade(s)", executed);
        } else {
            result.message = "No trades executed".to_string();
        }

        info!("Wallet {}: {}", wallet_id, result.message);
        Ok(result)
    }

    fn spawn_scheduler(self: &Arc<Self>) {
        let service = Arc::clone(self);
        let mut generation = self.generation.subscribe();
        let own_generation = *generation.borrow_and_update();
        let period = self.config.interval;

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if !service.is_running().await {
                            break;
                        }
                        let report = service.run_tick().await;
                        debug!(
                            "Scheduled tick finished: {} evaluated, {} failed",
                            report.results.len(),
                            report.errors.len()
                        );
                    }
                    changed = generation.changed() => {
                        if changed.is_err() || *generation.borrow_and_update() != own_generation {
                            break;
                        }
                    }
                }
            }

            debug!("Scheduler loop {} exited", own_generation);
        });
    }
}
