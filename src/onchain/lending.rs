//! Base-side yield leg: the EUR position is parked in Aave as aEURC, and
//! stray USDC on Base is swapped into EURC through the Aerodrome router.
//!
//! Everything here only builds calldata. Submission goes through the
//! executor's [`TransactionSubmitter`](super::TransactionSubmitter).

use alloy::primitives::{Address, Bytes, U256, address};
use alloy::sol;
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use tracing::debug;

use super::client::ChainClient;
use super::{PreparedTransaction, SwapQuoter};
use crate::agent::types::{AgentError, Chain};

sol! {
    #[allow(missing_docs)]
    struct Route {
        address from;
        address to;
        bool stable;
        address factory;
    }

    #[allow(missing_docs)]
    interface IApprove {
        function approve(address spender, uint256 amount) external returns (bool);
    }

    #[allow(missing_docs)]
    interface IAavePool {
        function supply(address asset, uint256 amount, address onBehalfOf, uint16 referralCode) external;
        function withdraw(address asset, uint256 amount, address to) external returns (uint256);
    }

    #[allow(missing_docs)]
    #[sol(rpc)]
    interface IAerodromeRouter {
        function swapExactTokensForTokens(
            uint256 amountIn,
            uint256 amountOutMin,
            Route[] routes,
            address to,
            uint256 deadline
        ) external returns (uint256[] amounts);

        function getAmountsOut(uint256 amountIn, Route[] routes) external view returns (uint256[] amounts);
    }
}

/// Aave V3 pool on Base.
pub const AAVE_POOL_BASE: Address = address!("0xA238Dd80C259a72e81d7e4664a9801593F98d1c5");
/// Aave interest-bearing EURC on Base.
pub const AEURC_BASE: Address = address!("0x90DA57E0A6C0d166Bf15764E03b83745Dc90025B");
/// Aerodrome router on Base.
pub const AERODROME_ROUTER_BASE: Address = address!("0xcF77a3Ba9A5CA399B7c97c74d54e5b1Beb874E43");
/// Native USDC on Base.
pub const USDC_BASE: Address = address!("0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913");

/// Swap deadline, relative to when the calldata is built.
pub const SWAP_DEADLINE_SECS: u64 = 20 * 60;

const BPS: u32 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LendingConfig {
    pub pool: Address,
    pub a_token: Address,
    pub router: Address,
    /// Zero selects the router's default pool factory.
    pub factory: Address,
    pub base_usdc: Address,
    pub slippage_bps: u32,
}

impl Default for LendingConfig {
    fn default() -> Self {
        Self {
            pool: AAVE_POOL_BASE,
            a_token: AEURC_BASE,
            router: AERODROME_ROUTER_BASE,
            factory: Address::ZERO,
            base_usdc: USDC_BASE,
            slippage_bps: 50,
        }
    }
}

/// Builds the Aave and Aerodrome calls for one EURC token on Base.
#[derive(Debug, Clone, Copy)]
pub struct LendingLeg {
    config: LendingConfig,
    eurc: Address,
}

impl LendingLeg {
    pub fn new(config: LendingConfig, eurc: Address) -> Self {
        Self { config, eurc }
    }

    pub fn config(&self) -> &LendingConfig {
        &self.config
    }

    /// Approve the pool, then supply `amount` EURC on behalf of `owner`.
    pub fn supply(&self, owner: Address, amount: U256) -> Vec<PreparedTransaction> {
        vec![
            approve(self.eurc, self.config.pool, amount),
            call(
                self.config.pool,
                IAavePool::supplyCall {
                    asset: self.eurc,
                    amount,
                    onBehalfOf: owner,
                    referralCode: 0,
                }
                .abi_encode(),
            ),
        ]
    }

    /// Redeem `amount` aEURC back into EURC held by `owner`.
    pub fn withdraw(&self, owner: Address, amount: U256) -> PreparedTransaction {
        call(
            self.config.pool,
            IAavePool::withdrawCall {
                asset: self.eurc,
                amount,
                to: owner,
            }
            .abi_encode(),
        )
    }

    /// Direct stable-pool route from Base USDC to EURC.
    pub fn usdc_to_eurc_route(&self) -> Vec<Route> {
        vec![Route {
            from: self.config.base_usdc,
            to: self.eurc,
            stable: true,
            factory: self.config.factory,
        }]
    }

    /// Approve the router, then swap `amount_in` Base USDC for at least
    /// `min_out` EURC.
    pub fn swap_usdc_to_eurc(
        &self,
        owner: Address,
        amount_in: U256,
        min_out: U256,
        deadline: u64,
    ) -> Vec<PreparedTransaction> {
        vec![
            approve(self.config.base_usdc, self.config.router, amount_in),
            call(
                self.config.router,
                IAerodromeRouter::swapExactTokensForTokensCall {
                    amountIn: amount_in,
                    amountOutMin: min_out,
                    routes: self.usdc_to_eurc_route(),
                    to: owner,
                    deadline: U256::from(deadline),
                }
                .abi_encode(),
            ),
        ]
    }

    /// Quoted output less the configured slippage allowance, rounded down.
    pub fn min_out(&self, quoted: U256) -> U256 {
        let keep = BPS.saturating_sub(self.config.slippage_bps);
        quoted * U256::from(keep) / U256::from(BPS)
    }
}

fn approve(token: Address, spender: Address, amount: U256) -> PreparedTransaction {
    call(token, IApprove::approveCall { spender, amount }.abi_encode())
}

fn call(to: Address, data: Vec<u8>) -> PreparedTransaction {
    PreparedTransaction {
        to,
        data: Bytes::from(data),
        value: U256::ZERO,
    }
}

#[async_trait]
impl SwapQuoter for ChainClient {
    async fn amounts_out(
        &self,
        chain: Chain,
        router: Address,
        amount_in: U256,
        routes: Vec<Route>,
    ) -> Result<U256, AgentError> {
        let amounts = IAerodromeRouter::new(router, self.provider_for(chain).clone())
            .getAmountsOut(amount_in, routes)
            .call()
            .await
            .map_err(|e| {
                AgentError::QuoteUnavailable(format!("getAmountsOut on {} failed: {}", chain, e))
            })?;

        let out = amounts
            .last()
            .copied()
            .ok_or_else(|| AgentError::QuoteUnavailable("router returned no amounts".to_string()))?;

        debug!(%chain, %amount_in, %out, "Quoted swap");
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onchain::tokens::EURC_BASE;

    fn leg() -> LendingLeg {
        LendingLeg::new(LendingConfig::default(), EURC_BASE)
    }

    fn owner() -> Address {
        address!("0x5228062c16A5c023ae598F0326D5f806Aa6a9c8E")
    }

    #[test]
    fn supply_approves_the_pool_first() {
        let txs = leg().supply(owner(), U256::from(2_500_000u64));

        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0].to, EURC_BASE);
        let approval = IApprove::approveCall::abi_decode(&txs[0].data).unwrap();
        assert_eq!(approval.spender, AAVE_POOL_BASE);
        assert_eq!(approval.amount, U256::from(2_500_000u64));

        assert_eq!(txs[1].to, AAVE_POOL_BASE);
        let supply = IAavePool::supplyCall::abi_decode(&txs[1].data).unwrap();
        assert_eq!(supply.asset, EURC_BASE);
        assert_eq!(supply.onBehalfOf, owner());
        assert_eq!(supply.referralCode, 0);
    }

    #[test]
    fn withdraw_returns_funds_to_the_owner() {
        let tx = leg().withdraw(owner(), U256::from(7u64));

        assert_eq!(tx.to, AAVE_POOL_BASE);
        assert_eq!(tx.value, U256::ZERO);
        let withdraw = IAavePool::withdrawCall::abi_decode(&tx.data).unwrap();
        assert_eq!(withdraw.asset, EURC_BASE);
        assert_eq!(withdraw.amount, U256::from(7u64));
        assert_eq!(withdraw.to, owner());
    }

    #[test]
    fn swap_uses_stable_route_and_floor() {
        let txs = leg().swap_usdc_to_eurc(owner(), U256::from(1_000_000u64), U256::from(900_000u64), 1_700_000_000);

        assert_eq!(txs[0].to, USDC_BASE);
        assert_eq!(txs[1].to, AERODROME_ROUTER_BASE);
        let swap = IAerodromeRouter::swapExactTokensForTokensCall::abi_decode(&txs[1].data).unwrap();
        assert_eq!(swap.amountOutMin, U256::from(900_000u64));
        assert_eq!(swap.routes.len(), 1);
        assert!(swap.routes[0].stable);
        assert_eq!(swap.routes[0].to, EURC_BASE);
        assert_eq!(swap.deadline, U256::from(1_700_000_000u64));
    }

    #[tokio::test]
    async fn quoted_output_is_the_last_hop() {
        use alloy::providers::mock::Asserter;
        use alloy::providers::{Provider, ProviderBuilder};
        use std::time::Duration;

        let base = Asserter::new();
        base.push_success(&format!(
            "0x{:064x}{:064x}{:064x}{:064x}",
            0x20, 2, 1_000_000u64, 921_000u64
        ));
        let client = ChainClient::from_providers(
            ProviderBuilder::new().connect_mocked_client(base).erased(),
            ProviderBuilder::new().connect_mocked_client(Asserter::new()).erased(),
            None,
            Duration::from_secs(1),
        );

        let out = client
            .amounts_out(
                Chain::Base,
                AERODROME_ROUTER_BASE,
                U256::from(1_000_000u64),
                leg().usdc_to_eurc_route(),
            )
            .await
            .unwrap();

        assert_eq!(out, U256::from(921_000u64));
    }

    #[test]
    fn min_out_applies_slippage() {
        assert_eq!(leg().min_out(U256::from(1_000_000u64)), U256::from(995_000u64));

        let strict = LendingLeg::new(
            LendingConfig {
                slippage_bps: 0,
                ..LendingConfig::default()
            },
            EURC_BASE,
        );
        assert_eq!(strict.min_out(U256::from(1_000_000u64)), U256::from(1_000_000u64));
    }
}
