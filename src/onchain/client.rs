use std::time::Duration;

use alloy::network::EthereumWallet;
use alloy::primitives::{Address, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use alloy::sol;
use async_trait::async_trait;
use tracing::{debug, info, warn};
use url::Url;

use super::{BalanceReader, PreparedTransaction, SubmittedTransaction, TransactionSubmitter};
use crate::agent::types::{AgentError, Chain};

sol! {
    #[allow(missing_docs)]
    #[sol(rpc)]
    interface IERC20 {
        function balanceOf(address account) external view returns (uint256);
    }
}

const REQUIRED_CONFIRMATIONS: u64 = 1;

/// One provider per chain. When a private key is configured both providers
/// carry the same signing wallet.
pub struct ChainClient {
    base: DynProvider,
    flow: DynProvider,
    signer: Option<Address>,
    confirmation_timeout: Duration,
}

impl ChainClient {
    pub fn connect(
        base_rpc_url: &str,
        flow_rpc_url: &str,
        private_key: Option<&str>,
        confirmation_timeout: Duration,
    ) -> Result<Self, AgentError> {
        let signer = private_key
            .map(|key| key.trim().parse::<PrivateKeySigner>())
            .transpose()
            .map_err(|e| AgentError::Configuration(format!("Invalid private key: {}", e)))?;

        let signer_address = signer.as_ref().map(|s| s.address());
        match signer_address {
            Some(address) => info!("Chain client signing as {}", address),
            None => warn!("No signing key configured, transfers are disabled"),
        }

        Ok(Self {
            base: Self::provider(base_rpc_url, signer.clone())?,
            flow: Self::provider(flow_rpc_url, signer)?,
            signer: signer_address,
            confirmation_timeout,
        })
    }

    pub fn from_providers(
        base: DynProvider,
        flow: DynProvider,
        signer: Option<Address>,
        confirmation_timeout: Duration,
    ) -> Self {
        Self {
            base,
            flow,
            signer,
            confirmation_timeout,
        }
    }

    fn provider(rpc_url: &str, signer: Option<PrivateKeySigner>) -> Result<DynProvider, AgentError> {
        let url: Url = rpc_url
            .parse()
            .map_err(|e| AgentError::Configuration(format!("Invalid RPC URL {}: {}", rpc_url, e)))?;

        let provider = match signer {
            Some(signer) => ProviderBuilder::new()
                .wallet(EthereumWallet::from(signer))
                .connect_http(url)
                .erased(),
            None => ProviderBuilder::new().connect_http(url).erased(),
        };

        Ok(provider)
    }

    pub(super) fn provider_for(&self, chain: Chain) -> &DynProvider {
        match chain {
            Chain::Base => &self.base,
            Chain::Flow => &self.flow,
        }
    }
}

#[async_trait]
impl BalanceReader for ChainClient {
    async fn token_balance(
        &self,
        chain: Chain,
        token: Address,
        owner: Address,
    ) -> Result<U256, AgentError> {
        let balance = IERC20::new(token, self.provider_for(chain).clone())
            .balanceOf(owner)
            .call()
            .await
            .map_err(|e| {
                AgentError::Chain(format!(
                    "balanceOf({}) for token {} on {} failed: {}",
                    owner, token, chain, e
                ))
            })?;

        debug!(%chain, %token, %owner, %balance, "Read token balance");
        Ok(balance)
    }
}

#[async_trait]
impl TransactionSubmitter for ChainClient {
    fn sender(&self) -> Option<Address> {
        self.signer
    }

    async fn submit(
        &self,
        chain: Chain,
        transaction: PreparedTransaction,
    ) -> Result<SubmittedTransaction, AgentError> {
        let from = self.signer.ok_or_else(|| {
            AgentError::transfer_failed("no signing key configured", Vec::new())
        })?;

        let request = TransactionRequest::default()
            .from(from)
            .to(transaction.to)
            .input(transaction.data.into())
            .value(transaction.value);

        let pending = self
            .provider_for(chain)
            .send_transaction(request)
            .await
            .map_err(|e| {
                AgentError::transfer_failed(format!("broadcast on {} failed: {}", chain, e), Vec::new())
            })?;

        let hash = *pending.tx_hash();
        info!(%chain, tx_hash = %hash, "Transaction submitted");

        let receipt = pending
            .with_required_confirmations(REQUIRED_CONFIRMATIONS)
            .with_timeout(Some(self.confirmation_timeout))
            .get_receipt()
            .await
            .map_err(|e| {
                AgentError::transfer_failed(
                    format!("transaction {} on {} not confirmed: {}", hash, chain, e),
                    vec![hash.to_string()],
                )
            })?;

        let succeeded = receipt.status();
        if succeeded {
            info!(%chain, tx_hash = %hash, "Transaction confirmed");
        } else {
            warn!(%chain, tx_hash = %hash, "Transaction reverted");
        }

        Ok(SubmittedTransaction { hash, succeeded })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;
    use alloy::providers::mock::Asserter;

    fn mocked(asserter: Asserter) -> DynProvider {
        ProviderBuilder::new().connect_mocked_client(asserter).erased()
    }

    #[tokio::test]
    async fn reads_balance_from_the_requested_chain() {
        let base = Asserter::new();
        let flow = Asserter::new();
        flow.push_success(&format!("0x{:064x}", 1_234_567u64));

        let client = ChainClient::from_providers(
            mocked(base),
            mocked(flow),
            None,
            Duration::from_secs(1),
        );

        let balance = client
            .token_balance(
                Chain::Flow,
                address!("0xF1815bd50389c46847f0Bda824eC8da914045D14"),
                address!("0x1111111111111111111111111111111111111111"),
            )
            .await
            .unwrap();

        assert_eq!(balance, U256::from(1_234_567u64));
    }

    #[tokio::test]
    async fn rpc_failure_is_a_chain_error() {
        let base = Asserter::new();
        base.push_failure_msg("header not found");

        let client = ChainClient::from_providers(
            mocked(base),
            mocked(Asserter::new()),
            None,
            Duration::from_secs(1),
        );

        let err = client
            .token_balance(Chain::Base, Address::ZERO, Address::ZERO)
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::Chain(_)));
    }

    #[tokio::test]
    async fn submit_without_key_fails_before_broadcast() {
        let client = ChainClient::from_providers(
            mocked(Asserter::new()),
            mocked(Asserter::new()),
            None,
            Duration::from_secs(1),
        );

        assert_eq!(client.sender(), None);
        let err = client
            .submit(
                Chain::Base,
                PreparedTransaction {
                    to: Address::ZERO,
                    data: Default::default(),
                    value: U256::ZERO,
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::TransferFailed { transaction_hashes, .. } if transaction_hashes.is_empty()));
    }

    #[test]
    fn invalid_private_key_is_rejected() {
        let result = ChainClient::connect(
            "https://mainnet.base.org",
            "https://mainnet.evm.nodes.onflow.org",
            Some("not-a-key"),
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(AgentError::Configuration(_))));
    }
}
