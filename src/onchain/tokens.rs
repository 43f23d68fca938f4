use alloy::primitives::{Address, address};

use crate::agent::types::{Asset, Chain};

/// EURC on Base.
pub const EURC_BASE: Address = address!("0x60a3E35Cc302bFA44Cb288Bc5a4F316Fdb1adb42");
/// Stargate-bridged USDC on Flow EVM.
pub const USDC_FLOW: Address = address!("0xF1815bd50389c46847f0Bda824eC8da914045D14");

/// Token contract per asset, each on the asset's home chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenRegistry {
    eurc: Address,
    usdc: Address,
}

impl Default for TokenRegistry {
    fn default() -> Self {
        Self {
            eurc: EURC_BASE,
            usdc: USDC_FLOW,
        }
    }
}

impl TokenRegistry {
    pub fn new(eurc: Address, usdc: Address) -> Self {
        Self { eurc, usdc }
    }

    pub fn address(&self, asset: Asset) -> Address {
        match asset {
            Asset::Eurc => self.eurc,
            Asset::Usdc => self.usdc,
        }
    }

    pub fn location(&self, asset: Asset) -> (Chain, Address) {
        (asset.home_chain(), self.address(asset))
    }
}
