//! Allocation arithmetic over raw on-chain balances.
//!
//! Balances arrive as `U256` amounts in each token's smallest unit. Fractions
//! are computed with `rust_decimal` so trade decisions near the threshold
//! boundary never depend on binary floating point rounding.

use alloy::primitives::U256;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::agent::types::{AgentError, Allocation};

/// Maximum deviation from 1.0 tolerated before a recommendation is
/// renormalized.
pub const ALLOCATION_TOLERANCE: Decimal = dec!(0.01);

// Leaves one bit of headroom below the 96-bit decimal mantissa so the sum of
// two converted balances cannot overflow.
const DECIMAL_SAFE_BITS: usize = 95;

/// Converts two balances into a normalized allocation.
///
/// An empty wallet yields [`Allocation::ZERO`] rather than dividing by zero.
/// The USDC share is derived as `1 - eurc`, so non-empty allocations sum to
/// exactly one.
pub fn compute_allocation(balance_eurc: U256, balance_usdc: U256) -> Allocation {
    if balance_eurc.is_zero() && balance_usdc.is_zero() {
        return Allocation::ZERO;
    }

    let (eurc, usdc) = to_decimal_pair(balance_eurc, balance_usdc);
    let eurc_share = eurc / (eurc + usdc);

    Allocation::new(eurc_share, Decimal::ONE - eurc_share)
}

/// Applies a fraction in [0,1] to a balance using integer arithmetic,
/// rounding down to the token's smallest unit.
pub fn apply_fraction(balance: U256, fraction: Decimal) -> U256 {
    if fraction <= Decimal::ZERO || balance.is_zero() {
        return U256::ZERO;
    }
    if fraction >= Decimal::ONE {
        return balance;
    }

    let fraction = fraction.normalize();
    let numerator = U256::from(fraction.mantissa().unsigned_abs());
    let denominator = U256::from(10u64).pow(U256::from(fraction.scale()));

    match balance.checked_mul(numerator) {
        Some(product) => product / denominator,
        None => (balance / denominator) * numerator,
    }
}

/// Validates a pair of fractions and renormalizes them when their sum is
/// outside [`ALLOCATION_TOLERANCE`]. Upstream advisors are allowed to be
/// slightly inconsistent; the ratio between the two values is preserved.
pub fn normalize_fractions(eurc: Decimal, usdc: Decimal) -> Result<Allocation, AgentError> {
    if eurc < Decimal::ZERO || usdc < Decimal::ZERO {
        return Err(AgentError::MalformedRecommendation(format!(
            "negative allocation (EURC {}, USDC {})",
            eurc, usdc
        )));
    }

    let total = eurc + usdc;
    if total.is_zero() {
        return Err(AgentError::MalformedRecommendation(
            "allocation sums to zero".to_string(),
        ));
    }

    if (total - Decimal::ONE).abs() > ALLOCATION_TOLERANCE {
        let eurc_share = eurc / total;
        return Ok(Allocation::new(eurc_share, Decimal::ONE - eurc_share));
    }

    Ok(Allocation::new(eurc, usdc))
}

fn to_decimal_pair(a: U256, b: U256) -> (Decimal, Decimal) {
    let bits = a.bit_len().max(b.bit_len());
    let shift = bits.saturating_sub(DECIMAL_SAFE_BITS);
    (to_decimal(a >> shift), to_decimal(b >> shift))
}

fn to_decimal(value: U256) -> Decimal {
    let raw = u128::try_from(value).unwrap_or(u128::MAX);
    Decimal::try_from_i128_with_scale(raw as i128, 0).unwrap_or(Decimal::MAX)
}
