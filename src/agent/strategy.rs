//! Rebalance policy.
//!
//! The act/no-act boundary lives here and nowhere else. Both functions compare
//! only the primary asset: with two assets the counterpart's delta is the
//! negation of the primary's, so a second comparison adds nothing.

use rust_decimal::Decimal;
use tracing::debug;

use crate::agent::types::{Allocation, Asset, TradeAction};

/// Returns true when the portfolio should be rebalanced towards `target`.
pub fn should_rebalance(
    current: &Allocation,
    target: &Allocation,
    threshold: Decimal,
    force: bool,
) -> bool {
    if force {
        return true;
    }

    primary_delta(current, target).abs() > threshold
}

/// Derives the trades that move `current` towards `target`.
///
/// Produces an empty list exactly when [`should_rebalance`] (unforced) returns
/// false. The single action's `amount_fraction` is the absolute delta.
pub fn derive_trade_actions(
    current: &Allocation,
    target: &Allocation,
    threshold: Decimal,
) -> Vec<TradeAction> {
    let delta = primary_delta(current, target);

    if delta.abs() <= threshold {
        debug!(
            "Allocation delta {} within threshold {}, no action",
            delta, threshold
        );
        return Vec::new();
    }

    let (from, to) = if delta > Decimal::ZERO {
        (Asset::PRIMARY.counterpart(), Asset::PRIMARY)
    } else {
        (Asset::PRIMARY, Asset::PRIMARY.counterpart())
    };

    vec![TradeAction {
        from,
        to,
        amount_fraction: delta.abs(),
        source_chain: from.home_chain(),
        destination_chain: to.home_chain(),
    }]
}

fn primary_delta(current: &Allocation, target: &Allocation) -> Decimal {
    target.share(Asset::PRIMARY) - current.share(Asset::PRIMARY)
}
