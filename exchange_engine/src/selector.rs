//! The Rate & Account Selector.
//!
//! A pure mapping from a signed IDR amount plus the current rate card, tier limits and bank-account
//! rows to a charge, a tier and the set of payout accounts to quote. No store access happens here;
//! callers fetch the rows and persist the result through the lifecycle engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use xge_common::{Idr, Rub};

use crate::db_types::{BankAccount, RateLimits, RateTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorConfig {
    /// Absolute bound on the requested amount, either direction.
    pub max_abs_idr: Idr,
    /// Minimum accepted size for positive (client-pays) transfers.
    pub min_transfer_idr: Idr,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self { max_abs_idr: Idr::from(999_999_999), min_transfer_idr: Idr::from(600_000) }
    }
}

/// The rate band a quote priced in. `Refund` marks negative amounts, priced at the back-rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tier {
    Refund,
    Tier1,
    Tier2,
    Tier3,
    Tier4,
    Top,
}

impl Tier {
    /// Index into [`RateTable::tier_rates`] for positive-amount tiers.
    pub fn rate_index(&self) -> Option<usize> {
        match self {
            Tier::Refund => None,
            Tier::Tier1 => Some(0),
            Tier::Tier2 => Some(1),
            Tier::Tier3 => Some(2),
            Tier::Tier4 => Some(3),
            Tier::Top => Some(4),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub idr_amount: Idr,
    pub used_rate: f64,
    pub tier: Tier,
    /// Rounded to the nearest whole rouble, half away from zero; carries the sign of the amount.
    pub rub_amount: Rub,
    pub eligible_accounts: Vec<BankAccount>,
    pub uses_special_accounts: bool,
}

impl Quote {
    pub fn is_refund(&self) -> bool {
        self.idr_amount.is_refund()
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QuoteError {
    #[error("Amount {amount} is outside the allowed range of ±{max_abs}")]
    AmountOutOfBounds { amount: Idr, max_abs: Idr },
    #[error("Transfers below {minimum} are not accepted (requested {amount})")]
    BelowMinimumTransfer { amount: Idr, minimum: Idr },
}

/// Computes a quote for a signed IDR amount.
///
/// Positive amounts are assigned to the first tier whose RUB limit, converted to IDR *at that
/// tier's own rate*, the amount does not exceed; beyond all four limits the top rate applies.
/// Negative amounts always price at the back-rate against the actual (non-special) accounts.
pub fn quote(
    amount: Idr,
    rates: &RateTable,
    limits: &RateLimits,
    accounts: &[BankAccount],
    config: &SelectorConfig,
) -> Result<Quote, QuoteError> {
    if amount.abs() > config.max_abs_idr {
        return Err(QuoteError::AmountOutOfBounds { amount, max_abs: config.max_abs_idr });
    }
    if !amount.is_refund() && amount < config.min_transfer_idr {
        return Err(QuoteError::BelowMinimumTransfer { amount, minimum: config.min_transfer_idr });
    }

    if amount.is_refund() {
        let used_rate = rates.rate_back;
        let rub_amount = Rub::from(-round_rub(amount.abs(), used_rate));
        let eligible_accounts = filter_accounts(accounts, false);
        return Ok(Quote {
            idr_amount: amount,
            used_rate,
            tier: Tier::Refund,
            rub_amount,
            eligible_accounts,
            uses_special_accounts: false,
        });
    }

    let tier_rates = rates.tier_rates();
    let bounds = limits.bounds();
    let mut tier = Tier::Top;
    let mut used_rate = tier_rates[4];
    for (i, (bound, rate)) in bounds.iter().zip(tier_rates.iter()).enumerate() {
        let boundary_idr = bound.value() as f64 * rate;
        if amount.value() as f64 <= boundary_idr {
            tier = [Tier::Tier1, Tier::Tier2, Tier::Tier3, Tier::Tier4][i];
            used_rate = *rate;
            break;
        }
    }

    let rub_amount = Rub::from(round_rub(amount, used_rate));
    let uses_special_accounts = rub_amount >= rates.special_threshold;
    let eligible_accounts = filter_accounts(accounts, uses_special_accounts);
    Ok(Quote { idr_amount: amount, used_rate, tier, rub_amount, eligible_accounts, uses_special_accounts })
}

fn round_rub(amount: Idr, rate: f64) -> i64 {
    (amount.value() as f64 / rate).round() as i64
}

fn filter_accounts(accounts: &[BankAccount], special: bool) -> Vec<BankAccount> {
    accounts
        .iter()
        .filter(|a| a.is_active && if special { a.is_special } else { a.is_actual })
        .cloned()
        .collect()
}
