//! Bank fee and tax calculation.
//!
//! Pure functions only: the same gross amount, method and configuration always give the
//! same breakdown, and `net` is computed as `gross - bank_fee - tax_amount` so the three
//! parts add back up to the gross amount.

use crate::{
    config::rates::{FeeTable, TaxConfig},
    entities::PaymentMethod,
};
use serde::Serialize;

/// Result of splitting a gross payment into fee, tax and net
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeeBreakdown {
    /// Withheld by the bank or POS provider
    pub bank_fee: f64,
    /// Company tax on the gross amount
    pub tax_amount: f64,
    /// What the school keeps
    pub net: f64,
}

/// Fee rate for a payment method. Cash is free; card payments use the rate of their
/// network, `None` when that network has no configured rate.
#[must_use]
pub fn fee_rate(
    method: PaymentMethod,
    card_network: Option<&str>,
    fees: &FeeTable,
) -> Option<f64> {
    match method {
        PaymentMethod::Cash => Some(0.0),
        PaymentMethod::Qr => Some(fees.qr_base_rate),
        PaymentMethod::Card => fees.pos_rate(card_network),
    }
}

/// Computes bank fee, tax and net for a gross amount.
///
/// A card network without a configured rate is charged no fee; callers decide whether to
/// report it.
#[must_use]
pub fn compute_fees(
    gross: f64,
    method: PaymentMethod,
    card_network: Option<&str>,
    fees: &FeeTable,
    tax: &TaxConfig,
) -> FeeBreakdown {
    let bank_fee = gross * fee_rate(method, card_network, fees).unwrap_or(0.0);
    let tax_amount = gross * tax.company_tax_rate;
    FeeBreakdown {
        bank_fee,
        tax_amount,
        net: gross - bank_fee - tax_amount,
    }
}
