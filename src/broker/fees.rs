//! Deterministic trading fee function
//!
//! Commission applies to both sides, transaction tax to sells only. Rates
//! are configuration; the function itself is pure.

use crate::config::FeeConfig;
use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy)]
pub struct FeeSchedule {
    commission_rate: Decimal,
    sell_tax_rate: Decimal,
}

impl FeeSchedule {
    pub fn new(commission_rate: Decimal, sell_tax_rate: Decimal) -> Self {
        Self {
            commission_rate,
            sell_tax_rate,
        }
    }

    pub fn from_config(config: &FeeConfig) -> Self {
        Self::new(config.commission_rate, config.sell_tax_rate)
    }

    /// Total fees for a trade at `price` x `quantity`
    pub fn fees(&self, price: Decimal, quantity: u64, is_buy: bool) -> Decimal {
        let notional = price * Decimal::from(quantity);
        let mut total = notional * self.commission_rate;
        if !is_buy {
            total += notional * self.sell_tax_rate;
        }
        total
    }
}
