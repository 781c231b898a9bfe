//! Stage sizing
//!
//! Pure mapping from the valuation discount and available budget to an
//! allocation amount. Band tables come from configuration and are validated
//! for monotonicity at load time, so lookup here never re-checks them.

use crate::config::SizingBand;
use rust_decimal::Decimal;

/// Fractional gap between fair value and price; positive means undervalued
pub fn discount_rate(fair_value: Decimal, current_price: Decimal) -> Decimal {
    if fair_value <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    (fair_value - current_price) / fair_value
}

/// Gating inputs for stages beyond the first
#[derive(Debug, Clone, Copy)]
pub struct StageGate {
    /// Stage slot about to be opened, 1-based
    pub stage_number: u8,
    /// Cooldown and pullback check for this slot
    pub reentry_allowed: bool,
    /// Stage N requires stage N-1 open; stages are never skipped
    pub previous_stage_open: bool,
}

impl StageGate {
    /// Gate for the initial stage, which has no predecessor
    pub fn first_stage() -> Self {
        Self {
            stage_number: 1,
            reentry_allowed: true,
            previous_stage_open: true,
        }
    }

    fn passes(&self) -> bool {
        self.stage_number == 1 || (self.reentry_allowed && self.previous_stage_open)
    }
}

/// Allocation amount for one stage
///
/// Zero at or below 0% discount, zero when the stage gate fails, otherwise
/// the matched band's fraction of budget, clamped to the available budget.
pub fn size_for_stage(
    bands: &[SizingBand],
    discount: Decimal,
    available_budget: Decimal,
    gate: &StageGate,
) -> Decimal {
    if available_budget <= Decimal::ZERO || discount <= Decimal::ZERO || !gate.passes() {
        return Decimal::ZERO;
    }

    let fraction = bands
        .iter()
        .find(|band| discount >= band.min_discount)
        .map(|band| band.budget_fraction)
        .unwrap_or(Decimal::ZERO);

    (available_budget * fraction).min(available_budget)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SizingBand;
    use rust_decimal_macros::dec;

    fn default_bands() -> Vec<SizingBand> {
        vec![
            SizingBand {
                min_discount: dec!(0.50),
                budget_fraction: dec!(0.40),
            },
            SizingBand {
                min_discount: dec!(0.30),
                budget_fraction: dec!(0.25),
            },
            SizingBand {
                min_discount: dec!(0.10),
                budget_fraction: dec!(0.15),
            },
            SizingBand {
                min_discount: dec!(0),
                budget_fraction: dec!(0.05),
            },
        ]
    }

    #[test]
    fn test_discount_rate() {
        // fair value 82000, price 75000 -> ~8.54%
        let rate = discount_rate(dec!(82000), dec!(75000));
        assert!(rate > dec!(0.085) && rate < dec!(0.086));
    }

    #[test]
    fn test_discount_rate_overvalued_is_negative() {
        assert!(discount_rate(dec!(70000), dec!(80000)) < dec!(0));
    }

    #[test]
    fn test_discount_rate_zero_fair_value() {
        assert_eq!(discount_rate(dec!(0), dec!(75000)), dec!(0));
    }

    #[test]
    fn test_low_band_allocation() {
        // Scenario: 8.54% discount falls in the 0-10% band -> 5% of budget
        let discount = discount_rate(dec!(82000), dec!(75000));
        let size = size_for_stage(
            &default_bands(),
            discount,
            dec!(1000000),
            &StageGate::first_stage(),
        );
        assert_eq!(size, dec!(50000));
    }

    #[test]
    fn test_deep_discount_allocates_largest_fraction() {
        let size = size_for_stage(
            &default_bands(),
            dec!(0.55),
            dec!(1000000),
            &StageGate::first_stage(),
        );
        assert_eq!(size, dec!(400000));
    }

    #[test]
    fn test_zero_at_or_below_zero_discount() {
        let gate = StageGate::first_stage();
        assert_eq!(size_for_stage(&default_bands(), dec!(0), dec!(1000000), &gate), dec!(0));
        assert_eq!(
            size_for_stage(&default_bands(), dec!(-0.10), dec!(1000000), &gate),
            dec!(0)
        );
    }

    #[test]
    fn test_monotone_in_discount() {
        let gate = StageGate::first_stage();
        let budget = dec!(1000000);
        let mut last = Decimal::MAX;
        for discount in [
            dec!(0.60),
            dec!(0.50),
            dec!(0.35),
            dec!(0.30),
            dec!(0.12),
            dec!(0.10),
            dec!(0.05),
            dec!(0.001),
            dec!(0),
            dec!(-0.20),
        ] {
            let size = size_for_stage(&default_bands(), discount, budget, &gate);
            assert!(size <= last, "allocation grew as discount shrank at {discount}");
            last = size;
        }
    }

    #[test]
    fn test_allocation_never_negative() {
        let gate = StageGate::first_stage();
        for discount in [dec!(-0.50), dec!(0), dec!(0.05), dec!(0.30), dec!(0.80)] {
            for budget in [dec!(0), dec!(1), dec!(1000000)] {
                let size = size_for_stage(&default_bands(), discount, budget, &gate);
                assert!(size >= dec!(0), "negative allocation at {discount}/{budget}");
            }
        }
    }

    #[test]
    fn test_later_stage_requires_reentry_allowed() {
        let gate = StageGate {
            stage_number: 2,
            reentry_allowed: false,
            previous_stage_open: true,
        };
        assert_eq!(
            size_for_stage(&default_bands(), dec!(0.55), dec!(1000000), &gate),
            dec!(0)
        );
    }

    #[test]
    fn test_later_stage_requires_previous_open() {
        let gate = StageGate {
            stage_number: 3,
            reentry_allowed: true,
            previous_stage_open: false,
        };
        assert_eq!(
            size_for_stage(&default_bands(), dec!(0.55), dec!(1000000), &gate),
            dec!(0)
        );
    }

    #[test]
    fn test_never_exceeds_available_budget() {
        let bands = vec![SizingBand {
            min_discount: dec!(0),
            budget_fraction: dec!(1.0),
        }];
        let size = size_for_stage(&bands, dec!(0.50), dec!(5000), &StageGate::first_stage());
        assert_eq!(size, dec!(5000));
    }

    #[test]
    fn test_zero_budget_yields_zero() {
        assert_eq!(
            size_for_stage(&default_bands(), dec!(0.50), dec!(0), &StageGate::first_stage()),
            dec!(0)
        );
    }
}
