//! Monetary amounts in integer sen (MYR cents).
//!
//! The storefront prices everything in Malaysian Ringgit. Keeping amounts as
//! integer cents makes the order-total invariant
//! (`total == subtotal - discount + tax + shipping`) exact with no float drift.

use serde::{Deserialize, Serialize};

/// An amount of money in sen (1/100 MYR). May be negative for deltas.
#[derive(
    Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Construct from whole ringgit (e.g. `Money::from_major(200)` == RM200.00).
    pub const fn from_major(major: i64) -> Self {
        Self(major * 100)
    }

    pub fn cents(self) -> i64 {
        self.0
    }

    /// Whole-ringgit part, floored. Loyalty points are computed from this.
    pub fn major_floor(self) -> i64 {
        self.0.div_euclid(100)
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// A percentage of this amount, rounded half-up to the nearest cent.
    pub fn percentage(self, percent: f64) -> Money {
        let raw = (self.0 as f64) * percent / 100.0;
        Money(raw.round() as i64)
    }

    pub fn min(self, other: Money) -> Money {
        Money(self.0.min(other.0))
    }

    pub fn saturating_sub_to_zero(self, other: Money) -> Money {
        Money((self.0 - other.0).max(0))
    }
}

impl core::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl core::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl core::ops::Mul<i64> for Money {
    type Output = Money;

    fn mul(self, rhs: i64) -> Money {
        Money(self.0 * rhs)
    }
}

impl core::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, |acc, m| acc + m)
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.abs();
        write!(f, "{sign}RM{}.{:02}", abs / 100, abs % 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_rounds_half_up_to_cents() {
        // 6% of RM94.00 = RM5.64
        assert_eq!(Money::from_cents(9400).percentage(6.0), Money::from_cents(564));
        // 10% of RM0.05 = 0.5 cent, rounds to 1 cent
        assert_eq!(Money::from_cents(5).percentage(10.0), Money::from_cents(1));
    }

    #[test]
    fn major_floor_truncates_cents() {
        assert_eq!(Money::from_cents(19999).major_floor(), 199);
        assert_eq!(Money::from_cents(100).major_floor(), 1);
        assert_eq!(Money::from_cents(99).major_floor(), 0);
    }

    #[test]
    fn display_formats_ringgit() {
        assert_eq!(Money::from_cents(1500).to_string(), "RM15.00");
        assert_eq!(Money::from_cents(-205).to_string(), "-RM2.05");
    }

    #[test]
    fn sum_and_arithmetic() {
        let items = [Money::from_cents(5000), Money::from_cents(5000)];
        let subtotal: Money = items.iter().copied().sum();
        assert_eq!(subtotal, Money::from_major(100));
        assert_eq!(subtotal - Money::from_cents(500) + Money::from_cents(600), Money::from_cents(10100));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn add_then_sub_is_identity(a in -1_000_000i64..1_000_000, b in -1_000_000i64..1_000_000) {
                let a = Money::from_cents(a);
                let b = Money::from_cents(b);
                prop_assert_eq!(a + b - b, a);
            }

            #[test]
            fn saturating_sub_never_goes_negative(a in 0i64..1_000_000, b in 0i64..1_000_000) {
                let result = Money::from_cents(a).saturating_sub_to_zero(Money::from_cents(b));
                prop_assert!(!result.is_negative());
            }

            #[test]
            fn percentage_stays_within_the_amount(cents in 0i64..10_000_000, pct in 0.0f64..100.0) {
                let amount = Money::from_cents(cents);
                let part = amount.percentage(pct);
                prop_assert!(part.cents() >= 0);
                // Half-up rounding can exceed the exact share by at most one sen.
                prop_assert!(part.cents() <= amount.cents() + 1);
            }
        }
    }
}
