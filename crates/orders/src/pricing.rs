//! Order pricing rules.
//!
//! Tax is Malaysian SST at 6%, charged on the discounted subtotal. Shipping
//! is a flat fee per method, waived once the discounted subtotal reaches
//! RM200.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use reweave_core::Money;

/// Sales and Service Tax rate, percent.
pub const SST_RATE_PERCENT: f64 = 6.0;

/// Discounted-subtotal threshold above which shipping is free.
pub const FREE_SHIPPING_THRESHOLD: Money = Money::from_cents(20_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShippingMethod {
    Standard,
    Express,
    Overnight,
}

impl ShippingMethod {
    pub fn flat_fee(self) -> Money {
        match self {
            ShippingMethod::Standard => Money::from_cents(1_500),
            ShippingMethod::Express => Money::from_cents(2_500),
            ShippingMethod::Overnight => Money::from_cents(3_500),
        }
    }

    pub fn delivery_days(self) -> i64 {
        match self {
            ShippingMethod::Standard => 5,
            ShippingMethod::Express => 2,
            ShippingMethod::Overnight => 1,
        }
    }
}

/// The complete money column set of an order, computed once at checkout and
/// stored as a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingBreakdown {
    pub subtotal: Money,
    pub discount: Money,
    pub tax: Money,
    pub shipping: Money,
    pub total: Money,
}

impl PricingBreakdown {
    pub fn compute(subtotal: Money, discount: Money, method: ShippingMethod) -> Self {
        let discounted = subtotal.saturating_sub_to_zero(discount);
        let tax = sst(discounted);
        let shipping = shipping_fee(method, discounted);
        Self {
            subtotal,
            discount,
            tax,
            shipping,
            total: discounted + tax + shipping,
        }
    }

    /// `total == subtotal - discount + tax + shipping`, with the discount
    /// clamped to the subtotal.
    pub fn is_consistent(&self) -> bool {
        self.subtotal.saturating_sub_to_zero(self.discount) + self.tax + self.shipping
            == self.total
    }
}

/// SST on a discounted subtotal, rounded half-up to the sen.
pub fn sst(discounted_subtotal: Money) -> Money {
    discounted_subtotal.percentage(SST_RATE_PERCENT)
}

pub fn shipping_fee(method: ShippingMethod, discounted_subtotal: Money) -> Money {
    if discounted_subtotal >= FREE_SHIPPING_THRESHOLD {
        Money::ZERO
    } else {
        method.flat_fee()
    }
}

/// Estimated delivery date. Preorder items override the shipping method
/// with the production lead time.
pub fn estimated_delivery(
    now: DateTime<Utc>,
    method: ShippingMethod,
    has_preorder_items: bool,
) -> DateTime<Utc> {
    if has_preorder_items {
        now + Duration::days(45)
    } else {
        now + Duration::days(method.delivery_days())
    }
}

/// Human-facing order number: `RW-<yyyymmdd>-<6 hex>`.
pub fn generate_order_number(now: DateTime<Utc>) -> String {
    let uuid = Uuid::now_v7().simple().to_string();
    // The tail of a v7 UUID is random.
    let suffix = uuid[uuid.len() - 6..].to_uppercase();
    format!("RW-{}-{}", now.format("%Y%m%d"), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sst_is_six_percent_rounded_to_sen() {
        assert_eq!(sst(Money::from_cents(10_000)), Money::from_cents(600));
        // 6% of RM0.99 is 5.94 sen, rounds to 6.
        assert_eq!(sst(Money::from_cents(99)), Money::from_cents(6));
        assert_eq!(sst(Money::ZERO), Money::ZERO);
    }

    #[test]
    fn shipping_is_free_from_rm200() {
        assert_eq!(
            shipping_fee(ShippingMethod::Standard, Money::from_cents(19_999)),
            Money::from_cents(1_500)
        );
        assert_eq!(
            shipping_fee(ShippingMethod::Standard, Money::from_cents(20_000)),
            Money::ZERO
        );
        assert_eq!(
            shipping_fee(ShippingMethod::Overnight, Money::from_cents(50_000)),
            Money::ZERO
        );
    }

    #[test]
    fn breakdown_holds_the_total_equation() {
        let b = PricingBreakdown::compute(
            Money::from_cents(15_000),
            Money::from_cents(1_500),
            ShippingMethod::Express,
        );
        assert_eq!(b.tax, Money::from_cents(810));
        assert_eq!(b.shipping, Money::from_cents(2_500));
        assert_eq!(b.total, Money::from_cents(16_810));
        assert!(b.is_consistent());
    }

    #[test]
    fn discount_beyond_subtotal_clamps_to_zero() {
        let b = PricingBreakdown::compute(
            Money::from_cents(1_000),
            Money::from_cents(5_000),
            ShippingMethod::Standard,
        );
        assert_eq!(b.tax, Money::ZERO);
        assert_eq!(b.total, Money::from_cents(1_500));
        assert!(b.is_consistent());
    }

    #[test]
    fn preorder_overrides_delivery_estimate() {
        let now = Utc::now();
        assert_eq!(
            estimated_delivery(now, ShippingMethod::Overnight, true),
            now + Duration::days(45)
        );
        assert_eq!(
            estimated_delivery(now, ShippingMethod::Express, false),
            now + Duration::days(2)
        );
    }

    #[test]
    fn order_numbers_carry_the_date_and_differ() {
        let now = Utc::now();
        let a = generate_order_number(now);
        let b = generate_order_number(now);
        assert!(a.starts_with(&format!("RW-{}-", now.format("%Y%m%d"))));
        assert_eq!(a.len(), "RW-".len() + 8 + 1 + 6);
        assert_ne!(a, b);
    }
}
