//! Loyalty accounts projection.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::Serialize;
use serde_json::Value as JsonValue;

use reweave_core::CustomerId;
use reweave_events::EventEnvelope;
use reweave_promotions::{LoyaltyAccountId, LoyaltyEvent, Tier};

use super::{ProjectionError, StreamCursors};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoyaltyRow {
    pub account_id: LoyaltyAccountId,
    pub customer_id: CustomerId,
    pub points_balance: i64,
    pub lifetime_points: i64,
    pub tier: Tier,
}

/// Loyalty read model, indexed by customer for checkout point awards.
#[derive(Debug, Default)]
pub struct LoyaltyProjection {
    rows: RwLock<HashMap<LoyaltyAccountId, LoyaltyRow>>,
    by_customer: RwLock<HashMap<CustomerId, LoyaltyAccountId>>,
    cursors: StreamCursors,
}

impl LoyaltyProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, account_id: LoyaltyAccountId) -> Option<LoyaltyRow> {
        self.rows.read().ok()?.get(&account_id).cloned()
    }

    pub fn for_customer(&self, customer_id: CustomerId) -> Option<LoyaltyRow> {
        let id = *self.by_customer.read().ok()?.get(&customer_id)?;
        self.get(id)
    }

    pub fn reset(&self) {
        self.cursors.clear();
        if let Ok(mut rows) = self.rows.write() {
            rows.clear();
        }
        if let Ok(mut index) = self.by_customer.write() {
            index.clear();
        }
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), ProjectionError> {
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        if !self.cursors.check(aggregate_id, seq)? {
            return Ok(());
        }

        let event: LoyaltyEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        self.apply_event(&event);
        self.cursors.advance(aggregate_id, seq);
        Ok(())
    }

    fn apply_event(&self, event: &LoyaltyEvent) {
        match event {
            LoyaltyEvent::AccountOpened(e) => {
                let row = LoyaltyRow {
                    account_id: e.account_id,
                    customer_id: e.customer_id,
                    points_balance: 0,
                    lifetime_points: 0,
                    tier: Tier::Bronze,
                };
                if let Ok(mut index) = self.by_customer.write() {
                    index.insert(e.customer_id, e.account_id);
                }
                if let Ok(mut rows) = self.rows.write() {
                    rows.insert(e.account_id, row);
                }
            }
            LoyaltyEvent::PointsAwarded(e) => {
                self.update_row(e.account_id, |row| {
                    row.points_balance += e.points;
                    row.lifetime_points += e.points;
                    row.tier = e.new_tier;
                });
            }
            LoyaltyEvent::PointsRedeemed(e) => {
                self.update_row(e.account_id, |row| row.points_balance -= e.points);
            }
        }
    }

    fn update_row(&self, account_id: LoyaltyAccountId, f: impl FnOnce(&mut LoyaltyRow)) {
        if let Ok(mut rows) = self.rows.write() {
            if let Some(row) = rows.get_mut(&account_id) {
                f(row);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use reweave_core::AggregateId;
    use reweave_promotions::{AccountOpened, PointsAwarded, PointsRedeemed};
    use uuid::Uuid;

    fn envelope(account_id: LoyaltyAccountId, seq: u64, event: &LoyaltyEvent) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            Uuid::now_v7(),
            account_id.0,
            "promotions.loyalty",
            seq,
            serde_json::to_value(event).unwrap(),
        )
    }

    #[test]
    fn awards_and_redemptions_track_balance_and_tier() {
        let projection = LoyaltyProjection::new();
        let account_id = LoyaltyAccountId::new(AggregateId::new());
        let customer_id = CustomerId::new();

        projection
            .apply_envelope(&envelope(
                account_id,
                1,
                &LoyaltyEvent::AccountOpened(AccountOpened {
                    account_id,
                    customer_id,
                    occurred_at: Utc::now(),
                }),
            ))
            .unwrap();
        projection
            .apply_envelope(&envelope(
                account_id,
                2,
                &LoyaltyEvent::PointsAwarded(PointsAwarded {
                    account_id,
                    order_id: AggregateId::new(),
                    points: 1_200,
                    new_tier: Tier::Silver,
                    expires_at: Utc::now() + Duration::days(365),
                    occurred_at: Utc::now(),
                }),
            ))
            .unwrap();
        projection
            .apply_envelope(&envelope(
                account_id,
                3,
                &LoyaltyEvent::PointsRedeemed(PointsRedeemed {
                    account_id,
                    points: 200,
                    description: "birthday voucher".to_string(),
                    occurred_at: Utc::now(),
                }),
            ))
            .unwrap();

        let row = projection.for_customer(customer_id).unwrap();
        assert_eq!(row.points_balance, 1_000);
        assert_eq!(row.lifetime_points, 1_200);
        assert_eq!(row.tier, Tier::Silver);
    }
}
