//! Discount codes projection. Checkout resolves a typed code like
//! "SAVE10" to its aggregate id here before dispatching.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use reweave_core::Money;
use reweave_events::EventEnvelope;
use reweave_promotions::{DiscountCodeId, DiscountEvent, DiscountKind};

use super::{ProjectionError, StreamCursors};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscountRow {
    pub code_id: DiscountCodeId,
    pub code: String,
    pub kind: DiscountKind,
    pub minimum_order_amount: Option<Money>,
    pub maximum_discount_amount: Option<Money>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub usage_limit: Option<u64>,
    pub usage_count: u64,
    pub total_discounted: Money,
    pub is_active: bool,
}

#[derive(Debug, Default)]
pub struct DiscountsProjection {
    rows: RwLock<HashMap<DiscountCodeId, DiscountRow>>,
    by_code: RwLock<HashMap<String, DiscountCodeId>>,
    cursors: StreamCursors,
}

impl DiscountsProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, code_id: DiscountCodeId) -> Option<DiscountRow> {
        self.rows.read().ok()?.get(&code_id).cloned()
    }

    /// Resolve a typed code. Codes are stored uppercased, so the lookup
    /// tolerates whatever casing the shopper used.
    pub fn id_for_code(&self, code: &str) -> Option<DiscountCodeId> {
        let normalized = code.trim().to_uppercase();
        self.by_code.read().ok()?.get(&normalized).copied()
    }

    pub fn list(&self) -> Vec<DiscountRow> {
        let mut rows: Vec<_> = self
            .rows
            .read()
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();
        rows.sort_by(|a, b| a.code.cmp(&b.code));
        rows
    }

    pub fn reset(&self) {
        self.cursors.clear();
        if let Ok(mut rows) = self.rows.write() {
            rows.clear();
        }
        if let Ok(mut index) = self.by_code.write() {
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

        let event: DiscountEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        self.apply_event(&event);
        self.cursors.advance(aggregate_id, seq);
        Ok(())
    }

    fn apply_event(&self, event: &DiscountEvent) {
        match event {
            DiscountEvent::CodeCreated(e) => {
                let row = DiscountRow {
                    code_id: e.code_id,
                    code: e.code.clone(),
                    kind: e.kind,
                    minimum_order_amount: e.minimum_order_amount,
                    maximum_discount_amount: e.maximum_discount_amount,
                    starts_at: e.starts_at,
                    ends_at: e.ends_at,
                    usage_limit: e.usage_limit,
                    usage_count: 0,
                    total_discounted: Money::ZERO,
                    is_active: true,
                };
                if let Ok(mut index) = self.by_code.write() {
                    index.insert(e.code.clone(), e.code_id);
                }
                if let Ok(mut rows) = self.rows.write() {
                    rows.insert(e.code_id, row);
                }
            }
            DiscountEvent::CodeRedeemed(e) => {
                self.update_row(e.code_id, |row| {
                    row.usage_count += 1;
                    row.total_discounted = row.total_discounted + e.amount;
                });
            }
            DiscountEvent::CodeDeactivated(e) => {
                self.update_row(e.code_id, |row| row.is_active = false);
            }
        }
    }

    fn update_row(&self, code_id: DiscountCodeId, f: impl FnOnce(&mut DiscountRow)) {
        if let Ok(mut rows) = self.rows.write() {
            if let Some(row) = rows.get_mut(&code_id) {
                f(row);
            }
        }
    }
}
