//! Preorder batches projection.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use reweave_events::EventEnvelope;
use reweave_products::{BatchStatus, PreorderBatchId, PreorderEvent, ProductId};

use super::{ProjectionError, StreamCursors};

/// Slot counters and window for one production run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreorderBatchRow {
    pub batch_id: PreorderBatchId,
    pub product_id: ProductId,
    pub status: BatchStatus,
    pub total_slots: i64,
    pub reserved_slots: i64,
    pub sold_slots: i64,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub expected_delivery: DateTime<Utc>,
}

impl PreorderBatchRow {
    pub fn available_slots(&self) -> i64 {
        self.total_slots - self.reserved_slots - self.sold_slots
    }

    pub fn is_taking_orders(&self, now: DateTime<Utc>) -> bool {
        self.status == BatchStatus::Active && now >= self.starts_at && now <= self.ends_at
    }
}

/// Batch read model, indexed by product for the checkout path.
#[derive(Debug, Default)]
pub struct PreorderBatchesProjection {
    rows: RwLock<HashMap<PreorderBatchId, PreorderBatchRow>>,
    by_product: RwLock<HashMap<ProductId, Vec<PreorderBatchId>>>,
    cursors: StreamCursors,
}

impl PreorderBatchesProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, batch_id: PreorderBatchId) -> Option<PreorderBatchRow> {
        self.rows.read().ok()?.get(&batch_id).cloned()
    }

    pub fn list(&self) -> Vec<PreorderBatchRow> {
        let mut rows: Vec<_> = self
            .rows
            .read()
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();
        rows.sort_by_key(|r| r.starts_at);
        rows
    }

    pub fn list_for_product(&self, product_id: ProductId) -> Vec<PreorderBatchRow> {
        let ids = self
            .by_product
            .read()
            .ok()
            .and_then(|m| m.get(&product_id).cloned())
            .unwrap_or_default();
        ids.into_iter().filter_map(|id| self.get(id)).collect()
    }

    /// The batch currently taking orders for a product, if any.
    pub fn active_for_product(
        &self,
        product_id: ProductId,
        now: DateTime<Utc>,
    ) -> Option<PreorderBatchRow> {
        self.list_for_product(product_id)
            .into_iter()
            .find(|row| row.is_taking_orders(now))
    }

    pub fn reset(&self) {
        self.cursors.clear();
        if let Ok(mut rows) = self.rows.write() {
            rows.clear();
        }
        if let Ok(mut index) = self.by_product.write() {
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

        let event: PreorderEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        self.apply_event(&event);
        self.cursors.advance(aggregate_id, seq);
        Ok(())
    }

    fn apply_event(&self, event: &PreorderEvent) {
        match event {
            PreorderEvent::BatchOpened(e) => {
                let row = PreorderBatchRow {
                    batch_id: e.batch_id,
                    product_id: e.product_id,
                    status: BatchStatus::Active,
                    total_slots: e.total_slots,
                    reserved_slots: 0,
                    sold_slots: 0,
                    starts_at: e.starts_at,
                    ends_at: e.ends_at,
                    expected_delivery: e.expected_delivery,
                };
                if let Ok(mut index) = self.by_product.write() {
                    index.entry(e.product_id).or_default().push(e.batch_id);
                }
                if let Ok(mut rows) = self.rows.write() {
                    rows.insert(e.batch_id, row);
                }
            }
            PreorderEvent::SlotsReserved(e) => {
                self.update_row(e.batch_id, |row| row.reserved_slots += e.quantity);
            }
            PreorderEvent::SlotsReleased(e) => {
                self.update_row(e.batch_id, |row| row.reserved_slots -= e.quantity);
            }
            PreorderEvent::SlotsSold(e) => {
                self.update_row(e.batch_id, |row| {
                    row.reserved_slots -= e.quantity;
                    row.sold_slots += e.quantity;
                });
            }
            PreorderEvent::BatchClosed(e) => {
                self.update_row(e.batch_id, |row| row.status = BatchStatus::Closed);
            }
            PreorderEvent::BatchCancelled(e) => {
                self.update_row(e.batch_id, |row| row.status = BatchStatus::Cancelled);
            }
            PreorderEvent::BatchDelivered(e) => {
                self.update_row(e.batch_id, |row| row.status = BatchStatus::Delivered);
            }
        }
    }

    fn update_row(&self, batch_id: PreorderBatchId, f: impl FnOnce(&mut PreorderBatchRow)) {
        if let Ok(mut rows) = self.rows.write() {
            if let Some(row) = rows.get_mut(&batch_id) {
                f(row);
            }
        }
    }
}
