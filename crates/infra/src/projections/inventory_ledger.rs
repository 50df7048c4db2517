//! Inventory ledger projection: stock levels plus the movement trail.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use reweave_core::AggregateId;
use reweave_events::EventEnvelope;
use reweave_inventory::{MovementSource, StockEvent, StockRecordId};

use super::{ProjectionError, StreamCursors};

/// Current counters of one stock record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockLevelRow {
    pub record_id: StockRecordId,
    pub product_id: AggregateId,
    pub variant_id: Option<AggregateId>,
    pub available: i64,
    pub reserved: i64,
    pub committed: i64,
    pub low_stock_threshold: i64,
    pub reorder_point: i64,
}

impl StockLevelRow {
    pub fn free(&self) -> i64 {
        self.available - self.reserved - self.committed
    }

    pub fn is_low_stock(&self) -> bool {
        self.free() <= self.low_stock_threshold
    }
}

/// Movement categories shown in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    Reserve,
    Release,
    Sale,
    Adjustment,
}

/// One entry in a record's movement trail, newest last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MovementRow {
    pub record_id: StockRecordId,
    pub kind: MovementKind,
    pub quantity: i64,
    pub previous_free: i64,
    pub new_free: i64,
    pub source: MovementSource,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Inventory read model.
///
/// Indexes levels by record id and by `(product, variant)` so checkout can
/// resolve the stock record for a cart line whether or not the line names a
/// variant: an exact variant match wins, a product-level record is the
/// fallback.
#[derive(Debug, Default)]
pub struct InventoryLedgerProjection {
    levels: RwLock<HashMap<StockRecordId, StockLevelRow>>,
    by_product: RwLock<HashMap<(AggregateId, Option<AggregateId>), StockRecordId>>,
    movements: RwLock<HashMap<StockRecordId, Vec<MovementRow>>>,
    cursors: StreamCursors,
}

impl InventoryLedgerProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(&self, record_id: StockRecordId) -> Option<StockLevelRow> {
        self.levels.read().ok()?.get(&record_id).cloned()
    }

    /// Free-to-promise quantity, zero for an unknown record.
    pub fn free(&self, record_id: StockRecordId) -> i64 {
        self.level(record_id).map(|l| l.free()).unwrap_or(0)
    }

    /// Resolve the stock record tracking a product (and optionally one of
    /// its variants). A variant-specific record takes precedence over a
    /// record covering the whole product.
    pub fn record_for(
        &self,
        product_id: AggregateId,
        variant_id: Option<AggregateId>,
    ) -> Option<StockRecordId> {
        let index = self.by_product.read().ok()?;
        if variant_id.is_some() {
            if let Some(id) = index.get(&(product_id, variant_id)) {
                return Some(*id);
            }
        }
        index.get(&(product_id, None)).copied()
    }

    pub fn list_levels(&self) -> Vec<StockLevelRow> {
        self.levels
            .read()
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn low_stock(&self) -> Vec<StockLevelRow> {
        let mut rows: Vec<_> = self
            .list_levels()
            .into_iter()
            .filter(StockLevelRow::is_low_stock)
            .collect();
        rows.sort_by_key(StockLevelRow::free);
        rows
    }

    /// Movement trail for a record, in event order.
    pub fn movements(&self, record_id: StockRecordId) -> Vec<MovementRow> {
        self.movements
            .read()
            .ok()
            .and_then(|m| m.get(&record_id).cloned())
            .unwrap_or_default()
    }

    pub fn reset(&self) {
        self.cursors.clear();
        if let Ok(mut levels) = self.levels.write() {
            levels.clear();
        }
        if let Ok(mut index) = self.by_product.write() {
            index.clear();
        }
        if let Ok(mut movements) = self.movements.write() {
            movements.clear();
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

        let event: StockEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        self.apply_event(&event);
        self.cursors.advance(aggregate_id, seq);
        Ok(())
    }

    fn apply_event(&self, event: &StockEvent) {
        match event {
            StockEvent::StockRecordCreated(e) => {
                let row = StockLevelRow {
                    record_id: e.record_id,
                    product_id: e.product_id,
                    variant_id: e.variant_id,
                    available: e.initial_quantity,
                    reserved: 0,
                    committed: 0,
                    low_stock_threshold: e.low_stock_threshold,
                    reorder_point: e.reorder_point,
                };
                if let Ok(mut index) = self.by_product.write() {
                    index.insert((e.product_id, e.variant_id), e.record_id);
                }
                if let Ok(mut levels) = self.levels.write() {
                    levels.insert(e.record_id, row);
                }
            }
            StockEvent::StockAdjusted(e) => {
                self.update_level(e.record_id, |row| row.available += e.delta);
                self.push_movement(MovementRow {
                    record_id: e.record_id,
                    kind: MovementKind::Adjustment,
                    quantity: e.delta,
                    previous_free: e.previous_free,
                    new_free: e.new_free,
                    source: MovementSource::Manual,
                    reason: Some(e.reason.clone()),
                    occurred_at: e.occurred_at,
                });
            }
            StockEvent::StockReserved(e) => {
                self.update_level(e.record_id, |row| row.reserved += e.quantity);
                self.push_movement(MovementRow {
                    record_id: e.record_id,
                    kind: MovementKind::Reserve,
                    quantity: e.quantity,
                    previous_free: e.previous_free,
                    new_free: e.new_free,
                    source: e.source,
                    reason: None,
                    occurred_at: e.occurred_at,
                });
            }
            StockEvent::StockReleased(e) => {
                self.update_level(e.record_id, |row| row.reserved -= e.quantity);
                self.push_movement(MovementRow {
                    record_id: e.record_id,
                    kind: MovementKind::Release,
                    quantity: e.quantity,
                    previous_free: e.previous_free,
                    new_free: e.new_free,
                    source: e.source,
                    reason: Some(e.reason.clone()),
                    occurred_at: e.occurred_at,
                });
            }
            StockEvent::StockCommitted(e) => {
                self.update_level(e.record_id, |row| {
                    row.available -= e.quantity;
                    row.reserved -= e.reserved_released;
                    row.committed += e.quantity;
                });
                self.push_movement(MovementRow {
                    record_id: e.record_id,
                    kind: MovementKind::Sale,
                    quantity: e.quantity,
                    previous_free: e.previous_free,
                    new_free: e.new_free,
                    source: e.source,
                    reason: None,
                    occurred_at: e.occurred_at,
                });
            }
            StockEvent::StockRestocked(e) => {
                self.update_level(e.record_id, |row| {
                    row.available += e.quantity;
                    row.committed -= e.committed_released;
                });
                self.push_movement(MovementRow {
                    record_id: e.record_id,
                    kind: MovementKind::Release,
                    quantity: e.quantity,
                    previous_free: e.previous_free,
                    new_free: e.new_free,
                    source: e.source,
                    reason: Some(e.reason.clone()),
                    occurred_at: e.occurred_at,
                });
            }
        }
    }

    fn update_level(&self, record_id: StockRecordId, f: impl FnOnce(&mut StockLevelRow)) {
        if let Ok(mut levels) = self.levels.write() {
            if let Some(row) = levels.get_mut(&record_id) {
                f(row);
            }
        }
    }

    fn push_movement(&self, movement: MovementRow) {
        if let Ok(mut movements) = self.movements.write() {
            movements.entry(movement.record_id).or_default().push(movement);
        }
    }
}
