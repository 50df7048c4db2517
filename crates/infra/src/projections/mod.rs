//! Projection implementations (read model builders).
//!
//! Projections consume published event envelopes and fold them into
//! query-optimized read models. All of them are rebuildable from the event
//! stream and idempotent under at-least-once delivery: each keeps a cursor
//! per aggregate stream and ignores replays at or below it.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use serde_json::Value as JsonValue;
use thiserror::Error;

use reweave_core::AggregateId;
use reweave_events::{EventEnvelope, Subscription};

pub mod catalog;
pub mod discounts;
pub mod inventory_ledger;
pub mod loyalty;
pub mod orders;
pub mod popup_sales;
pub mod preorder_batches;

pub use catalog::{CatalogProjection, ProductQuery, ProductRow, ProductSort};
pub use discounts::{DiscountRow, DiscountsProjection};
pub use inventory_ledger::{
    InventoryLedgerProjection, MovementKind, MovementRow, StockLevelRow,
};
pub use loyalty::{LoyaltyProjection, LoyaltyRow};
pub use orders::{OrderRow, OrdersProjection, TimelineEntry};
pub use popup_sales::{
    PopupAnalytics, PopupCustomerRow, PopupOrderRow, PopupSalesProjection, QrPaymentRow,
};
pub use preorder_batches::{PreorderBatchRow, PreorderBatchesProjection};

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("failed to deserialize event payload: {0}")]
    Deserialize(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Per-aggregate stream cursors shared by every projection.
///
/// `check` decides whether an envelope should be applied: replays at or
/// below the cursor are skipped (idempotency), gaps after the first event
/// are rejected. Callers `advance` the cursor only after a successful apply.
#[derive(Debug, Default)]
pub(crate) struct StreamCursors {
    inner: RwLock<HashMap<AggregateId, u64>>,
}

impl StreamCursors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check an incoming (aggregate, sequence) pair against the cursor.
    ///
    /// `Ok(false)` means duplicate/replay, safe to ignore.
    pub fn check(&self, aggregate_id: AggregateId, seq: u64) -> Result<bool, ProjectionError> {
        let cursors = match self.inner.read() {
            Ok(c) => c,
            Err(_) => return Ok(false),
        };
        let last = *cursors.get(&aggregate_id).unwrap_or(&0);

        if seq == 0 {
            return Err(ProjectionError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            return Ok(false);
        }
        // The first event of a stream may carry any positive sequence;
        // after that, strict +1 increments are required.
        if last != 0 && seq != last + 1 {
            return Err(ProjectionError::NonMonotonicSequence { last, found: seq });
        }
        Ok(true)
    }

    /// Advance the cursor after a successful apply.
    pub fn advance(&self, aggregate_id: AggregateId, seq: u64) {
        if let Ok(mut cursors) = self.inner.write() {
            cursors.insert(aggregate_id, seq);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut cursors) = self.inner.write() {
            cursors.clear();
        }
    }
}

/// All read models of the storefront, routed by aggregate type.
#[derive(Debug, Default)]
pub struct Projections {
    pub inventory: InventoryLedgerProjection,
    pub catalog: CatalogProjection,
    pub preorders: PreorderBatchesProjection,
    pub orders: OrdersProjection,
    pub discounts: DiscountsProjection,
    pub loyalty: LoyaltyProjection,
    pub popup: PopupSalesProjection,
}

impl Projections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route a published envelope to the projection owning its aggregate type.
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), ProjectionError> {
        match envelope.aggregate_type() {
            "inventory.record" => self.inventory.apply_envelope(envelope),
            "products.product" => self.catalog.apply_envelope(envelope),
            "products.preorder" => self.preorders.apply_envelope(envelope),
            "orders.order" => self.orders.apply_envelope(envelope),
            "promotions.discount" => self.discounts.apply_envelope(envelope),
            "promotions.loyalty" => self.loyalty.apply_envelope(envelope),
            "popup.order" | "popup.qr_payment" => self.popup.apply_envelope(envelope),
            // Cart state is read from the aggregate itself; other types
            // have no read model.
            _ => Ok(()),
        }
    }

    /// Rebuild every read model from a full set of stored envelopes.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), ProjectionError> {
        self.inventory.reset();
        self.catalog.reset();
        self.preorders.reset();
        self.orders.reset();
        self.discounts.reset();
        self.loyalty.reset();
        self.popup.reset();

        // Deterministic replay order: aggregate, then sequence.
        let mut envs: Vec<_> = envelopes.into_iter().collect();
        envs.sort_by_key(|e| (*e.aggregate_id().as_uuid().as_bytes(), e.sequence_number()));

        for env in &envs {
            self.apply_envelope(env)?;
        }
        Ok(())
    }
}

/// Pulls published envelopes off a bus subscription and feeds them into the
/// projections. Services call [`ProjectionFeed::pump`] after dispatching
/// commands so their own reads see the events they just wrote.
pub struct ProjectionFeed {
    subscription: Mutex<Subscription<EventEnvelope<JsonValue>>>,
}

impl ProjectionFeed {
    pub fn new(subscription: Subscription<EventEnvelope<JsonValue>>) -> Self {
        Self {
            subscription: Mutex::new(subscription),
        }
    }

    /// Drain every envelope currently queued and apply it. Returns the
    /// number processed.
    pub fn pump(&self, projections: &Projections) -> Result<usize, ProjectionError> {
        let subscription = match self.subscription.lock() {
            Ok(s) => s,
            Err(_) => return Ok(0),
        };

        let mut processed = 0;
        while let Ok(envelope) = subscription.try_recv() {
            projections.apply_envelope(&envelope)?;
            processed += 1;
        }
        Ok(processed)
    }
}
