//! Orders projection: order detail rows plus a human-readable timeline.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use reweave_core::CustomerId;
use reweave_events::EventEnvelope;
use reweave_orders::{
    FulfillmentStatus, OrderEvent, OrderId, OrderItem, OrderStatus, PaymentStatus,
    PricingBreakdown, ShippingMethod,
};

use super::{ProjectionError, StreamCursors};

/// Denormalized order detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderRow {
    pub order_id: OrderId,
    pub order_number: String,
    pub customer_id: CustomerId,
    pub items: Vec<OrderItem>,
    pub pricing: PricingBreakdown,
    pub discount_code: Option<String>,
    pub shipping_method: ShippingMethod,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub fulfillment_status: FulfillmentStatus,
    pub placed_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub estimated_delivery: DateTime<Utc>,
}

/// One line in the order's history view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelineEntry {
    pub label: String,
    pub detail: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Order read model with number and customer indexes.
#[derive(Debug, Default)]
pub struct OrdersProjection {
    rows: RwLock<HashMap<OrderId, OrderRow>>,
    by_number: RwLock<HashMap<String, OrderId>>,
    by_customer: RwLock<HashMap<CustomerId, Vec<OrderId>>>,
    timelines: RwLock<HashMap<OrderId, Vec<TimelineEntry>>>,
    cursors: StreamCursors,
}

impl OrdersProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, order_id: OrderId) -> Option<OrderRow> {
        self.rows.read().ok()?.get(&order_id).cloned()
    }

    pub fn by_number(&self, order_number: &str) -> Option<OrderRow> {
        let id = *self.by_number.read().ok()?.get(order_number)?;
        self.get(id)
    }

    /// A customer's orders, newest first.
    pub fn list_for_customer(&self, customer_id: CustomerId) -> Vec<OrderRow> {
        let ids = self
            .by_customer
            .read()
            .ok()
            .and_then(|m| m.get(&customer_id).cloned())
            .unwrap_or_default();
        let mut rows: Vec<_> = ids.into_iter().filter_map(|id| self.get(id)).collect();
        rows.sort_by(|a, b| b.placed_at.cmp(&a.placed_at));
        rows
    }

    pub fn list(&self) -> Vec<OrderRow> {
        let mut rows: Vec<_> = self
            .rows
            .read()
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();
        rows.sort_by(|a, b| b.placed_at.cmp(&a.placed_at));
        rows
    }

    pub fn timeline(&self, order_id: OrderId) -> Vec<TimelineEntry> {
        self.timelines
            .read()
            .ok()
            .and_then(|m| m.get(&order_id).cloned())
            .unwrap_or_default()
    }

    pub fn reset(&self) {
        self.cursors.clear();
        if let Ok(mut rows) = self.rows.write() {
            rows.clear();
        }
        if let Ok(mut index) = self.by_number.write() {
            index.clear();
        }
        if let Ok(mut index) = self.by_customer.write() {
            index.clear();
        }
        if let Ok(mut timelines) = self.timelines.write() {
            timelines.clear();
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

        let event: OrderEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        self.apply_event(&event);
        self.cursors.advance(aggregate_id, seq);
        Ok(())
    }

    fn apply_event(&self, event: &OrderEvent) {
        match event {
            OrderEvent::OrderCreated(e) => {
                let row = OrderRow {
                    order_id: e.order_id,
                    order_number: e.order_number.clone(),
                    customer_id: e.customer_id,
                    items: e.items.clone(),
                    pricing: e.pricing.clone(),
                    discount_code: e.discount_code.clone(),
                    shipping_method: e.shipping_method,
                    status: OrderStatus::Pending,
                    payment_status: PaymentStatus::Pending,
                    fulfillment_status: FulfillmentStatus::Unfulfilled,
                    placed_at: e.occurred_at,
                    paid_at: None,
                    cancelled_at: None,
                    estimated_delivery: e.estimated_delivery,
                };
                if let Ok(mut index) = self.by_number.write() {
                    index.insert(e.order_number.clone(), e.order_id);
                }
                if let Ok(mut index) = self.by_customer.write() {
                    index.entry(e.customer_id).or_default().push(e.order_id);
                }
                if let Ok(mut rows) = self.rows.write() {
                    rows.insert(e.order_id, row);
                }
                self.push_timeline(
                    e.order_id,
                    TimelineEntry {
                        label: "order placed".to_string(),
                        detail: Some(e.order_number.clone()),
                        occurred_at: e.occurred_at,
                    },
                );
            }
            OrderEvent::StatusChanged(e) => {
                self.update_row(e.order_id, |row| row.status = e.to);
                self.push_timeline(
                    e.order_id,
                    TimelineEntry {
                        label: format!("status changed to {:?}", e.to).to_lowercase(),
                        detail: e.notes.clone(),
                        occurred_at: e.occurred_at,
                    },
                );
            }
            OrderEvent::FulfillmentChanged(e) => {
                self.update_row(e.order_id, |row| row.fulfillment_status = e.to);
                self.push_timeline(
                    e.order_id,
                    TimelineEntry {
                        label: format!("fulfillment changed to {:?}", e.to).to_lowercase(),
                        detail: None,
                        occurred_at: e.occurred_at,
                    },
                );
            }
            OrderEvent::PaymentStatusChanged(e) => {
                self.update_row(e.order_id, |row| row.payment_status = e.to);
                self.push_timeline(
                    e.order_id,
                    TimelineEntry {
                        label: format!("payment status changed to {:?}", e.to).to_lowercase(),
                        detail: None,
                        occurred_at: e.occurred_at,
                    },
                );
            }
            OrderEvent::OrderCancelled(e) => {
                self.update_row(e.order_id, |row| {
                    row.status = OrderStatus::Cancelled;
                    if row.payment_status == PaymentStatus::Pending {
                        row.payment_status = PaymentStatus::Cancelled;
                    }
                    row.cancelled_at = Some(e.occurred_at);
                });
                self.push_timeline(
                    e.order_id,
                    TimelineEntry {
                        label: "order cancelled".to_string(),
                        detail: Some(e.reason.clone()),
                        occurred_at: e.occurred_at,
                    },
                );
            }
            OrderEvent::OrderVoided(e) => {
                self.remove_row(e.order_id);
            }
            OrderEvent::PaymentRecorded(e) => {
                self.update_row(e.order_id, |row| {
                    row.payment_status = PaymentStatus::Paid;
                    row.paid_at = Some(e.occurred_at);
                    if row.status == OrderStatus::Pending {
                        row.status = OrderStatus::Confirmed;
                    }
                });
                self.push_timeline(
                    e.order_id,
                    TimelineEntry {
                        label: format!("payment received ({})", e.amount),
                        detail: Some(e.transaction_reference.clone()),
                        occurred_at: e.occurred_at,
                    },
                );
            }
            OrderEvent::RefundRecorded(e) => {
                self.update_row(e.order_id, |row| {
                    row.payment_status = if e.full_refund {
                        PaymentStatus::Refunded
                    } else {
                        PaymentStatus::PartiallyRefunded
                    };
                    if e.full_refund && row.status == OrderStatus::Cancelled {
                        row.status = OrderStatus::Refunded;
                    }
                });
                self.push_timeline(
                    e.order_id,
                    TimelineEntry {
                        label: format!("refund issued ({})", e.amount),
                        detail: Some(e.reason.clone()),
                        occurred_at: e.occurred_at,
                    },
                );
            }
        }
    }

    fn update_row(&self, order_id: OrderId, f: impl FnOnce(&mut OrderRow)) {
        if let Ok(mut rows) = self.rows.write() {
            if let Some(row) = rows.get_mut(&order_id) {
                f(row);
            }
        }
    }

    fn push_timeline(&self, order_id: OrderId, entry: TimelineEntry) {
        if let Ok(mut timelines) = self.timelines.write() {
            timelines.entry(order_id).or_default().push(entry);
        }
    }

    /// A voided order disappears from every index, as if it was never
    /// placed.
    fn remove_row(&self, order_id: OrderId) {
        let removed = self
            .rows
            .write()
            .ok()
            .and_then(|mut rows| rows.remove(&order_id));
        let Some(row) = removed else {
            return;
        };
        if let Ok(mut index) = self.by_number.write() {
            index.remove(&row.order_number);
        }
        if let Ok(mut index) = self.by_customer.write() {
            if let Some(ids) = index.get_mut(&row.customer_id) {
                ids.retain(|id| *id != order_id);
            }
        }
        if let Ok(mut timelines) = self.timelines.write() {
            timelines.remove(&order_id);
        }
    }
}
