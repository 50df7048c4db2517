//! Popup point-of-sale projection. Handles both the order stream and the
//! QR payment stream, and keeps a customer book deduplicated by phone.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use reweave_core::Money;
use reweave_events::EventEnvelope;
use reweave_popup::{
    PopupCustomer, PopupItem, PopupOrderEvent, PopupOrderId, PopupOrderStatus,
    PopupPaymentMethod, QrPaymentEvent, QrPaymentId, QrPaymentStatus,
};

use super::{ProjectionError, StreamCursors};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PopupOrderRow {
    pub popup_order_id: PopupOrderId,
    pub popup_number: String,
    pub items: Vec<PopupItem>,
    pub customer: PopupCustomer,
    pub event_name: String,
    pub payment_method: PopupPaymentMethod,
    pub total: Money,
    pub status: PopupOrderStatus,
    pub payment_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QrPaymentRow {
    pub payment_id: QrPaymentId,
    pub popup_order_id: PopupOrderId,
    pub code: String,
    pub amount: Money,
    pub method: PopupPaymentMethod,
    pub status: QrPaymentStatus,
    pub expires_at: DateTime<Utc>,
}

/// Customer book entry, keyed by phone number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PopupCustomerRow {
    pub name: String,
    pub phone: String,
    pub instagram: Option<String>,
    pub email: Option<String>,
    pub orders_count: u64,
    pub total_spent: Money,
    pub last_seen_at: DateTime<Utc>,
}

/// Stall-level sales summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PopupAnalytics {
    pub total_orders: u64,
    pub paid_orders: u64,
    pub revenue: Money,
    pub cash_orders: u64,
    pub card_orders: u64,
    pub qr_orders: u64,
}

#[derive(Debug, Default)]
pub struct PopupSalesProjection {
    orders: RwLock<HashMap<PopupOrderId, PopupOrderRow>>,
    qr_payments: RwLock<HashMap<QrPaymentId, QrPaymentRow>>,
    qr_by_code: RwLock<HashMap<String, QrPaymentId>>,
    customers: RwLock<HashMap<String, PopupCustomerRow>>,
    cursors: StreamCursors,
}

impl PopupSalesProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn order(&self, popup_order_id: PopupOrderId) -> Option<PopupOrderRow> {
        self.orders.read().ok()?.get(&popup_order_id).cloned()
    }

    /// Orders newest first, the stall's running log.
    pub fn list_orders(&self) -> Vec<PopupOrderRow> {
        let mut rows: Vec<_> = self
            .orders
            .read()
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows
    }

    pub fn qr_payment(&self, payment_id: QrPaymentId) -> Option<QrPaymentRow> {
        self.qr_payments.read().ok()?.get(&payment_id).cloned()
    }

    pub fn qr_payment_by_code(&self, code: &str) -> Option<QrPaymentRow> {
        let id = *self.qr_by_code.read().ok()?.get(code)?;
        self.qr_payment(id)
    }

    pub fn customers(&self) -> Vec<PopupCustomerRow> {
        let mut rows: Vec<_> = self
            .customers
            .read()
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();
        rows.sort_by(|a, b| b.total_spent.cmp(&a.total_spent));
        rows
    }

    /// Revenue counts paid orders only; method tallies count every order.
    pub fn analytics(&self) -> PopupAnalytics {
        let orders = match self.orders.read() {
            Ok(orders) => orders,
            Err(_) => return PopupAnalytics::default(),
        };

        let mut summary = PopupAnalytics::default();
        for row in orders.values() {
            summary.total_orders += 1;
            match row.payment_method {
                PopupPaymentMethod::Cash => summary.cash_orders += 1,
                PopupPaymentMethod::Card => summary.card_orders += 1,
                PopupPaymentMethod::Qr => summary.qr_orders += 1,
            }
            if row.status == PopupOrderStatus::Paid {
                summary.paid_orders += 1;
                summary.revenue = summary.revenue + row.total;
            }
        }
        summary
    }

    pub fn reset(&self) {
        self.cursors.clear();
        if let Ok(mut orders) = self.orders.write() {
            orders.clear();
        }
        if let Ok(mut payments) = self.qr_payments.write() {
            payments.clear();
        }
        if let Ok(mut index) = self.qr_by_code.write() {
            index.clear();
        }
        if let Ok(mut customers) = self.customers.write() {
            customers.clear();
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

        match envelope.aggregate_type() {
            "popup.qr_payment" => {
                let event: QrPaymentEvent = serde_json::from_value(envelope.payload().clone())
                    .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;
                self.apply_qr_event(&event);
            }
            _ => {
                let event: PopupOrderEvent = serde_json::from_value(envelope.payload().clone())
                    .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;
                self.apply_order_event(&event);
            }
        }

        self.cursors.advance(aggregate_id, seq);
        Ok(())
    }

    fn apply_order_event(&self, event: &PopupOrderEvent) {
        match event {
            PopupOrderEvent::PopupOrderCreated(e) => {
                let row = PopupOrderRow {
                    popup_order_id: e.popup_order_id,
                    popup_number: e.popup_number.clone(),
                    items: e.items.clone(),
                    customer: e.customer.clone(),
                    event_name: e.event_name.clone(),
                    payment_method: e.payment_method,
                    total: e.total,
                    status: PopupOrderStatus::Pending,
                    payment_reference: None,
                    created_at: e.occurred_at,
                    paid_at: None,
                };
                if let Ok(mut orders) = self.orders.write() {
                    orders.insert(e.popup_order_id, row);
                }
                self.record_customer(&e.customer, e.total, e.occurred_at);
            }
            PopupOrderEvent::PopupOrderPaid(e) => {
                if let Ok(mut orders) = self.orders.write() {
                    if let Some(row) = orders.get_mut(&e.popup_order_id) {
                        row.status = PopupOrderStatus::Paid;
                        row.payment_reference = Some(e.payment_reference.clone());
                        row.paid_at = Some(e.occurred_at);
                    }
                }
            }
        }
    }

    fn apply_qr_event(&self, event: &QrPaymentEvent) {
        match event {
            QrPaymentEvent::QrPaymentGenerated(e) => {
                let row = QrPaymentRow {
                    payment_id: e.payment_id,
                    popup_order_id: e.popup_order_id,
                    code: e.code.clone(),
                    amount: e.amount,
                    method: e.method,
                    status: QrPaymentStatus::Pending,
                    expires_at: e.expires_at,
                };
                if let Ok(mut index) = self.qr_by_code.write() {
                    index.insert(e.code.clone(), e.payment_id);
                }
                if let Ok(mut payments) = self.qr_payments.write() {
                    payments.insert(e.payment_id, row);
                }
            }
            QrPaymentEvent::QrPaymentVerified(e) => {
                if let Ok(mut payments) = self.qr_payments.write() {
                    if let Some(row) = payments.get_mut(&e.payment_id) {
                        row.status = QrPaymentStatus::Paid;
                    }
                }
            }
        }
    }

    fn record_customer(&self, customer: &PopupCustomer, total: Money, seen_at: DateTime<Utc>) {
        if let Ok(mut customers) = self.customers.write() {
            customers
                .entry(customer.phone.clone())
                .and_modify(|row| {
                    row.name = customer.name.clone();
                    if customer.instagram.is_some() {
                        row.instagram = customer.instagram.clone();
                    }
                    if customer.email.is_some() {
                        row.email = customer.email.clone();
                    }
                    row.orders_count += 1;
                    row.total_spent = row.total_spent + total;
                    row.last_seen_at = seen_at;
                })
                .or_insert_with(|| PopupCustomerRow {
                    name: customer.name.clone(),
                    phone: customer.phone.clone(),
                    instagram: customer.instagram.clone(),
                    email: customer.email.clone(),
                    orders_count: 1,
                    total_spent: total,
                    last_seen_at: seen_at,
                });
        }
    }
}
