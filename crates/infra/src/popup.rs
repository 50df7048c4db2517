//! Point-of-sale orchestration for popup events.
//!
//! Walk-up sales hit the same inventory ledger as the storefront: each
//! line is committed with a `popup_order` movement source before the
//! order is recorded, so a stall can never sell stock the site already
//! holds. The QR flow is generate-then-verify with a five minute window.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tracing::{info, instrument, warn};

use reweave_core::{AggregateId, AggregateRoot, Money};
use reweave_events::{EventBus, EventEnvelope};
use reweave_inventory::{CommitStock, MovementSource, Restock, StockCommand, StockRecord, StockRecordId};
use reweave_popup::{
    generate_popup_number, generate_qr_code, CreatePopupOrder, GenerateQrPayment,
    MarkPopupOrderPaid, PopupCustomer, PopupItem, PopupOrder, PopupOrderCommand, PopupOrderId,
    PopupOrderStatus, PopupPaymentMethod, QrPayment, QrPaymentCommand, QrPaymentId,
    VerifyQrPayment,
};

use crate::checkout::CheckoutError;
use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::EventStore;
use crate::projections::{PopupOrderRow, ProjectionFeed, Projections, QrPaymentRow};

/// Revenue and volume for one named popup event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopupEventSummary {
    pub event_name: String,
    pub orders: usize,
    pub revenue: Money,
}

/// One product's take across all popup sales.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopProduct {
    pub product_name: String,
    pub quantity: i64,
    pub revenue: Money,
}

/// Cross-event analytics for the stall dashboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopupAnalyticsReport {
    pub total_sales: Money,
    pub order_count: u64,
    pub unique_customers: u64,
    pub average_order_value: Money,
    pub top_products: Vec<TopProduct>,
    pub cash_orders: u64,
    pub card_orders: u64,
    pub qr_orders: u64,
}

/// Orchestrates popup sales, in-ledger stock commits, and QR payments.
pub struct PopupService<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    dispatcher: CommandDispatcher<S, B>,
    projections: Arc<Projections>,
    feed: ProjectionFeed,
}

impl<S, B> PopupService<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(
        dispatcher: CommandDispatcher<S, B>,
        projections: Arc<Projections>,
        feed: ProjectionFeed,
    ) -> Self {
        Self {
            dispatcher,
            projections,
            feed,
        }
    }

    pub fn projections(&self) -> &Projections {
        &self.projections
    }

    pub fn pump(&self) -> Result<usize, crate::projections::ProjectionError> {
        self.feed.pump(&self.projections)
    }

    /// Record a walk-up sale. Stock is committed line by line before the
    /// order exists; an out-of-stock line unwinds the lines already taken.
    #[instrument(skip(self, items, customer), fields(event_name = %event_name))]
    pub fn create_order(
        &self,
        items: Vec<PopupItem>,
        customer: PopupCustomer,
        event_name: &str,
        payment_method: PopupPaymentMethod,
    ) -> Result<PopupOrderRow, CheckoutError> {
        self.pump()?;
        let now = Utc::now();
        let popup_order_id = PopupOrderId::new(AggregateId::new());
        let popup_number = generate_popup_number(now);

        let mut committed: Vec<(StockRecordId, i64)> = Vec::new();
        for item in &items {
            match self.commit_stock_for(item, popup_order_id, now) {
                Ok(record_id) => committed.push((record_id, item.quantity)),
                Err(err) => {
                    self.unwind(&committed, popup_order_id, now);
                    return Err(err.into());
                }
            }
        }

        if let Err(err) = self.dispatcher.dispatch(
            popup_order_id.0,
            "popup.order",
            PopupOrderCommand::CreatePopupOrder(CreatePopupOrder {
                popup_order_id,
                popup_number: popup_number.clone(),
                items,
                customer,
                event_name: event_name.to_string(),
                payment_method,
                occurred_at: now,
            }),
            |id| PopupOrder::empty(PopupOrderId::new(id)),
        ) {
            self.unwind(&committed, popup_order_id, now);
            return Err(err.into());
        }

        self.pump()?;
        info!(popup_order_id = %popup_order_id, popup_number = %popup_number, "popup order recorded");
        self.projections
            .popup
            .order(popup_order_id)
            .ok_or_else(|| DispatchError::NotFound.into())
    }

    /// Mark a cash or card sale paid at the till.
    pub fn mark_paid(
        &self,
        popup_order_id: PopupOrderId,
        payment_reference: &str,
    ) -> Result<(), CheckoutError> {
        self.dispatcher.dispatch(
            popup_order_id.0,
            "popup.order",
            PopupOrderCommand::MarkPopupOrderPaid(MarkPopupOrderPaid {
                popup_order_id,
                payment_reference: payment_reference.to_string(),
                occurred_at: Utc::now(),
            }),
            |id| PopupOrder::empty(PopupOrderId::new(id)),
        )?;
        self.pump()?;
        Ok(())
    }

    /// Mint a scan-to-pay code for a pending popup order.
    #[instrument(skip(self), fields(popup_order_id = %popup_order_id))]
    pub fn generate_qr_payment(
        &self,
        popup_order_id: PopupOrderId,
    ) -> Result<QrPaymentRow, CheckoutError> {
        let now = Utc::now();
        let order = self
            .dispatcher
            .load(popup_order_id.0, |id| PopupOrder::empty(PopupOrderId::new(id)))?;
        if order.version() == 0 {
            return Err(DispatchError::NotFound.into());
        }
        if order.status() != PopupOrderStatus::Pending {
            return Err(DispatchError::InvalidState(format!(
                "popup order {popup_order_id} is already paid"
            ))
            .into());
        }

        let payment_id = QrPaymentId::new(AggregateId::new());
        self.dispatcher.dispatch(
            payment_id.0,
            "popup.qr_payment",
            QrPaymentCommand::GenerateQrPayment(GenerateQrPayment {
                payment_id,
                popup_order_id,
                popup_number: order.popup_number().to_string(),
                amount: order.total(),
                method: order.payment_method(),
                occurred_at: now,
            }),
            |id| QrPayment::empty(QrPaymentId::new(id)),
        )?;

        self.pump()?;
        self.projections
            .popup
            .qr_payment(payment_id)
            .ok_or_else(|| DispatchError::NotFound.into())
    }

    /// Scan a code at the till. An unknown or expired code fails; a live
    /// one marks both the payment and its popup order paid.
    #[instrument(skip(self, code))]
    pub fn verify_qr_payment(&self, code: &str) -> Result<PopupOrderRow, CheckoutError> {
        self.pump()?;
        let now = Utc::now();
        let row = self
            .projections
            .popup
            .qr_payment_by_code(code)
            .ok_or(DispatchError::NotFound)?;

        self.dispatcher.dispatch(
            row.payment_id.0,
            "popup.qr_payment",
            QrPaymentCommand::VerifyQrPayment(VerifyQrPayment {
                payment_id: row.payment_id,
                occurred_at: now,
            }),
            |id| QrPayment::empty(QrPaymentId::new(id)),
        )?;

        if let Err(err) = self.dispatcher.dispatch(
            row.popup_order_id.0,
            "popup.order",
            PopupOrderCommand::MarkPopupOrderPaid(MarkPopupOrderPaid {
                popup_order_id: row.popup_order_id,
                payment_reference: code.to_string(),
                occurred_at: now,
            }),
            |id| PopupOrder::empty(PopupOrderId::new(id)),
        ) {
            warn!(popup_order_id = %row.popup_order_id, error = %err, "verified payment but failed to mark order paid");
            return Err(err.into());
        }

        self.pump()?;
        self.projections
            .popup
            .order(row.popup_order_id)
            .ok_or_else(|| DispatchError::NotFound.into())
    }

    /// Orders grouped by event name, most recent event first.
    pub fn events(&self) -> Result<Vec<PopupEventSummary>, CheckoutError> {
        self.pump()?;
        let orders = self.projections.popup.list_orders();
        let mut by_event: Vec<PopupEventSummary> = Vec::new();
        for order in &orders {
            match by_event
                .iter_mut()
                .find(|s| s.event_name == order.event_name)
            {
                Some(summary) => {
                    summary.orders += 1;
                    summary.revenue = summary.revenue + order.total;
                }
                None => by_event.push(PopupEventSummary {
                    event_name: order.event_name.clone(),
                    orders: 1,
                    revenue: order.total,
                }),
            }
        }
        Ok(by_event)
    }

    /// Stall dashboard numbers. Revenue counts paid orders only; the
    /// method breakdown counts every order taken.
    pub fn analytics(&self) -> Result<PopupAnalyticsReport, CheckoutError> {
        self.pump()?;
        let orders = self.projections.popup.list_orders();
        let tallies = self.projections.popup.analytics();

        let mut product_take: HashMap<String, (i64, Money)> = HashMap::new();
        for order in orders
            .iter()
            .filter(|o| o.status == PopupOrderStatus::Paid)
        {
            for item in &order.items {
                let entry = product_take
                    .entry(item.product_name.clone())
                    .or_insert((0, Money::ZERO));
                entry.0 += item.quantity;
                entry.1 = entry.1 + item.line_total();
            }
        }
        let mut top_products: Vec<TopProduct> = product_take
            .into_iter()
            .map(|(product_name, (quantity, revenue))| TopProduct {
                product_name,
                quantity,
                revenue,
            })
            .collect();
        top_products.sort_by(|a, b| b.revenue.cmp(&a.revenue));
        top_products.truncate(5);

        let average_order_value = if tallies.paid_orders > 0 {
            Money::from_cents(tallies.revenue.cents() / tallies.paid_orders as i64)
        } else {
            Money::ZERO
        };

        Ok(PopupAnalyticsReport {
            total_sales: tallies.revenue,
            order_count: tallies.total_orders,
            unique_customers: self.projections.popup.customers().len() as u64,
            average_order_value,
            top_products,
            cash_orders: tallies.cash_orders,
            card_orders: tallies.card_orders,
            qr_orders: tallies.qr_orders,
        })
    }

    fn commit_stock_for(
        &self,
        item: &PopupItem,
        popup_order_id: PopupOrderId,
        now: DateTime<Utc>,
    ) -> Result<StockRecordId, DispatchError> {
        let record_id = self
            .projections
            .inventory
            .record_for(item.product_id.0, item.variant_id.map(|v| v.0))
            .ok_or_else(|| {
                DispatchError::InsufficientInventory(format!(
                    "no stock record for product {}",
                    item.product_id
                ))
            })?;
        self.dispatcher.dispatch(
            record_id.0,
            "inventory.record",
            StockCommand::CommitStock(CommitStock {
                record_id,
                quantity: item.quantity,
                source: MovementSource::PopupOrder(popup_order_id.0),
                occurred_at: now,
            }),
            |id| StockRecord::empty(StockRecordId::new(id)),
        )?;
        Ok(record_id)
    }

    fn unwind(&self, committed: &[(StockRecordId, i64)], popup_order_id: PopupOrderId, now: DateTime<Utc>) {
        for (record_id, quantity) in committed.iter().rev() {
            if let Err(err) = self.dispatcher.dispatch(
                record_id.0,
                "inventory.record",
                StockCommand::Restock(Restock {
                    record_id: *record_id,
                    quantity: *quantity,
                    source: MovementSource::PopupOrder(popup_order_id.0),
                    reason: "popup sale unwound".to_string(),
                    occurred_at: now,
                }),
                |id| StockRecord::empty(StockRecordId::new(id)),
            ) {
                warn!(record_id = %record_id, error = %err, "restock during popup unwind failed");
            }
        }
    }
}
