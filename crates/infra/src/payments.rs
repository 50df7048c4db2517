//! Payment gateway seam and the payment/refund ledgers.
//!
//! The gateway trait is the integration point for FPX/card providers; the
//! simulated implementation stands in until one is wired up. Ledger rows
//! are kept outside the event streams so gateway references survive a
//! projection rebuild.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use reweave_core::Money;
use reweave_orders::{OrderId, PaymentMethod};

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("payment declined: {0}")]
    Declined(String),
    #[error("gateway unavailable: {0}")]
    Unavailable(String),
}

/// Outcome of a successful charge or refund at the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayReceipt {
    pub reference: String,
    pub processed_at: DateTime<Utc>,
}

/// External payment provider seam.
pub trait PaymentGateway: Send + Sync {
    fn charge(
        &self,
        order_id: OrderId,
        amount: Money,
        method: PaymentMethod,
    ) -> Result<GatewayReceipt, PaymentError>;

    fn refund(
        &self,
        order_id: OrderId,
        amount: Money,
        original_reference: &str,
    ) -> Result<GatewayReceipt, PaymentError>;
}

/// Gateway stand-in that approves everything and mints references.
#[derive(Debug, Default)]
pub struct SimulatedGateway;

impl SimulatedGateway {
    pub fn new() -> Self {
        Self
    }
}

impl PaymentGateway for SimulatedGateway {
    fn charge(
        &self,
        _order_id: OrderId,
        _amount: Money,
        _method: PaymentMethod,
    ) -> Result<GatewayReceipt, PaymentError> {
        Ok(GatewayReceipt {
            reference: format!("TXN-{}", Uuid::now_v7().simple()),
            processed_at: Utc::now(),
        })
    }

    fn refund(
        &self,
        _order_id: OrderId,
        _amount: Money,
        _original_reference: &str,
    ) -> Result<GatewayReceipt, PaymentError> {
        Ok(GatewayReceipt {
            reference: format!("RFD-{}", Uuid::now_v7().simple()),
            processed_at: Utc::now(),
        })
    }
}

/// One settled charge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentRecord {
    pub order_id: OrderId,
    pub amount: Money,
    pub method: PaymentMethod,
    pub reference: String,
    pub processed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    Pending,
    Completed,
}

/// A refund owed or issued. Created pending when a paid order is
/// cancelled; a background job settles it against the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefundRecord {
    pub order_id: OrderId,
    pub amount: Money,
    pub reason: String,
    pub status: RefundStatus,
    pub reference: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// In-memory payment and refund books, keyed by order.
#[derive(Debug, Default)]
pub struct PaymentLedger {
    payments: RwLock<HashMap<OrderId, PaymentRecord>>,
    refunds: RwLock<HashMap<OrderId, RefundRecord>>,
}

impl PaymentLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_payment(&self, record: PaymentRecord) {
        if let Ok(mut payments) = self.payments.write() {
            payments.insert(record.order_id, record);
        }
    }

    pub fn payment_for(&self, order_id: OrderId) -> Option<PaymentRecord> {
        self.payments.read().ok()?.get(&order_id).cloned()
    }

    pub fn open_refund(&self, order_id: OrderId, amount: Money, reason: impl Into<String>) {
        if let Ok(mut refunds) = self.refunds.write() {
            refunds.insert(
                order_id,
                RefundRecord {
                    order_id,
                    amount,
                    reason: reason.into(),
                    status: RefundStatus::Pending,
                    reference: None,
                    requested_at: Utc::now(),
                    completed_at: None,
                },
            );
        }
    }

    pub fn complete_refund(&self, order_id: OrderId, reference: impl Into<String>) {
        if let Ok(mut refunds) = self.refunds.write() {
            if let Some(record) = refunds.get_mut(&order_id) {
                record.status = RefundStatus::Completed;
                record.reference = Some(reference.into());
                record.completed_at = Some(Utc::now());
            }
        }
    }

    pub fn refund_for(&self, order_id: OrderId) -> Option<RefundRecord> {
        self.refunds.read().ok()?.get(&order_id).cloned()
    }

    pub fn pending_refunds(&self) -> Vec<RefundRecord> {
        self.refunds
            .read()
            .map(|m| {
                m.values()
                    .filter(|r| r.status == RefundStatus::Pending)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reweave_core::AggregateId;

    #[test]
    fn simulated_gateway_mints_distinct_references() {
        let gateway = SimulatedGateway::new();
        let order_id = OrderId::new(AggregateId::new());

        let first = gateway
            .charge(order_id, Money::from_cents(10_000), PaymentMethod::Fpx)
            .unwrap();
        let second = gateway
            .charge(order_id, Money::from_cents(10_000), PaymentMethod::Fpx)
            .unwrap();
        assert_ne!(first.reference, second.reference);
        assert!(first.reference.starts_with("TXN-"));
    }

    #[test]
    fn refund_moves_from_pending_to_completed() {
        let ledger = PaymentLedger::new();
        let order_id = OrderId::new(AggregateId::new());

        ledger.open_refund(order_id, Money::from_cents(5_000), "order cancelled");
        assert_eq!(ledger.pending_refunds().len(), 1);

        ledger.complete_refund(order_id, "RFD-1");
        let record = ledger.refund_for(order_id).unwrap();
        assert_eq!(record.status, RefundStatus::Completed);
        assert_eq!(record.reference.as_deref(), Some("RFD-1"));
        assert!(ledger.pending_refunds().is_empty());
    }
}
