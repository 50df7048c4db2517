use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use reweave_core::{Aggregate, AggregateId, AggregateRoot, CustomerId, DomainError, Money};
use reweave_events::Event;
use reweave_products::{PreorderBatchId, ProductId, VariantId};

use crate::pricing::{PricingBreakdown, ShippingMethod};

/// Order identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub AggregateId);

impl OrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for OrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Order lifecycle. The happy path runs pending through delivered one step
/// at a time; cancelled, refunded and failed sit outside the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
    Failed,
}

impl OrderStatus {
    /// Position in the forward chain, if the status is on it.
    fn rank(self) -> Option<u8> {
        match self {
            OrderStatus::Pending => Some(0),
            OrderStatus::Confirmed => Some(1),
            OrderStatus::Processing => Some(2),
            OrderStatus::Shipped => Some(3),
            OrderStatus::Delivered => Some(4),
            OrderStatus::Cancelled | OrderStatus::Refunded | OrderStatus::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered
                | OrderStatus::Cancelled
                | OrderStatus::Refunded
                | OrderStatus::Failed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    PartiallyPaid,
    Refunded,
    PartiallyRefunded,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentStatus {
    Unfulfilled,
    PartiallyFulfilled,
    Fulfilled,
    Returned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Card,
    Fpx,
    Ewallet,
}

/// Shipping/billing address, snapshotted onto the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub state: String,
    pub postcode: String,
    pub country: String,
}

/// Order line. Product name, SKU and unit price are snapshots taken at
/// checkout so later catalog edits never rewrite history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub product_name: String,
    pub variant_name: Option<String>,
    pub sku: Option<String>,
    pub quantity: i64,
    pub unit_price: Money,
    pub is_preorder: bool,
    pub preorder_batch_id: Option<PreorderBatchId>,
}

impl OrderItem {
    pub fn line_total(&self) -> Money {
        self.unit_price * self.quantity
    }
}

/// Aggregate root: Order.
///
/// The event stream doubles as the order's status history; projections fold
/// it into the timeline shown to customers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    id: OrderId,
    order_number: String,
    customer_id: CustomerId,
    items: Vec<OrderItem>,
    pricing: PricingBreakdown,
    discount_code: Option<String>,
    shipping_method: ShippingMethod,
    shipping_address: Option<Address>,
    billing_address: Option<Address>,
    status: OrderStatus,
    payment_status: PaymentStatus,
    fulfillment_status: FulfillmentStatus,
    estimated_delivery: Option<DateTime<Utc>>,
    placed_at: Option<DateTime<Utc>>,
    confirmed_at: Option<DateTime<Utc>>,
    paid_at: Option<DateTime<Utc>>,
    shipped_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Order {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: OrderId) -> Self {
        Self {
            id,
            order_number: String::new(),
            customer_id: CustomerId::from_uuid(uuid::Uuid::nil()),
            items: Vec::new(),
            pricing: PricingBreakdown {
                subtotal: Money::ZERO,
                discount: Money::ZERO,
                tax: Money::ZERO,
                shipping: Money::ZERO,
                total: Money::ZERO,
            },
            discount_code: None,
            shipping_method: ShippingMethod::Standard,
            shipping_address: None,
            billing_address: None,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            fulfillment_status: FulfillmentStatus::Unfulfilled,
            estimated_delivery: None,
            placed_at: None,
            confirmed_at: None,
            paid_at: None,
            shipped_at: None,
            delivered_at: None,
            cancelled_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn order_number(&self) -> &str {
        &self.order_number
    }

    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn pricing(&self) -> &PricingBreakdown {
        &self.pricing
    }

    pub fn discount_code(&self) -> Option<&str> {
        self.discount_code.as_deref()
    }

    pub fn shipping_method(&self) -> ShippingMethod {
        self.shipping_method
    }

    pub fn shipping_address(&self) -> Option<&Address> {
        self.shipping_address.as_ref()
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.payment_status
    }

    pub fn fulfillment_status(&self) -> FulfillmentStatus {
        self.fulfillment_status
    }

    pub fn estimated_delivery(&self) -> Option<DateTime<Utc>> {
        self.estimated_delivery
    }

    pub fn placed_at(&self) -> Option<DateTime<Utc>> {
        self.placed_at
    }

    pub fn paid_at(&self) -> Option<DateTime<Utc>> {
        self.paid_at
    }

    pub fn is_paid(&self) -> bool {
        self.payment_status == PaymentStatus::Paid
    }

    pub fn has_preorder_items(&self) -> bool {
        self.items.iter().any(|i| i.is_preorder)
    }

    /// Orders leave the cancellable window once they ship.
    pub fn is_cancellable(&self) -> bool {
        !matches!(
            self.status,
            OrderStatus::Shipped
                | OrderStatus::Delivered
                | OrderStatus::Cancelled
                | OrderStatus::Refunded
        )
    }
}

impl AggregateRoot for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateOrder. Totals are computed by checkout and validated
/// against each other here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOrder {
    pub order_id: OrderId,
    pub order_number: String,
    pub customer_id: CustomerId,
    pub items: Vec<OrderItem>,
    pub pricing: PricingBreakdown,
    pub discount_code: Option<String>,
    pub shipping_method: ShippingMethod,
    pub shipping_address: Address,
    pub billing_address: Option<Address>,
    pub estimated_delivery: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateStatus. Any subset of the three status fields; events are
/// emitted only for fields that actually change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateStatus {
    pub order_id: OrderId,
    pub status: Option<OrderStatus>,
    pub fulfillment_status: Option<FulfillmentStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOrder {
    pub order_id: OrderId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: VoidOrder. Retracts an order whose checkout failed after the
/// order row was written, before the customer ever saw it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoidOrder {
    pub order_id: OrderId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordPayment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPayment {
    pub order_id: OrderId,
    pub method: PaymentMethod,
    pub transaction_reference: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordRefund.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordRefund {
    pub order_id: OrderId,
    pub amount: Money,
    pub reason: String,
    pub refund_reference: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderCommand {
    CreateOrder(CreateOrder),
    UpdateStatus(UpdateStatus),
    CancelOrder(CancelOrder),
    VoidOrder(VoidOrder),
    RecordPayment(RecordPayment),
    RecordRefund(RecordRefund),
}

/// Event: OrderCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreated {
    pub order_id: OrderId,
    pub order_number: String,
    pub customer_id: CustomerId,
    pub items: Vec<OrderItem>,
    pub pricing: PricingBreakdown,
    pub discount_code: Option<String>,
    pub shipping_method: ShippingMethod,
    pub shipping_address: Address,
    pub billing_address: Option<Address>,
    pub estimated_delivery: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StatusChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChanged {
    pub order_id: OrderId,
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: FulfillmentChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FulfillmentChanged {
    pub order_id: OrderId,
    pub from: FulfillmentStatus,
    pub to: FulfillmentStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentStatusChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentStatusChanged {
    pub order_id: OrderId,
    pub from: PaymentStatus,
    pub to: PaymentStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCancelled {
    pub order_id: OrderId,
    pub reason: String,
    pub was_paid: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderVoided. Unlike a cancellation, a voided order never reaches
/// a customer-visible state; read models drop the row entirely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderVoided {
    pub order_id: OrderId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecorded {
    pub order_id: OrderId,
    pub method: PaymentMethod,
    pub amount: Money,
    pub transaction_reference: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RefundRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundRecorded {
    pub order_id: OrderId,
    pub amount: Money,
    pub full_refund: bool,
    pub reason: String,
    pub refund_reference: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEvent {
    OrderCreated(OrderCreated),
    StatusChanged(StatusChanged),
    FulfillmentChanged(FulfillmentChanged),
    PaymentStatusChanged(PaymentStatusChanged),
    OrderCancelled(OrderCancelled),
    OrderVoided(OrderVoided),
    PaymentRecorded(PaymentRecorded),
    RefundRecorded(RefundRecorded),
}

impl Event for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderCreated(_) => "orders.order.created",
            OrderEvent::StatusChanged(_) => "orders.order.status_changed",
            OrderEvent::FulfillmentChanged(_) => "orders.order.fulfillment_changed",
            OrderEvent::PaymentStatusChanged(_) => "orders.order.payment_status_changed",
            OrderEvent::OrderCancelled(_) => "orders.order.cancelled",
            OrderEvent::OrderVoided(_) => "orders.order.voided",
            OrderEvent::PaymentRecorded(_) => "orders.order.payment_recorded",
            OrderEvent::RefundRecorded(_) => "orders.order.refund_recorded",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::OrderCreated(e) => e.occurred_at,
            OrderEvent::StatusChanged(e) => e.occurred_at,
            OrderEvent::FulfillmentChanged(e) => e.occurred_at,
            OrderEvent::PaymentStatusChanged(e) => e.occurred_at,
            OrderEvent::OrderCancelled(e) => e.occurred_at,
            OrderEvent::OrderVoided(e) => e.occurred_at,
            OrderEvent::PaymentRecorded(e) => e.occurred_at,
            OrderEvent::RefundRecorded(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Order {
    type Command = OrderCommand;
    type Event = OrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OrderEvent::OrderCreated(e) => {
                self.id = e.order_id;
                self.order_number = e.order_number.clone();
                self.customer_id = e.customer_id;
                self.items = e.items.clone();
                self.pricing = e.pricing;
                self.discount_code = e.discount_code.clone();
                self.shipping_method = e.shipping_method;
                self.shipping_address = Some(e.shipping_address.clone());
                self.billing_address = e.billing_address.clone();
                self.status = OrderStatus::Pending;
                self.payment_status = PaymentStatus::Pending;
                self.fulfillment_status = FulfillmentStatus::Unfulfilled;
                self.estimated_delivery = Some(e.estimated_delivery);
                self.placed_at = Some(e.occurred_at);
                self.created = true;
            }
            OrderEvent::StatusChanged(e) => {
                self.status = e.to;
                match e.to {
                    OrderStatus::Confirmed => self.confirmed_at = Some(e.occurred_at),
                    OrderStatus::Shipped => {
                        self.shipped_at = Some(e.occurred_at);
                        self.fulfillment_status = FulfillmentStatus::Fulfilled;
                    }
                    OrderStatus::Delivered => self.delivered_at = Some(e.occurred_at),
                    _ => {}
                }
            }
            OrderEvent::FulfillmentChanged(e) => {
                self.fulfillment_status = e.to;
            }
            OrderEvent::PaymentStatusChanged(e) => {
                self.payment_status = e.to;
                if e.to == PaymentStatus::Paid {
                    self.paid_at = Some(e.occurred_at);
                }
            }
            OrderEvent::OrderCancelled(e) => {
                self.status = OrderStatus::Cancelled;
                self.cancelled_at = Some(e.occurred_at);
                if self.payment_status == PaymentStatus::Pending {
                    self.payment_status = PaymentStatus::Cancelled;
                }
            }
            OrderEvent::OrderVoided(e) => {
                self.status = OrderStatus::Cancelled;
                self.payment_status = PaymentStatus::Cancelled;
                self.cancelled_at = Some(e.occurred_at);
            }
            OrderEvent::PaymentRecorded(e) => {
                self.payment_status = PaymentStatus::Paid;
                self.paid_at = Some(e.occurred_at);
                if self.status == OrderStatus::Pending {
                    self.status = OrderStatus::Confirmed;
                    self.confirmed_at = Some(e.occurred_at);
                }
            }
            OrderEvent::RefundRecorded(e) => {
                self.payment_status = if e.full_refund {
                    PaymentStatus::Refunded
                } else {
                    PaymentStatus::PartiallyRefunded
                };
                if e.full_refund && self.status == OrderStatus::Cancelled {
                    self.status = OrderStatus::Refunded;
                }
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::CreateOrder(cmd) => self.handle_create(cmd),
            OrderCommand::UpdateStatus(cmd) => self.handle_update_status(cmd),
            OrderCommand::CancelOrder(cmd) => self.handle_cancel(cmd),
            OrderCommand::VoidOrder(cmd) => self.handle_void(cmd),
            OrderCommand::RecordPayment(cmd) => self.handle_record_payment(cmd),
            OrderCommand::RecordRefund(cmd) => self.handle_record_refund(cmd),
        }
    }
}

impl Order {
    fn ensure_exists(&self, order_id: OrderId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateOrder) -> Result<Vec<OrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("order already exists"));
        }
        if cmd.items.is_empty() {
            return Err(DomainError::validation("order must have at least one item"));
        }
        for item in &cmd.items {
            if item.quantity <= 0 {
                return Err(DomainError::validation("item quantity must be positive"));
            }
            if item.unit_price.is_negative() {
                return Err(DomainError::validation("unit price cannot be negative"));
            }
        }
        if cmd.order_number.trim().is_empty() {
            return Err(DomainError::validation("order number cannot be empty"));
        }
        if cmd.shipping_address.email.trim().is_empty() {
            return Err(DomainError::validation("shipping address needs an email"));
        }

        let line_sum: Money = cmd.items.iter().map(OrderItem::line_total).sum();
        if line_sum != cmd.pricing.subtotal {
            return Err(DomainError::invariant("subtotal does not match line totals"));
        }
        if !cmd.pricing.is_consistent() {
            return Err(DomainError::invariant(
                "total does not equal subtotal - discount + tax + shipping",
            ));
        }

        Ok(vec![OrderEvent::OrderCreated(OrderCreated {
            order_id: cmd.order_id,
            order_number: cmd.order_number.clone(),
            customer_id: cmd.customer_id,
            items: cmd.items.clone(),
            pricing: cmd.pricing,
            discount_code: cmd.discount_code.clone(),
            shipping_method: cmd.shipping_method,
            shipping_address: cmd.shipping_address.clone(),
            billing_address: cmd.billing_address.clone(),
            estimated_delivery: cmd.estimated_delivery,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_status(&self, cmd: &UpdateStatus) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;

        let mut events = Vec::new();

        if let Some(status) = cmd.status {
            if status != self.status {
                events.push(self.status_transition(status, cmd)?);
            }
        }
        if let Some(fulfillment) = cmd.fulfillment_status {
            if fulfillment != self.fulfillment_status {
                events.push(OrderEvent::FulfillmentChanged(FulfillmentChanged {
                    order_id: cmd.order_id,
                    from: self.fulfillment_status,
                    to: fulfillment,
                    occurred_at: cmd.occurred_at,
                }));
            }
        }
        if let Some(payment) = cmd.payment_status {
            if payment != self.payment_status {
                events.push(OrderEvent::PaymentStatusChanged(PaymentStatusChanged {
                    order_id: cmd.order_id,
                    from: self.payment_status,
                    to: payment,
                    occurred_at: cmd.occurred_at,
                }));
            }
        }

        if events.is_empty() {
            return Err(DomainError::validation("no status change requested"));
        }
        Ok(events)
    }

    fn status_transition(
        &self,
        to: OrderStatus,
        cmd: &UpdateStatus,
    ) -> Result<OrderEvent, DomainError> {
        match to {
            OrderStatus::Cancelled => {
                return Err(DomainError::validation(
                    "use the cancel operation to cancel an order",
                ));
            }
            OrderStatus::Refunded => {
                return Err(DomainError::validation(
                    "refunded status is set by recording a refund",
                ));
            }
            // Payment failure before confirmation.
            OrderStatus::Failed => {
                if self.status != OrderStatus::Pending {
                    return Err(DomainError::invalid_state(
                        "only pending orders can be marked failed",
                    ));
                }
            }
            _ => {
                let (from_rank, to_rank) = match (self.status.rank(), to.rank()) {
                    (Some(f), Some(t)) => (f, t),
                    _ => {
                        return Err(DomainError::invalid_state(format!(
                            "orders in {:?} state cannot change status",
                            self.status
                        )));
                    }
                };
                if to_rank != from_rank + 1 {
                    return Err(DomainError::invalid_state(format!(
                        "cannot move order from {:?} to {:?}",
                        self.status, to
                    )));
                }
            }
        }

        Ok(OrderEvent::StatusChanged(StatusChanged {
            order_id: cmd.order_id,
            from: self.status,
            to,
            notes: cmd.notes.clone(),
            occurred_at: cmd.occurred_at,
        }))
    }

    fn handle_cancel(&self, cmd: &CancelOrder) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;

        if !self.is_cancellable() {
            return Err(DomainError::invalid_state(format!(
                "orders in {:?} state cannot be cancelled",
                self.status
            )));
        }

        Ok(vec![OrderEvent::OrderCancelled(OrderCancelled {
            order_id: cmd.order_id,
            reason: cmd.reason.clone(),
            was_paid: self.is_paid(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_void(&self, cmd: &VoidOrder) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;

        // Voiding is reserved for the checkout rollback window; an order
        // that progressed or took payment must go through cancellation.
        if self.status != OrderStatus::Pending || self.is_paid() {
            return Err(DomainError::invalid_state(
                "only pending unpaid orders can be voided",
            ));
        }

        Ok(vec![OrderEvent::OrderVoided(OrderVoided {
            order_id: cmd.order_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_record_payment(&self, cmd: &RecordPayment) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;

        if self.payment_status == PaymentStatus::Paid {
            return Err(DomainError::AlreadyPaid);
        }
        if self.status == OrderStatus::Cancelled {
            return Err(DomainError::invalid_state("cancelled orders cannot be paid"));
        }

        Ok(vec![OrderEvent::PaymentRecorded(PaymentRecorded {
            order_id: cmd.order_id,
            method: cmd.method,
            amount: self.pricing.total,
            transaction_reference: cmd.transaction_reference.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_record_refund(&self, cmd: &RecordRefund) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;

        if !matches!(
            self.payment_status,
            PaymentStatus::Paid | PaymentStatus::PartiallyRefunded
        ) {
            return Err(DomainError::invalid_state(
                "only paid orders can be refunded",
            ));
        }
        if cmd.amount <= Money::ZERO || cmd.amount > self.pricing.total {
            return Err(DomainError::validation(
                "refund amount must be positive and at most the order total",
            ));
        }

        Ok(vec![OrderEvent::RefundRecorded(RefundRecorded {
            order_id: cmd.order_id,
            amount: cmd.amount,
            full_refund: cmd.amount == self.pricing.total,
            reason: cmd.reason.clone(),
            refund_reference: cmd.refund_reference.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_order_id() -> OrderId {
        OrderId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn test_address() -> Address {
        Address {
            first_name: "Aisyah".to_string(),
            last_name: "Rahman".to_string(),
            email: "aisyah@example.com".to_string(),
            phone: "+60123456789".to_string(),
            line1: "12 Jalan Melur".to_string(),
            line2: None,
            city: "Kuala Lumpur".to_string(),
            state: "WP Kuala Lumpur".to_string(),
            postcode: "50450".to_string(),
            country: "MY".to_string(),
        }
    }

    fn test_items() -> Vec<OrderItem> {
        vec![OrderItem {
            product_id: ProductId::new(AggregateId::new()),
            variant_id: None,
            product_name: "Batik Scarf".to_string(),
            variant_name: None,
            sku: Some("SCARF-M".to_string()),
            quantity: 2,
            unit_price: Money::from_cents(8_900),
            is_preorder: false,
            preorder_batch_id: None,
        }]
    }

    fn create_cmd(id: OrderId) -> CreateOrder {
        let items = test_items();
        let subtotal: Money = items.iter().map(OrderItem::line_total).sum();
        CreateOrder {
            order_id: id,
            order_number: "RW-20250101-ABC123".to_string(),
            customer_id: CustomerId::new(),
            items,
            pricing: PricingBreakdown::compute(subtotal, Money::ZERO, ShippingMethod::Standard),
            discount_code: None,
            shipping_method: ShippingMethod::Standard,
            shipping_address: test_address(),
            billing_address: None,
            estimated_delivery: test_time(),
            occurred_at: test_time(),
        }
    }

    fn created_order() -> Order {
        let id = test_order_id();
        let mut order = Order::empty(id);
        let events = order
            .handle(&OrderCommand::CreateOrder(create_cmd(id)))
            .unwrap();
        order.apply(&events[0]);
        order
    }

    fn pay(order: &mut Order) {
        let events = order
            .handle(&OrderCommand::RecordPayment(RecordPayment {
                order_id: order.id_typed(),
                method: PaymentMethod::Card,
                transaction_reference: "TXN-1".to_string(),
                occurred_at: test_time(),
            }))
            .unwrap();
        for event in &events {
            order.apply(event);
        }
    }

    fn advance(order: &mut Order, status: OrderStatus) -> Result<(), DomainError> {
        let events = order.handle(&OrderCommand::UpdateStatus(UpdateStatus {
            order_id: order.id_typed(),
            status: Some(status),
            fulfillment_status: None,
            payment_status: None,
            notes: None,
            occurred_at: test_time(),
        }))?;
        for event in &events {
            order.apply(event);
        }
        Ok(())
    }

    #[test]
    fn create_order_starts_pending_and_unpaid() {
        let order = created_order();
        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.payment_status(), PaymentStatus::Pending);
        assert_eq!(order.fulfillment_status(), FulfillmentStatus::Unfulfilled);
        assert!(order.is_cancellable());
    }

    #[test]
    fn create_order_rejects_inconsistent_totals() {
        let id = test_order_id();
        let order = Order::empty(id);
        let mut cmd = create_cmd(id);
        cmd.pricing.total = cmd.pricing.total + Money::from_cents(1);

        let err = order.handle(&OrderCommand::CreateOrder(cmd)).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn create_order_rejects_subtotal_mismatch() {
        let id = test_order_id();
        let order = Order::empty(id);
        let mut cmd = create_cmd(id);
        cmd.items[0].quantity = 3;

        let err = order.handle(&OrderCommand::CreateOrder(cmd)).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn payment_confirms_a_pending_order() {
        let mut order = created_order();
        pay(&mut order);
        assert_eq!(order.payment_status(), PaymentStatus::Paid);
        assert_eq!(order.status(), OrderStatus::Confirmed);
        assert!(order.paid_at().is_some());
    }

    #[test]
    fn paying_twice_is_rejected() {
        let mut order = created_order();
        pay(&mut order);

        let err = order
            .handle(&OrderCommand::RecordPayment(RecordPayment {
                order_id: order.id_typed(),
                method: PaymentMethod::Fpx,
                transaction_reference: "TXN-2".to_string(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::AlreadyPaid);
    }

    #[test]
    fn status_moves_forward_one_step_at_a_time() {
        let mut order = created_order();
        pay(&mut order);

        advance(&mut order, OrderStatus::Processing).unwrap();
        advance(&mut order, OrderStatus::Shipped).unwrap();
        advance(&mut order, OrderStatus::Delivered).unwrap();

        assert_eq!(order.status(), OrderStatus::Delivered);
        assert_eq!(order.fulfillment_status(), FulfillmentStatus::Fulfilled);
    }

    #[test]
    fn status_cannot_skip_ahead() {
        let mut order = created_order();
        let err = advance(&mut order, OrderStatus::Shipped).unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));
    }

    #[test]
    fn update_with_no_effective_change_is_rejected() {
        let order = created_order();
        let err = order
            .handle(&OrderCommand::UpdateStatus(UpdateStatus {
                order_id: order.id_typed(),
                status: Some(OrderStatus::Pending),
                fulfillment_status: None,
                payment_status: None,
                notes: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn fulfillment_and_payment_fields_change_independently() {
        let mut order = created_order();
        let events = order
            .handle(&OrderCommand::UpdateStatus(UpdateStatus {
                order_id: order.id_typed(),
                status: None,
                fulfillment_status: Some(FulfillmentStatus::PartiallyFulfilled),
                payment_status: Some(PaymentStatus::Paid),
                notes: None,
                occurred_at: test_time(),
            }))
            .unwrap();
        assert_eq!(events.len(), 2);
        for event in &events {
            order.apply(event);
        }
        assert_eq!(
            order.fulfillment_status(),
            FulfillmentStatus::PartiallyFulfilled
        );
        assert_eq!(order.payment_status(), PaymentStatus::Paid);
        assert!(order.paid_at().is_some());
    }

    #[test]
    fn shipped_orders_cannot_be_cancelled() {
        let mut order = created_order();
        pay(&mut order);
        advance(&mut order, OrderStatus::Processing).unwrap();
        advance(&mut order, OrderStatus::Shipped).unwrap();
        assert!(!order.is_cancellable());

        let err = order
            .handle(&OrderCommand::CancelOrder(CancelOrder {
                order_id: order.id_typed(),
                reason: "changed my mind".to_string(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));
    }

    #[test]
    fn cancelling_a_paid_order_flags_the_refund() {
        let mut order = created_order();
        pay(&mut order);

        let events = order
            .handle(&OrderCommand::CancelOrder(CancelOrder {
                order_id: order.id_typed(),
                reason: "customer request".to_string(),
                occurred_at: test_time(),
            }))
            .unwrap();

        match &events[0] {
            OrderEvent::OrderCancelled(e) => assert!(e.was_paid),
            _ => panic!("Expected OrderCancelled event"),
        }
        order.apply(&events[0]);
        assert_eq!(order.status(), OrderStatus::Cancelled);
    }

    #[test]
    fn cancelling_an_unpaid_order_cancels_the_payment() {
        let mut order = created_order();
        let events = order
            .handle(&OrderCommand::CancelOrder(CancelOrder {
                order_id: order.id_typed(),
                reason: "customer request".to_string(),
                occurred_at: test_time(),
            }))
            .unwrap();
        order.apply(&events[0]);
        assert_eq!(order.payment_status(), PaymentStatus::Cancelled);
    }

    #[test]
    fn voiding_a_pending_order_emits_order_voided() {
        let mut order = created_order();
        let events = order
            .handle(&OrderCommand::VoidOrder(VoidOrder {
                order_id: order.id_typed(),
                reason: "stock commit rejected".to_string(),
                occurred_at: test_time(),
            }))
            .unwrap();
        match &events[0] {
            OrderEvent::OrderVoided(e) => assert_eq!(e.reason, "stock commit rejected"),
            _ => panic!("Expected OrderVoided event"),
        }
        order.apply(&events[0]);
        assert_eq!(order.status(), OrderStatus::Cancelled);
        assert_eq!(order.payment_status(), PaymentStatus::Cancelled);
    }

    #[test]
    fn paid_orders_cannot_be_voided() {
        let mut order = created_order();
        pay(&mut order);

        let err = order
            .handle(&OrderCommand::VoidOrder(VoidOrder {
                order_id: order.id_typed(),
                reason: "stock commit rejected".to_string(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));
    }

    #[test]
    fn refund_requires_a_paid_order() {
        let order = created_order();
        let err = order
            .handle(&OrderCommand::RecordRefund(RecordRefund {
                order_id: order.id_typed(),
                amount: Money::from_cents(1_000),
                reason: "goodwill".to_string(),
                refund_reference: "REFUND-1".to_string(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));
    }

    #[test]
    fn full_refund_after_cancel_lands_in_refunded() {
        let mut order = created_order();
        pay(&mut order);
        let total = order.pricing().total;

        let events = order
            .handle(&OrderCommand::CancelOrder(CancelOrder {
                order_id: order.id_typed(),
                reason: "order cancelled".to_string(),
                occurred_at: test_time(),
            }))
            .unwrap();
        order.apply(&events[0]);

        let events = order
            .handle(&OrderCommand::RecordRefund(RecordRefund {
                order_id: order.id_typed(),
                amount: total,
                reason: "order cancelled".to_string(),
                refund_reference: "REFUND-1".to_string(),
                occurred_at: test_time(),
            }))
            .unwrap();
        order.apply(&events[0]);

        assert_eq!(order.payment_status(), PaymentStatus::Refunded);
        assert_eq!(order.status(), OrderStatus::Refunded);
    }

    #[test]
    fn partial_refund_keeps_the_order_partially_refunded() {
        let mut order = created_order();
        pay(&mut order);

        let events = order
            .handle(&OrderCommand::RecordRefund(RecordRefund {
                order_id: order.id_typed(),
                amount: Money::from_cents(1_000),
                reason: "damaged item".to_string(),
                refund_reference: "REFUND-2".to_string(),
                occurred_at: test_time(),
            }))
            .unwrap();
        order.apply(&events[0]);
        assert_eq!(order.payment_status(), PaymentStatus::PartiallyRefunded);
    }

    #[test]
    fn handle_does_not_mutate_state() {
        let order = created_order();
        let before = order.clone();
        let _ = order.handle(&OrderCommand::CancelOrder(CancelOrder {
            order_id: order.id_typed(),
            reason: "test".to_string(),
            occurred_at: test_time(),
        }));
        assert_eq!(order, before);
    }
}
