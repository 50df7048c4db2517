use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use reweave_core::{Aggregate, AggregateId, AggregateRoot, DomainError, Money};
use reweave_events::Event;
use reweave_products::{ProductId, VariantId};

/// Popup order identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PopupOrderId(pub AggregateId);

impl PopupOrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for PopupOrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// How the walk-up customer pays at the stall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PopupPaymentMethod {
    Cash,
    Card,
    Qr,
}

impl PopupPaymentMethod {
    /// Three-letter code used inside QR payment strings.
    pub fn short_code(self) -> &'static str {
        match self {
            PopupPaymentMethod::Cash => "CAS",
            PopupPaymentMethod::Card => "CAR",
            PopupPaymentMethod::Qr => "QRX",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PopupOrderStatus {
    Pending,
    Paid,
}

/// A line sold at the stall. Name and price are keyed in by the seller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopupItem {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub product_name: String,
    pub variant_name: Option<String>,
    pub quantity: i64,
    pub unit_price: Money,
}

impl PopupItem {
    pub fn line_total(&self) -> Money {
        self.unit_price * self.quantity
    }
}

/// Walk-up customer details. Name and phone are required; phone is the
/// dedup key for the popup customer list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopupCustomer {
    pub name: String,
    pub phone: String,
    pub instagram: Option<String>,
    pub email: Option<String>,
}

/// Human-facing popup order number: `POP-<epoch millis>-<6 alnum>`.
pub fn generate_popup_number(now: DateTime<Utc>) -> String {
    let uuid = Uuid::now_v7().simple().to_string();
    let suffix = uuid[uuid.len() - 6..].to_uppercase();
    format!("POP-{}-{}", now.timestamp_millis(), suffix)
}

/// Aggregate root: PopupOrder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopupOrder {
    id: PopupOrderId,
    popup_number: String,
    items: Vec<PopupItem>,
    customer: Option<PopupCustomer>,
    event_name: String,
    payment_method: PopupPaymentMethod,
    total: Money,
    status: PopupOrderStatus,
    paid_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl PopupOrder {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: PopupOrderId) -> Self {
        Self {
            id,
            popup_number: String::new(),
            items: Vec::new(),
            customer: None,
            event_name: String::new(),
            payment_method: PopupPaymentMethod::Cash,
            total: Money::ZERO,
            status: PopupOrderStatus::Pending,
            paid_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> PopupOrderId {
        self.id
    }

    pub fn popup_number(&self) -> &str {
        &self.popup_number
    }

    pub fn items(&self) -> &[PopupItem] {
        &self.items
    }

    pub fn customer(&self) -> Option<&PopupCustomer> {
        self.customer.as_ref()
    }

    pub fn event_name(&self) -> &str {
        &self.event_name
    }

    pub fn payment_method(&self) -> PopupPaymentMethod {
        self.payment_method
    }

    pub fn total(&self) -> Money {
        self.total
    }

    pub fn status(&self) -> PopupOrderStatus {
        self.status
    }
}

impl AggregateRoot for PopupOrder {
    type Id = PopupOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreatePopupOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePopupOrder {
    pub popup_order_id: PopupOrderId,
    pub popup_number: String,
    pub items: Vec<PopupItem>,
    pub customer: PopupCustomer,
    pub event_name: String,
    pub payment_method: PopupPaymentMethod,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkPopupOrderPaid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkPopupOrderPaid {
    pub popup_order_id: PopupOrderId,
    pub payment_reference: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PopupOrderCommand {
    CreatePopupOrder(CreatePopupOrder),
    MarkPopupOrderPaid(MarkPopupOrderPaid),
}

/// Event: PopupOrderCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopupOrderCreated {
    pub popup_order_id: PopupOrderId,
    pub popup_number: String,
    pub items: Vec<PopupItem>,
    pub customer: PopupCustomer,
    pub event_name: String,
    pub payment_method: PopupPaymentMethod,
    pub total: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PopupOrderPaid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopupOrderPaid {
    pub popup_order_id: PopupOrderId,
    pub payment_reference: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PopupOrderEvent {
    PopupOrderCreated(PopupOrderCreated),
    PopupOrderPaid(PopupOrderPaid),
}

impl Event for PopupOrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PopupOrderEvent::PopupOrderCreated(_) => "popup.order.created",
            PopupOrderEvent::PopupOrderPaid(_) => "popup.order.paid",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PopupOrderEvent::PopupOrderCreated(e) => e.occurred_at,
            PopupOrderEvent::PopupOrderPaid(e) => e.occurred_at,
        }
    }
}

impl Aggregate for PopupOrder {
    type Command = PopupOrderCommand;
    type Event = PopupOrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PopupOrderEvent::PopupOrderCreated(e) => {
                self.id = e.popup_order_id;
                self.popup_number = e.popup_number.clone();
                self.items = e.items.clone();
                self.customer = Some(e.customer.clone());
                self.event_name = e.event_name.clone();
                self.payment_method = e.payment_method;
                self.total = e.total;
                self.status = PopupOrderStatus::Pending;
                self.created = true;
            }
            PopupOrderEvent::PopupOrderPaid(e) => {
                self.status = PopupOrderStatus::Paid;
                self.paid_at = Some(e.occurred_at);
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PopupOrderCommand::CreatePopupOrder(cmd) => self.handle_create(cmd),
            PopupOrderCommand::MarkPopupOrderPaid(cmd) => self.handle_mark_paid(cmd),
        }
    }
}

impl PopupOrder {
    fn handle_create(&self, cmd: &CreatePopupOrder) -> Result<Vec<PopupOrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("popup order already exists"));
        }
        if cmd.items.is_empty() {
            return Err(DomainError::validation("popup order needs at least one item"));
        }
        for item in &cmd.items {
            if item.quantity <= 0 {
                return Err(DomainError::validation("item quantity must be positive"));
            }
            if item.unit_price.is_negative() {
                return Err(DomainError::validation("unit price cannot be negative"));
            }
        }
        if cmd.customer.name.trim().is_empty() {
            return Err(DomainError::validation("customer name is required"));
        }
        if cmd.customer.phone.trim().is_empty() {
            return Err(DomainError::validation("customer phone is required"));
        }

        let total: Money = cmd.items.iter().map(PopupItem::line_total).sum();

        Ok(vec![PopupOrderEvent::PopupOrderCreated(PopupOrderCreated {
            popup_order_id: cmd.popup_order_id,
            popup_number: cmd.popup_number.clone(),
            items: cmd.items.clone(),
            customer: cmd.customer.clone(),
            event_name: cmd.event_name.clone(),
            payment_method: cmd.payment_method,
            total,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_mark_paid(
        &self,
        cmd: &MarkPopupOrderPaid,
    ) -> Result<Vec<PopupOrderEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.status == PopupOrderStatus::Paid {
            return Err(DomainError::AlreadyPaid);
        }

        Ok(vec![PopupOrderEvent::PopupOrderPaid(PopupOrderPaid {
            popup_order_id: cmd.popup_order_id,
            payment_reference: cmd.payment_reference.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_order_id() -> PopupOrderId {
        PopupOrderId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn test_customer() -> PopupCustomer {
        PopupCustomer {
            name: "Mei Lin".to_string(),
            phone: "+60198765432".to_string(),
            instagram: Some("@meilin".to_string()),
            email: None,
        }
    }

    fn create_cmd(id: PopupOrderId) -> CreatePopupOrder {
        CreatePopupOrder {
            popup_order_id: id,
            popup_number: generate_popup_number(test_time()),
            items: vec![PopupItem {
                product_id: ProductId::new(AggregateId::new()),
                variant_id: None,
                product_name: "Batik Tote".to_string(),
                variant_name: None,
                quantity: 2,
                unit_price: Money::from_cents(4_500),
            }],
            customer: test_customer(),
            event_name: "Pasar Seni Weekend Market".to_string(),
            payment_method: PopupPaymentMethod::Cash,
            occurred_at: test_time(),
        }
    }

    #[test]
    fn create_computes_the_total() {
        let id = test_order_id();
        let mut order = PopupOrder::empty(id);
        let events = order
            .handle(&PopupOrderCommand::CreatePopupOrder(create_cmd(id)))
            .unwrap();
        order.apply(&events[0]);

        assert_eq!(order.total(), Money::from_cents(9_000));
        assert_eq!(order.status(), PopupOrderStatus::Pending);
        assert!(order.popup_number().starts_with("POP-"));
    }

    #[test]
    fn create_requires_customer_phone() {
        let id = test_order_id();
        let order = PopupOrder::empty(id);
        let mut cmd = create_cmd(id);
        cmd.customer.phone = "  ".to_string();

        let err = order
            .handle(&PopupOrderCommand::CreatePopupOrder(cmd))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn marking_paid_twice_is_rejected() {
        let id = test_order_id();
        let mut order = PopupOrder::empty(id);
        let events = order
            .handle(&PopupOrderCommand::CreatePopupOrder(create_cmd(id)))
            .unwrap();
        order.apply(&events[0]);

        let events = order
            .handle(&PopupOrderCommand::MarkPopupOrderPaid(MarkPopupOrderPaid {
                popup_order_id: id,
                payment_reference: "QR-REF-1".to_string(),
                occurred_at: test_time(),
            }))
            .unwrap();
        order.apply(&events[0]);
        assert_eq!(order.status(), PopupOrderStatus::Paid);

        let err = order
            .handle(&PopupOrderCommand::MarkPopupOrderPaid(MarkPopupOrderPaid {
                popup_order_id: id,
                payment_reference: "QR-REF-2".to_string(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::AlreadyPaid);
    }
}
