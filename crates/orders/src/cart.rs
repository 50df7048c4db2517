use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use reweave_core::{Aggregate, AggregateId, AggregateRoot, CustomerId, DomainError, Money};
use reweave_events::Event;
use reweave_products::{ProductId, VariantId};

/// Cart identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CartId(pub AggregateId);

impl CartId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for CartId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Cart lifecycle. Only active carts accept mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CartStatus {
    Active,
    Abandoned,
    Converted,
    Expired,
}

/// A line in the cart. Price is a snapshot taken when the line was added;
/// checkout re-reads the catalog before charging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub product_name: String,
    pub quantity: i64,
    pub unit_price: Money,
}

impl CartItem {
    pub fn line_total(&self) -> Money {
        self.unit_price * self.quantity
    }

    fn same_line(&self, product_id: ProductId, variant_id: Option<VariantId>) -> bool {
        self.product_id == product_id && self.variant_id == variant_id
    }
}

/// Aggregate root: Cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cart {
    id: CartId,
    customer_id: CustomerId,
    items: Vec<CartItem>,
    status: CartStatus,
    version: u64,
    created: bool,
}

impl Cart {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: CartId) -> Self {
        Self {
            id,
            customer_id: CustomerId::from_uuid(uuid::Uuid::nil()),
            items: Vec::new(),
            status: CartStatus::Active,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> CartId {
        self.id
    }

    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    pub fn status(&self) -> CartStatus {
        self.status
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn subtotal(&self) -> Money {
        self.items.iter().map(CartItem::line_total).sum()
    }
}

impl AggregateRoot for Cart {
    type Id = CartId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateCart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateCart {
    pub cart_id: CartId,
    pub customer_id: CustomerId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddItem. Adding an existing product/variant line merges
/// quantities instead of duplicating the line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddItem {
    pub cart_id: CartId,
    pub item: CartItem,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateItemQuantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateItemQuantity {
    pub cart_id: CartId,
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemoveItem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveItem {
    pub cart_id: CartId,
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkConverted. Issued by checkout once an order exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkConverted {
    pub cart_id: CartId,
    pub order_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AbandonCart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbandonCart {
    pub cart_id: CartId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ExpireCart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpireCart {
    pub cart_id: CartId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CartCommand {
    CreateCart(CreateCart),
    AddItem(AddItem),
    UpdateItemQuantity(UpdateItemQuantity),
    RemoveItem(RemoveItem),
    MarkConverted(MarkConverted),
    AbandonCart(AbandonCart),
    ExpireCart(ExpireCart),
}

/// Event: CartCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartCreated {
    pub cart_id: CartId,
    pub customer_id: CustomerId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemAdded {
    pub cart_id: CartId,
    pub item: CartItem,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemQuantityUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemQuantityUpdated {
    pub cart_id: CartId,
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemRemoved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRemoved {
    pub cart_id: CartId,
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CartConverted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartConverted {
    pub cart_id: CartId,
    pub order_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CartAbandoned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartAbandoned {
    pub cart_id: CartId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CartExpired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartExpired {
    pub cart_id: CartId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CartEvent {
    CartCreated(CartCreated),
    ItemAdded(ItemAdded),
    ItemQuantityUpdated(ItemQuantityUpdated),
    ItemRemoved(ItemRemoved),
    CartConverted(CartConverted),
    CartAbandoned(CartAbandoned),
    CartExpired(CartExpired),
}

impl Event for CartEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CartEvent::CartCreated(_) => "orders.cart.created",
            CartEvent::ItemAdded(_) => "orders.cart.item_added",
            CartEvent::ItemQuantityUpdated(_) => "orders.cart.item_quantity_updated",
            CartEvent::ItemRemoved(_) => "orders.cart.item_removed",
            CartEvent::CartConverted(_) => "orders.cart.converted",
            CartEvent::CartAbandoned(_) => "orders.cart.abandoned",
            CartEvent::CartExpired(_) => "orders.cart.expired",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            CartEvent::CartCreated(e) => e.occurred_at,
            CartEvent::ItemAdded(e) => e.occurred_at,
            CartEvent::ItemQuantityUpdated(e) => e.occurred_at,
            CartEvent::ItemRemoved(e) => e.occurred_at,
            CartEvent::CartConverted(e) => e.occurred_at,
            CartEvent::CartAbandoned(e) => e.occurred_at,
            CartEvent::CartExpired(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Cart {
    type Command = CartCommand;
    type Event = CartEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            CartEvent::CartCreated(e) => {
                self.id = e.cart_id;
                self.customer_id = e.customer_id;
                self.items = Vec::new();
                self.status = CartStatus::Active;
                self.created = true;
            }
            CartEvent::ItemAdded(e) => {
                match self
                    .items
                    .iter_mut()
                    .find(|i| i.same_line(e.item.product_id, e.item.variant_id))
                {
                    Some(existing) => existing.quantity += e.item.quantity,
                    None => self.items.push(e.item.clone()),
                }
            }
            CartEvent::ItemQuantityUpdated(e) => {
                if let Some(item) = self
                    .items
                    .iter_mut()
                    .find(|i| i.same_line(e.product_id, e.variant_id))
                {
                    item.quantity = e.quantity;
                }
            }
            CartEvent::ItemRemoved(e) => {
                self.items
                    .retain(|i| !i.same_line(e.product_id, e.variant_id));
            }
            CartEvent::CartConverted(_) => {
                self.status = CartStatus::Converted;
            }
            CartEvent::CartAbandoned(_) => {
                self.status = CartStatus::Abandoned;
            }
            CartEvent::CartExpired(_) => {
                self.status = CartStatus::Expired;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            CartCommand::CreateCart(cmd) => self.handle_create(cmd),
            CartCommand::AddItem(cmd) => self.handle_add(cmd),
            CartCommand::UpdateItemQuantity(cmd) => self.handle_update_quantity(cmd),
            CartCommand::RemoveItem(cmd) => self.handle_remove(cmd),
            CartCommand::MarkConverted(cmd) => self.handle_convert(cmd),
            CartCommand::AbandonCart(cmd) => self.handle_abandon(cmd),
            CartCommand::ExpireCart(cmd) => self.handle_expire(cmd),
        }
    }
}

impl Cart {
    fn ensure_active(&self, cart_id: CartId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.id != cart_id {
            return Err(DomainError::invariant("cart_id mismatch"));
        }
        if self.status != CartStatus::Active {
            return Err(DomainError::invalid_state("cart is no longer active"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateCart) -> Result<Vec<CartEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("cart already exists"));
        }
        Ok(vec![CartEvent::CartCreated(CartCreated {
            cart_id: cmd.cart_id,
            customer_id: cmd.customer_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add(&self, cmd: &AddItem) -> Result<Vec<CartEvent>, DomainError> {
        self.ensure_active(cmd.cart_id)?;

        if cmd.item.quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        if cmd.item.unit_price.is_negative() {
            return Err(DomainError::validation("unit price cannot be negative"));
        }

        Ok(vec![CartEvent::ItemAdded(ItemAdded {
            cart_id: cmd.cart_id,
            item: cmd.item.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_quantity(
        &self,
        cmd: &UpdateItemQuantity,
    ) -> Result<Vec<CartEvent>, DomainError> {
        self.ensure_active(cmd.cart_id)?;

        if cmd.quantity <= 0 {
            return Err(DomainError::validation(
                "quantity must be positive; remove the item instead",
            ));
        }
        if !self
            .items
            .iter()
            .any(|i| i.same_line(cmd.product_id, cmd.variant_id))
        {
            return Err(DomainError::not_found());
        }

        Ok(vec![CartEvent::ItemQuantityUpdated(ItemQuantityUpdated {
            cart_id: cmd.cart_id,
            product_id: cmd.product_id,
            variant_id: cmd.variant_id,
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove(&self, cmd: &RemoveItem) -> Result<Vec<CartEvent>, DomainError> {
        self.ensure_active(cmd.cart_id)?;

        if !self
            .items
            .iter()
            .any(|i| i.same_line(cmd.product_id, cmd.variant_id))
        {
            return Err(DomainError::not_found());
        }

        Ok(vec![CartEvent::ItemRemoved(ItemRemoved {
            cart_id: cmd.cart_id,
            product_id: cmd.product_id,
            variant_id: cmd.variant_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_convert(&self, cmd: &MarkConverted) -> Result<Vec<CartEvent>, DomainError> {
        self.ensure_active(cmd.cart_id)?;

        if self.items.is_empty() {
            return Err(DomainError::validation("cannot convert an empty cart"));
        }

        Ok(vec![CartEvent::CartConverted(CartConverted {
            cart_id: cmd.cart_id,
            order_id: cmd.order_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_abandon(&self, cmd: &AbandonCart) -> Result<Vec<CartEvent>, DomainError> {
        self.ensure_active(cmd.cart_id)?;

        Ok(vec![CartEvent::CartAbandoned(CartAbandoned {
            cart_id: cmd.cart_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_expire(&self, cmd: &ExpireCart) -> Result<Vec<CartEvent>, DomainError> {
        self.ensure_active(cmd.cart_id)?;

        Ok(vec![CartEvent::CartExpired(CartExpired {
            cart_id: cmd.cart_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}
