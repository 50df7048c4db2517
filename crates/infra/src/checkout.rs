//! Checkout orchestration.
//!
//! `place_order` runs the multi-aggregate checkout as a compensated
//! sequence: preorder slots are held first, the order is created, then
//! stock is committed line by line. If any step fails, the steps already
//! taken are unwound in reverse (restocks, slot releases, order
//! cancellation) and the original error surfaces to the caller.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Value as JsonValue};
use thiserror::Error;
use tracing::{info, instrument, warn};

use reweave_core::{AggregateId, AggregateRoot, CustomerId, DomainError, Money};
use reweave_events::{EventBus, EventEnvelope};
use reweave_inventory::{CommitStock, MovementSource, Restock, StockRecord, StockRecordId};
use reweave_orders::{
    estimated_delivery, generate_order_number, Address, CancelOrder, Cart, CartCommand, CartId,
    CartStatus, CreateOrder, MarkConverted, Order, OrderCommand, OrderId, OrderItem,
    PaymentMethod, PricingBreakdown, RecordPayment, RecordRefund, ShippingMethod, VoidOrder,
};
use reweave_products::{
    MarkSlotsSold, PreorderBatch, PreorderBatchId, PreorderCommand, ReleaseSlots, ReserveSlots,
};
use reweave_promotions::{
    points_for_order, AwardPoints, DiscountCode, DiscountCodeId, DiscountCommand, LoyaltyAccount,
    LoyaltyAccountId, LoyaltyCommand, OpenAccount, Redeem,
};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::EventStore;
use crate::jobs::{Job, JobKind, JobStore};
use crate::payments::{PaymentError, PaymentGateway, PaymentLedger, PaymentRecord, RefundStatus};
use crate::projections::{ProjectionError, ProjectionFeed, Projections};

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Projection(#[from] ProjectionError),
    #[error(transparent)]
    Payment(#[from] PaymentError),
}

impl From<DomainError> for CheckoutError {
    fn from(value: DomainError) -> Self {
        CheckoutError::Dispatch(DispatchError::from(value))
    }
}

/// What the storefront submits at checkout.
#[derive(Debug, Clone)]
pub struct PlaceOrderRequest {
    pub cart_id: CartId,
    pub customer_id: CustomerId,
    pub shipping_method: ShippingMethod,
    pub shipping_address: Address,
    pub billing_address: Option<Address>,
    pub discount_code: Option<String>,
}

/// Checkout outcome handed back to the storefront.
#[derive(Debug, Clone)]
pub struct PlacedOrder {
    pub order_id: OrderId,
    pub order_number: String,
    pub pricing: PricingBreakdown,
    pub estimated_delivery: DateTime<Utc>,
}

/// A step already taken that must be reversed if checkout fails later.
enum Compensation {
    Restock {
        record_id: StockRecordId,
        quantity: i64,
    },
    ReleaseSlots {
        batch_id: PreorderBatchId,
        quantity: i64,
    },
}

/// Orchestrates checkout, payment, cancellation, and refunds across
/// aggregates. Reads go through the projections; writes go through the
/// command dispatcher one aggregate at a time.
pub struct CheckoutService<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    dispatcher: CommandDispatcher<S, B>,
    projections: Arc<Projections>,
    feed: ProjectionFeed,
    jobs: Arc<dyn JobStore>,
    gateway: Arc<dyn PaymentGateway>,
    ledger: Arc<PaymentLedger>,
}

impl<S, B> CheckoutService<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(
        dispatcher: CommandDispatcher<S, B>,
        projections: Arc<Projections>,
        feed: ProjectionFeed,
        jobs: Arc<dyn JobStore>,
        gateway: Arc<dyn PaymentGateway>,
        ledger: Arc<PaymentLedger>,
    ) -> Self {
        Self {
            dispatcher,
            projections,
            feed,
            jobs,
            gateway,
            ledger,
        }
    }

    pub fn dispatcher(&self) -> &CommandDispatcher<S, B> {
        &self.dispatcher
    }

    pub fn projections(&self) -> &Projections {
        &self.projections
    }

    pub fn jobs(&self) -> &Arc<dyn JobStore> {
        &self.jobs
    }

    pub fn ledger(&self) -> &PaymentLedger {
        &self.ledger
    }

    /// Drain pending envelopes into the projections.
    pub fn pump(&self) -> Result<usize, ProjectionError> {
        self.feed.pump(&self.projections)
    }

    /// Current free stock for a product or variant. Unknown products
    /// report zero rather than an error.
    pub fn check_inventory(
        &self,
        product_id: AggregateId,
        variant_id: Option<AggregateId>,
    ) -> Result<i64, CheckoutError> {
        self.pump()?;
        let free = self
            .projections
            .inventory
            .record_for(product_id, variant_id)
            .map(|record_id| self.projections.inventory.free(record_id))
            .unwrap_or(0);
        Ok(free)
    }

    /// Convert a cart into a paid-pending order: price it, hold preorder
    /// slots, create the order, and commit stock per line. Any failure
    /// unwinds the committed steps and cancels the half-created order.
    #[instrument(skip(self, request), fields(cart_id = %request.cart_id))]
    pub fn place_order(&self, request: PlaceOrderRequest) -> Result<PlacedOrder, CheckoutError> {
        self.pump()?;
        let now = Utc::now();

        let cart = self
            .dispatcher
            .load(request.cart_id.0, |id| Cart::empty(CartId::new(id)))?;
        if cart.version() == 0 {
            return Err(DispatchError::NotFound.into());
        }
        if cart.customer_id() != request.customer_id {
            return Err(DispatchError::Unauthorized.into());
        }
        if cart.status() != CartStatus::Active {
            return Err(DispatchError::InvalidState(format!(
                "cart {} is not active",
                request.cart_id
            ))
            .into());
        }
        if cart.is_empty() {
            return Err(DispatchError::Validation("cart is empty".to_string()).into());
        }

        let (items, has_preorder) = self.build_order_items(&cart, now)?;
        let subtotal = cart.subtotal();

        let (discount, discount_code_id) = match request.discount_code.as_deref() {
            Some(raw) => self.price_discount(raw, subtotal, now)?,
            None => (Money::ZERO, None),
        };

        let pricing = PricingBreakdown::compute(subtotal, discount, request.shipping_method);
        let order_id = OrderId::new(AggregateId::new());
        let order_number = generate_order_number(now);
        let delivery = estimated_delivery(now, request.shipping_method, has_preorder);

        let mut compensations: Vec<Compensation> = Vec::new();

        // Hold preorder slots before the order exists so an exhausted
        // batch fails checkout with nothing to unwind but earlier holds.
        for item in items.iter().filter(|i| i.is_preorder) {
            if let Some(batch_id) = item.preorder_batch_id {
                let result = self.dispatcher.dispatch(
                    batch_id.0,
                    "products.preorder",
                    PreorderCommand::ReserveSlots(ReserveSlots {
                        batch_id,
                        quantity: item.quantity,
                        order_id: order_id.0,
                        occurred_at: now,
                    }),
                    |id| PreorderBatch::empty(PreorderBatchId::new(id)),
                );
                if let Err(err) = result {
                    self.unwind(&compensations, order_id, now);
                    return Err(err.into());
                }
                compensations.push(Compensation::ReleaseSlots {
                    batch_id,
                    quantity: item.quantity,
                });
            }
        }

        let create = CreateOrder {
            order_id,
            order_number: order_number.clone(),
            customer_id: request.customer_id,
            items: items.clone(),
            pricing,
            discount_code: request.discount_code.clone(),
            shipping_method: request.shipping_method,
            shipping_address: request.shipping_address.clone(),
            billing_address: request.billing_address.clone(),
            estimated_delivery: delivery,
            occurred_at: now,
        };
        if let Err(err) = self.dispatcher.dispatch(
            order_id.0,
            "orders.order",
            OrderCommand::CreateOrder(create),
            |id| Order::empty(OrderId::new(id)),
        ) {
            self.unwind(&compensations, order_id, now);
            return Err(err.into());
        }
        self.pump()?;

        // Commit stock per physical line. A failure here rolls back every
        // line already committed plus the slot holds, then voids the order.
        for item in items.iter().filter(|i| !i.is_preorder) {
            let result = self.commit_stock_for(item, order_id, now);
            match result {
                Ok(record_id) => compensations.push(Compensation::Restock {
                    record_id,
                    quantity: item.quantity,
                }),
                Err(err) => {
                    self.unwind(&compensations, order_id, now);
                    if let Err(void_err) = self.dispatcher.dispatch(
                        order_id.0,
                        "orders.order",
                        OrderCommand::VoidOrder(VoidOrder {
                            order_id,
                            reason: "checkout failed: stock commit rejected".to_string(),
                            occurred_at: now,
                        }),
                        |id| Order::empty(OrderId::new(id)),
                    ) {
                        warn!(order_id = %order_id, error = %void_err, "failed to void order after stock commit failure");
                    }
                    return Err(err.into());
                }
            }
        }

        // Side effects below must not fail the placed order; a dropped one
        // is retried as a background job.
        if let Err(err) = self.dispatcher.dispatch(
            request.cart_id.0,
            "orders.cart",
            CartCommand::MarkConverted(MarkConverted {
                cart_id: request.cart_id,
                order_id: order_id.0,
                occurred_at: now,
            }),
            |id| Cart::empty(CartId::new(id)),
        ) {
            warn!(cart_id = %request.cart_id, error = %err, "cart conversion deferred to job");
            self.enqueue_job(
                JobKind::cart_conversion(request.cart_id.0, order_id.0),
                json!({ "cart_id": request.cart_id.to_string() }),
            );
        }

        if let Some(code_id) = discount_code_id {
            if let Err(err) = self.dispatcher.dispatch(
                code_id.0,
                "promotions.discount",
                DiscountCommand::Redeem(Redeem {
                    code_id,
                    order_id: order_id.0,
                    customer_id: request.customer_id,
                    amount: discount,
                    occurred_at: now,
                }),
                |id| DiscountCode::empty(DiscountCodeId::new(id)),
            ) {
                warn!(code_id = %code_id, error = %err, "discount redemption deferred to job");
                self.enqueue_job(
                    JobKind::discount_redemption(code_id.0, order_id.0),
                    json!({ "amount_cents": discount.cents() }),
                );
            }
        }

        self.pump()?;
        info!(order_id = %order_id, order_number = %order_number, total = %pricing.total, "order placed");

        Ok(PlacedOrder {
            order_id,
            order_number,
            pricing,
            estimated_delivery: delivery,
        })
    }

    /// Charge the order total through the gateway and record the payment.
    /// Paying a preorder line converts its held slots into sales. Loyalty
    /// points accrue on the paid total.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub fn process_payment(
        &self,
        order_id: OrderId,
        method: PaymentMethod,
    ) -> Result<PaymentRecord, CheckoutError> {
        let now = Utc::now();
        let order = self
            .dispatcher
            .load(order_id.0, |id| Order::empty(OrderId::new(id)))?;
        if order.version() == 0 {
            return Err(DispatchError::NotFound.into());
        }
        if order.is_paid() {
            return Err(DispatchError::AlreadyPaid.into());
        }

        let total = order.pricing().total;
        let receipt = self.gateway.charge(order_id, total, method)?;
        let record = PaymentRecord {
            order_id,
            amount: total,
            method,
            reference: receipt.reference.clone(),
            processed_at: receipt.processed_at,
        };
        self.ledger.record_payment(record.clone());

        self.dispatcher.dispatch(
            order_id.0,
            "orders.order",
            OrderCommand::RecordPayment(RecordPayment {
                order_id,
                method,
                transaction_reference: receipt.reference,
                occurred_at: now,
            }),
            |id| Order::empty(OrderId::new(id)),
        )?;

        for item in order.items().iter().filter(|i| i.is_preorder) {
            if let Some(batch_id) = item.preorder_batch_id {
                if let Err(err) = self.dispatcher.dispatch(
                    batch_id.0,
                    "products.preorder",
                    PreorderCommand::MarkSlotsSold(MarkSlotsSold {
                        batch_id,
                        quantity: item.quantity,
                        order_id: order_id.0,
                        occurred_at: now,
                    }),
                    |id| PreorderBatch::empty(PreorderBatchId::new(id)),
                ) {
                    warn!(batch_id = %batch_id, error = %err, "failed to mark preorder slots sold");
                }
            }
        }

        if let Err(err) = self.award_loyalty_points(order.customer_id(), order_id, total, now) {
            warn!(order_id = %order_id, error = %err, "loyalty accrual failed");
        }

        self.pump()?;
        info!(order_id = %order_id, amount = %total, "payment recorded");
        Ok(record)
    }

    /// Cancel an order, returning committed stock and held slots. A paid
    /// order additionally opens a refund, settled by a background job.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub fn cancel_order(&self, order_id: OrderId, reason: &str) -> Result<(), CheckoutError> {
        let now = Utc::now();
        let order = self
            .dispatcher
            .load(order_id.0, |id| Order::empty(OrderId::new(id)))?;
        if order.version() == 0 {
            return Err(DispatchError::NotFound.into());
        }
        let was_paid = order.is_paid();

        self.dispatcher.dispatch(
            order_id.0,
            "orders.order",
            OrderCommand::CancelOrder(CancelOrder {
                order_id,
                reason: reason.to_string(),
                occurred_at: now,
            }),
            |id| Order::empty(OrderId::new(id)),
        )?;
        self.pump()?;

        for item in order.items() {
            if item.is_preorder {
                if let Some(batch_id) = item.preorder_batch_id {
                    if let Err(err) = self.dispatcher.dispatch(
                        batch_id.0,
                        "products.preorder",
                        PreorderCommand::ReleaseSlots(ReleaseSlots {
                            batch_id,
                            quantity: item.quantity,
                            order_id: order_id.0,
                            occurred_at: now,
                        }),
                        |id| PreorderBatch::empty(PreorderBatchId::new(id)),
                    ) {
                        warn!(batch_id = %batch_id, error = %err, "slot release on cancel failed");
                    }
                }
            } else if let Some(record_id) = self
                .projections
                .inventory
                .record_for(item.product_id.0, item.variant_id.map(|v| v.0))
            {
                if let Err(err) = self.dispatcher.dispatch(
                    record_id.0,
                    "inventory.record",
                    reweave_inventory::StockCommand::Restock(Restock {
                        record_id,
                        quantity: item.quantity,
                        source: MovementSource::Order(order_id.0),
                        reason: "order cancelled".to_string(),
                        occurred_at: now,
                    }),
                    |id| StockRecord::empty(StockRecordId::new(id)),
                ) {
                    warn!(record_id = %record_id, error = %err, "restock on cancel failed");
                }
            }
        }

        if was_paid {
            self.ledger
                .open_refund(order_id, order.pricing().total, reason);
            self.enqueue_job(
                JobKind::refund_completion(order_id.0),
                json!({ "order_id": order_id.to_string() }),
            );
        }

        self.pump()?;
        info!(order_id = %order_id, was_paid, "order cancelled");
        Ok(())
    }

    /// Settle a pending refund through the gateway. Called by the refund
    /// completion job handler.
    pub fn complete_refund(&self, order_id: OrderId) -> Result<(), CheckoutError> {
        let now = Utc::now();
        let refund = self
            .ledger
            .refund_for(order_id)
            .filter(|r| r.status == RefundStatus::Pending)
            .ok_or(DispatchError::NotFound)?;
        let payment = self
            .ledger
            .payment_for(order_id)
            .ok_or(DispatchError::NotFound)?;

        let receipt = self
            .gateway
            .refund(order_id, refund.amount, &payment.reference)?;
        self.ledger
            .complete_refund(order_id, receipt.reference.clone());

        self.dispatcher.dispatch(
            order_id.0,
            "orders.order",
            OrderCommand::RecordRefund(RecordRefund {
                order_id,
                amount: refund.amount,
                reason: refund.reason,
                refund_reference: receipt.reference,
                occurred_at: now,
            }),
            |id| Order::empty(OrderId::new(id)),
        )?;
        self.pump()?;
        Ok(())
    }

    /// Snapshot cart lines into order lines. Catalog rows supply the
    /// preorder flag, variant names and SKUs; preorder lines bind to the
    /// batch currently taking orders.
    fn build_order_items(
        &self,
        cart: &Cart,
        now: DateTime<Utc>,
    ) -> Result<(Vec<OrderItem>, bool), CheckoutError> {
        let mut items = Vec::with_capacity(cart.items().len());
        let mut has_preorder = false;
        for line in cart.items() {
            let row = self
                .projections
                .catalog
                .get(line.product_id)
                .ok_or_else(|| {
                    DispatchError::Validation(format!(
                        "product {} is not in the catalog",
                        line.product_id
                    ))
                })?;
            let variant = line.variant_id.and_then(|vid| {
                row.variants.iter().find(|v| v.variant_id == vid).cloned()
            });
            let (variant_name, sku) = match (&line.variant_id, variant) {
                (Some(vid), None) => {
                    return Err(DispatchError::Validation(format!(
                        "variant {vid} does not belong to product {}",
                        line.product_id
                    ))
                    .into());
                }
                (Some(_), Some(v)) => (Some(v.name), Some(v.sku)),
                (None, _) => (None, None),
            };

            let preorder_batch_id = if row.is_preorder {
                has_preorder = true;
                let batch = self
                    .projections
                    .preorders
                    .active_for_product(line.product_id, now)
                    .ok_or_else(|| {
                        DispatchError::InvalidState(format!(
                            "no preorder batch is taking orders for product {}",
                            line.product_id
                        ))
                    })?;
                Some(batch.batch_id)
            } else {
                None
            };

            items.push(OrderItem {
                product_id: line.product_id,
                variant_id: line.variant_id,
                product_name: line.product_name.clone(),
                variant_name,
                sku,
                quantity: line.quantity,
                unit_price: line.unit_price,
                is_preorder: row.is_preorder,
                preorder_batch_id,
            });
        }
        Ok((items, has_preorder))
    }

    fn price_discount(
        &self,
        raw_code: &str,
        subtotal: Money,
        now: DateTime<Utc>,
    ) -> Result<(Money, Option<DiscountCodeId>), CheckoutError> {
        let code_id = self
            .projections
            .discounts
            .id_for_code(raw_code)
            .ok_or_else(|| {
                DispatchError::Validation(format!("unknown discount code {raw_code:?}"))
            })?;
        let code = self
            .dispatcher
            .load(code_id.0, |id| DiscountCode::empty(DiscountCodeId::new(id)))?;
        let discount = code.price(subtotal, now)?;
        Ok((discount, Some(code_id)))
    }

    fn commit_stock_for(
        &self,
        item: &OrderItem,
        order_id: OrderId,
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
            reweave_inventory::StockCommand::CommitStock(CommitStock {
                record_id,
                quantity: item.quantity,
                source: MovementSource::Order(order_id.0),
                occurred_at: now,
            }),
            |id| StockRecord::empty(StockRecordId::new(id)),
        )?;
        Ok(record_id)
    }

    /// Reverse already-taken checkout steps, newest first. Unwind is
    /// best-effort; a failed reversal is logged, not surfaced.
    fn unwind(&self, compensations: &[Compensation], order_id: OrderId, now: DateTime<Utc>) {
        for compensation in compensations.iter().rev() {
            match compensation {
                Compensation::Restock {
                    record_id,
                    quantity,
                } => {
                    if let Err(err) = self.dispatcher.dispatch(
                        record_id.0,
                        "inventory.record",
                        reweave_inventory::StockCommand::Restock(Restock {
                            record_id: *record_id,
                            quantity: *quantity,
                            source: MovementSource::Order(order_id.0),
                            reason: "checkout unwound".to_string(),
                            occurred_at: now,
                        }),
                        |id| StockRecord::empty(StockRecordId::new(id)),
                    ) {
                        warn!(record_id = %record_id, error = %err, "restock during unwind failed");
                    }
                }
                Compensation::ReleaseSlots { batch_id, quantity } => {
                    if let Err(err) = self.dispatcher.dispatch(
                        batch_id.0,
                        "products.preorder",
                        PreorderCommand::ReleaseSlots(ReleaseSlots {
                            batch_id: *batch_id,
                            quantity: *quantity,
                            order_id: order_id.0,
                            occurred_at: now,
                        }),
                        |id| PreorderBatch::empty(PreorderBatchId::new(id)),
                    ) {
                        warn!(batch_id = %batch_id, error = %err, "slot release during unwind failed");
                    }
                }
            }
        }
    }

    fn award_loyalty_points(
        &self,
        customer_id: CustomerId,
        order_id: OrderId,
        total: Money,
        now: DateTime<Utc>,
    ) -> Result<(), CheckoutError> {
        let account_id = match self.projections.loyalty.for_customer(customer_id) {
            Some(row) => row.account_id,
            None => {
                let account_id = LoyaltyAccountId::new(AggregateId::new());
                self.dispatcher.dispatch(
                    account_id.0,
                    "promotions.loyalty",
                    LoyaltyCommand::OpenAccount(OpenAccount {
                        account_id,
                        customer_id,
                        occurred_at: now,
                    }),
                    |id| LoyaltyAccount::empty(LoyaltyAccountId::new(id)),
                )?;
                account_id
            }
        };

        let account = self
            .dispatcher
            .load(account_id.0, |id| LoyaltyAccount::empty(LoyaltyAccountId::new(id)))?;
        let points = points_for_order(total, account.tier());
        if points == 0 {
            return Ok(());
        }
        self.dispatcher.dispatch(
            account_id.0,
            "promotions.loyalty",
            LoyaltyCommand::AwardPoints(AwardPoints {
                account_id,
                order_id: order_id.0,
                points,
                occurred_at: now,
            }),
            |id| LoyaltyAccount::empty(LoyaltyAccountId::new(id)),
        )?;
        Ok(())
    }

    fn enqueue_job(&self, kind: JobKind, payload: JsonValue) {
        if let Err(err) = self.jobs.enqueue(Job::new(kind, payload)) {
            warn!(error = %err, "failed to enqueue background job");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Duration;

    use reweave_events::InMemoryEventBus;
    use reweave_inventory::{CreateStockRecord, StockCommand};
    use reweave_orders::{AddItem, CreateCart};
    use reweave_products::{
        CreateProduct, OpenBatch, ProductCommand, ProductDetails, ProductId, Variant, VariantId,
    };
    use reweave_promotions::{CreateCode, DiscountKind};

    use crate::event_store::InMemoryEventStore;
    use crate::jobs::InMemoryJobStore;
    use crate::payments::SimulatedGateway;

    type TestService = CheckoutService<
        Arc<InMemoryEventStore>,
        Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>,
    >;

    fn service() -> TestService {
        let store = Arc::new(InMemoryEventStore::new());
        let bus = Arc::new(InMemoryEventBus::new());
        let feed = ProjectionFeed::new(bus.subscribe());
        let dispatcher = CommandDispatcher::new(store, bus);
        CheckoutService::new(
            dispatcher,
            Arc::new(Projections::new()),
            feed,
            Arc::new(InMemoryJobStore::new()),
            Arc::new(SimulatedGateway::new()),
            Arc::new(PaymentLedger::new()),
        )
    }

    fn test_address() -> Address {
        Address {
            first_name: "Aina".to_string(),
            last_name: "Rahman".to_string(),
            email: "aina@example.com".to_string(),
            phone: "+60123456789".to_string(),
            line1: "12 Jalan Ampang".to_string(),
            line2: None,
            city: "Kuala Lumpur".to_string(),
            state: "WP Kuala Lumpur".to_string(),
            postcode: "50450".to_string(),
            country: "MY".to_string(),
        }
    }

    fn seed_product(
        service: &TestService,
        name: &str,
        slug: &str,
        price: Money,
        is_preorder: bool,
    ) -> ProductId {
        let product_id = ProductId::new(AggregateId::new());
        service
            .dispatcher()
            .dispatch(
                product_id.0,
                "products.product",
                ProductCommand::CreateProduct(CreateProduct {
                    product_id,
                    details: ProductDetails {
                        name: name.to_string(),
                        slug: slug.to_string(),
                        description: "hand-woven".to_string(),
                        price,
                        category: "totes".to_string(),
                        tags: vec![],
                        is_preorder,
                    },
                    variants: Vec::<Variant>::new(),
                    occurred_at: Utc::now(),
                }),
                |id| reweave_products::Product::empty(ProductId::new(id)),
            )
            .unwrap();
        service.pump().unwrap();
        product_id
    }

    fn seed_stock(service: &TestService, product_id: ProductId, quantity: i64) -> StockRecordId {
        let record_id = StockRecordId::new(AggregateId::new());
        service
            .dispatcher()
            .dispatch(
                record_id.0,
                "inventory.record",
                StockCommand::CreateStockRecord(CreateStockRecord {
                    record_id,
                    product_id: product_id.0,
                    variant_id: None,
                    initial_quantity: quantity,
                    low_stock_threshold: 2,
                    reorder_point: 1,
                    occurred_at: Utc::now(),
                }),
                |id| StockRecord::empty(StockRecordId::new(id)),
            )
            .unwrap();
        service.pump().unwrap();
        record_id
    }

    fn seed_cart(
        service: &TestService,
        customer_id: CustomerId,
        lines: &[(ProductId, Option<VariantId>, &str, i64, Money)],
    ) -> CartId {
        let cart_id = CartId::new(AggregateId::new());
        service
            .dispatcher()
            .dispatch(
                cart_id.0,
                "orders.cart",
                CartCommand::CreateCart(CreateCart {
                    cart_id,
                    customer_id,
                    occurred_at: Utc::now(),
                }),
                |id| Cart::empty(CartId::new(id)),
            )
            .unwrap();
        for (product_id, variant_id, name, quantity, unit_price) in lines {
            service
                .dispatcher()
                .dispatch(
                    cart_id.0,
                    "orders.cart",
                    CartCommand::AddItem(AddItem {
                        cart_id,
                        item: reweave_orders::CartItem {
                            product_id: *product_id,
                            variant_id: *variant_id,
                            product_name: name.to_string(),
                            quantity: *quantity,
                            unit_price: *unit_price,
                        },
                        occurred_at: Utc::now(),
                    }),
                    |id| Cart::empty(CartId::new(id)),
                )
                .unwrap();
        }
        service.pump().unwrap();
        cart_id
    }

    fn place_request(cart_id: CartId, customer_id: CustomerId) -> PlaceOrderRequest {
        PlaceOrderRequest {
            cart_id,
            customer_id,
            shipping_method: ShippingMethod::Standard,
            shipping_address: test_address(),
            billing_address: None,
            discount_code: None,
        }
    }

    #[test]
    fn place_order_commits_stock_and_prices_the_cart() {
        let service = service();
        let customer_id = CustomerId::new();
        let price = Money::from_major(50);
        let product_id = seed_product(&service, "Tote", "tote", price, false);
        let record_id = seed_stock(&service, product_id, 10);
        let cart_id = seed_cart(&service, customer_id, &[(product_id, None, "Tote", 2, price)]);

        let placed = service
            .place_order(place_request(cart_id, customer_id))
            .unwrap();

        assert_eq!(placed.pricing.subtotal, Money::from_major(100));
        assert_eq!(placed.pricing.tax, Money::from_cents(600));
        assert_eq!(placed.pricing.shipping, Money::from_cents(1500));
        assert_eq!(placed.pricing.total, Money::from_cents(12_100));

        let level = service.projections().inventory.level(record_id).unwrap();
        assert_eq!(level.available, 8);
        assert_eq!(level.committed, 2);

        let row = service.projections().orders.get(placed.order_id).unwrap();
        assert_eq!(row.order_number, placed.order_number);
        assert_eq!(row.items.len(), 1);

        // Cart converted in the same pass.
        let cart = service
            .dispatcher()
            .load(cart_id.0, |id| Cart::empty(CartId::new(id)))
            .unwrap();
        assert_eq!(cart.status(), CartStatus::Converted);
    }

    #[test]
    fn insufficient_stock_leaves_no_order_behind() {
        let service = service();
        let customer_id = CustomerId::new();
        let price = Money::from_major(50);
        let product_id = seed_product(&service, "Tote", "tote", price, false);
        let record_id = seed_stock(&service, product_id, 1);
        let cart_id = seed_cart(&service, customer_id, &[(product_id, None, "Tote", 2, price)]);

        let err = service
            .place_order(place_request(cart_id, customer_id))
            .unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::Dispatch(DispatchError::InsufficientInventory(_))
        ));

        service.pump().unwrap();
        let level = service.projections().inventory.level(record_id).unwrap();
        assert_eq!(level.available, 1);
        assert_eq!(level.committed, 0);
        // The voided order leaves no trace in the read model: the customer
        // sees no order at all, not a cancelled one.
        assert!(service.projections().orders.list().is_empty());
        assert!(service
            .projections()
            .orders
            .list_for_customer(customer_id)
            .is_empty());
    }

    #[test]
    fn discount_code_is_applied_and_capped() {
        let service = service();
        let customer_id = CustomerId::new();
        let price = Money::from_major(200);
        let product_id = seed_product(&service, "Rug", "rug", price, false);
        seed_stock(&service, product_id, 5);
        let cart_id = seed_cart(&service, customer_id, &[(product_id, None, "Rug", 1, price)]);

        let code_id = DiscountCodeId::new(AggregateId::new());
        let now = Utc::now();
        service
            .dispatcher()
            .dispatch(
                code_id.0,
                "promotions.discount",
                DiscountCommand::CreateCode(CreateCode {
                    code_id,
                    code: "SAVE10".to_string(),
                    kind: DiscountKind::Percentage(10),
                    minimum_order_amount: None,
                    maximum_discount_amount: Some(Money::from_major(5)),
                    starts_at: Some(now - Duration::hours(1)),
                    ends_at: Some(now + Duration::days(30)),
                    usage_limit: None,
                    occurred_at: now,
                }),
                |id| DiscountCode::empty(DiscountCodeId::new(id)),
            )
            .unwrap();
        service.pump().unwrap();

        let mut request = place_request(cart_id, customer_id);
        request.discount_code = Some("SAVE10".to_string());
        let placed = service.place_order(request).unwrap();

        // 10% of RM200 would be RM20; the cap holds it at RM5.
        assert_eq!(placed.pricing.discount, Money::from_major(5));

        let row = service.projections().discounts.get(code_id).unwrap();
        assert_eq!(row.usage_count, 1);
    }

    #[test]
    fn cancelling_an_unpaid_order_restocks_without_a_refund() {
        let service = service();
        let customer_id = CustomerId::new();
        let price = Money::from_major(50);
        let product_id = seed_product(&service, "Tote", "tote", price, false);
        let record_id = seed_stock(&service, product_id, 10);
        let cart_id = seed_cart(&service, customer_id, &[(product_id, None, "Tote", 3, price)]);

        let placed = service
            .place_order(place_request(cart_id, customer_id))
            .unwrap();
        service.cancel_order(placed.order_id, "changed my mind").unwrap();

        let level = service.projections().inventory.level(record_id).unwrap();
        assert_eq!(level.available, 10);
        assert_eq!(level.committed, 0);
        assert!(service.ledger().refund_for(placed.order_id).is_none());
    }

    #[test]
    fn cancelling_a_paid_order_opens_a_refund_and_settles_it() {
        let service = service();
        let customer_id = CustomerId::new();
        let price = Money::from_major(50);
        let product_id = seed_product(&service, "Tote", "tote", price, false);
        seed_stock(&service, product_id, 10);
        let cart_id = seed_cart(&service, customer_id, &[(product_id, None, "Tote", 1, price)]);

        let placed = service
            .place_order(place_request(cart_id, customer_id))
            .unwrap();
        service
            .process_payment(placed.order_id, PaymentMethod::Card)
            .unwrap();
        service.cancel_order(placed.order_id, "damaged in transit").unwrap();

        let refund = service.ledger().refund_for(placed.order_id).unwrap();
        assert_eq!(refund.status, RefundStatus::Pending);
        assert_eq!(refund.amount, placed.pricing.total);

        service.complete_refund(placed.order_id).unwrap();
        let refund = service.ledger().refund_for(placed.order_id).unwrap();
        assert_eq!(refund.status, RefundStatus::Completed);

        let order = service.projections().orders.get(placed.order_id).unwrap();
        assert_eq!(order.status, reweave_orders::OrderStatus::Refunded);
    }

    #[test]
    fn payment_awards_loyalty_points() {
        let service = service();
        let customer_id = CustomerId::new();
        let price = Money::from_major(50);
        let product_id = seed_product(&service, "Tote", "tote", price, false);
        seed_stock(&service, product_id, 10);
        let cart_id = seed_cart(&service, customer_id, &[(product_id, None, "Tote", 2, price)]);

        let placed = service
            .place_order(place_request(cart_id, customer_id))
            .unwrap();
        service
            .process_payment(placed.order_id, PaymentMethod::Card)
            .unwrap();

        let row = service
            .projections()
            .loyalty
            .for_customer(customer_id)
            .unwrap();
        // Bronze multiplier is 1.0: one point per whole ringgit paid.
        assert_eq!(row.points_balance, placed.pricing.total.major_floor());
    }

    #[test]
    fn exhausted_preorder_batch_fails_checkout_cleanly() {
        let service = service();
        let customer_id = CustomerId::new();
        let price = Money::from_major(80);
        let product_id = seed_product(&service, "Batik Run", "batik-run", price, true);

        let batch_id = PreorderBatchId::new(AggregateId::new());
        let now = Utc::now();
        service
            .dispatcher()
            .dispatch(
                batch_id.0,
                "products.preorder",
                PreorderCommand::OpenBatch(OpenBatch {
                    batch_id,
                    product_id,
                    starts_at: now - Duration::hours(1),
                    ends_at: now + Duration::days(14),
                    total_slots: 10,
                    expected_delivery: now + Duration::days(45),
                    occurred_at: now,
                }),
                |id| PreorderBatch::empty(PreorderBatchId::new(id)),
            )
            .unwrap();
        service
            .dispatcher()
            .dispatch(
                batch_id.0,
                "products.preorder",
                PreorderCommand::ReserveSlots(ReserveSlots {
                    batch_id,
                    quantity: 9,
                    order_id: AggregateId::new(),
                    occurred_at: now,
                }),
                |id| PreorderBatch::empty(PreorderBatchId::new(id)),
            )
            .unwrap();
        service.pump().unwrap();

        let cart_id = seed_cart(
            &service,
            customer_id,
            &[(product_id, None, "Batik Run", 2, price)],
        );
        let err = service
            .place_order(place_request(cart_id, customer_id))
            .unwrap_err();
        assert!(matches!(err, CheckoutError::Dispatch(_)));

        service.pump().unwrap();
        let batch = service.projections().preorders.get(batch_id).unwrap();
        assert_eq!(batch.reserved_slots, 9);
    }

    #[test]
    fn paying_twice_is_rejected() {
        let service = service();
        let customer_id = CustomerId::new();
        let price = Money::from_major(50);
        let product_id = seed_product(&service, "Tote", "tote", price, false);
        seed_stock(&service, product_id, 10);
        let cart_id = seed_cart(&service, customer_id, &[(product_id, None, "Tote", 1, price)]);

        let placed = service
            .place_order(place_request(cart_id, customer_id))
            .unwrap();
        service
            .process_payment(placed.order_id, PaymentMethod::Card)
            .unwrap();
        let err = service
            .process_payment(placed.order_id, PaymentMethod::Card)
            .unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::Dispatch(DispatchError::AlreadyPaid)
        ));
    }

    #[test]
    fn another_customers_cart_is_rejected() {
        let service = service();
        let owner = CustomerId::new();
        let price = Money::from_major(50);
        let product_id = seed_product(&service, "Tote", "tote", price, false);
        seed_stock(&service, product_id, 10);
        let cart_id = seed_cart(&service, owner, &[(product_id, None, "Tote", 1, price)]);

        let err = service
            .place_order(place_request(cart_id, CustomerId::new()))
            .unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::Dispatch(DispatchError::Unauthorized)
        ));
    }
}
