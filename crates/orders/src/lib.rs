//! Order domain module (event-sourced).
//!
//! Carts, orders, and the pricing rules that turn one into the other. Pure
//! domain logic (no IO, no HTTP, no storage).

pub mod cart;
pub mod order;
pub mod pricing;

pub use cart::{
    AbandonCart, AddItem, Cart, CartAbandoned, CartCommand, CartConverted, CartCreated,
    CartEvent, CartExpired, CartId, CartItem, CartStatus, CreateCart, ExpireCart, ItemAdded,
    ItemQuantityUpdated, ItemRemoved, MarkConverted, RemoveItem, UpdateItemQuantity,
};
pub use order::{
    Address, CancelOrder, CreateOrder, FulfillmentChanged, FulfillmentStatus, Order,
    OrderCancelled, OrderCommand, OrderCreated, OrderEvent, OrderId, OrderItem, OrderStatus,
    OrderVoided, PaymentMethod, PaymentRecorded, PaymentStatus, PaymentStatusChanged,
    RecordPayment, RecordRefund, RefundRecorded, StatusChanged, UpdateStatus, VoidOrder,
};
pub use pricing::{
    estimated_delivery, generate_order_number, shipping_fee, sst, PricingBreakdown,
    ShippingMethod, FREE_SHIPPING_THRESHOLD, SST_RATE_PERCENT,
};
