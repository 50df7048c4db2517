//! Infrastructure layer: event store, dispatch, projections, jobs,
//! payments, and the checkout/popup orchestration services.

pub mod checkout;
pub mod command_dispatcher;
pub mod event_store;
pub mod jobs;
pub mod payments;
pub mod popup;
pub mod projections;


pub use checkout::{CheckoutError, CheckoutService, PlaceOrderRequest, PlacedOrder};
pub use command_dispatcher::{CommandDispatcher, DispatchError};
pub use event_store::{
    EventStore, EventStoreError, InMemoryEventStore, StoredEvent, UncommittedEvent,
};
pub use payments::{
    GatewayReceipt, PaymentError, PaymentGateway, PaymentLedger, PaymentRecord, RefundRecord,
    RefundStatus, SimulatedGateway,
};
pub use popup::{PopupAnalyticsReport, PopupEventSummary, PopupService, TopProduct};
pub use projections::{ProjectionError, ProjectionFeed, Projections};
