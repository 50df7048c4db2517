//! Infrastructure wiring: event store/bus, projections, services, jobs.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde_json::Value as JsonValue;

use reweave_events::{EventBus, EventEnvelope, InMemoryEventBus};
use reweave_infra::checkout::CheckoutService;
use reweave_infra::command_dispatcher::CommandDispatcher;
use reweave_infra::event_store::InMemoryEventStore;
use reweave_infra::jobs::{
    InMemoryJobStore, JobExecutor, JobExecutorConfig, JobExecutorHandle, JobKind, JobResult,
    JobStore,
};
use reweave_infra::payments::{PaymentLedger, SimulatedGateway};
use reweave_infra::popup::PopupService;
use reweave_infra::projections::{ProjectionFeed, Projections};
use reweave_orders::{CartCommand, CartId, MarkConverted, Order, OrderId};
use reweave_promotions::{DiscountCode, DiscountCodeId, DiscountCommand, Redeem};

pub type Store = Arc<InMemoryEventStore>;
pub type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

/// Everything the route handlers need, wired once at startup.
pub struct AppServices {
    pub checkout: Arc<CheckoutService<Store, Bus>>,
    pub popup: Arc<PopupService<Store, Bus>>,
    pub store: Store,
    pub projections: Arc<Projections>,
    pub jobs: Arc<InMemoryJobStore>,
    executor: Mutex<Option<JobExecutorHandle>>,
}

impl AppServices {
    /// Stop the background executor. Used by tests; in production the
    /// executor lives as long as the process.
    pub fn shutdown_executor(&self) {
        if let Ok(mut guard) = self.executor.lock() {
            if let Some(handle) = guard.take() {
                handle.shutdown();
            }
        }
    }
}

/// Build the full in-memory service graph and start the job executor.
pub fn build_services() -> AppServices {
    let store: Store = Arc::new(InMemoryEventStore::new());
    let bus: Bus = Arc::new(InMemoryEventBus::new());
    let projections = Arc::new(Projections::new());
    let jobs = Arc::new(InMemoryJobStore::new());

    // Subscribe before anything can publish.
    let checkout_feed = ProjectionFeed::new(bus.subscribe());
    let popup_feed = ProjectionFeed::new(bus.subscribe());

    let checkout = Arc::new(CheckoutService::new(
        CommandDispatcher::new(store.clone(), bus.clone()),
        projections.clone(),
        checkout_feed,
        jobs.clone() as Arc<dyn JobStore>,
        Arc::new(SimulatedGateway::new()),
        Arc::new(PaymentLedger::new()),
    ));
    let popup = Arc::new(PopupService::new(
        CommandDispatcher::new(store.clone(), bus.clone()),
        projections.clone(),
        popup_feed,
    ));

    let executor = spawn_executor(
        jobs.clone(),
        checkout.clone(),
        store.clone(),
        projections.clone(),
    );

    AppServices {
        checkout,
        popup,
        store,
        projections,
        jobs,
        executor: Mutex::new(Some(executor)),
    }
}

/// Register the side-effect job handlers and start the polling thread.
fn spawn_executor(
    jobs: Arc<InMemoryJobStore>,
    checkout: Arc<CheckoutService<Store, Bus>>,
    store: Store,
    projections: Arc<Projections>,
) -> JobExecutorHandle {
    let mut executor = JobExecutor::new(jobs);

    let refund_checkout = checkout.clone();
    executor.register_handler("payments.refund_completion", move |job| {
        let JobKind::RefundCompletion { order_id } = &job.kind else {
            return JobResult::Failure("wrong kind".to_string());
        };
        match refund_checkout.complete_refund(OrderId::new(*order_id)) {
            Ok(()) => JobResult::Success,
            Err(e) => JobResult::Failure(e.to_string()),
        }
    });

    let conversion_checkout = checkout.clone();
    executor.register_handler("orders.cart_conversion", move |job| {
        let JobKind::CartConversion { cart_id, order_id } = &job.kind else {
            return JobResult::Failure("wrong kind".to_string());
        };
        let result = conversion_checkout.dispatcher().dispatch(
            *cart_id,
            "orders.cart",
            CartCommand::MarkConverted(MarkConverted {
                cart_id: CartId::new(*cart_id),
                order_id: *order_id,
                occurred_at: Utc::now(),
            }),
            |id| reweave_orders::Cart::empty(CartId::new(id)),
        );
        match result {
            Ok(_) => JobResult::Success,
            Err(e) => JobResult::Failure(e.to_string()),
        }
    });

    let redemption_checkout = checkout.clone();
    executor.register_handler("promotions.discount_redemption", move |job| {
        let JobKind::DiscountRedemption { code_id, order_id } = &job.kind else {
            return JobResult::Failure("wrong kind".to_string());
        };
        // The order carries the customer and the amount actually taken off.
        let order = match redemption_checkout
            .dispatcher()
            .load(*order_id, |id| Order::empty(OrderId::new(id)))
        {
            Ok(o) => o,
            Err(e) => return JobResult::Failure(e.to_string()),
        };
        let result = redemption_checkout.dispatcher().dispatch(
            *code_id,
            "promotions.discount",
            DiscountCommand::Redeem(Redeem {
                code_id: DiscountCodeId::new(*code_id),
                order_id: *order_id,
                customer_id: order.customer_id(),
                amount: order.pricing().discount,
                occurred_at: Utc::now(),
            }),
            |id| DiscountCode::empty(DiscountCodeId::new(id)),
        );
        match result {
            Ok(_) => JobResult::Success,
            Err(e) => JobResult::Failure(e.to_string()),
        }
    });

    executor.register_handler("projections.rebuild", move |_job| {
        let history = match store.all_events() {
            Ok(h) => h,
            Err(e) => return JobResult::Failure(format!("{e}")),
        };
        match projections.rebuild_from_scratch(history.iter().map(|e| e.to_envelope())) {
            Ok(()) => JobResult::Success,
            Err(e) => JobResult::Failure(e.to_string()),
        }
    });

    executor.spawn(JobExecutorConfig::default().with_name("reweave-api"))
}
