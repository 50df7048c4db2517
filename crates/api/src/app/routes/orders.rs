use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde_json::json;

use reweave_infra::checkout::PlaceOrderRequest;
use reweave_infra::projections::OrderRow;
use reweave_orders::{CartId, Order, OrderCommand, OrderId, UpdateStatus};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::CustomerContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(checkout).get(list_orders))
        .route("/:order_id", get(get_order))
        .route("/:order_id/status", put(update_status))
        .route("/:order_id/cancel", post(cancel_order))
        .route("/:order_id/payment", post(record_payment))
}

pub async fn checkout(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(customer): Extension<CustomerContext>,
    Json(body): Json<dto::CheckoutRequest>,
) -> axum::response::Response {
    let cart_id = match dto::parse_typed_id(&body.cart_id, "cart_id") {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let placed = match services.checkout.place_order(PlaceOrderRequest {
        cart_id: CartId::new(cart_id),
        customer_id: customer.customer_id(),
        shipping_method: body.shipping_method,
        shipping_address: body.shipping_address,
        billing_address: body.billing_address,
        discount_code: body.discount_code,
    }) {
        Ok(placed) => placed,
        Err(e) => return errors::checkout_error_to_response(e),
    };

    let order = services
        .projections
        .orders
        .get(placed.order_id)
        .map(|row| dto::order_to_json(&row));

    (
        StatusCode::CREATED,
        Json(json!({
            "order": order,
            "message": format!("order {} placed", placed.order_number),
            "next_step": "payment",
        })),
    )
        .into_response()
}

pub async fn list_orders(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(customer): Extension<CustomerContext>,
    Query(query): Query<dto::OrderListQuery>,
) -> axum::response::Response {
    if let Err(e) = services.checkout.pump() {
        return errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
    }

    let mut rows = services
        .projections
        .orders
        .list_for_customer(customer.customer_id());
    if let Some(status) = query.status {
        rows.retain(|r| r.status == status);
    }
    if let Some(search) = &query.search {
        let needle = search.to_lowercase();
        rows.retain(|r| r.order_number.to_lowercase().contains(&needle));
    }

    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(20).clamp(1, 100);
    let (page_rows, pagination) = dto::paginate(rows, page, limit);

    (
        StatusCode::OK,
        Json(json!({
            "orders": page_rows.iter().map(dto::order_to_json).collect::<Vec<_>>(),
            "pagination": pagination,
        })),
    )
        .into_response()
}

pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(customer): Extension<CustomerContext>,
    Path(order_id): Path<String>,
) -> axum::response::Response {
    let row = match owned_order(&services, &customer, &order_id) {
        Ok(row) => row,
        Err(resp) => return resp,
    };

    let ledger = services.checkout.ledger();
    let payments = ledger
        .payment_for(row.order_id)
        .map(|p| vec![dto::payment_to_json(&p)])
        .unwrap_or_default();
    let refunds = ledger
        .refund_for(row.order_id)
        .map(|r| vec![dto::refund_to_json(&r)])
        .unwrap_or_default();
    let timeline = services.projections.orders.timeline(row.order_id);

    (
        StatusCode::OK,
        Json(json!({
            "order": dto::order_to_json(&row),
            "payments": payments,
            "refunds": refunds,
            "timeline": dto::timeline_to_json(&timeline),
        })),
    )
        .into_response()
}

pub async fn update_status(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(customer): Extension<CustomerContext>,
    Path(order_id): Path<String>,
    Json(body): Json<dto::UpdateOrderStatusRequest>,
) -> axum::response::Response {
    let row = match owned_order(&services, &customer, &order_id) {
        Ok(row) => row,
        Err(resp) => return resp,
    };

    let cmd = OrderCommand::UpdateStatus(UpdateStatus {
        order_id: row.order_id,
        status: body.status,
        fulfillment_status: body.fulfillment_status,
        payment_status: body.payment_status,
        notes: body.notes,
        occurred_at: Utc::now(),
    });
    if let Err(e) = services.checkout.dispatcher().dispatch(
        row.order_id.0,
        "orders.order",
        cmd,
        |agg| Order::empty(OrderId::new(agg)),
    ) {
        return errors::dispatch_error_to_response(e);
    }
    if let Err(e) = services.checkout.pump() {
        return errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
    }

    let row = services
        .projections
        .orders
        .get(row.order_id)
        .unwrap_or(row);
    (StatusCode::OK, Json(json!({"order": dto::order_to_json(&row)}))).into_response()
}

pub async fn cancel_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(customer): Extension<CustomerContext>,
    Path(order_id): Path<String>,
    Json(body): Json<dto::CancelOrderRequest>,
) -> axum::response::Response {
    let row = match owned_order(&services, &customer, &order_id) {
        Ok(row) => row,
        Err(resp) => return resp,
    };

    let reason = body.reason.unwrap_or_else(|| "customer requested".to_string());
    if let Err(e) = services.checkout.cancel_order(row.order_id, &reason) {
        return errors::checkout_error_to_response(e);
    }

    let row = services
        .projections
        .orders
        .get(row.order_id)
        .unwrap_or(row);
    (
        StatusCode::OK,
        Json(json!({
            "order": dto::order_to_json(&row),
            "message": "order cancelled",
        })),
    )
        .into_response()
}

pub async fn record_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(customer): Extension<CustomerContext>,
    Path(order_id): Path<String>,
    Json(body): Json<dto::PaymentRequest>,
) -> axum::response::Response {
    let row = match owned_order(&services, &customer, &order_id) {
        Ok(row) => row,
        Err(resp) => return resp,
    };

    let payment = match services.checkout.process_payment(row.order_id, body.method) {
        Ok(payment) => payment,
        Err(e) => return errors::checkout_error_to_response(e),
    };

    if let Err(e) = services.checkout.pump() {
        return errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
    }
    let row = services
        .projections
        .orders
        .get(row.order_id)
        .unwrap_or(row);

    (
        StatusCode::OK,
        Json(json!({
            "payment": dto::payment_to_json(&payment),
            "order": dto::order_to_json(&row),
        })),
    )
        .into_response()
}

/// Resolve an order and check it belongs to the caller. An order owned by
/// someone else reads as not found.
fn owned_order(
    services: &AppServices,
    customer: &CustomerContext,
    raw_id: &str,
) -> Result<OrderRow, axum::response::Response> {
    if let Err(e) = services.checkout.pump() {
        return Err(errors::json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            e.to_string(),
        ));
    }
    let agg = dto::parse_typed_id(raw_id, "order_id")?;
    let row = services
        .projections
        .orders
        .get(OrderId::new(agg))
        .ok_or_else(|| errors::json_error(StatusCode::NOT_FOUND, "order not found"))?;
    if row.customer_id != customer.customer_id() {
        return Err(errors::json_error(StatusCode::NOT_FOUND, "order not found"));
    }
    Ok(row)
}
