use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use reweave_infra::checkout::CheckoutError;
use reweave_popup::PopupOrderId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/orders", post(create_order))
        .route("/orders/:popup_order_id/paid", post(mark_paid))
        .route("/qr-payment", post(generate_qr_payment))
        .route("/qr-payment/:code/verify", get(verify_qr_payment))
        .route("/events", get(list_events))
        .route("/analytics", get(analytics))
}

pub async fn create_order(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::PopupOrderRequest>,
) -> axum::response::Response {
    if body.items.is_empty() {
        return failure(
            StatusCode::BAD_REQUEST,
            "a popup order needs at least one item",
        );
    }

    let mut items = Vec::with_capacity(body.items.len());
    for item in body.items {
        match dto::to_popup_item(item) {
            Ok(item) => items.push(item),
            Err(resp) => return resp,
        }
    }

    match services.popup.create_order(
        items,
        body.customer.into(),
        &body.event_name,
        body.payment_method,
    ) {
        Ok(row) => (
            StatusCode::CREATED,
            Json(dto::popup_success(
                dto::popup_order_to_json(&row),
                format!("popup order {} recorded", row.popup_number),
            )),
        )
            .into_response(),
        Err(e) => checkout_failure(e),
    }
}

pub async fn mark_paid(
    Extension(services): Extension<Arc<AppServices>>,
    Path(popup_order_id): Path<String>,
    Json(body): Json<dto::MarkPopupPaidRequest>,
) -> axum::response::Response {
    let agg = match dto::parse_typed_id(&popup_order_id, "popup_order_id") {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let popup_order_id = PopupOrderId::new(agg);
    let reference = body
        .payment_reference
        .unwrap_or_else(|| "till".to_string());

    if let Err(e) = services.popup.mark_paid(popup_order_id, &reference) {
        return checkout_failure(e);
    }

    match services.popup.projections().popup.order(popup_order_id) {
        Some(row) => (
            StatusCode::OK,
            Json(dto::popup_success(
                dto::popup_order_to_json(&row),
                "payment recorded",
            )),
        )
            .into_response(),
        None => failure(StatusCode::NOT_FOUND, "popup order not found"),
    }
}

pub async fn generate_qr_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::QrPaymentRequest>,
) -> axum::response::Response {
    let agg = match dto::parse_typed_id(&body.popup_order_id, "popup_order_id") {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.popup.generate_qr_payment(PopupOrderId::new(agg)) {
        Ok(row) => (
            StatusCode::CREATED,
            Json(dto::popup_success(
                dto::qr_payment_to_json(&row),
                "scan to pay",
            )),
        )
            .into_response(),
        Err(e) => checkout_failure(e),
    }
}

pub async fn verify_qr_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Path(code): Path<String>,
) -> axum::response::Response {
    match services.popup.verify_qr_payment(&code) {
        Ok(row) => (
            StatusCode::OK,
            Json(dto::popup_success(
                dto::popup_order_to_json(&row),
                "payment verified",
            )),
        )
            .into_response(),
        Err(e) => checkout_failure(e),
    }
}

pub async fn list_events(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.popup.events() {
        Ok(events) => (
            StatusCode::OK,
            Json(dto::popup_success(
                json!(events.iter().map(dto::popup_event_to_json).collect::<Vec<_>>()),
                "events",
            )),
        )
            .into_response(),
        Err(e) => checkout_failure(e),
    }
}

pub async fn analytics(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.popup.analytics() {
        Ok(report) => (
            StatusCode::OK,
            Json(dto::popup_success(
                dto::popup_analytics_to_json(&report),
                "analytics",
            )),
        )
            .into_response(),
        Err(e) => checkout_failure(e),
    }
}

fn failure(status: StatusCode, message: &str) -> axum::response::Response {
    (status, Json(dto::popup_failure(message))).into_response()
}

fn checkout_failure(err: CheckoutError) -> axum::response::Response {
    let status = errors::checkout_error_status(&err);
    (status, Json(dto::popup_failure(err.to_string()))).into_response()
}
