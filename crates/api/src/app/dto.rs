use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use reweave_core::Money;
use reweave_infra::projections::{
    OrderRow, PopupOrderRow, PreorderBatchRow, ProductRow, QrPaymentRow, TimelineEntry,
};
use reweave_infra::payments::{PaymentRecord, RefundRecord, RefundStatus};
use reweave_orders::{
    Address, FulfillmentStatus, OrderStatus, PaymentMethod, PaymentStatus, ShippingMethod,
};
use reweave_popup::{PopupCustomer, PopupItem, PopupPaymentMethod};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub cart_id: String,
    pub shipping_method: ShippingMethod,
    pub shipping_address: Address,
    pub billing_address: Option<Address>,
    pub discount_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OrderListQuery {
    pub page: Option<usize>,
    pub limit: Option<usize>,
    pub status: Option<OrderStatus>,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateOrderStatusRequest {
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub fulfillment_status: Option<FulfillmentStatus>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CancelOrderRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PaymentRequest {
    pub method: PaymentMethod,
}

#[derive(Debug, Deserialize)]
pub struct ProductListQuery {
    pub page: Option<usize>,
    pub limit: Option<usize>,
    pub category: Option<String>,
    pub search: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub is_preorder: Option<bool>,
    pub in_stock: Option<bool>,
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
    pub tags: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CheckInventoryRequest {
    pub product_id: String,
    pub variant_id: Option<String>,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct PopupItemRequest {
    pub product_id: String,
    pub variant_id: Option<String>,
    pub product_name: String,
    pub variant_name: Option<String>,
    pub quantity: i64,
    /// Unit price in major units (ringgit).
    pub unit_price: f64,
}

#[derive(Debug, Deserialize)]
pub struct PopupOrderRequest {
    pub items: Vec<PopupItemRequest>,
    pub customer: PopupCustomerRequest,
    pub event_name: String,
    pub payment_method: PopupPaymentMethod,
}

#[derive(Debug, Deserialize)]
pub struct PopupCustomerRequest {
    pub name: String,
    pub phone: String,
    pub instagram: Option<String>,
    pub email: Option<String>,
}

impl From<PopupCustomerRequest> for PopupCustomer {
    fn from(req: PopupCustomerRequest) -> Self {
        PopupCustomer {
            name: req.name,
            phone: req.phone,
            instagram: req.instagram,
            email: req.email,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct QrPaymentRequest {
    pub popup_order_id: String,
}

// -------------------------
// Money conversion
// -------------------------

/// Major units (ringgit, two decimals) to cents, half-up.
pub fn money_from_major(value: f64) -> Money {
    Money::from_cents((value * 100.0).round() as i64)
}

pub fn money_to_json(m: Money) -> JsonValue {
    json!(m.cents() as f64 / 100.0)
}

// -------------------------
// JSON mapping helpers
// -------------------------

pub fn pricing_to_json(p: &reweave_orders::PricingBreakdown) -> JsonValue {
    json!({
        "subtotal": money_to_json(p.subtotal),
        "discount": money_to_json(p.discount),
        "tax": money_to_json(p.tax),
        "shipping": money_to_json(p.shipping),
        "total": money_to_json(p.total),
    })
}

pub fn order_to_json(row: &OrderRow) -> JsonValue {
    json!({
        "id": row.order_id.to_string(),
        "order_number": row.order_number,
        "status": row.status,
        "payment_status": row.payment_status,
        "fulfillment_status": row.fulfillment_status,
        "shipping_method": row.shipping_method,
        "discount_code": row.discount_code,
        "pricing": pricing_to_json(&row.pricing),
        "items": row.items.iter().map(order_item_to_json).collect::<Vec<_>>(),
        "placed_at": row.placed_at.to_rfc3339(),
        "paid_at": row.paid_at.map(|t| t.to_rfc3339()),
        "cancelled_at": row.cancelled_at.map(|t| t.to_rfc3339()),
        "estimated_delivery": row.estimated_delivery.to_rfc3339(),
    })
}

pub fn order_item_to_json(item: &reweave_orders::OrderItem) -> JsonValue {
    json!({
        "product_id": item.product_id.to_string(),
        "variant_id": item.variant_id.map(|v| v.to_string()),
        "product_name": item.product_name,
        "variant_name": item.variant_name,
        "sku": item.sku,
        "quantity": item.quantity,
        "unit_price": money_to_json(item.unit_price),
        "line_total": money_to_json(item.line_total()),
        "is_preorder": item.is_preorder,
    })
}

pub fn timeline_to_json(entries: &[TimelineEntry]) -> JsonValue {
    json!(entries
        .iter()
        .map(|e| json!({
            "label": e.label,
            "detail": e.detail,
            "occurred_at": e.occurred_at.to_rfc3339(),
        }))
        .collect::<Vec<_>>())
}

pub fn payment_to_json(p: &PaymentRecord) -> JsonValue {
    json!({
        "amount": money_to_json(p.amount),
        "method": p.method,
        "reference": p.reference,
        "processed_at": p.processed_at.to_rfc3339(),
    })
}

pub fn refund_to_json(r: &RefundRecord) -> JsonValue {
    json!({
        "amount": money_to_json(r.amount),
        "reason": r.reason,
        "status": match r.status {
            RefundStatus::Pending => "pending",
            RefundStatus::Completed => "completed",
        },
        "reference": r.reference,
        "requested_at": r.requested_at.to_rfc3339(),
        "completed_at": r.completed_at.map(|t| t.to_rfc3339()),
    })
}

pub fn product_to_json(
    row: &ProductRow,
    free_stock: i64,
    batches: &[PreorderBatchRow],
) -> JsonValue {
    json!({
        "id": row.product_id.to_string(),
        "name": row.name,
        "slug": row.slug,
        "description": row.description,
        "price": money_to_json(row.price),
        "category": row.category,
        "tags": row.tags,
        "is_preorder": row.is_preorder,
        "status": row.status,
        "view_count": row.view_count,
        "variants": row.variants.iter().map(|v| json!({
            "id": v.variant_id.to_string(),
            "sku": v.sku,
            "name": v.name,
            "price_override": v.price_override.map(money_to_json),
        })).collect::<Vec<_>>(),
        "inventory": {
            "total_stock": free_stock,
            "is_in_stock": free_stock > 0,
        },
        "preorder_batches": batches.iter().map(batch_to_json).collect::<Vec<_>>(),
    })
}

pub fn batch_to_json(b: &PreorderBatchRow) -> JsonValue {
    json!({
        "id": b.batch_id.to_string(),
        "status": b.status,
        "total_slots": b.total_slots,
        "available_slots": b.available_slots(),
        "starts_at": b.starts_at.to_rfc3339(),
        "ends_at": b.ends_at.to_rfc3339(),
        "expected_delivery": b.expected_delivery.to_rfc3339(),
    })
}

pub fn popup_order_to_json(row: &PopupOrderRow) -> JsonValue {
    json!({
        "id": row.popup_order_id.to_string(),
        "popup_number": row.popup_number,
        "event_name": row.event_name,
        "payment_method": row.payment_method,
        "total": money_to_json(row.total),
        "status": row.status,
        "payment_reference": row.payment_reference,
        "items": row.items.iter().map(|i| json!({
            "product_id": i.product_id.to_string(),
            "product_name": i.product_name,
            "variant_name": i.variant_name,
            "quantity": i.quantity,
            "unit_price": money_to_json(i.unit_price),
        })).collect::<Vec<_>>(),
        "customer": {
            "name": row.customer.name,
            "phone": row.customer.phone,
            "instagram": row.customer.instagram,
            "email": row.customer.email,
        },
        "created_at": row.created_at.to_rfc3339(),
        "paid_at": row.paid_at.map(|t| t.to_rfc3339()),
    })
}

pub fn qr_payment_to_json(row: &QrPaymentRow) -> JsonValue {
    json!({
        "id": row.payment_id.to_string(),
        "popup_order_id": row.popup_order_id.to_string(),
        "code": row.code,
        "amount": money_to_json(row.amount),
        "method": row.method,
        "status": row.status,
        "expires_at": row.expires_at.to_rfc3339(),
    })
}

pub fn to_popup_item(req: PopupItemRequest) -> Result<PopupItem, axum::response::Response> {
    let product_id = parse_typed_id(&req.product_id, "product_id")?;
    let variant_id = match req.variant_id {
        Some(raw) => Some(parse_typed_id(&raw, "variant_id")?),
        None => None,
    };
    Ok(PopupItem {
        product_id: reweave_products::ProductId::new(product_id),
        variant_id: variant_id.map(reweave_products::VariantId::new),
        product_name: req.product_name,
        variant_name: req.variant_name,
        quantity: req.quantity,
        unit_price: money_from_major(req.unit_price),
    })
}

pub fn parse_typed_id(
    raw: &str,
    field: &str,
) -> Result<reweave_core::AggregateId, axum::response::Response> {
    raw.parse().map_err(|_| {
        crate::app::errors::json_error(
            axum::http::StatusCode::BAD_REQUEST,
            format!("invalid {field}"),
        )
    })
}

pub fn popup_event_to_json(summary: &reweave_infra::popup::PopupEventSummary) -> JsonValue {
    json!({
        "event_name": summary.event_name,
        "orders": summary.orders,
        "revenue": money_to_json(summary.revenue),
    })
}

pub fn popup_analytics_to_json(report: &reweave_infra::popup::PopupAnalyticsReport) -> JsonValue {
    json!({
        "total_sales": money_to_json(report.total_sales),
        "order_count": report.order_count,
        "unique_customers": report.unique_customers,
        "average_order_value": money_to_json(report.average_order_value),
        "cash_orders": report.cash_orders,
        "card_orders": report.card_orders,
        "qr_orders": report.qr_orders,
        "top_products": report.top_products.iter().map(|p| json!({
            "product_name": p.product_name,
            "quantity": p.quantity,
            "revenue": money_to_json(p.revenue),
        })).collect::<Vec<_>>(),
    })
}

#[derive(Debug, Deserialize)]
pub struct MarkPopupPaidRequest {
    pub payment_reference: Option<String>,
}

// -------------------------
// Envelopes
// -------------------------

/// Pagination envelope shared by list endpoints.
pub fn pagination_json(page: usize, limit: usize, total: usize) -> JsonValue {
    let total_pages = total.div_ceil(limit.max(1));
    json!({
        "page": page,
        "limit": limit,
        "total": total,
        "total_pages": total_pages,
    })
}

/// Slice a full result set down to the requested page.
pub fn paginate<T>(items: Vec<T>, page: usize, limit: usize) -> (Vec<T>, JsonValue) {
    let total = items.len();
    let start = (page.saturating_sub(1)) * limit;
    let page_items = items
        .into_iter()
        .skip(start)
        .take(limit)
        .collect::<Vec<_>>();
    (page_items, pagination_json(page, limit, total))
}

/// Popup endpoints reply with `{success, data?, message?, error?}`.
pub fn popup_success(data: JsonValue, message: impl Into<String>) -> JsonValue {
    json!({
        "success": true,
        "data": data,
        "message": message.into(),
    })
}

pub fn popup_failure(error: impl Into<String>) -> JsonValue {
    json!({
        "success": false,
        "error": error.into(),
    })
}
