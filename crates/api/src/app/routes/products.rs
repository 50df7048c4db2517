use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::json;
use tracing::warn;

use reweave_core::AggregateId;
use reweave_infra::projections::{PreorderBatchRow, ProductQuery, ProductRow, ProductSort};
use reweave_products::{Product, ProductCommand, ProductId, ProductStatus, RecordView};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_products))
        .route("/check-inventory", post(check_inventory))
        .route("/:id", get(get_product))
}

pub async fn list_products(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::ProductListQuery>,
) -> axum::response::Response {
    if let Err(e) = services.checkout.pump() {
        return errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
    }

    let sort = match (query.sort_by.as_deref(), query.sort_order.as_deref()) {
        (Some("price"), Some("desc")) => ProductSort::PriceDesc,
        (Some("price"), _) => ProductSort::PriceAsc,
        (Some("popularity"), _) => ProductSort::Popularity,
        _ => ProductSort::Newest,
    };

    let filter = ProductQuery {
        status: Some(ProductStatus::Active),
        category: query.category.clone(),
        search: query.search.clone(),
        sort,
    };
    let mut rows = services.projections.catalog.list(&filter);

    if let Some(is_preorder) = query.is_preorder {
        rows.retain(|r| r.is_preorder == is_preorder);
    }
    if let Some(min) = query.price_min {
        let min = dto::money_from_major(min);
        rows.retain(|r| r.price.cents() >= min.cents());
    }
    if let Some(max) = query.price_max {
        let max = dto::money_from_major(max);
        rows.retain(|r| r.price.cents() <= max.cents());
    }
    if let Some(tags) = &query.tags {
        let wanted: Vec<String> = tags
            .split(',')
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        rows.retain(|r| {
            wanted
                .iter()
                .all(|w| r.tags.iter().any(|t| t.to_lowercase() == *w))
        });
    }
    if query.in_stock == Some(true) {
        rows.retain(|r| r.is_preorder || total_free(&services, r) > 0);
    }

    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(20).clamp(1, 100);
    let (page_rows, pagination) = dto::paginate(rows, page, limit);

    let now = Utc::now();
    let products = page_rows
        .iter()
        .map(|row| {
            let free = total_free(&services, row);
            let batches = active_batches(&services, row.product_id, now);
            dto::product_to_json(row, free, &batches)
        })
        .collect::<Vec<_>>();

    (
        StatusCode::OK,
        Json(json!({"products": products, "pagination": pagination})),
    )
        .into_response()
}

pub async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(e) = services.checkout.pump() {
        return errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
    }

    // Detail pages accept either the product id or its slug.
    let row = match id.parse::<AggregateId>() {
        Ok(agg) => services.projections.catalog.get(ProductId::new(agg)),
        Err(_) => services.projections.catalog.by_slug(&id),
    };
    let Some(row) = row else {
        return errors::json_error(StatusCode::NOT_FOUND, "product not found");
    };

    // Popularity counter; a failed bump never fails the page.
    let view = ProductCommand::RecordView(RecordView {
        product_id: row.product_id,
        occurred_at: Utc::now(),
    });
    if let Err(e) = services.checkout.dispatcher().dispatch(
        row.product_id.0,
        "products.product",
        view,
        |agg| Product::empty(ProductId::new(agg)),
    ) {
        warn!(product_id = %row.product_id, error = %e, "view count bump failed");
    }
    if let Err(e) = services.checkout.pump() {
        warn!(error = %e, "projection pump failed after view bump");
    }

    let row = services
        .projections
        .catalog
        .get(row.product_id)
        .unwrap_or(row);
    let free = total_free(&services, &row);
    let batches = active_batches(&services, row.product_id, Utc::now());

    (
        StatusCode::OK,
        Json(json!({"product": dto::product_to_json(&row, free, &batches)})),
    )
        .into_response()
}

pub async fn check_inventory(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::CheckInventoryRequest>,
) -> axum::response::Response {
    let product_id = match dto::parse_typed_id(&body.product_id, "product_id") {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let variant_id = match body.variant_id.as_deref() {
        Some(raw) => match dto::parse_typed_id(raw, "variant_id") {
            Ok(id) => Some(id),
            Err(resp) => return resp,
        },
        None => None,
    };
    if body.quantity <= 0 {
        return errors::json_error(StatusCode::BAD_REQUEST, "quantity must be positive");
    }

    let free = match services.checkout.check_inventory(product_id, variant_id) {
        Ok(free) => free,
        Err(e) => return errors::checkout_error_to_response(e),
    };
    let available = free >= body.quantity;
    let message = if available {
        "available".to_string()
    } else {
        format!("only {free} available")
    };

    (
        StatusCode::OK,
        Json(json!({
            "available": available,
            "available_quantity": free,
            "requested_quantity": body.quantity,
            "message": message,
        })),
    )
        .into_response()
}

/// Free-to-promise stock summed across all of a product's records.
fn total_free(services: &AppServices, row: &ProductRow) -> i64 {
    services
        .projections
        .inventory
        .list_levels()
        .iter()
        .filter(|level| level.product_id == row.product_id.0)
        .map(|level| level.free())
        .sum()
}

fn active_batches(
    services: &AppServices,
    product_id: ProductId,
    now: chrono::DateTime<Utc>,
) -> Vec<PreorderBatchRow> {
    services
        .projections
        .preorders
        .list_for_product(product_id)
        .into_iter()
        .filter(|b| b.is_taking_orders(now))
        .collect()
}
