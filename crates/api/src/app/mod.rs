//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: infrastructure wiring (event store/bus, projections, services)
//! - `routes/`: HTTP routes + handlers (one file per domain area)
//! - `dto.rs`: request/response DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};

use crate::middleware;
use crate::middleware::SessionStore;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
///
/// Catalog browsing is public; orders and popup endpoints require a
/// bearer token resolvable through the session store.
pub fn build_app(services: Arc<services::AppServices>, sessions: Arc<dyn SessionStore>) -> Router {
    let auth_state = middleware::AuthState { sessions };

    let protected = Router::new()
        .nest("/orders", routes::orders::router())
        .nest("/popup", routes::popup::router())
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));

    let api = Router::new()
        .nest("/products", routes::products::router())
        .merge(protected);

    Router::new()
        .route("/health", get(routes::system::health))
        .nest("/api", api)
        .layer(Extension(services))
}
