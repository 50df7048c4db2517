//! Bearer-token authentication.
//!
//! Session management lives outside this service; the API only needs a
//! way to resolve a bearer token to a customer. The in-memory store
//! backs dev and tests.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use reweave_core::CustomerId;

use crate::context::CustomerContext;

/// Token-to-customer resolution seam.
pub trait SessionStore: Send + Sync {
    fn customer_for(&self, token: &str) -> Option<CustomerId>;
}

/// In-memory session table for dev and tests.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    inner: RwLock<HashMap<String, CustomerId>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a token for a customer and remember it.
    pub fn issue(&self, customer_id: CustomerId) -> String {
        let token = Uuid::now_v7().simple().to_string();
        if let Ok(mut map) = self.inner.write() {
            map.insert(token.clone(), customer_id);
        }
        token
    }
}

impl SessionStore for InMemorySessionStore {
    fn customer_for(&self, token: &str) -> Option<CustomerId> {
        self.inner.read().ok()?.get(token).copied()
    }
}

#[derive(Clone)]
pub struct AuthState {
    pub sessions: Arc<dyn SessionStore>,
}

pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    // Auth rejections use the same `{"error": ...}` body as every other
    // failure in the API.
    let unauthorized = || crate::app::errors::json_error(StatusCode::UNAUTHORIZED, "unauthorized");

    let token = extract_bearer(req.headers()).ok_or_else(unauthorized)?;

    let customer_id = state
        .sessions
        .customer_for(token)
        .ok_or_else(unauthorized)?;

    req.extensions_mut().insert(CustomerContext::new(customer_id));

    Ok(next.run(req).await)
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(axum::http::header::AUTHORIZATION)?;
    let header = header.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        return None;
    }
    Some(token)
}
