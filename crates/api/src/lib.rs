//! JSON storefront API: routing, auth middleware, and DTO mapping.

pub mod app;
pub mod context;
pub mod middleware;
