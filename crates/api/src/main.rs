use std::sync::Arc;

use reweave_api::app;
use reweave_api::middleware::InMemorySessionStore;

#[tokio::main]
async fn main() {
    reweave_observability::init();

    let sessions = Arc::new(InMemorySessionStore::new());
    let services = Arc::new(app::services::build_services());
    let router = app::build_app(services, sessions);

    let bind_addr =
        std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("failed to bind listen address");

    tracing::info!("listening on {}", listener.local_addr().unwrap());

    axum::serve(listener, router).await.unwrap();
}
