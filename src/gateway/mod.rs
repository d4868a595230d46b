//! HTTP gateway for inbound provider events.

pub mod handlers;
pub mod state;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;

pub use state::AppState;

/// Build the gateway router. Kept separate from serving so tests can drive
/// the router directly.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route(
            "/api/v1/webhooks/provider",
            post(handlers::provider_webhook),
        )
        .with_state(state)
}

/// Bind and serve. Bind failure is fatal: the service must not come up
/// half-listening.
pub async fn run_server(host: &str, port: u16, state: Arc<AppState>) {
    let app = router(state);

    let addr = format!("{}:{}", host, port);
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("❌ FATAL: Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    println!("🚀 Gateway listening on http://{}", addr);
    println!("📬 Webhook endpoint: /api/v1/webhooks/provider");

    if let Err(e) = axum::serve(listener, app).await {
        eprintln!("❌ FATAL: Server error: {}", e);
        std::process::exit(1);
    }
}
