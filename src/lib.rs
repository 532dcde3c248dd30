pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod services;

use axum::{routing::get, Json, Router};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::events::EventSender;
use crate::handlers::AppServices;

/// Shared application state handed to every handler.
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
    pub event_sender: Arc<EventSender>,
    pub services: AppServices,
}

impl AppState {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: Arc<AppConfig>,
        event_sender: Arc<EventSender>,
    ) -> Self {
        let services = AppServices::new(
            Arc::clone(&db),
            Arc::clone(&event_sender),
            Arc::clone(&config),
        );
        Self {
            db,
            config,
            event_sender,
            services,
        }
    }
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Builds the versioned API router.
pub fn api_routes() -> Router<Arc<AppState>> {
    let v1 = Router::new()
        .nest("/products", handlers::products::routes())
        .nest("/carts", handlers::carts::routes())
        .nest("/coupons", handlers::coupons::routes())
        .nest("/orders", handlers::orders::routes())
        .nest("/checkout", handlers::checkout::routes());

    Router::new()
        .nest("/api/v1", v1)
        .route("/health", get(health_check))
}
