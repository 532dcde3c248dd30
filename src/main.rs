use axum::http::HeaderValue;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use storefront_api::config::{init_tracing, load_config};
use storefront_api::db::establish_connection_from_app_config;
use storefront_api::events::{process_events, EventSender};
use storefront_api::{api_routes, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config()?;
    init_tracing(&config.log_level, config.log_json);
    info!(environment = %config.environment, "Starting storefront API");

    let db = establish_connection_from_app_config(&config).await?;
    let db = Arc::new(db);
    let config = Arc::new(config);

    let (tx, rx) = mpsc::channel(config.event_channel_capacity);
    let event_sender = Arc::new(EventSender::new(tx));
    tokio::spawn(process_events(rx));

    let cors = if config.should_allow_permissive_cors() {
        warn!("CORS is permissive; do not use this configuration in production");
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_allowed_origins
            .as_deref()
            .unwrap_or("")
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .filter_map(|origin| HeaderValue::from_str(origin).ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    let state = Arc::new(AppState::new(
        db,
        Arc::clone(&config),
        Arc::clone(&event_sender),
    ));

    let app = api_routes()
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Failed to install ctrl-c handler: {}", err);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => warn!("Failed to install SIGTERM handler: {}", err),
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("Shutdown signal received");
}
