use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use std::time::Duration;
use tracing::info;

use crate::config::AppConfig;

/// Type alias for a database connection pool
pub type DbPool = DatabaseConnection;

/// Configuration for database connection
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Database connection URL
    pub url: String,
    /// Maximum number of connections
    pub max_connections: u32,
    /// Minimum number of connections
    pub min_connections: u32,
    /// Connection timeout duration
    pub connect_timeout: Duration,
    /// Idle timeout duration
    pub idle_timeout: Duration,
    /// Acquire connection timeout
    pub acquire_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            acquire_timeout: Duration::from_secs(8),
        }
    }
}

/// Establishes a connection pool to the database
pub async fn establish_connection(config: DbConfig) -> Result<DbPool, DbErr> {
    let mut opts = ConnectOptions::new(config.url.clone());
    opts.max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(config.connect_timeout)
        .idle_timeout(config.idle_timeout)
        .acquire_timeout(config.acquire_timeout)
        .sqlx_logging(false);

    let pool = Database::connect(opts).await?;
    info!("Connected to database");
    Ok(pool)
}

/// Establishes a connection pool using the application configuration
pub async fn establish_connection_from_app_config(cfg: &AppConfig) -> Result<DbPool, DbErr> {
    establish_connection(DbConfig {
        url: cfg.database_url.clone(),
        max_connections: cfg.db_max_connections,
        min_connections: cfg.db_min_connections,
        connect_timeout: Duration::from_secs(cfg.db_connect_timeout_secs),
        idle_timeout: Duration::from_secs(cfg.db_idle_timeout_secs),
        acquire_timeout: Duration::from_secs(cfg.db_acquire_timeout_secs),
    })
    .await
}
