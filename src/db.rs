use crate::errors::ServiceError;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use std::time::Duration;
use tracing::info;

/// Type alias for the shared connection pool.
pub type DbPool = DatabaseConnection;

/// Establishes the connection pool. SQLite URLs (used by the test harness)
/// get a single connection so conditional updates serialize properly.
pub async fn establish_connection(database_url: &str) -> Result<DbPool, ServiceError> {
    let mut opt = ConnectOptions::new(database_url.to_string());
    let max_connections = if database_url.starts_with("sqlite") {
        1
    } else {
        10
    };
    opt.max_connections(max_connections)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(30))
        .acquire_timeout(Duration::from_secs(8))
        .idle_timeout(Duration::from_secs(600))
        .sqlx_logging(false);

    info!(max_connections, "Connecting to database");
    let pool = Database::connect(opt).await?;
    info!("Database connection pool established");
    Ok(pool)
}

pub async fn run_migrations(pool: &DbPool) -> Result<(), ServiceError> {
    info!("Running database migrations");
    let start = std::time::Instant::now();
    migrations::Migrator::up(pool, None).await?;
    info!("Database migrations completed in {:?}", start.elapsed());
    Ok(())
}
