use anyhow::{Context, Result, anyhow};
use diesel::Connection;
use diesel_async::{
    AsyncPgConnection,
    async_connection_wrapper::AsyncConnectionWrapper,
    pooled_connection::{AsyncDieselConnectionManager, bb8::Pool},
};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness};

use crate::common::config::DatabaseConfig;

pub type DbPool = Pool<AsyncPgConnection>;

pub async fn create_pool(config: &DatabaseConfig) -> Result<DbPool> {
    let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(&config.url);
    Pool::builder()
        .max_size(config.max_connections)
        .build(manager)
        .await
        .context("Failed to build the DB connection pool")
}

/// Runs pending migrations on a blocking thread and returns how many were applied.
pub async fn run_migrations_blocking(
    migrations: EmbeddedMigrations,
    database_url: &str,
) -> Result<usize> {
    let url = database_url.to_owned();
    tokio::task::spawn_blocking(move || -> Result<usize> {
        let mut conn = AsyncConnectionWrapper::<AsyncPgConnection>::establish(&url)
            .context("Failed to connect to the database for migrations")?;
        let applied = conn
            .run_pending_migrations(migrations)
            .map_err(|e| anyhow!("Failed to run migrations: {e}"))?;
        Ok(applied.len())
    })
    .await
    .context("Migration task panicked")?
}
