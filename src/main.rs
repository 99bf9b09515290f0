use std::sync::Arc;

use agriconnect_marketplace::{
    common::{app_state::AppState, auth::TokenService, bootstrap, config, db},
    routes,
    store::{Store, memory::MemoryStore, postgres::PgStore},
};
use anyhow::Result;
use diesel_migrations::{EmbeddedMigrations, embed_migrations};

/// Migrations embedded into the binary which helps with streamlining image building process
const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[tokio::main]
async fn main() -> Result<()> {
    bootstrap::init_tracing();
    bootstrap::init_env();

    let config = config::load()?;

    let store: Arc<dyn Store> = match &config.database {
        Some(database) => {
            tracing::info!("Running migrations...");
            let migrations_count = db::run_migrations_blocking(MIGRATIONS, &database.url).await?;
            tracing::info!("Run {} new migrations successfully", migrations_count);
            Arc::new(PgStore::new(db::create_pool(database).await?))
        }
        None => {
            tracing::warn!("DATABASE_URL is not set, using the in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let tokens = TokenService::new(&config.auth.jwt_secret, config.auth.token_ttl_hours);
    let state = AppState::new(store, config.pricing.clone(), tokens);

    tracing::info!("Bootstrapping...");
    bootstrap::serve("AgriConnect", routes::app(state), &config.server).await?;
    Ok(())
}
