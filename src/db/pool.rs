// SPDX-License-Identifier: Apache-2.0

//! Connection pool setup. A single `bb8` pool of `diesel-async` connections is shared
//! across every component that writes to or reads from the relational store, matching
//! how the rest of this codebase threads one `PgDbPool` through its workers.

use std::sync::Arc;

use diesel_async::{
    pg::AsyncPgConnection,
    pooled_connection::{bb8::Pool, AsyncDieselConnectionManager, PoolError},
};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

pub type MyDbConnection = AsyncPgConnection;
pub type PgPool = Pool<MyDbConnection>;
pub type PgDbPool = Arc<PgPool>;

pub const DEFAULT_MAX_POOL_SIZE: u32 = 30;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

pub async fn new_db_pool(database_url: &str, max_pool_size: Option<u32>) -> Result<PgDbPool, PoolError> {
    let config = AsyncDieselConnectionManager::<MyDbConnection>::new(database_url);
    let pool = Pool::builder()
        .max_size(max_pool_size.unwrap_or(DEFAULT_MAX_POOL_SIZE))
        .build(config)
        .await?;
    Ok(Arc::new(pool))
}

/// Runs embedded migrations against a synchronous connection to the same database.
/// `diesel_migrations` doesn't speak `diesel-async`, so we open one blocking connection
/// for this one-time bootstrap step, matching `worker.rs::run_migrations`.
pub fn run_migrations(database_url: &str) -> anyhow::Result<()> {
    use diesel::{pg::PgConnection, Connection};
    let mut conn = PgConnection::establish(database_url)?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow::anyhow!("migrations failed: {e}"))?;
    Ok(())
}
