// SPDX-License-Identifier: Apache-2.0

//! Shared setup for Postgres-backed integration tests. Every test in this directory
//! that needs a live database reads its connection string from `DATABASE_URL`
//! (the same variable `db::pool::new_db_pool` takes in production) and is marked
//! `#[ignore]` so `cargo test` alone never requires a running Postgres instance, the
//! way the teacher's own integration-tests crate assumes a reachable database rather
//! than spinning one up implicitly.

use diesel_async::RunQueryDsl;
use governance_vote_collector::db::pool::{self, PgDbPool};

/// Builds a fresh pool against `DATABASE_URL`, runs migrations, and truncates every
/// table so each test starts from empty state. Panics (rather than skipping) if
/// `DATABASE_URL` is unset — callers only reach this from `#[ignore]`-gated tests, so a
/// panic here means the test was run without the database it explicitly asked for.
pub async fn fresh_pool() -> PgDbPool {
    let database_url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set to run Postgres-backed integration tests");

    pool::run_migrations(&database_url).expect("failed to run migrations against DATABASE_URL");
    let db_pool = pool::new_db_pool(&database_url, Some(5))
        .await
        .expect("failed to build connection pool against DATABASE_URL");

    let mut conn = db_pool.get().await.expect("failed to acquire a connection to truncate");
    diesel::sql_query(
        "TRUNCATE TABLE transaction_cursor, component_metadata, dedup_entries, \
         proposals, temperature_checks, vote_records, vote_tallies, \
         recompute_triggers, governance_parameters, dead_letters",
    )
    .execute(&mut conn)
    .await
    .expect("failed to truncate tables before test");
    drop(conn);

    db_pool
}
