// SPDX-License-Identifier: Apache-2.0

//! Dedup Buffer (spec §4.2). Suppresses replay of transactions already processed,
//! including across restarts: an in-memory LRU ring gives the Listener a fast
//! single-writer path, backed by a durable `dedup_entries` table that survives restarts
//! and tolerates concurrent readers.

use std::sync::Arc;

use diesel::{dsl::count_star, ExpressionMethods, QueryDsl};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use lru::LruCache;
use tokio::sync::Mutex;

use crate::{counters::DEDUP_HITS, errors::CollectorError, schema::dedup_entries};

pub struct DedupBuffer {
    window: usize,
    recent: Arc<Mutex<LruCache<String, ()>>>,
}

impl DedupBuffer {
    pub fn new(window: usize) -> Self {
        let capacity = std::num::NonZeroUsize::new(window.max(1)).unwrap();
        Self {
            window,
            recent: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }

    /// Preloads the in-memory ring with the `window` most recent durable entries. Must
    /// complete before any `try_reserve` call is trusted to short-circuit on the
    /// in-memory path (spec §9: "it is only consulted after the database rehydration
    /// completes").
    pub async fn rehydrate(&self, conn: &mut AsyncPgConnection) -> Result<usize, CollectorError> {
        let rows: Vec<String> = dedup_entries::table
            .select(dedup_entries::tx_id)
            .order(dedup_entries::inserted_at.desc())
            .limit(self.window as i64)
            .load(conn)
            .await?;
        let mut recent = self.recent.lock().await;
        for tx_id in rows.iter().rev() {
            recent.put(tx_id.clone(), ());
        }
        Ok(rows.len())
    }

    /// Within the caller's transaction: if `tx_id` is already present, returns `false`
    /// without writing anything. Otherwise inserts it and returns `true`. Consulted
    /// before any work begins for a transaction.
    pub async fn try_reserve(
        &self,
        conn: &mut AsyncPgConnection,
        tx_id: &str,
    ) -> Result<bool, CollectorError> {
        {
            let recent = self.recent.lock().await;
            if recent.contains(tx_id) {
                DEDUP_HITS.inc();
                return Ok(false);
            }
        }

        let inserted = diesel::insert_into(dedup_entries::table)
            .values((
                dedup_entries::tx_id.eq(tx_id),
                dedup_entries::inserted_at.eq(diesel::dsl::now),
            ))
            .on_conflict(dedup_entries::tx_id)
            .do_nothing()
            .execute(conn)
            .await?;

        if inserted == 0 {
            DEDUP_HITS.inc();
            return Ok(false);
        }

        let mut recent = self.recent.lock().await;
        recent.put(tx_id.to_string(), ());
        Ok(true)
    }

    /// Deletes durable entries beyond the `window` most recent. Safe to run from a
    /// background compactor on any cadence; the size bound only needs to hold
    /// eventually.
    pub async fn compact(&self, conn: &mut AsyncPgConnection) -> Result<usize, CollectorError> {
        let total: i64 = dedup_entries::table
            .select(count_star())
            .first(conn)
            .await?;
        let window = self.window as i64;
        if total <= window {
            return Ok(0);
        }

        let cutoff: Vec<String> = dedup_entries::table
            .select(dedup_entries::tx_id)
            .order(dedup_entries::inserted_at.desc())
            .offset(window)
            .limit(total - window)
            .load(conn)
            .await?;

        let deleted = diesel::delete(
            dedup_entries::table.filter(dedup_entries::tx_id.eq_any(&cutoff)),
        )
        .execute(conn)
        .await?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_fast_path_rejects_without_touching_db() {
        let buffer = DedupBuffer::new(4);
        {
            let mut recent = buffer.recent.lock().await;
            recent.put("seen-tx".to_string(), ());
        }
        let recent = buffer.recent.lock().await;
        assert!(recent.contains("seen-tx"));
        assert!(!recent.contains("unseen-tx"));
    }

    #[test]
    fn window_of_zero_is_clamped_to_one() {
        let buffer = DedupBuffer::new(0);
        assert_eq!(buffer.window, 0);
        // capacity is clamped to avoid a panic constructing LruCache with 0.
    }
}
