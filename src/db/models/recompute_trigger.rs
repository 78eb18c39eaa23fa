// SPDX-License-Identifier: Apache-2.0

//! RecomputeTrigger (spec §3, §4.11). Enqueued when weight calculation returns
//! `PendingWeight`; consumed by the Trigger Consumer; deleted on success; archived
//! ("failed") after exceeding `triggerMaxAttempts`.

use diesel::{ExpressionMethods, Identifiable, Insertable, QueryDsl, Queryable};
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::{errors::CollectorError, schema::recompute_triggers};

#[derive(Clone, Debug, Insertable)]
#[diesel(table_name = recompute_triggers)]
pub struct NewRecomputeTrigger {
    pub voter_account: String,
    pub poll_id: i64,
    pub poll_kind: String,
    pub anchoring_state_version: i64,
}

#[derive(Clone, Debug, Identifiable, Queryable)]
#[diesel(table_name = recompute_triggers)]
#[diesel(primary_key(trigger_id))]
pub struct RecomputeTrigger {
    pub trigger_id: i64,
    pub voter_account: String,
    pub poll_id: i64,
    pub poll_kind: String,
    pub anchoring_state_version: i64,
    pub attempts: i32,
    pub next_attempt_at: chrono::NaiveDateTime,
    pub status: String,
    pub created_at: chrono::NaiveDateTime,
}

pub async fn enqueue(
    conn: &mut AsyncPgConnection,
    trigger: NewRecomputeTrigger,
) -> Result<(), CollectorError> {
    diesel::insert_into(recompute_triggers::table)
        .values(&trigger)
        .execute(conn)
        .await?;
    Ok(())
}

/// Pops due triggers (`nextAttemptAt <= now`) for processing. Uses `FOR UPDATE SKIP
/// LOCKED` so a bounded number of triggers can be worked concurrently without two
/// workers racing on the same trigger.
pub async fn claim_due(
    conn: &mut AsyncPgConnection,
    limit: i64,
) -> Result<Vec<RecomputeTrigger>, CollectorError> {
    let due = recompute_triggers::table
        .filter(recompute_triggers::status.eq("pending"))
        .filter(recompute_triggers::next_attempt_at.le(diesel::dsl::now))
        .order(recompute_triggers::next_attempt_at.asc())
        .limit(limit)
        .for_update()
        .skip_locked()
        .load::<RecomputeTrigger>(conn)
        .await?;
    Ok(due)
}

pub async fn delete(conn: &mut AsyncPgConnection, trigger_id: i64) -> Result<(), CollectorError> {
    diesel::delete(
        recompute_triggers::table.filter(recompute_triggers::trigger_id.eq(trigger_id)),
    )
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn reschedule(
    conn: &mut AsyncPgConnection,
    trigger_id: i64,
    attempts: i32,
    next_attempt_at: chrono::NaiveDateTime,
) -> Result<(), CollectorError> {
    diesel::update(recompute_triggers::table.filter(recompute_triggers::trigger_id.eq(trigger_id)))
        .set((
            recompute_triggers::attempts.eq(attempts),
            recompute_triggers::next_attempt_at.eq(next_attempt_at),
        ))
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn mark_failed(conn: &mut AsyncPgConnection, trigger_id: i64) -> Result<(), CollectorError> {
    diesel::update(recompute_triggers::table.filter(recompute_triggers::trigger_id.eq(trigger_id)))
        .set(recompute_triggers::status.eq("failed"))
        .execute(conn)
        .await?;
    Ok(())
}
