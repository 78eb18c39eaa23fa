// SPDX-License-Identifier: Apache-2.0

//! Dead letters: a small observable table recording transactions that exhausted the
//! per-transaction retry budget. The cursor still advances past them (spec §4.9) so a
//! single poisoned transaction can't block the pipeline indefinitely; they are
//! replayable manually.

use diesel::{dsl::count_star, ExpressionMethods, Insertable, QueryDsl};
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::{errors::CollectorError, schema::dead_letters};

#[derive(Clone, Debug, Insertable)]
#[diesel(table_name = dead_letters)]
pub struct NewDeadLetter {
    pub state_version: i64,
    pub intent_hash: String,
    pub error_kind: String,
    pub error_details: String,
}

pub async fn record(
    conn: &mut AsyncPgConnection,
    dead_letter: NewDeadLetter,
) -> Result<(), CollectorError> {
    diesel::insert_into(dead_letters::table)
        .values(&dead_letter)
        .execute(conn)
        .await?;
    Ok(())
}

/// Counts dead letters recorded for a given intent hash. Mainly a test/observability
/// accessor; operators otherwise read `dead_letters` directly for manual replay.
pub async fn count_for_intent_hash(
    conn: &mut AsyncPgConnection,
    intent_hash: &str,
) -> Result<i64, CollectorError> {
    let count: i64 = dead_letters::table
        .select(count_star())
        .filter(dead_letters::intent_hash.eq(intent_hash))
        .first(conn)
        .await?;
    Ok(count)
}
