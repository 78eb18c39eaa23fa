// SPDX-License-Identifier: Apache-2.0

//! VoteTally (spec §3). Derived, materialized per `(pollKind, pollId, optionId)` for
//! read efficiency; kept consistent with the set of VoteRecords at the last committed
//! cursor by the Snapshot Engine, never recomputed from scratch on the hot path.

use bigdecimal::BigDecimal;
use diesel::{
    dsl::sql, sql_types::Numeric, AsChangeset, ExpressionMethods, Identifiable, Insertable,
    QueryDsl, Queryable,
};
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::{errors::CollectorError, schema::vote_tallies};

#[derive(Clone, Debug, Identifiable, Insertable, AsChangeset, Queryable)]
#[diesel(table_name = vote_tallies)]
#[diesel(primary_key(poll_kind, poll_id, option_id))]
pub struct VoteTally {
    pub poll_kind: String,
    pub poll_id: i64,
    pub option_id: String,
    pub tally: BigDecimal,
}

/// Adds `delta` (which may be negative, for decrementing a prior vote's contribution)
/// to the running tally for `(poll_kind, poll_id, option_id)`, creating the row with
/// `delta` as its initial value if it doesn't exist yet.
pub async fn adjust(
    conn: &mut AsyncPgConnection,
    poll_kind: &str,
    poll_id: i64,
    option_id: &str,
    delta: &BigDecimal,
) -> Result<(), CollectorError> {
    diesel::insert_into(vote_tallies::table)
        .values((
            vote_tallies::poll_kind.eq(poll_kind),
            vote_tallies::poll_id.eq(poll_id),
            vote_tallies::option_id.eq(option_id),
            vote_tallies::tally.eq(delta.clone()),
        ))
        .on_conflict((
            vote_tallies::poll_kind,
            vote_tallies::poll_id,
            vote_tallies::option_id,
        ))
        .do_update()
        .set(
            vote_tallies::tally
                .eq(vote_tallies::tally + sql::<Numeric>("").bind::<Numeric, _>(delta.clone())),
        )
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn get(
    conn: &mut AsyncPgConnection,
    poll_kind: &str,
    poll_id: i64,
    option_id: &str,
) -> Result<BigDecimal, CollectorError> {
    use diesel::OptionalExtension;
    let tally = vote_tallies::table
        .select(vote_tallies::tally)
        .filter(vote_tallies::poll_kind.eq(poll_kind))
        .filter(vote_tallies::poll_id.eq(poll_id))
        .filter(vote_tallies::option_id.eq(option_id))
        .first::<BigDecimal>(conn)
        .await
        .optional()?;
    Ok(tally.unwrap_or_else(|| BigDecimal::from(0)))
}
