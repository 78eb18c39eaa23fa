// SPDX-License-Identifier: Apache-2.0

//! VoteRecord (spec §3). Composite identity `(pollKind, pollId, voterAccount)`: a voter
//! has at most one current vote per poll, mutated in place on revote.

use bigdecimal::BigDecimal;
use diesel::{AsChangeset, ExpressionMethods, Identifiable, Insertable, QueryDsl, Queryable};
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::{db::models::poll::PollKind, errors::CollectorError, schema::vote_records};

#[derive(Clone, Debug, Identifiable, Insertable, AsChangeset, Queryable)]
#[diesel(table_name = vote_records)]
#[diesel(primary_key(poll_kind, poll_id, voter_account))]
pub struct VoteRecord {
    pub poll_kind: String,
    pub poll_id: i64,
    pub voter_account: String,
    pub selections: serde_json::Value,
    pub voting_power: BigDecimal,
    pub anchoring_state_version: i64,
    pub cast_at_state_version: i64,
    pub revote_count: i32,
    pub voting_power_pending: bool,
    pub updated_at: chrono::NaiveDateTime,
}

impl VoteRecord {
    pub fn selections(&self) -> Vec<String> {
        serde_json::from_value(self.selections.clone()).unwrap_or_default()
    }

    pub fn poll_kind(&self) -> PollKind {
        self.poll_kind
            .parse()
            .expect("poll_kind column always holds a valid PollKind discriminant")
    }
}

pub fn selections_to_json(selections: &[String]) -> serde_json::Value {
    serde_json::to_value(selections).expect("Vec<String> is always serializable")
}

pub async fn get(
    conn: &mut AsyncPgConnection,
    poll_kind: &str,
    poll_id: i64,
    voter_account: &str,
) -> Result<Option<VoteRecord>, CollectorError> {
    use diesel::OptionalExtension;
    vote_records::table
        .filter(vote_records::poll_kind.eq(poll_kind))
        .filter(vote_records::poll_id.eq(poll_id))
        .filter(vote_records::voter_account.eq(voter_account))
        .first::<VoteRecord>(conn)
        .await
        .optional()
        .map_err(CollectorError::from)
}

pub async fn delete(
    conn: &mut AsyncPgConnection,
    poll_kind: &str,
    poll_id: i64,
    voter_account: &str,
) -> Result<(), CollectorError> {
    diesel::delete(
        vote_records::table
            .filter(vote_records::poll_kind.eq(poll_kind))
            .filter(vote_records::poll_id.eq(poll_id))
            .filter(vote_records::voter_account.eq(voter_account)),
    )
    .execute(conn)
    .await?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn upsert(
    conn: &mut AsyncPgConnection,
    poll_kind: &str,
    poll_id: i64,
    voter_account: &str,
    selections: &[String],
    voting_power: &BigDecimal,
    anchoring_state_version: i64,
    cast_at_state_version: i64,
    revote_count: i32,
    voting_power_pending: bool,
) -> Result<(), CollectorError> {
    let selections_json = selections_to_json(selections);
    diesel::insert_into(vote_records::table)
        .values((
            vote_records::poll_kind.eq(poll_kind),
            vote_records::poll_id.eq(poll_id),
            vote_records::voter_account.eq(voter_account),
            vote_records::selections.eq(&selections_json),
            vote_records::voting_power.eq(voting_power),
            vote_records::anchoring_state_version.eq(anchoring_state_version),
            vote_records::cast_at_state_version.eq(cast_at_state_version),
            vote_records::revote_count.eq(revote_count),
            vote_records::voting_power_pending.eq(voting_power_pending),
        ))
        .on_conflict((
            vote_records::poll_kind,
            vote_records::poll_id,
            vote_records::voter_account,
        ))
        .do_update()
        .set((
            vote_records::selections.eq(&selections_json),
            vote_records::voting_power.eq(voting_power),
            vote_records::anchoring_state_version.eq(anchoring_state_version),
            vote_records::cast_at_state_version.eq(cast_at_state_version),
            vote_records::revote_count.eq(revote_count),
            vote_records::voting_power_pending.eq(voting_power_pending),
            vote_records::updated_at.eq(diesel::dsl::now),
        ))
        .execute(conn)
        .await?;
    Ok(())
}

/// Used by the Trigger Consumer to resolve a previously-pending vote in place without
/// touching selections/anchoring version.
pub async fn resolve_pending_weight(
    conn: &mut AsyncPgConnection,
    poll_kind: &str,
    poll_id: i64,
    voter_account: &str,
    voting_power: &BigDecimal,
) -> Result<(), CollectorError> {
    diesel::update(
        vote_records::table
            .filter(vote_records::poll_kind.eq(poll_kind))
            .filter(vote_records::poll_id.eq(poll_id))
            .filter(vote_records::voter_account.eq(voter_account)),
    )
    .set((
        vote_records::voting_power.eq(voting_power),
        vote_records::voting_power_pending.eq(false),
        vote_records::updated_at.eq(diesel::dsl::now),
    ))
    .execute(conn)
    .await?;
    Ok(())
}
