// SPDX-License-Identifier: Apache-2.0

//! Proposal / TemperatureCheck (spec §3). Two distinct poll kinds sharing a common
//! shape; kept as separate tables (rather than a single polymorphic one) the way this
//! codebase keeps distinct on-chain concepts in distinct tables even when their column
//! shape overlaps (c.f. `proposals`/`temperature_checks` here vs. the teacher's
//! `token_models`/`token_v2_models` split for the same underlying asset concept).

use bigdecimal::BigDecimal;
use diesel::{AsChangeset, ExpressionMethods, Identifiable, Insertable, QueryDsl, Queryable};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};

use crate::{errors::CollectorError, schema::{proposals, temperature_checks}};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollKind {
    Proposal,
    TemperatureCheck,
}

impl PollKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PollKind::Proposal => "proposal",
            PollKind::TemperatureCheck => "temperature_check",
        }
    }
}

impl std::str::FromStr for PollKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "proposal" => Ok(PollKind::Proposal),
            "temperature_check" => Ok(PollKind::TemperatureCheck),
            other => Err(anyhow::anyhow!("unknown poll kind: {other}")),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct VoteOption {
    pub option_id: String,
    pub label: String,
}

#[derive(Clone, Debug, Identifiable, Insertable, AsChangeset, Queryable)]
#[diesel(table_name = proposals)]
#[diesel(primary_key(id))]
pub struct Proposal {
    pub id: i64,
    pub title: String,
    pub short_description: String,
    pub description: String,
    pub vote_options: serde_json::Value,
    pub max_selections: i32,
    pub start_version: Option<i64>,
    pub end_version: Option<i64>,
    pub quorum: bigdecimal::BigDecimal,
    pub approval_threshold: bigdecimal::BigDecimal,
    pub hidden: bool,
    pub voter_kvs_address: String,
    pub vote_kvs_address: String,
    pub created_at: chrono::NaiveDateTime,
    pub updated_at: chrono::NaiveDateTime,
}

#[derive(Clone, Debug, Identifiable, Insertable, AsChangeset, Queryable)]
#[diesel(table_name = temperature_checks)]
#[diesel(primary_key(id))]
pub struct TemperatureCheck {
    pub id: i64,
    pub title: String,
    pub short_description: String,
    pub description: String,
    pub vote_options: serde_json::Value,
    pub max_selections: i32,
    pub start_version: Option<i64>,
    pub end_version: Option<i64>,
    pub quorum: bigdecimal::BigDecimal,
    pub approval_threshold: bigdecimal::BigDecimal,
    pub hidden: bool,
    pub voter_kvs_address: String,
    pub vote_kvs_address: String,
    pub promoted_to_proposal_id: Option<i64>,
    pub created_at: chrono::NaiveDateTime,
    pub updated_at: chrono::NaiveDateTime,
}

/// Common read-only view over either poll kind, used by the Snapshot Engine to check
/// invariants (valid option ids, `maxSelections`, `endVersion`) without matching on the
/// kind at every call site.
pub struct PollView {
    pub max_selections: i32,
    pub end_version: Option<i64>,
    pub option_ids: Vec<String>,
}

impl Proposal {
    pub fn option_ids(&self) -> Vec<String> {
        options_from_json(&self.vote_options)
    }

    pub fn as_view(&self) -> PollView {
        PollView {
            max_selections: self.max_selections,
            end_version: self.end_version,
            option_ids: self.option_ids(),
        }
    }
}

impl TemperatureCheck {
    pub fn option_ids(&self) -> Vec<String> {
        options_from_json(&self.vote_options)
    }

    pub fn as_view(&self) -> PollView {
        PollView {
            max_selections: self.max_selections,
            end_version: self.end_version,
            option_ids: self.option_ids(),
        }
    }
}

fn options_from_json(value: &serde_json::Value) -> Vec<String> {
    serde_json::from_value::<Vec<VoteOption>>(value.clone())
        .map(|opts| opts.into_iter().map(|o| o.option_id).collect())
        .unwrap_or_default()
}

pub fn vote_options_to_json(options: &[VoteOption]) -> serde_json::Value {
    serde_json::to_value(options).expect("VoteOption is always serializable")
}

/// Decoded fields of a `ProposalCreated`/`TemperatureCheckCreated` action, independent
/// of the decoder's own payload types so this module doesn't need to know about them.
pub struct PollFields {
    pub id: i64,
    pub title: String,
    pub short_description: String,
    pub description: String,
    pub vote_options: Vec<VoteOption>,
    pub max_selections: i32,
    pub start_version: Option<i64>,
    pub end_version: Option<i64>,
    pub quorum: BigDecimal,
    pub approval_threshold: BigDecimal,
    pub hidden: bool,
    pub voter_kvs_address: String,
    pub vote_kvs_address: String,
}

/// `applyProposalCreated` (spec §4.10): insert-or-replace, idempotent by id — a replay
/// of the same creation event is a no-op beyond overwriting identical fields.
pub async fn insert_or_replace_proposal(
    conn: &mut AsyncPgConnection,
    fields: &PollFields,
) -> Result<(), CollectorError> {
    let vote_options = vote_options_to_json(&fields.vote_options);
    diesel::insert_into(proposals::table)
        .values((
            proposals::id.eq(fields.id),
            proposals::title.eq(&fields.title),
            proposals::short_description.eq(&fields.short_description),
            proposals::description.eq(&fields.description),
            proposals::vote_options.eq(&vote_options),
            proposals::max_selections.eq(fields.max_selections),
            proposals::start_version.eq(fields.start_version),
            proposals::end_version.eq(fields.end_version),
            proposals::quorum.eq(&fields.quorum),
            proposals::approval_threshold.eq(&fields.approval_threshold),
            proposals::hidden.eq(fields.hidden),
            proposals::voter_kvs_address.eq(&fields.voter_kvs_address),
            proposals::vote_kvs_address.eq(&fields.vote_kvs_address),
        ))
        .on_conflict(proposals::id)
        .do_update()
        .set((
            proposals::title.eq(&fields.title),
            proposals::short_description.eq(&fields.short_description),
            proposals::description.eq(&fields.description),
            proposals::vote_options.eq(&vote_options),
            proposals::max_selections.eq(fields.max_selections),
            proposals::start_version.eq(fields.start_version),
            proposals::end_version.eq(fields.end_version),
            proposals::quorum.eq(&fields.quorum),
            proposals::approval_threshold.eq(&fields.approval_threshold),
            proposals::hidden.eq(fields.hidden),
            proposals::voter_kvs_address.eq(&fields.voter_kvs_address),
            proposals::vote_kvs_address.eq(&fields.vote_kvs_address),
            proposals::updated_at.eq(diesel::dsl::now),
        ))
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn insert_or_replace_temperature_check(
    conn: &mut AsyncPgConnection,
    fields: &PollFields,
) -> Result<(), CollectorError> {
    let vote_options = vote_options_to_json(&fields.vote_options);
    diesel::insert_into(temperature_checks::table)
        .values((
            temperature_checks::id.eq(fields.id),
            temperature_checks::title.eq(&fields.title),
            temperature_checks::short_description.eq(&fields.short_description),
            temperature_checks::description.eq(&fields.description),
            temperature_checks::vote_options.eq(&vote_options),
            temperature_checks::max_selections.eq(fields.max_selections),
            temperature_checks::start_version.eq(fields.start_version),
            temperature_checks::end_version.eq(fields.end_version),
            temperature_checks::quorum.eq(&fields.quorum),
            temperature_checks::approval_threshold.eq(&fields.approval_threshold),
            temperature_checks::hidden.eq(fields.hidden),
            temperature_checks::voter_kvs_address.eq(&fields.voter_kvs_address),
            temperature_checks::vote_kvs_address.eq(&fields.vote_kvs_address),
        ))
        .on_conflict(temperature_checks::id)
        .do_update()
        .set((
            temperature_checks::title.eq(&fields.title),
            temperature_checks::short_description.eq(&fields.short_description),
            temperature_checks::description.eq(&fields.description),
            temperature_checks::vote_options.eq(&vote_options),
            temperature_checks::max_selections.eq(fields.max_selections),
            temperature_checks::start_version.eq(fields.start_version),
            temperature_checks::end_version.eq(fields.end_version),
            temperature_checks::quorum.eq(&fields.quorum),
            temperature_checks::approval_threshold.eq(&fields.approval_threshold),
            temperature_checks::hidden.eq(fields.hidden),
            temperature_checks::voter_kvs_address.eq(&fields.voter_kvs_address),
            temperature_checks::vote_kvs_address.eq(&fields.vote_kvs_address),
            temperature_checks::updated_at.eq(diesel::dsl::now),
        ))
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn get_proposal(
    conn: &mut AsyncPgConnection,
    id: i64,
) -> Result<Option<Proposal>, CollectorError> {
    use diesel::OptionalExtension;
    proposals::table
        .filter(proposals::id.eq(id))
        .first::<Proposal>(conn)
        .await
        .optional()
        .map_err(CollectorError::from)
}

pub async fn get_temperature_check(
    conn: &mut AsyncPgConnection,
    id: i64,
) -> Result<Option<TemperatureCheck>, CollectorError> {
    use diesel::OptionalExtension;
    temperature_checks::table
        .filter(temperature_checks::id.eq(id))
        .first::<TemperatureCheck>(conn)
        .await
        .optional()
        .map_err(CollectorError::from)
}

pub async fn set_proposal_hidden(
    conn: &mut AsyncPgConnection,
    id: i64,
    hidden: bool,
) -> Result<(), CollectorError> {
    diesel::update(proposals::table.filter(proposals::id.eq(id)))
        .set((proposals::hidden.eq(hidden), proposals::updated_at.eq(diesel::dsl::now)))
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn set_temperature_check_hidden(
    conn: &mut AsyncPgConnection,
    id: i64,
    hidden: bool,
) -> Result<(), CollectorError> {
    diesel::update(temperature_checks::table.filter(temperature_checks::id.eq(id)))
        .set((
            temperature_checks::hidden.eq(hidden),
            temperature_checks::updated_at.eq(diesel::dsl::now),
        ))
        .execute(conn)
        .await?;
    Ok(())
}

/// Every key-value-store address owned by a poll created so far, across both poll
/// kinds. Used to seed the `ChildAddressRegistry` at Startup Reconciliation so the
/// Event Decoder's emitter filter recognizes events from polls created before this
/// process last restarted, not just ones it sees created live (spec §4.5 step 1).
pub async fn list_all_kvs_addresses(
    conn: &mut AsyncPgConnection,
) -> Result<Vec<String>, CollectorError> {
    let proposal_addrs: Vec<(String, String)> = proposals::table
        .select((proposals::voter_kvs_address, proposals::vote_kvs_address))
        .load(conn)
        .await?;
    let tc_addrs: Vec<(String, String)> = temperature_checks::table
        .select((
            temperature_checks::voter_kvs_address,
            temperature_checks::vote_kvs_address,
        ))
        .load(conn)
        .await?;
    let mut addresses = Vec::with_capacity((proposal_addrs.len() + tc_addrs.len()) * 2);
    for (voter, vote) in proposal_addrs.into_iter().chain(tc_addrs) {
        addresses.push(voter);
        addresses.push(vote);
    }
    Ok(addresses)
}

/// `applyProposalPromoted` (spec §4.10): links a temperature check to the proposal it
/// graduated into. The temperature check row itself is left intact as a historical
/// record; only the link is recorded.
pub async fn promote_temperature_check(
    conn: &mut AsyncPgConnection,
    from_temperature_check_id: i64,
    to_proposal_id: i64,
) -> Result<(), CollectorError> {
    diesel::update(
        temperature_checks::table.filter(temperature_checks::id.eq(from_temperature_check_id)),
    )
    .set((
        temperature_checks::promoted_to_proposal_id.eq(Some(to_proposal_id)),
        temperature_checks::updated_at.eq(diesel::dsl::now),
    ))
    .execute(conn)
    .await?;
    Ok(())
}
