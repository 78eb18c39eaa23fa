// SPDX-License-Identifier: Apache-2.0

//! Snapshot Engine (spec §4.10). Applies a single decoded Action to the relational
//! store inside the caller's transaction, preserving every invariant: selections are a
//! subset of the poll's options, tallies equal the sum of non-pending voting power, and
//! a voter's cast version never exceeds the committed cursor.

use bigdecimal::BigDecimal;
use diesel_async::AsyncPgConnection;

use crate::{
    db::models::{governance_parameters, poll, poll::PollKind, poll::PollView, vote_record, vote_tally},
    errors::CollectorError,
    weight::WeightOutcome,
};

pub async fn apply_proposal_created(
    conn: &mut AsyncPgConnection,
    fields: &poll::PollFields,
) -> Result<(), CollectorError> {
    poll::insert_or_replace_proposal(conn, fields).await
}

pub async fn apply_temperature_check_created(
    conn: &mut AsyncPgConnection,
    fields: &poll::PollFields,
) -> Result<(), CollectorError> {
    poll::insert_or_replace_temperature_check(conn, fields).await
}

async fn load_poll_view(
    conn: &mut AsyncPgConnection,
    poll_kind: PollKind,
    poll_id: i64,
) -> Result<PollView, CollectorError> {
    let view = match poll_kind {
        PollKind::Proposal => poll::get_proposal(conn, poll_id).await?.map(|p| p.as_view()),
        PollKind::TemperatureCheck => poll::get_temperature_check(conn, poll_id)
            .await?
            .map(|t| t.as_view()),
    };
    view.ok_or_else(|| {
        CollectorError::InvariantViolated(format!(
            "vote cast on unknown {:?} poll {poll_id}",
            poll_kind
        ))
    })
}

fn validate_selections(view: &PollView, selections: &[String]) -> Result<(), CollectorError> {
    if selections.is_empty() {
        return Err(CollectorError::InvariantViolated(
            "vote has an empty selection set".to_string(),
        ));
    }
    if selections.len() > view.max_selections as usize {
        return Err(CollectorError::InvariantViolated(format!(
            "vote selects {} options, poll allows at most {}",
            selections.len(),
            view.max_selections
        )));
    }
    for selection in selections {
        if !view.option_ids.contains(selection) {
            return Err(CollectorError::InvariantViolated(format!(
                "selection {selection} is not one of this poll's options"
            )));
        }
    }
    Ok(())
}

fn weight_and_pending(outcome: &WeightOutcome) -> (BigDecimal, bool) {
    match outcome {
        WeightOutcome::Weight(w) => (w.clone(), false),
        WeightOutcome::Pending => (BigDecimal::from(0), true),
    }
}

/// `applyVoteCast` (spec §4.10), covering both a first vote and a revote (the decoder
/// maps `VoteChanged` onto the same call).
#[allow(clippy::too_many_arguments)]
pub async fn apply_vote_cast(
    conn: &mut AsyncPgConnection,
    poll_kind: PollKind,
    poll_id: i64,
    voter_account: &str,
    selections: &[String],
    weight: &WeightOutcome,
    poll_version: i64,
) -> Result<(), CollectorError> {
    let view = load_poll_view(conn, poll_kind, poll_id).await?;
    if let Some(end_version) = view.end_version {
        if poll_version > end_version {
            return Err(CollectorError::InvariantViolated(format!(
                "vote cast at version {poll_version} after poll {poll_id} ended at {end_version}"
            )));
        }
    }
    validate_selections(&view, selections)?;

    let kind_str = poll_kind.as_str();
    let (new_power, new_pending) = weight_and_pending(weight);

    let prior = vote_record::get(conn, kind_str, poll_id, voter_account).await?;
    let revote_count = match &prior {
        Some(record) => {
            if !record.voting_power_pending {
                for option in record.selections() {
                    vote_tally::adjust(conn, kind_str, poll_id, &option, &(-record.voting_power.clone()))
                        .await?;
                }
            }
            record.revote_count + 1
        }
        None => 0,
    };

    vote_record::upsert(
        conn,
        kind_str,
        poll_id,
        voter_account,
        selections,
        &new_power,
        poll_version,
        poll_version,
        revote_count,
        new_pending,
    )
    .await?;

    if !new_pending {
        for option in selections {
            vote_tally::adjust(conn, kind_str, poll_id, option, &new_power).await?;
        }
    }

    Ok(())
}

/// Not explicitly enumerated among the Snapshot Engine's named operations, but
/// required to keep tallies consistent when `VoteRevoked` is emitted: symmetric with
/// the revote branch of `applyVoteCast`, just without a replacement vote.
pub async fn apply_vote_revoked(
    conn: &mut AsyncPgConnection,
    poll_kind: PollKind,
    poll_id: i64,
    voter_account: &str,
) -> Result<(), CollectorError> {
    let kind_str = poll_kind.as_str();
    let Some(record) = vote_record::get(conn, kind_str, poll_id, voter_account).await? else {
        tracing::warn!(
            poll_id,
            voter_account,
            "VoteRevoked for a voter with no recorded vote, ignoring"
        );
        return Ok(());
    };
    if !record.voting_power_pending {
        for option in record.selections() {
            vote_tally::adjust(conn, kind_str, poll_id, &option, &(-record.voting_power.clone())).await?;
        }
    }
    vote_record::delete(conn, kind_str, poll_id, voter_account).await
}

pub async fn apply_parameters_changed(
    conn: &mut AsyncPgConnection,
    params: serde_json::Value,
) -> Result<(), CollectorError> {
    governance_parameters::replace(conn, params).await
}

pub async fn apply_hidden_toggled(
    conn: &mut AsyncPgConnection,
    poll_kind: PollKind,
    poll_id: i64,
    hidden: bool,
) -> Result<(), CollectorError> {
    match poll_kind {
        PollKind::Proposal => poll::set_proposal_hidden(conn, poll_id, hidden).await,
        PollKind::TemperatureCheck => poll::set_temperature_check_hidden(conn, poll_id, hidden).await,
    }
}

pub async fn apply_proposal_promoted(
    conn: &mut AsyncPgConnection,
    from_temperature_check_id: i64,
    to_proposal_id: i64,
) -> Result<(), CollectorError> {
    poll::promote_temperature_check(conn, from_temperature_check_id, to_proposal_id).await
}
