// SPDX-License-Identifier: Apache-2.0

//! Per-Transaction Handler (spec §4.9). Drives exactly one committed transaction to its
//! terminal state: dedup check, decode, weight calculation outside any lock, Snapshot
//! Engine application and cursor advance inside one database transaction.

use std::collections::HashSet;

use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::AsyncConnection;
use tokio::sync::{Mutex, Semaphore};

use crate::{
    db::models::{cursor, dedup::DedupBuffer, poll, poll::PollFields, recompute_trigger::NewRecomputeTrigger, recompute_trigger},
    db::PgDbPool,
    decoder::{self, Action, NewPollPayload},
    errors::CollectorError,
    gateway::{CommittedTransaction, GatewayCapability},
    snapshot,
    weight::{self, ledger_resolver::LedgerStateResolver, RetryBudget, VotingPowerStrategy, WeightOutcome},
};

/// In-memory registry of key-value-store addresses known to belong to the governance
/// component, so the Event Decoder's emitter filter stays current without a DB round
/// trip per transaction. Seeded at Startup Reconciliation from persisted polls, grown
/// as new `ProposalCreated`/`TemperatureCheckCreated` actions commit.
pub struct ChildAddressRegistry {
    addresses: Mutex<HashSet<String>>,
}

impl ChildAddressRegistry {
    pub fn new(initial: HashSet<String>) -> Self {
        Self {
            addresses: Mutex::new(initial),
        }
    }

    pub async fn snapshot(&self) -> HashSet<String> {
        self.addresses.lock().await.clone()
    }

    pub async fn register_many(&self, addrs: impl IntoIterator<Item = String>) {
        let mut guard = self.addresses.lock().await;
        guard.extend(addrs);
    }
}

fn to_poll_fields(payload: &NewPollPayload) -> PollFields {
    PollFields {
        id: payload.id,
        title: payload.title.clone(),
        short_description: payload.short_description.clone(),
        description: payload.description.clone(),
        vote_options: payload.vote_options.clone(),
        max_selections: payload.max_selections,
        start_version: payload.start_version,
        end_version: payload.end_version,
        quorum: payload.quorum.clone(),
        approval_threshold: payload.approval_threshold.clone(),
        hidden: payload.hidden,
        voter_kvs_address: payload.voter_kvs_address.clone(),
        vote_kvs_address: payload.vote_kvs_address.clone(),
    }
}

/// Precomputes voting power for every `VoteCast`/`VoteChanged` action ahead of opening
/// the database transaction (spec §4.9 step 3): long gateway round-trips must not hold
/// row locks.
async fn precompute_weights(
    gateway: &dyn GatewayCapability,
    strategy: &dyn VotingPowerStrategy,
    semaphore: &Semaphore,
    budget: RetryBudget,
    actions: &[Action],
) -> Vec<Option<WeightOutcome>> {
    let futures = actions.iter().enumerate().filter_map(|(idx, action)| match action {
        Action::VoteCast {
            voter, poll_version, ..
        }
        | Action::VoteChanged {
            voter, poll_version, ..
        } => Some(async move {
            (
                idx,
                weight::calculate_voting_power(gateway, strategy, voter, *poll_version, semaphore, budget)
                    .await,
            )
        }),
        _ => None,
    });

    let results = futures::future::join_all(futures).await;
    let mut weights: Vec<Option<WeightOutcome>> = vec![None; actions.len()];
    for (idx, outcome) in results {
        weights[idx] = Some(outcome);
    }
    weights
}

struct TxOutcome {
    newly_known_addresses: Vec<String>,
}

/// Processes one committed transaction exactly once against the current database
/// state. Returns `Ok(())` whether the transaction was newly applied or recognized as
/// a duplicate; retry-then-dead-letter policy on failure is the Listener's concern.
pub async fn process_transaction(
    pool: &PgDbPool,
    gateway: &dyn GatewayCapability,
    strategy: &dyn VotingPowerStrategy,
    dedup: &DedupBuffer,
    weight_semaphore: &Semaphore,
    retry_budget: RetryBudget,
    ledger_resolver: &LedgerStateResolver,
    component_address: &str,
    child_addresses: &ChildAddressRegistry,
    txn: &CommittedTransaction,
) -> Result<(), CollectorError> {
    let known = child_addresses.snapshot().await;
    let actions = decoder::decode_transaction(txn, component_address, &known);

    if !actions.is_empty() {
        // Resolved once per transaction rather than per action: every action in a
        // transaction shares the same anchoring ledger state by definition. Purely
        // observability context, so a resolver miss is logged and otherwise ignored
        // rather than failing the transaction.
        match ledger_resolver.resolve(gateway, txn.state_version).await {
            Ok(anchor) => tracing::debug!(
                state_version = txn.state_version,
                epoch = anchor.epoch,
                action_count = actions.len(),
                "resolved anchoring ledger state for transaction"
            ),
            Err(err) => tracing::warn!(
                state_version = txn.state_version,
                error = %err,
                "failed to resolve anchoring ledger state for transaction"
            ),
        }
    }

    let weights = precompute_weights(gateway, strategy, weight_semaphore, retry_budget, &actions).await;

    let mut conn = pool
        .get()
        .await
        .map_err(|err| CollectorError::Other(anyhow::anyhow!("failed to acquire db connection: {err:?}")))?;
    let intent_hash = txn.intent_hash.clone();
    let state_version = txn.state_version;

    let outcome = conn
        .transaction::<TxOutcome, CollectorError, _>(move |conn| {
            let actions = &actions;
            let weights = &weights;
            async move {
                if !dedup.try_reserve(conn, &intent_hash).await? {
                    cursor::advance_to(conn, state_version).await?;
                    return Ok(TxOutcome {
                        newly_known_addresses: Vec::new(),
                    });
                }

                let mut newly_known_addresses = Vec::new();
                for (idx, action) in actions.iter().enumerate() {
                    apply_one_action(conn, action, weights[idx].as_ref(), &mut newly_known_addresses)
                        .await?;
                }

                cursor::advance_to(conn, state_version).await?;
                Ok(TxOutcome {
                    newly_known_addresses,
                })
            }
            .scope_boxed()
        })
        .await?;

    if !outcome.newly_known_addresses.is_empty() {
        child_addresses
            .register_many(outcome.newly_known_addresses)
            .await;
    }

    Ok(())
}

async fn apply_one_action(
    conn: &mut diesel_async::AsyncPgConnection,
    action: &Action,
    weight: Option<&WeightOutcome>,
    newly_known_addresses: &mut Vec<String>,
) -> Result<(), CollectorError> {
    match action {
        Action::ProposalCreated(payload) => {
            let fields = to_poll_fields(payload);
            snapshot::apply_proposal_created(conn, &fields).await?;
            newly_known_addresses.push(payload.voter_kvs_address.clone());
            newly_known_addresses.push(payload.vote_kvs_address.clone());
        }
        Action::TemperatureCheckCreated(payload) => {
            let fields = to_poll_fields(payload);
            snapshot::apply_temperature_check_created(conn, &fields).await?;
            newly_known_addresses.push(payload.voter_kvs_address.clone());
            newly_known_addresses.push(payload.vote_kvs_address.clone());
        }
        Action::VoteCast {
            poll_kind,
            poll_id,
            voter,
            selections,
            poll_version,
        } => {
            let weight = weight.expect("weight is precomputed for every VoteCast action");
            snapshot::apply_vote_cast(conn, *poll_kind, *poll_id, voter, selections, weight, *poll_version)
                .await?;
            maybe_enqueue_trigger(conn, *poll_kind, *poll_id, voter, *poll_version, weight).await?;
        }
        Action::VoteChanged {
            poll_kind,
            poll_id,
            voter,
            selections,
            poll_version,
        } => {
            let weight = weight.expect("weight is precomputed for every VoteChanged action");
            snapshot::apply_vote_cast(conn, *poll_kind, *poll_id, voter, selections, weight, *poll_version)
                .await?;
            maybe_enqueue_trigger(conn, *poll_kind, *poll_id, voter, *poll_version, weight).await?;
        }
        Action::VoteRevoked {
            poll_kind,
            poll_id,
            voter,
        } => {
            snapshot::apply_vote_revoked(conn, *poll_kind, *poll_id, voter).await?;
        }
        Action::HiddenToggled {
            poll_kind,
            poll_id,
            hidden,
        } => {
            snapshot::apply_hidden_toggled(conn, *poll_kind, *poll_id, *hidden).await?;
        }
        Action::ParametersChanged(value) => {
            snapshot::apply_parameters_changed(conn, value.clone()).await?;
        }
        Action::ProposalPromoted {
            from_temperature_check_id,
            to_proposal_id,
        } => {
            snapshot::apply_proposal_promoted(conn, *from_temperature_check_id, *to_proposal_id).await?;
        }
    }
    Ok(())
}

/// `spec.md` §4.9: "If step 3 returns PendingWeight, ... a RecomputeTrigger is also
/// inserted in the same transaction."
async fn maybe_enqueue_trigger(
    conn: &mut diesel_async::AsyncPgConnection,
    poll_kind: poll::PollKind,
    poll_id: i64,
    voter_account: &str,
    anchoring_state_version: i64,
    weight: &WeightOutcome,
) -> Result<(), CollectorError> {
    if matches!(weight, WeightOutcome::Pending) {
        recompute_trigger::enqueue(
            conn,
            NewRecomputeTrigger {
                voter_account: voter_account.to_string(),
                poll_id,
                poll_kind: poll_kind.as_str().to_string(),
                anchoring_state_version,
            },
        )
        .await?;
    }
    Ok(())
}
