// SPDX-License-Identifier: Apache-2.0

//! Trigger Consumer (spec §4.11). Drains the `RecomputeTrigger` queue: re-runs the
//! weight calculator for votes that were left pending, resolves them on success,
//! reschedules with exponential backoff on repeated transient failure, and retires a
//! trigger to a terminal "failed" state after too many attempts.

use std::time::Duration;

use diesel_async::{scoped_futures::ScopedFutureExt, AsyncConnection};
use tokio::sync::Semaphore;

use crate::{
    counters::{TRIGGER_OUTCOMES, WEIGHT_FAILED_COUNT},
    db::{
        models::{recompute_trigger, recompute_trigger::RecomputeTrigger, vote_record, vote_tally},
        PgDbPool,
    },
    errors::CollectorError,
    gateway::GatewayCapability,
    weight::{self, RetryBudget, VotingPowerStrategy, WeightOutcome},
};

#[derive(Clone, Copy, Debug)]
pub struct TriggerConsumerConfig {
    pub batch_size: i64,
    pub max_attempts: i32,
    pub concurrency: usize,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
}

impl Default for TriggerConsumerConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            max_attempts: 10,
            concurrency: 5,
            backoff_base: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(30),
        }
    }
}

/// `nextAttemptAt = now() + backoff(attempts)`, doubling from `backoff_base` and
/// capped at `backoff_cap` (spec §4.11: "1s, 2s, 4s ... capped at 30s").
fn backoff_delay(config: &TriggerConsumerConfig, attempts: i32) -> Duration {
    let factor = 1u32.checked_shl(attempts.max(0) as u32).unwrap_or(u32::MAX);
    config.backoff_base.saturating_mul(factor).min(config.backoff_cap)
}

/// Claims one batch of due triggers and resolves each, bounded by
/// `config.concurrency` in-flight weight recomputations.
pub async fn run_once(
    pool: &PgDbPool,
    gateway: &dyn GatewayCapability,
    strategy: &dyn VotingPowerStrategy,
    weight_semaphore: &Semaphore,
    weight_budget: RetryBudget,
    config: TriggerConsumerConfig,
) -> Result<usize, CollectorError> {
    let mut conn = pool
        .get()
        .await
        .map_err(|err| CollectorError::Other(anyhow::anyhow!("failed to acquire db connection: {err:?}")))?;
    let due = recompute_trigger::claim_due(&mut conn, config.batch_size).await?;
    drop(conn);

    if due.is_empty() {
        return Ok(0);
    }

    let concurrency = Semaphore::new(config.concurrency);
    let work = due.into_iter().map(|trigger| {
        let concurrency = &concurrency;
        async move {
            let _permit = concurrency.acquire().await.expect("not closed");
            resolve_one(pool, gateway, strategy, weight_semaphore, weight_budget, config, trigger).await
        }
    });

    let results = futures::future::join_all(work).await;
    let processed = results.len();
    for result in results {
        if let Err(err) = result {
            tracing::warn!(error = %err, "trigger consumer failed to resolve a trigger");
        }
    }
    Ok(processed)
}

async fn resolve_one(
    pool: &PgDbPool,
    gateway: &dyn GatewayCapability,
    strategy: &dyn VotingPowerStrategy,
    weight_semaphore: &Semaphore,
    weight_budget: RetryBudget,
    config: TriggerConsumerConfig,
    trigger: RecomputeTrigger,
) -> Result<(), CollectorError> {
    let outcome = weight::calculate_voting_power(
        gateway,
        strategy,
        &trigger.voter_account,
        trigger.anchoring_state_version,
        weight_semaphore,
        weight_budget,
    )
    .await;

    let mut conn = pool
        .get()
        .await
        .map_err(|err| CollectorError::Other(anyhow::anyhow!("failed to acquire db connection: {err:?}")))?;

    match outcome {
        WeightOutcome::Weight(power) => {
            conn.transaction::<(), CollectorError, _>(move |conn| {
                let trigger = &trigger;
                let power = power.clone();
                async move {
                    let record = vote_record::get(
                        conn,
                        &trigger.poll_kind,
                        trigger.poll_id,
                        &trigger.voter_account,
                    )
                    .await?;

                    // A later revote may already have superseded the vote this trigger
                    // was anchored to; in that case the trigger is stale and resolving
                    // it would double-count against the newer vote's own tally update.
                    let still_current = record.as_ref().is_some_and(|r| {
                        r.voting_power_pending && r.anchoring_state_version == trigger.anchoring_state_version
                    });

                    if still_current {
                        vote_record::resolve_pending_weight(
                            conn,
                            &trigger.poll_kind,
                            trigger.poll_id,
                            &trigger.voter_account,
                            &power,
                        )
                        .await?;
                        for option in record.expect("checked above").selections() {
                            vote_tally::adjust(conn, &trigger.poll_kind, trigger.poll_id, &option, &power)
                                .await?;
                        }
                    }

                    recompute_trigger::delete(conn, trigger.trigger_id).await?;
                    Ok(())
                }
                .scope_boxed()
            })
            .await?;
            TRIGGER_OUTCOMES.with_label_values(&["resolved"]).inc();
        }
        WeightOutcome::Pending => {
            let attempts = trigger.attempts + 1;
            if attempts >= config.max_attempts {
                recompute_trigger::mark_failed(&mut conn, trigger.trigger_id).await?;
                WEIGHT_FAILED_COUNT.inc();
                TRIGGER_OUTCOMES.with_label_values(&["failed"]).inc();
            } else {
                let delay = backoff_delay(&config, attempts);
                let next_attempt_at =
                    chrono::Utc::now().naive_utc() + chrono::Duration::from_std(delay).unwrap_or_default();
                recompute_trigger::reschedule(&mut conn, trigger.trigger_id, attempts, next_attempt_at)
                    .await?;
                TRIGGER_OUTCOMES.with_label_values(&["rescheduled"]).inc();
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let config = TriggerConsumerConfig::default();
        assert_eq!(backoff_delay(&config, 0), Duration::from_secs(1));
        assert_eq!(backoff_delay(&config, 1), Duration::from_secs(2));
        assert_eq!(backoff_delay(&config, 2), Duration::from_secs(4));
        assert_eq!(backoff_delay(&config, 10), Duration::from_secs(30));
    }
}
