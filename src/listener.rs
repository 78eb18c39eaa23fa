// SPDX-License-Identifier: Apache-2.0

//! Transaction Listener / Pipeline Driver (spec §4.8). Drives the whole pipeline from
//! the upstream committed-transaction stream to committed work: fetches pages from
//! `lastSeenStateVersion + 1`, validates strict ascending ordering within a page,
//! processes each item through the Per-Transaction Handler in order, retries
//! transient per-transaction failures with backoff, and dead-letters a transaction
//! that exhausts its retry budget rather than blocking the pipeline indefinitely.

use std::{sync::Arc, time::Duration};

use diesel_async::{scoped_futures::ScopedFutureExt, AsyncConnection};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::{
    counters::{
        HANDLER_ERRORS, LISTENER_PAGES_FETCHED, LISTENER_TRANSACTIONS_DEAD_LETTERED,
        LISTENER_TRANSACTIONS_PROCESSED,
    },
    db::{
        models::{cursor, dead_letter, dead_letter::NewDeadLetter, dedup::DedupBuffer},
        PgDbPool,
    },
    errors::CollectorError,
    gateway::{CommittedTransaction, GatewayCapability},
    handler::{self, ChildAddressRegistry},
    weight::{ledger_resolver::LedgerStateResolver, RetryBudget, VotingPowerStrategy},
};

#[derive(Clone, Debug)]
pub struct ListenerConfig {
    pub limit_per_page: u32,
    pub wait_time: Duration,
    pub retry_attempts: u32,
    /// Passed straight through to the gateway's page fetch so the upstream only ever
    /// returns transactions that touch the governance component (spec §4.3, §4.8).
    pub filter_affected_entities: Vec<String>,
}

/// Everything the Listener needs to drive one committed transaction to a terminal
/// state, bundled so `run` doesn't take a dozen positional arguments.
pub struct Listener {
    pool: PgDbPool,
    gateway: Arc<dyn GatewayCapability>,
    strategy: Arc<dyn VotingPowerStrategy>,
    dedup: Arc<DedupBuffer>,
    weight_semaphore: Arc<Semaphore>,
    weight_budget: RetryBudget,
    ledger_resolver: Arc<LedgerStateResolver>,
    component_address: String,
    child_addresses: Arc<ChildAddressRegistry>,
    config: ListenerConfig,
}

impl Listener {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: PgDbPool,
        gateway: Arc<dyn GatewayCapability>,
        strategy: Arc<dyn VotingPowerStrategy>,
        dedup: Arc<DedupBuffer>,
        weight_semaphore: Arc<Semaphore>,
        weight_budget: RetryBudget,
        ledger_resolver: Arc<LedgerStateResolver>,
        component_address: String,
        child_addresses: Arc<ChildAddressRegistry>,
        config: ListenerConfig,
    ) -> Self {
        Self {
            pool,
            gateway,
            strategy,
            dedup,
            weight_semaphore,
            weight_budget,
            ledger_resolver,
            component_address,
            child_addresses,
            config,
        }
    }

    /// Drives the `[Idle] -> [Streaming] -> [Stopped]` state machine of spec §4.8,
    /// starting from `resume_from` (the value Startup Reconciliation computed).
    /// Returns on a fatal error (propagated to the runtime, which exits) or once
    /// `shutdown` is observed between pages, having drained the in-flight page to a
    /// consistent cursor boundary first.
    pub async fn run(&self, resume_from: i64, shutdown: CancellationToken) -> Result<(), CollectorError> {
        let mut last_seen = resume_from - 1;

        loop {
            if shutdown.is_cancelled() {
                tracing::info!(last_seen, "listener shutting down between pages");
                return Ok(());
            }

            let page = self
                .gateway
                .fetch_transactions_page(
                    last_seen + 1,
                    self.config.limit_per_page,
                    &self.config.filter_affected_entities,
                )
                .await?;
            LISTENER_PAGES_FETCHED.inc();

            if page.items.is_empty() {
                tokio::select! {
                    _ = shutdown.cancelled() => return Ok(()),
                    _ = tokio::time::sleep(self.config.wait_time) => {}
                }
                continue;
            }

            validate_ascending(&page.items, last_seen)?;

            for txn in &page.items {
                self.process_with_retry(txn).await?;
                last_seen = txn.state_version;
                LISTENER_TRANSACTIONS_PROCESSED.inc();
            }
        }
    }

    /// Retries a transient per-transaction failure with exponential backoff up to
    /// `config.retry_attempts`, then dead-letters. Permanent (non-transient,
    /// non-fatal) failures dead-letter immediately — retrying them can't help.
    /// `InvariantViolated` is fatal (the process exits after this call returns) but
    /// spec §7 still requires the offending transaction be preserved in the
    /// dead-letter collection first, so it is dead-lettered here too before the error
    /// propagates. `CursorRegressed` and `NonMonotonicPage` are structural/listener-level
    /// faults rather than a property of one transaction's content, so they propagate
    /// directly with no dead-letter write.
    async fn process_with_retry(&self, txn: &CommittedTransaction) -> Result<(), CollectorError> {
        let mut attempt = 0u32;
        let mut interval = Duration::from_millis(500);

        loop {
            let result = handler::process_transaction(
                &self.pool,
                self.gateway.as_ref(),
                self.strategy.as_ref(),
                &self.dedup,
                &self.weight_semaphore,
                self.weight_budget,
                &self.ledger_resolver,
                &self.component_address,
                &self.child_addresses,
                txn,
            )
            .await;

            match result {
                Ok(()) => return Ok(()),
                Err(err @ CollectorError::InvariantViolated(_)) => {
                    tracing::error!(
                        state_version = txn.state_version,
                        intent_hash = %txn.intent_hash,
                        error = %err,
                        "invariant violated, dead-lettering before exiting"
                    );
                    self.dead_letter(txn, &err).await?;
                    return Err(err);
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) if err.is_transient() => {
                    HANDLER_ERRORS.with_label_values(&[err.kind_tag()]).inc();
                    attempt += 1;
                    if attempt >= self.config.retry_attempts {
                        tracing::warn!(
                            state_version = txn.state_version,
                            intent_hash = %txn.intent_hash,
                            error = %err,
                            attempts = attempt,
                            "exhausted retry budget, dead-lettering"
                        );
                        return self.dead_letter(txn, &err).await;
                    }
                    tracing::warn!(
                        state_version = txn.state_version,
                        attempt,
                        error = %err,
                        "transient handler failure, retrying"
                    );
                    tokio::time::sleep(interval).await;
                    interval = (interval * 2).min(Duration::from_secs(30));
                }
                Err(err) => {
                    HANDLER_ERRORS.with_label_values(&[err.kind_tag()]).inc();
                    tracing::error!(
                        state_version = txn.state_version,
                        intent_hash = %txn.intent_hash,
                        error = %err,
                        "permanent handler failure, dead-lettering without retry"
                    );
                    return self.dead_letter(txn, &err).await;
                }
            }
        }
    }

    /// Records a dead letter and advances the cursor past the offending transaction
    /// in one fresh transaction — the transaction that failed was already rolled
    /// back, so this is a deliberate second, smaller commit (spec §4.9).
    async fn dead_letter(&self, txn: &CommittedTransaction, err: &CollectorError) -> Result<(), CollectorError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| CollectorError::Other(anyhow::anyhow!("failed to acquire db connection: {e:?}")))?;
        let state_version = txn.state_version;
        let intent_hash = txn.intent_hash.clone();
        let error_kind = err.kind_tag().to_string();
        let error_details = err.to_string();

        conn.transaction::<(), CollectorError, _>(move |conn| {
            async move {
                dead_letter::record(
                    conn,
                    NewDeadLetter {
                        state_version,
                        intent_hash,
                        error_kind,
                        error_details,
                    },
                )
                .await?;
                cursor::advance_to(conn, state_version).await?;
                Ok(())
            }
            .scope_boxed()
        })
        .await?;

        LISTENER_TRANSACTIONS_DEAD_LETTERED.inc();
        Ok(())
    }
}

/// Pure ordering check extracted for testability: a page must present items strictly
/// ascending by `stateVersion`, continuing on from `prev` (spec §4.8, §8 scenario 6 —
/// "the gateway returns a page whose items are presented in non-ascending order").
fn validate_ascending(items: &[CommittedTransaction], prev: i64) -> Result<(), CollectorError> {
    let mut prev = prev;
    for item in items {
        if item.state_version <= prev {
            return Err(CollectorError::NonMonotonicPage {
                prev,
                got: item.state_version,
            });
        }
        prev = item.state_version;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::TransactionStatus;
    use chrono::Utc;

    fn txn(state_version: i64) -> CommittedTransaction {
        CommittedTransaction {
            state_version,
            intent_hash: format!("hash-{state_version}"),
            events: vec![],
            affected_global_entities: vec![],
            status: TransactionStatus::Success,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn ascending_page_passes() {
        let items = vec![txn(1001), txn(1002), txn(1010)];
        assert!(validate_ascending(&items, 1000).is_ok());
    }

    #[test]
    fn first_item_not_strictly_after_prev_is_rejected() {
        let items = vec![txn(1000)];
        let err = validate_ascending(&items, 1000).unwrap_err();
        assert!(matches!(err, CollectorError::NonMonotonicPage { prev: 1000, got: 1000 }));
    }

    #[test]
    fn out_of_order_pair_within_a_page_is_rejected() {
        let items = vec![txn(1001), txn(1000)];
        let err = validate_ascending(&items, 1000).unwrap_err();
        assert!(matches!(err, CollectorError::NonMonotonicPage { prev: 1001, got: 1000 }));
    }

    #[test]
    fn non_monotonic_page_is_fatal() {
        let err = CollectorError::NonMonotonicPage { prev: 5, got: 5 };
        assert!(err.is_fatal());
    }
}
