// SPDX-License-Identifier: Apache-2.0

//! Vote-Weight Calculator (spec §4.6): the deterministic, replayable heart of the
//! system. A pure function of `(voterAccount, anchoringStateVersion, strategy, gateway
//! queries)` — never a method on stateful `self` — so it can be re-run byte-for-byte
//! identically from the Trigger Consumer as from the inline per-transaction path.

pub mod ledger_resolver;

use std::time::Duration;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use tokio::sync::Semaphore;

use crate::{
    counters::{WEIGHT_COMPLETED_COUNT, WEIGHT_PENDING_COUNT},
    errors::CollectorError,
    gateway::GatewayCapability,
};

/// Configured per-deployment shape of the voting-power formula (spec §4.6 Open
/// Question, resolved in the project's design notes): stake-weighted resource
/// holdings, badge presence, or a linear combination of sub-strategies.
#[async_trait]
pub trait VotingPowerStrategy: Send + Sync {
    async fn compute_weight(
        &self,
        gateway: &dyn GatewayCapability,
        voter_account: &str,
        at_state_version: i64,
    ) -> Result<BigDecimal, CollectorError>;
}

/// Sum of the voter's holdings of `resource_address` at the anchoring version, scaled
/// by `weight`.
pub struct StakeStrategy {
    pub resource_address: String,
    pub weight: BigDecimal,
}

#[async_trait]
impl VotingPowerStrategy for StakeStrategy {
    async fn compute_weight(
        &self,
        gateway: &dyn GatewayCapability,
        voter_account: &str,
        at_state_version: i64,
    ) -> Result<BigDecimal, CollectorError> {
        let balances = gateway
            .get_fungible_balances_at(voter_account, at_state_version, Some(&self.resource_address))
            .await?;
        let total: BigDecimal = balances.into_iter().map(|b| b.amount).sum();
        Ok(total * self.weight.clone())
    }
}

/// Presence (1) or absence (0) of any local id of `resource_address` held by the voter
/// at the anchoring version.
pub struct BadgeStrategy {
    pub resource_address: String,
}

#[async_trait]
impl VotingPowerStrategy for BadgeStrategy {
    async fn compute_weight(
        &self,
        gateway: &dyn GatewayCapability,
        voter_account: &str,
        at_state_version: i64,
    ) -> Result<BigDecimal, CollectorError> {
        let holdings = gateway
            .get_non_fungible_holdings_at(voter_account, at_state_version, &self.resource_address)
            .await?;
        Ok(if holdings.is_empty() {
            BigDecimal::from(0)
        } else {
            BigDecimal::from(1)
        })
    }
}

/// Linear combination of sub-strategies, each queried independently.
pub struct CompositeStrategy {
    pub components: Vec<Box<dyn VotingPowerStrategy>>,
}

#[async_trait]
impl VotingPowerStrategy for CompositeStrategy {
    async fn compute_weight(
        &self,
        gateway: &dyn GatewayCapability,
        voter_account: &str,
        at_state_version: i64,
    ) -> Result<BigDecimal, CollectorError> {
        let mut total = BigDecimal::from(0);
        for component in &self.components {
            total += component
                .compute_weight(gateway, voter_account, at_state_version)
                .await?;
        }
        Ok(total)
    }
}

#[derive(Clone, Debug)]
pub enum WeightOutcome {
    Weight(BigDecimal),
    /// Transient failures exhausted the retry budget; the caller persists the vote
    /// with `votingPowerPending = true` and enqueues a `RecomputeTrigger`.
    Pending,
}

/// How many times, and how long, the calculator itself will retry a strategy that
/// keeps failing transiently before giving up and returning `Pending`. Distinct from
/// `RetryingGateway`'s own (effectively unbounded) page-fetch retries: this budget is
/// intentionally small, because giving up here has a well-defined fallback (the
/// Recompute Trigger queue) while giving up on page fetches does not.
#[derive(Clone, Copy, Debug)]
pub struct RetryBudget {
    pub max_attempts: u32,
    pub initial_interval: Duration,
    pub max_interval: Duration,
}

impl Default for RetryBudget {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_interval: Duration::from_millis(200),
            max_interval: Duration::from_secs(2),
        }
    }
}

/// Computes a voter's weighted power at `at_state_version`, bounding concurrent
/// gateway traffic via `semaphore`. Not a method on `self`: callers pass whichever
/// `GatewayCapability` and `VotingPowerStrategy` apply, so the same call can be made
/// from the inline per-transaction path or replayed later from the Trigger Consumer
/// with identical results.
pub async fn calculate_voting_power(
    gateway: &dyn GatewayCapability,
    strategy: &dyn VotingPowerStrategy,
    voter_account: &str,
    at_state_version: i64,
    semaphore: &Semaphore,
    budget: RetryBudget,
) -> WeightOutcome {
    let _permit = semaphore
        .acquire()
        .await
        .expect("weight semaphore is never closed while the process is running");

    let mut interval = budget.initial_interval;
    for attempt in 0..budget.max_attempts {
        match strategy
            .compute_weight(gateway, voter_account, at_state_version)
            .await
        {
            Ok(power) => {
                WEIGHT_COMPLETED_COUNT.inc();
                return WeightOutcome::Weight(power);
            }
            Err(CollectorError::TransientGateway(reason)) => {
                tracing::warn!(
                    voter_account,
                    at_state_version,
                    attempt,
                    reason,
                    "transient failure computing voting power, retrying"
                );
                if attempt + 1 == budget.max_attempts {
                    break;
                }
                tokio::time::sleep(interval).await;
                interval = (interval * 2).min(budget.max_interval);
            }
            Err(other) => {
                // Permanent failures (e.g. the voter account does not exist at this
                // version) are still determinate: zero is the final answer, not a
                // reason to keep retrying.
                tracing::info!(
                    voter_account,
                    at_state_version,
                    reason = %other,
                    "permanent failure computing voting power, treating as zero"
                );
                WEIGHT_COMPLETED_COUNT.inc();
                return WeightOutcome::Weight(BigDecimal::from(0));
            }
        }
    }

    WEIGHT_PENDING_COUNT.inc();
    WeightOutcome::Pending
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::mock::{balance, MockGatewayCapability};

    #[tokio::test]
    async fn stake_strategy_sums_scaled_balances() {
        let gateway = MockGatewayCapability::new();
        gateway
            .set_balance(
                "account_a",
                500,
                vec![balance("resource_xrd", bigdecimal::BigDecimal::from(10))],
            )
            .await;
        let strategy = StakeStrategy {
            resource_address: "resource_xrd".to_string(),
            weight: BigDecimal::from(2),
        };
        let semaphore = Semaphore::new(4);
        let outcome = calculate_voting_power(
            &gateway,
            &strategy,
            "account_a",
            500,
            &semaphore,
            RetryBudget::default(),
        )
        .await;
        match outcome {
            WeightOutcome::Weight(w) => assert_eq!(w, BigDecimal::from(20)),
            WeightOutcome::Pending => panic!("expected a determinate weight"),
        }
    }

    #[tokio::test]
    async fn missing_account_resolves_to_zero_not_pending() {
        let gateway = MockGatewayCapability::new();
        gateway.mark_account_missing("account_b", 500).await;
        let strategy = StakeStrategy {
            resource_address: "resource_xrd".to_string(),
            weight: BigDecimal::from(1),
        };
        let semaphore = Semaphore::new(4);
        let outcome = calculate_voting_power(
            &gateway,
            &strategy,
            "account_b",
            500,
            &semaphore,
            RetryBudget::default(),
        )
        .await;
        assert!(matches!(outcome, WeightOutcome::Weight(w) if w == BigDecimal::from(0)));
    }

    #[tokio::test]
    async fn exhausted_transient_retries_become_pending() {
        let gateway = MockGatewayCapability::new();
        gateway.fail_transiently_for("account_c", 10).await;
        let strategy = StakeStrategy {
            resource_address: "resource_xrd".to_string(),
            weight: BigDecimal::from(1),
        };
        let semaphore = Semaphore::new(4);
        let budget = RetryBudget {
            max_attempts: 2,
            initial_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(2),
        };
        let outcome =
            calculate_voting_power(&gateway, &strategy, "account_c", 500, &semaphore, budget).await;
        assert!(matches!(outcome, WeightOutcome::Pending));
    }

    #[tokio::test]
    async fn transient_failure_recovers_within_budget() {
        let gateway = MockGatewayCapability::new();
        gateway.fail_transiently_for("account_d", 1).await;
        gateway
            .set_balance(
                "account_d",
                500,
                vec![balance("resource_xrd", bigdecimal::BigDecimal::from(5))],
            )
            .await;
        let strategy = StakeStrategy {
            resource_address: "resource_xrd".to_string(),
            weight: BigDecimal::from(1),
        };
        let semaphore = Semaphore::new(4);
        let budget = RetryBudget {
            max_attempts: 3,
            initial_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(2),
        };
        let outcome =
            calculate_voting_power(&gateway, &strategy, "account_d", 500, &semaphore, budget).await;
        assert!(matches!(outcome, WeightOutcome::Weight(w) if w == BigDecimal::from(5)));
    }
}
