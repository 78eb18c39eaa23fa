// SPDX-License-Identifier: Apache-2.0

//! Composition root (spec §4.12). Wires the Cursor Store, Dedup Buffer, Ledger-State
//! Resolver, Vote-Weight Calculator, Listener, and Trigger Consumer into one supervised
//! process, the way `server-framework::ServerArgs` composes the teacher's processors.

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::{
    config::{CollectorConfig, GenericConfig, VotingPowerStrategyConfig},
    db::{models::dedup::DedupBuffer, pool, PgDbPool},
    gateway::{mock::MockGatewayCapability, retry::RetryingGateway, GatewayCapability},
    handler::ChildAddressRegistry,
    listener::{Listener, ListenerConfig},
    reconciliation,
    triggers::{self, TriggerConsumerConfig},
    util,
    weight::{
        ledger_resolver::LedgerStateResolver, BadgeStrategy, CompositeStrategy, RetryBudget,
        StakeStrategy, VotingPowerStrategy,
    },
};

/// CLI entry point. Mirrors `server_framework::ServerArgs`: a config path (and an
/// optional verbosity override the config's own `logLevel` normally supplies) is all a
/// deployment needs to hand this binary.
#[derive(Parser)]
pub struct ServerArgs {
    #[clap(short, long, value_parser)]
    pub config_path: PathBuf,
    #[clap(short, long)]
    pub verbose: Option<bool>,
}

impl ServerArgs {
    /// Loads config, wires up every layer, and runs until a fatal error or a shutdown
    /// signal drains the pipeline. The gateway client itself is out of this core's
    /// scope (spec.md Non-goals) — real deployments substitute their own
    /// `GatewayCapability` and call [`run_collector`] directly instead of going through
    /// this method, which bundles `MockGatewayCapability` only as a runnable reference
    /// wiring (see DESIGN.md, Open Question: gateway client substitution).
    pub async fn run(&self) -> Result<()> {
        util::setup_panic_handler();

        let config: GenericConfig<CollectorConfig> = util::load_yaml(&self.config_path)?;
        util::setup_logging(
            self.verbose
                .filter(|v| *v)
                .map(|_| "debug")
                .unwrap_or(config.server_config.log_level.as_str()),
        );

        let health_port = config.health_check_port;
        let gateway: Arc<dyn GatewayCapability> =
            Arc::new(RetryingGateway::new(MockGatewayCapability::new()));

        let metrics_task = tokio::spawn(util::serve_health_and_metrics(health_port));
        let main_task = tokio::spawn(run_collector(config.server_config, gateway));

        tokio::select! {
            result = metrics_task => {
                result.context("health/metrics task panicked")?;
                bail!("health/metrics server unexpectedly exited");
            }
            result = main_task => {
                result.context("main pipeline task panicked")??;
            }
        }

        Ok(())
    }
}

/// Builds a `VotingPowerStrategy` trait object from its configuration shape (spec §4.6
/// Open Question, resolved in DESIGN.md).
fn build_strategy(config: &VotingPowerStrategyConfig) -> Box<dyn VotingPowerStrategy> {
    match config {
        VotingPowerStrategyConfig::Stake {
            resource_address,
            weight,
        } => Box::new(StakeStrategy {
            resource_address: resource_address.clone(),
            weight: weight.clone(),
        }),
        VotingPowerStrategyConfig::Badge { resource_address } => Box::new(BadgeStrategy {
            resource_address: resource_address.clone(),
        }),
        VotingPowerStrategyConfig::Composite { components } => Box::new(CompositeStrategy {
            components: components.iter().map(build_strategy).collect(),
        }),
    }
}

/// The true composition root: takes a concrete `GatewayCapability` and drives the
/// pipeline to completion or a fatal error. Kept generic over the gateway (rather than
/// folded into `ServerArgs::run`) so a deployment with its own gateway implementation
/// can call this directly without going through config loading or the bundled mock.
pub async fn run_collector(
    config: CollectorConfig,
    gateway: Arc<dyn GatewayCapability>,
) -> Result<()> {
    let db_pool = pool::new_db_pool(&config.database_url, Some(config.db_pool_size))
        .await
        .context("failed to create database connection pool")?;
    pool::run_migrations(&config.database_url).context("failed to run migrations")?;

    let strategy: Arc<dyn VotingPowerStrategy> = Arc::from(build_strategy(&config.voting_power_strategy));
    let dedup = Arc::new(DedupBuffer::new(config.dedup_window));
    let weight_semaphore = Arc::new(Semaphore::new(config.weight_concurrency));
    let weight_budget = RetryBudget::default();
    let ledger_resolver = Arc::new(LedgerStateResolver::new(config.ledger_state_cache_size));

    let mut conn = db_pool
        .get()
        .await
        .context("failed to acquire a connection for startup reconciliation")?;
    let outcome = reconciliation::reconcile(
        &mut conn,
        gateway.as_ref(),
        &config.governance_component_address,
        &dedup,
    )
    .await
    .context("startup reconciliation failed")?;
    drop(conn);

    let child_addresses = Arc::new(ChildAddressRegistry::new(outcome.known_child_addresses));
    let resume_from = config
        .listener_from_state_version
        .unwrap_or(outcome.resume_from);

    let listener = Listener::new(
        db_pool.clone(),
        gateway.clone(),
        strategy.clone(),
        dedup.clone(),
        weight_semaphore.clone(),
        weight_budget,
        ledger_resolver,
        config.governance_component_address.clone(),
        child_addresses,
        ListenerConfig {
            limit_per_page: config.listener_limit_per_page,
            wait_time: config.listener_wait_time(),
            retry_attempts: config.listener_retry_attempts,
            filter_affected_entities: vec![config.governance_component_address.clone()],
        },
    );

    let shutdown = CancellationToken::new();
    let listener_shutdown = shutdown.clone();
    let listener_task = tokio::spawn(async move { listener.run(resume_from, listener_shutdown).await });

    let trigger_task = tokio::spawn(run_trigger_consumer_loop(
        db_pool.clone(),
        gateway.clone(),
        strategy.clone(),
        weight_semaphore.clone(),
        weight_budget,
        TriggerConsumerConfig {
            batch_size: 50,
            max_attempts: config.trigger_max_attempts,
            concurrency: config.trigger_concurrency,
            backoff_base: config.trigger_backoff_base(),
            backoff_cap: config.trigger_backoff_cap(),
        },
        shutdown.clone(),
    ));

    let compactor_task = tokio::spawn(run_dedup_compactor_loop(
        db_pool,
        dedup,
        config.dedup_compaction_interval(),
        shutdown.clone(),
    ));

    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("received shutdown signal, draining");
        shutdown.cancel();
    });

    tokio::select! {
        result = listener_task => {
            result.context("listener task panicked")?.context("listener exited with a fatal error")?;
        }
        result = trigger_task => {
            result.context("trigger consumer task panicked")?;
        }
        result = compactor_task => {
            result.context("dedup compactor task panicked")?;
        }
    }

    Ok(())
}

/// Drains the `RecomputeTrigger` queue on a fixed cadence until shutdown. A fixed
/// 5-second tick between empty batches keeps this from busy-looping while a live
/// deployment is mostly caught up (spec §4.11 does not pin a cadence; this is this
/// project's choice).
async fn run_trigger_consumer_loop(
    pool: PgDbPool,
    gateway: Arc<dyn GatewayCapability>,
    strategy: Arc<dyn VotingPowerStrategy>,
    weight_semaphore: Arc<Semaphore>,
    weight_budget: RetryBudget,
    config: TriggerConsumerConfig,
    shutdown: CancellationToken,
) {
    loop {
        if shutdown.is_cancelled() {
            return;
        }
        match triggers::run_once(&pool, gateway.as_ref(), strategy.as_ref(), &weight_semaphore, weight_budget, config)
            .await
        {
            Ok(0) => {
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = tokio::time::sleep(Duration::from_secs(5)) => {}
                }
            }
            Ok(_) => {}
            Err(err) => {
                tracing::error!(error = %err, "trigger consumer batch failed");
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = tokio::time::sleep(Duration::from_secs(5)) => {}
                }
            }
        }
    }
}

/// Runs `DedupBuffer::compact` on `interval`, the background-compaction option spec
/// §4.2 leaves as an implementer's choice.
async fn run_dedup_compactor_loop(
    pool: PgDbPool,
    dedup: Arc<DedupBuffer>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tokio::time::sleep(interval) => {}
        }
        let mut conn = match pool.get().await {
            Ok(conn) => conn,
            Err(err) => {
                tracing::warn!(error = %err, "dedup compactor failed to acquire a connection");
                continue;
            }
        };
        match dedup.compact(&mut conn).await {
            Ok(deleted) if deleted > 0 => tracing::info!(deleted, "dedup compactor trimmed durable entries"),
            Ok(_) => {}
            Err(err) => tracing::warn!(error = %err, "dedup compactor run failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;

    #[test]
    fn stake_strategy_config_builds_a_stake_strategy() {
        let config = VotingPowerStrategyConfig::Stake {
            resource_address: "resource_xrd".to_string(),
            weight: BigDecimal::from(3),
        };
        let _strategy = build_strategy(&config);
    }

    #[test]
    fn composite_strategy_config_builds_nested_strategies() {
        let config = VotingPowerStrategyConfig::Composite {
            components: vec![
                VotingPowerStrategyConfig::Badge {
                    resource_address: "resource_badge".to_string(),
                },
                VotingPowerStrategyConfig::Stake {
                    resource_address: "resource_xrd".to_string(),
                    weight: BigDecimal::from(1),
                },
            ],
        };
        let _strategy = build_strategy(&config);
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        ServerArgs::command().debug_assert()
    }
}
