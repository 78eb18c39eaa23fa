// SPDX-License-Identifier: Apache-2.0

//! Configuration surface (spec §6). Loaded once at startup from a YAML file, the way
//! `server-framework::GenericConfig<T>` splits a shared `health_check_port` from the
//! service-specific config in the teacher's own processors.

use serde::{Deserialize, Serialize};

/// Shared envelope around any service-specific config, carrying the one field every
/// deployment needs regardless of what the service does: where to serve `/healthz` and
/// `/metrics`.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GenericConfig<T> {
    pub health_check_port: u16,
    pub server_config: T,
}

/// Deployment-time shape of the voting-power formula (spec §4.6 Open Question). The
/// exact composite formula is not pinned by the spec; this enum is the configuration
/// surface the composition root turns into a `Box<dyn VotingPowerStrategy>` (see
/// `runtime::build_strategy`, DESIGN.md).
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VotingPowerStrategyConfig {
    Stake {
        resource_address: String,
        #[serde(default = "VotingPowerStrategyConfig::default_weight")]
        weight: bigdecimal::BigDecimal,
    },
    Badge {
        resource_address: String,
    },
    Composite {
        components: Vec<VotingPowerStrategyConfig>,
    },
}

impl VotingPowerStrategyConfig {
    fn default_weight() -> bigdecimal::BigDecimal {
        bigdecimal::BigDecimal::from(1)
    }
}

/// Recognized options from spec.md §6, deserialized from YAML. Field names are
/// `snake_case` (this codebase's YAML convention); the doc comment on each documents
/// the spec's camelCase key it corresponds to.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CollectorConfig {
    /// `networkId`: which blockchain network this deployment targets. Opaque to the
    /// core beyond being threaded through to logs and the gateway implementation.
    pub network_id: String,

    /// `governanceComponentAddress`: the on-chain component address events are
    /// filtered by.
    pub governance_component_address: String,

    /// `gatewayBaseUrl`: base URL of the external Gateway Capability implementation.
    /// Consumed by whatever `GatewayCapability` the composition root constructs; the
    /// core itself only depends on the trait (spec §4.3).
    pub gateway_base_url: String,

    /// `gatewayBasicAuth`: optional HTTP basic-auth credential for the gateway.
    #[serde(default)]
    pub gateway_basic_auth: Option<String>,

    /// `databaseUrl`: Postgres connection string for the relational store.
    pub database_url: String,

    /// Not named in spec.md's config table (the formula is left an Open Question) but
    /// required to construct a concrete `VotingPowerStrategy` at startup.
    pub voting_power_strategy: VotingPowerStrategyConfig,

    /// `listenerFromStateVersion`: override for the Listener's starting state
    /// version. Defaults to `None`, meaning "derive from Startup Reconciliation".
    #[serde(default)]
    pub listener_from_state_version: Option<i64>,

    /// `listenerLimitPerPage`.
    #[serde(default = "CollectorConfig::default_listener_limit_per_page")]
    pub listener_limit_per_page: u32,

    /// `listenerWaitTime`, in seconds: sleep between polls when caught up.
    #[serde(default = "CollectorConfig::default_listener_wait_time_secs")]
    pub listener_wait_time_secs: u64,

    /// `listenerRetryAttempts`: per-transaction retry budget before dead-lettering.
    #[serde(default = "CollectorConfig::default_listener_retry_attempts")]
    pub listener_retry_attempts: u32,

    /// `weightConcurrency`: max concurrent Vote-Weight Calculator invocations.
    #[serde(default = "CollectorConfig::default_weight_concurrency")]
    pub weight_concurrency: usize,

    /// `gatewayPageConcurrency`: max concurrent gateway page fetches, used by
    /// paginated-KVS-traversal voting-power strategies (spec §4.6).
    #[serde(default = "CollectorConfig::default_gateway_page_concurrency")]
    pub gateway_page_concurrency: usize,

    /// `dedupWindow`: size of the dedup buffer (in-memory ring + durable retention).
    #[serde(default = "CollectorConfig::default_dedup_window")]
    pub dedup_window: usize,

    /// `triggerConcurrency`: max concurrent recompute triggers worked at once.
    #[serde(default = "CollectorConfig::default_trigger_concurrency")]
    pub trigger_concurrency: usize,

    /// `triggerMaxAttempts`: attempts before a trigger is archived as failed.
    #[serde(default = "CollectorConfig::default_trigger_max_attempts")]
    pub trigger_max_attempts: i32,

    /// `triggerBackoff` lower bound, in seconds (doubles from here up to the cap).
    #[serde(default = "CollectorConfig::default_trigger_backoff_base_secs")]
    pub trigger_backoff_base_secs: u64,

    /// `triggerBackoff` ceiling, in seconds.
    #[serde(default = "CollectorConfig::default_trigger_backoff_cap_secs")]
    pub trigger_backoff_cap_secs: u64,

    /// `logLevel`: Debug | Info | Warn | Error. Folded into the `RUST_LOG`-style
    /// `EnvFilter` the runtime builds at startup when `RUST_LOG` itself is unset.
    #[serde(default = "CollectorConfig::default_log_level")]
    pub log_level: String,

    /// Not named in spec.md's config table but required by the Ledger-State
    /// Resolver's cache policy (spec §4.4): bounded LRU capacity.
    #[serde(default = "CollectorConfig::default_ledger_state_cache_size")]
    pub ledger_state_cache_size: usize,

    /// How often the background dedup compactor runs, in seconds (spec §4.2: "in the
    /// same transaction or a background compaction — implementer's choice").
    #[serde(default = "CollectorConfig::default_dedup_compaction_interval_secs")]
    pub dedup_compaction_interval_secs: u64,

    /// Size of the shared `diesel-async`/`bb8` connection pool.
    #[serde(default = "CollectorConfig::default_db_pool_size")]
    pub db_pool_size: u32,
}

impl CollectorConfig {
    pub const fn default_listener_limit_per_page() -> u32 {
        100
    }

    pub const fn default_listener_wait_time_secs() -> u64 {
        10
    }

    pub const fn default_listener_retry_attempts() -> u32 {
        3
    }

    pub const fn default_weight_concurrency() -> usize {
        5
    }

    pub const fn default_gateway_page_concurrency() -> usize {
        5
    }

    pub const fn default_dedup_window() -> usize {
        10_000
    }

    pub const fn default_trigger_concurrency() -> usize {
        4
    }

    pub const fn default_trigger_max_attempts() -> i32 {
        10
    }

    pub const fn default_trigger_backoff_base_secs() -> u64 {
        1
    }

    pub const fn default_trigger_backoff_cap_secs() -> u64 {
        30
    }

    pub fn default_log_level() -> String {
        "info".to_string()
    }

    pub const fn default_ledger_state_cache_size() -> usize {
        10_000
    }

    pub const fn default_dedup_compaction_interval_secs() -> u64 {
        60
    }

    pub const fn default_db_pool_size() -> u32 {
        30
    }

    pub fn listener_wait_time(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.listener_wait_time_secs)
    }

    pub fn trigger_backoff_base(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.trigger_backoff_base_secs)
    }

    pub fn trigger_backoff_cap(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.trigger_backoff_cap_secs)
    }

    pub fn dedup_compaction_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.dedup_compaction_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_yaml_fills_in_defaults() {
        let yaml = r#"
            health_check_port: 8080
            server_config:
              network_id: "mainnet"
              governance_component_address: "component_rdx1"
              gateway_base_url: "https://gateway.example.com"
              database_url: "postgres://localhost/collector"
              voting_power_strategy:
                kind: badge
                resource_address: "resource_badge"
        "#;
        let config: GenericConfig<CollectorConfig> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.health_check_port, 8080);
        assert_eq!(config.server_config.listener_limit_per_page, 100);
        assert_eq!(config.server_config.dedup_window, 10_000);
        assert_eq!(config.server_config.trigger_max_attempts, 10);
        assert!(config.server_config.gateway_basic_auth.is_none());
        assert!(config.server_config.listener_from_state_version.is_none());
    }

    #[test]
    fn overrides_replace_defaults() {
        let yaml = r#"
            health_check_port: 8080
            server_config:
              network_id: "mainnet"
              governance_component_address: "component_rdx1"
              gateway_base_url: "https://gateway.example.com"
              database_url: "postgres://localhost/collector"
              voting_power_strategy:
                kind: stake
                resource_address: "resource_xrd"
                weight: 2
              listener_from_state_version: 42
              dedup_window: 500
              trigger_max_attempts: 3
        "#;
        let config: GenericConfig<CollectorConfig> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server_config.listener_from_state_version, Some(42));
        assert_eq!(config.server_config.dedup_window, 500);
        assert_eq!(config.server_config.trigger_max_attempts, 3);
    }

    #[test]
    fn unknown_field_is_rejected() {
        let yaml = r#"
            health_check_port: 8080
            server_config:
              network_id: "mainnet"
              governance_component_address: "component_rdx1"
              gateway_base_url: "https://gateway.example.com"
              database_url: "postgres://localhost/collector"
              made_up_field: true
        "#;
        let result: Result<GenericConfig<CollectorConfig>, _> = serde_yaml::from_str(yaml);
        assert!(result.is_err());
    }
}
