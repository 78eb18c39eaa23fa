// SPDX-License-Identifier: Apache-2.0

//! Rate-limit / transient-error retry middleware wrapping a `GatewayCapability` (spec
//! §4.12, §5): retries transient errors with an exponential backoff capped at 30s before
//! surfacing anything to the caller. Permanent errors pass straight through.

use std::time::Duration;

use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use std::collections::HashSet;

use super::{
    ComponentState, FungibleBalance, GatewayCapability, KvsEntry, KvsPage, LedgerState,
    TransactionPage,
};
use crate::errors::CollectorError;

pub struct RetryingGateway<G> {
    inner: G,
    initial_interval: Duration,
    max_interval: Duration,
}

impl<G: GatewayCapability> RetryingGateway<G> {
    pub fn new(inner: G) -> Self {
        Self {
            inner,
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(30),
        }
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_interval,
            max_interval: self.max_interval,
            multiplier: 2.0,
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        }
    }

    async fn with_retry<T, F, Fut>(&self, op: F) -> Result<T, CollectorError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, CollectorError>>,
    {
        retry(self.backoff(), || async {
            op().await.map_err(|err| match err {
                CollectorError::TransientGateway(_) => backoff::Error::transient(err),
                other => backoff::Error::permanent(other),
            })
        })
        .await
    }
}

#[async_trait]
impl<G: GatewayCapability> GatewayCapability for RetryingGateway<G> {
    async fn get_current_ledger_state(&self) -> Result<LedgerState, CollectorError> {
        self.with_retry(|| self.inner.get_current_ledger_state())
            .await
    }

    async fn get_ledger_state_at(&self, at_state_version: i64) -> Result<LedgerState, CollectorError> {
        self.with_retry(|| self.inner.get_ledger_state_at(at_state_version))
            .await
    }

    async fn fetch_transactions_page(
        &self,
        from_state_version: i64,
        limit_per_page: u32,
        filter_affected_entities: &[String],
    ) -> Result<TransactionPage, CollectorError> {
        self.with_retry(|| {
            self.inner
                .fetch_transactions_page(from_state_version, limit_per_page, filter_affected_entities)
        })
        .await
    }

    async fn get_component_state_at(
        &self,
        component_address: &str,
        at_state_version: i64,
    ) -> Result<ComponentState, CollectorError> {
        self.with_retry(|| {
            self.inner
                .get_component_state_at(component_address, at_state_version)
        })
        .await
    }

    async fn get_key_value_store_page_at(
        &self,
        kvs_address: &str,
        at_state_version: i64,
        cursor: Option<&str>,
        page_size: u32,
    ) -> Result<KvsPage, CollectorError> {
        self.with_retry(|| {
            self.inner
                .get_key_value_store_page_at(kvs_address, at_state_version, cursor, page_size)
        })
        .await
    }

    async fn get_key_value_store_data_at(
        &self,
        kvs_address: &str,
        at_state_version: i64,
        keys: &[String],
    ) -> Result<Vec<KvsEntry>, CollectorError> {
        self.with_retry(|| {
            self.inner
                .get_key_value_store_data_at(kvs_address, at_state_version, keys)
        })
        .await
    }

    async fn get_fungible_balances_at(
        &self,
        account_address: &str,
        at_state_version: i64,
        resource_address: Option<&str>,
    ) -> Result<Vec<FungibleBalance>, CollectorError> {
        self.with_retry(|| {
            self.inner
                .get_fungible_balances_at(account_address, at_state_version, resource_address)
        })
        .await
    }

    async fn get_non_fungible_holdings_at(
        &self,
        account_address: &str,
        at_state_version: i64,
        resource_address: &str,
    ) -> Result<HashSet<String>, CollectorError> {
        self.with_retry(|| {
            self.inner
                .get_non_fungible_holdings_at(account_address, at_state_version, resource_address)
        })
        .await
    }
}
