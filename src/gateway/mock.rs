// SPDX-License-Identifier: Apache-2.0

//! A fully in-memory `GatewayCapability` driven by scripted responses, used to exercise
//! the pipeline end-to-end without a live chain — the same role `testing-transactions`
//! fixtures play for the teacher's processors.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use tokio::sync::Mutex;

use super::{
    CommittedTransaction, ComponentState, FungibleBalance, GatewayCapability, KvsEntry, KvsPage,
    LedgerState, TransactionPage,
};
use crate::errors::CollectorError;

#[derive(Default)]
struct MockState {
    ledger_state: Option<LedgerState>,
    /// ledger_states_at[state_version] -> historical ledger state, for `get_ledger_state_at`.
    ledger_states_at: HashMap<i64, LedgerState>,
    transactions: Vec<CommittedTransaction>,
    component_state: Option<ComponentState>,
    /// balances[(account, at_version)] -> balances
    balances: HashMap<(String, i64), Vec<FungibleBalance>>,
    /// holdings[(account, at_version, resource)] -> ids held
    holdings: HashMap<(String, i64, String), HashSet<String>>,
    /// Accounts that should look up as "does not exist" at the given version.
    missing_accounts: HashSet<(String, i64)>,
    /// Remaining transient-failure countdown for weight-relevant queries, keyed by account.
    transient_failures_remaining: HashMap<String, u32>,
}

/// Scripted `GatewayCapability` for tests. Not part of the core's production
/// surface — an external collaborator supplies the real implementation.
pub struct MockGatewayCapability {
    state: Mutex<MockState>,
}

impl Default for MockGatewayCapability {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGatewayCapability {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
        }
    }

    pub async fn set_ledger_state(&self, ledger_state: LedgerState) {
        self.state.lock().await.ledger_state = Some(ledger_state);
    }

    pub async fn set_component_state(&self, component_state: ComponentState) {
        self.state.lock().await.component_state = Some(component_state);
    }

    pub async fn set_ledger_state_at(&self, state_version: i64, ledger_state: LedgerState) {
        self.state
            .lock()
            .await
            .ledger_states_at
            .insert(state_version, ledger_state);
    }

    pub async fn push_transaction(&self, txn: CommittedTransaction) {
        self.state.lock().await.transactions.push(txn);
    }

    pub async fn set_balance(&self, account: &str, at_version: i64, balances: Vec<FungibleBalance>) {
        self.state
            .lock()
            .await
            .balances
            .insert((account.to_string(), at_version), balances);
    }

    pub async fn set_holdings(
        &self,
        account: &str,
        at_version: i64,
        resource: &str,
        ids: HashSet<String>,
    ) {
        self.state.lock().await.holdings.insert(
            (account.to_string(), at_version, resource.to_string()),
            ids,
        );
    }

    pub async fn mark_account_missing(&self, account: &str, at_version: i64) {
        self.state
            .lock()
            .await
            .missing_accounts
            .insert((account.to_string(), at_version));
    }

    /// Causes the next `n` calls that read data for `account` to fail with a transient
    /// error before succeeding, exercising the weight calculator's retry-then-pending path.
    pub async fn fail_transiently_for(&self, account: &str, n: u32) {
        self.state
            .lock()
            .await
            .transient_failures_remaining
            .insert(account.to_string(), n);
    }

    async fn maybe_fail_transiently(&self, account: &str) -> Result<(), CollectorError> {
        let mut state = self.state.lock().await;
        if let Some(remaining) = state.transient_failures_remaining.get_mut(account) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(CollectorError::TransientGateway(format!(
                    "scripted transient failure for {account}"
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl GatewayCapability for MockGatewayCapability {
    async fn get_current_ledger_state(&self) -> Result<LedgerState, CollectorError> {
        self.state
            .lock()
            .await
            .ledger_state
            .clone()
            .ok_or_else(|| CollectorError::PermanentGateway("no ledger state configured".into()))
    }

    async fn get_ledger_state_at(&self, at_state_version: i64) -> Result<LedgerState, CollectorError> {
        self.state
            .lock()
            .await
            .ledger_states_at
            .get(&at_state_version)
            .cloned()
            .ok_or_else(|| {
                CollectorError::PermanentGateway(format!(
                    "no ledger state configured at version {at_state_version}"
                ))
            })
    }

    async fn fetch_transactions_page(
        &self,
        from_state_version: i64,
        limit_per_page: u32,
        filter_affected_entities: &[String],
    ) -> Result<TransactionPage, CollectorError> {
        let state = self.state.lock().await;
        let items: Vec<CommittedTransaction> = state
            .transactions
            .iter()
            .filter(|t| t.state_version >= from_state_version)
            .filter(|t| {
                filter_affected_entities.is_empty()
                    || t.affected_global_entities
                        .iter()
                        .any(|e| filter_affected_entities.contains(e))
            })
            .take(limit_per_page as usize)
            .cloned()
            .collect();
        Ok(TransactionPage {
            items,
            next_cursor: None,
        })
    }

    async fn get_component_state_at(
        &self,
        _component_address: &str,
        _at_state_version: i64,
    ) -> Result<ComponentState, CollectorError> {
        self.state
            .lock()
            .await
            .component_state
            .clone()
            .ok_or_else(|| CollectorError::PermanentGateway("no component state configured".into()))
    }

    async fn get_key_value_store_page_at(
        &self,
        _kvs_address: &str,
        _at_state_version: i64,
        _cursor: Option<&str>,
        _page_size: u32,
    ) -> Result<KvsPage, CollectorError> {
        Ok(KvsPage {
            entries: vec![],
            next_cursor: None,
        })
    }

    async fn get_key_value_store_data_at(
        &self,
        _kvs_address: &str,
        _at_state_version: i64,
        _keys: &[String],
    ) -> Result<Vec<KvsEntry>, CollectorError> {
        Ok(vec![])
    }

    async fn get_fungible_balances_at(
        &self,
        account_address: &str,
        at_state_version: i64,
        resource_address: Option<&str>,
    ) -> Result<Vec<FungibleBalance>, CollectorError> {
        self.maybe_fail_transiently(account_address).await?;
        let state = self.state.lock().await;
        if state
            .missing_accounts
            .contains(&(account_address.to_string(), at_state_version))
        {
            return Ok(vec![]);
        }
        let balances = state
            .balances
            .get(&(account_address.to_string(), at_state_version))
            .cloned()
            .unwrap_or_default();
        Ok(match resource_address {
            Some(resource) => balances
                .into_iter()
                .filter(|b| b.resource_address == resource)
                .collect(),
            None => balances,
        })
    }

    async fn get_non_fungible_holdings_at(
        &self,
        account_address: &str,
        at_state_version: i64,
        resource_address: &str,
    ) -> Result<HashSet<String>, CollectorError> {
        self.maybe_fail_transiently(account_address).await?;
        let state = self.state.lock().await;
        Ok(state
            .holdings
            .get(&(
                account_address.to_string(),
                at_state_version,
                resource_address.to_string(),
            ))
            .cloned()
            .unwrap_or_default())
    }
}

/// Convenience constructor for a balance entry in tests.
pub fn balance(resource_address: &str, amount: impl Into<BigDecimal>) -> FungibleBalance {
    FungibleBalance {
        resource_address: resource_address.to_string(),
        amount: amount.into(),
    }
}
