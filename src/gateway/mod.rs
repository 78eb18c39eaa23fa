// SPDX-License-Identifier: Apache-2.0

//! Gateway Capability (spec §4.3). Read-only access to ledger state, committed
//! transactions, component state, key-value-store pages, and account balances, all
//! pinned to a specific ledger version. The core only consumes this interface; who
//! implements it (HTTP + JSON, RPC, a local simulator) is an external concern.

pub mod mock;
pub mod retry;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::errors::CollectorError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransactionStatus {
    Success,
    Failure,
}

/// One event emitted by a committed transaction. `payload` is the event body already
/// decoded from its on-chain wire encoding into a structured value — the wire encoding
/// itself is the gateway implementation's concern, not the core's.
#[derive(Clone, Debug)]
pub struct RawEvent {
    pub emitter: String,
    pub event_name: String,
    pub payload: serde_json::Value,
}

#[derive(Clone, Debug)]
pub struct CommittedTransaction {
    pub state_version: i64,
    pub intent_hash: String,
    pub events: Vec<RawEvent>,
    pub affected_global_entities: Vec<String>,
    pub status: TransactionStatus,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct TransactionPage {
    pub items: Vec<CommittedTransaction>,
    pub next_cursor: Option<String>,
}

#[derive(Clone, Debug)]
pub struct LedgerState {
    pub state_version: i64,
    pub epoch: i64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct ComponentState {
    pub voter_kvs_address: String,
    pub vote_kvs_address: String,
    pub created_at_state_version: i64,
}

#[derive(Clone, Debug)]
pub struct KvsEntry {
    pub key: String,
    pub value: serde_json::Value,
    pub is_locked: bool,
    pub last_updated_at_state_version: i64,
}

#[derive(Clone, Debug)]
pub struct KvsPage {
    pub entries: Vec<KvsEntry>,
    pub next_cursor: Option<String>,
}

#[derive(Clone, Debug)]
pub struct FungibleBalance {
    pub resource_address: String,
    pub amount: BigDecimal,
}

/// Read-only capability this core consumes from an external collaborator (spec §4.3).
/// Every method is pinned to a ledger version where applicable, so the same call made
/// twice against an unchanged chain returns the same answer forever — this is what
/// makes the Vote-Weight Calculator replayable.
#[async_trait]
pub trait GatewayCapability: Send + Sync {
    async fn get_current_ledger_state(&self) -> Result<LedgerState, CollectorError>;

    /// Resolves `{ epoch, timestamp }` for a historical `stateVersion`, backing the
    /// Ledger-State Resolver's cache (spec §4.4).
    async fn get_ledger_state_at(&self, at_state_version: i64) -> Result<LedgerState, CollectorError>;

    /// Fetches one page of committed transactions starting at `from_state_version`,
    /// ordered strictly by ascending `stateVersion`. The Listener drives pagination by
    /// calling this repeatedly with `from_state_version = last_seen + 1`; this method
    /// itself does not retain cross-call state, matching the "lazy, restartable,
    /// finite-per-invocation" contract in spec §4.3.
    async fn fetch_transactions_page(
        &self,
        from_state_version: i64,
        limit_per_page: u32,
        filter_affected_entities: &[String],
    ) -> Result<TransactionPage, CollectorError>;

    async fn get_component_state_at(
        &self,
        component_address: &str,
        at_state_version: i64,
    ) -> Result<ComponentState, CollectorError>;

    async fn get_key_value_store_page_at(
        &self,
        kvs_address: &str,
        at_state_version: i64,
        cursor: Option<&str>,
        page_size: u32,
    ) -> Result<KvsPage, CollectorError>;

    async fn get_key_value_store_data_at(
        &self,
        kvs_address: &str,
        at_state_version: i64,
        keys: &[String],
    ) -> Result<Vec<KvsEntry>, CollectorError>;

    async fn get_fungible_balances_at(
        &self,
        account_address: &str,
        at_state_version: i64,
        resource_address: Option<&str>,
    ) -> Result<Vec<FungibleBalance>, CollectorError>;

    async fn get_non_fungible_holdings_at(
        &self,
        account_address: &str,
        at_state_version: i64,
        resource_address: &str,
    ) -> Result<HashSet<String>, CollectorError>;
}
