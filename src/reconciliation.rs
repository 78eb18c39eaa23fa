// SPDX-License-Identifier: Apache-2.0

//! Startup Reconciliation (spec §4.7). Chooses a correct resume point for the Listener
//! on every process start, including the very first one, and rehydrates the Dedup
//! Buffer so in-memory duplicate checks are warm before the first page is fetched.

use std::collections::HashSet;

use diesel_async::AsyncPgConnection;

use crate::{
    db::models::{component_metadata, cursor, dedup::DedupBuffer, poll},
    errors::CollectorError,
    gateway::GatewayCapability,
};

pub struct ReconciliationOutcome {
    pub resume_from: i64,
    /// Every key-value-store address owned by a poll persisted before this startup,
    /// used to seed the `ChildAddressRegistry` (spec §4.5).
    pub known_child_addresses: HashSet<String>,
}

/// Runs the five-step algorithm from the component's responsibility statement:
/// read the persisted cursor, look up the component's own first relevant version
/// (caching it on first sight), clamp against the gateway's current state, and
/// rehydrate the dedup buffer.
pub async fn reconcile(
    conn: &mut AsyncPgConnection,
    gateway: &dyn GatewayCapability,
    component_address: &str,
    dedup: &DedupBuffer,
) -> Result<ReconciliationOutcome, CollectorError> {
    let persisted_cursor = cursor::read(conn).await?;

    let current_ledger_state = gateway.get_current_ledger_state().await?;

    let first_relevant_version = match component_metadata::get_first_relevant_version(conn).await? {
        Some(v) => v,
        None => {
            let component_state = gateway
                .get_component_state_at(component_address, current_ledger_state.state_version)
                .await?;
            component_metadata::set_first_relevant_version(
                conn,
                component_state.created_at_state_version,
            )
            .await?;
            component_state.created_at_state_version
        }
    };

    let resume_from = (first_relevant_version.max(persisted_cursor + 1))
        .min(current_ledger_state.state_version + 1);

    dedup.rehydrate(conn).await?;

    let known_child_addresses: HashSet<String> =
        poll::list_all_kvs_addresses(conn).await?.into_iter().collect();

    tracing::info!(
        persisted_cursor,
        first_relevant_version,
        current_state_version = current_ledger_state.state_version,
        resume_from,
        known_child_addresses = known_child_addresses.len(),
        "startup reconciliation complete"
    );

    Ok(ReconciliationOutcome {
        resume_from,
        known_child_addresses,
    })
}
