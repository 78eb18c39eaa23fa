// SPDX-License-Identifier: Apache-2.0

//! Ledger-State Resolver (spec §4.4). Caches `{ stateVersion -> epoch, timestamp }`
//! lookups behind a bounded LRU so per-transaction handlers don't re-query the gateway
//! for metadata they can get once and keep.

use std::num::NonZeroUsize;

use lru::LruCache;
use tokio::sync::Mutex;

use crate::{errors::CollectorError, gateway::GatewayCapability};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EpochTimestamp {
    pub epoch: i64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

pub struct LedgerStateResolver {
    cache: Mutex<LruCache<i64, EpochTimestamp>>,
}

impl LedgerStateResolver {
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity.max(1)).expect("clamped to at least 1"),
            )),
        }
    }

    pub async fn resolve(
        &self,
        gateway: &dyn GatewayCapability,
        state_version: i64,
    ) -> Result<EpochTimestamp, CollectorError> {
        if let Some(hit) = self.cache.lock().await.get(&state_version) {
            return Ok(*hit);
        }
        let ledger_state = gateway.get_ledger_state_at(state_version).await?;
        let resolved = EpochTimestamp {
            epoch: ledger_state.epoch,
            timestamp: ledger_state.timestamp,
        };
        self.cache.lock().await.put(state_version, resolved);
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{mock::MockGatewayCapability, LedgerState};
    use chrono::Utc;

    #[tokio::test]
    async fn caches_after_first_resolve() {
        let gateway = MockGatewayCapability::new();
        gateway
            .set_ledger_state_at(
                500,
                LedgerState {
                    state_version: 500,
                    epoch: 7,
                    timestamp: Utc::now(),
                },
            )
            .await;
        let resolver = LedgerStateResolver::new(16);
        let first = resolver.resolve(&gateway, 500).await.unwrap();
        assert_eq!(first.epoch, 7);

        // Even after the backing state disappears, the cached value is served.
        let gateway2 = MockGatewayCapability::new();
        let second = resolver.resolve(&gateway2, 500).await.unwrap();
        assert_eq!(second.epoch, 7);
    }

    #[tokio::test]
    async fn miss_surfaces_gateway_error() {
        let gateway = MockGatewayCapability::new();
        let resolver = LedgerStateResolver::new(16);
        let result = resolver.resolve(&gateway, 999).await;
        assert!(result.is_err());
    }
}
