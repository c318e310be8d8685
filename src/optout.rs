//! STOP replies and the routes they block.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::Result;
use crate::store::ExpiringStore;

/// The only message body that registers an opt-out.
pub const STOP_TOKEN: &str = "STOP";

/// Records opt-outs under direction-qualified keys and answers whether a
/// route is blocked. Keys are built by the caller, e.g. `INBOUND_<from>`.
#[derive(Clone)]
pub struct OptOutRegistry {
    store: Arc<dyn ExpiringStore>,
    retention: Duration,
}

impl OptOutRegistry {
    pub fn new(store: Arc<dyn ExpiringStore>, retention: Duration) -> Self {
        Self { store, retention }
    }

    /// Store `key -> counterpart` for the retention window if `text` is a
    /// STOP request. Returns whether a record was written.
    pub async fn register_if_stop_request(
        &self,
        text: &str,
        key: &str,
        counterpart: &str,
    ) -> Result<bool> {
        if text.trim() != STOP_TOKEN {
            return Ok(false);
        }

        self.store
            .set_with_ttl(key, counterpart, self.retention)
            .await?;
        info!(key = %key, counterpart = %counterpart, "opt-out registered");

        Ok(true)
    }

    /// True iff `key` currently holds exactly `expected_counterpart`.
    pub async fn is_blocked(&self, key: &str, expected_counterpart: &str) -> Result<bool> {
        let blocked = self
            .store
            .get(key)
            .await?
            .is_some_and(|stored| stored == expected_counterpart);
        debug!(key = %key, blocked, "opt-out checked");

        Ok(blocked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use tokio::time;

    fn registry(retention_secs: u64) -> (Arc<MemoryStore>, OptOutRegistry) {
        let store = MemoryStore::init();
        let registry = OptOutRegistry::new(store.clone(), Duration::from_secs(retention_secs));
        (store, registry)
    }

    #[tokio::test]
    async fn test_only_exact_stop_registers() {
        let (store, registry) = registry(60);

        for text in ["stop", "STOP please", "Stop", "S T O P", "STOPP", ""] {
            assert!(!registry
                .register_if_stop_request(text, "INBOUND_A", "B")
                .await
                .unwrap());
        }
        assert_eq!(store.get("INBOUND_A").await.unwrap(), None);

        for text in ["STOP", "STOP\r\n", "  STOP\n", "\tSTOP "] {
            assert!(registry
                .register_if_stop_request(text, "INBOUND_A", "B")
                .await
                .unwrap());
        }
        assert_eq!(store.get("INBOUND_A").await.unwrap().as_deref(), Some("B"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_block_lasts_for_retention() {
        let (_store, registry) = registry(3);
        registry
            .register_if_stop_request("STOP", "INBOUND_A", "B")
            .await
            .unwrap();

        time::advance(Duration::from_secs(1)).await;
        assert!(registry.is_blocked("INBOUND_A", "B").await.unwrap());

        time::advance(Duration::from_secs(3)).await;
        assert!(!registry.is_blocked("INBOUND_A", "B").await.unwrap());
    }

    #[tokio::test]
    async fn test_block_matches_counterpart_exactly() {
        let (_store, registry) = registry(60);
        registry
            .register_if_stop_request("STOP", "INBOUND_A", "B")
            .await
            .unwrap();

        assert!(registry.is_blocked("INBOUND_A", "B").await.unwrap());
        assert!(!registry.is_blocked("INBOUND_A", "C").await.unwrap());
        assert!(!registry.is_blocked("INBOUND_A", "b").await.unwrap());
        assert!(!registry.is_blocked("OUTBOUND_A", "B").await.unwrap());
    }
}
