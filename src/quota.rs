//! Per-sender outbound quota over a fixed-length window.
//!
//! The counter is read, checked and rewritten under a critical section lock,
//! so no two increments are ever derived from the same read. The window
//! starts with the first send and is never extended by later ones.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{GatewayError, Result};
use crate::lock::{LockScope, LockSettings};
use crate::store::ExpiringStore;

/// Reason reported when a sender has used up its window.
pub const LIMIT_REACHED: &str = "limit reached for sender";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuotaOutcome {
    /// The send was counted; `count` is the new total for the window.
    Allowed { count: u64 },
    /// Nothing was written.
    LimitReached { reason: &'static str },
}

#[derive(Clone)]
pub struct QuotaCounter {
    store: Arc<dyn ExpiringStore>,
    /// Inclusive maximum of sends per window
    limit: u64,
    window: Duration,
    lock: LockSettings,
    scope: LockScope,
}

impl QuotaCounter {
    pub fn new(
        store: Arc<dyn ExpiringStore>,
        limit: u64,
        window: Duration,
        lock: LockSettings,
        scope: LockScope,
    ) -> Self {
        Self {
            store,
            limit,
            window,
            lock,
            scope,
        }
    }

    /// Count one send against `key` if it is still under the limit.
    ///
    /// The lock-read-write-release sequence runs on its own task, so a caller
    /// that is dropped midway (client disconnect, aborted task) cannot leave
    /// the lock held. The lock is released on every path, including store
    /// failures, before the outcome is returned.
    pub async fn check_and_increment(&self, key: &str) -> Result<QuotaOutcome> {
        let counter = self.clone();
        let key = key.to_string();

        tokio::spawn(async move { counter.critical_section(&key).await }).await?
    }

    async fn critical_section(&self, key: &str) -> Result<QuotaOutcome> {
        let lock_name = self.scope.lock_name(key);
        let handle = self.store.acquire_lock(&lock_name, &self.lock).await?;

        let outcome = self.increment_locked(key).await;

        match self.store.release(handle).await {
            Ok(true) => {}
            Ok(false) => warn!(
                lock = %lock_name,
                key = %key,
                "lock expired before release; hold timeout too short"
            ),
            Err(e) => {
                warn!(lock = %lock_name, error = %e, "failed to release lock");
                return outcome.and(Err(e));
            }
        }

        outcome
    }

    async fn increment_locked(&self, key: &str) -> Result<QuotaOutcome> {
        let Some(raw) = self.store.get(key).await? else {
            return self.start_window(key).await;
        };

        let count: u64 = raw.parse().map_err(|_| GatewayError::CorruptCounter {
            key: key.to_string(),
            value: raw.clone(),
        })?;

        if count >= self.limit {
            info!(key = %key, count, limit = self.limit, "quota limit reached");
            return Ok(QuotaOutcome::LimitReached {
                reason: LIMIT_REACHED,
            });
        }

        let remaining = match self.store.remaining_ttl(key).await? {
            Some(ttl) if !ttl.is_zero() => ttl,
            // expired between the two reads
            _ => return self.start_window(key).await,
        };

        let count = count + 1;
        self.store
            .set_preserving_ttl(key, &count.to_string(), remaining)
            .await?;
        debug!(key = %key, count, remaining = ?remaining, "quota incremented");

        Ok(QuotaOutcome::Allowed { count })
    }

    async fn start_window(&self, key: &str) -> Result<QuotaOutcome> {
        self.store.set_with_ttl(key, "1", self.window).await?;
        debug!(key = %key, window = ?self.window, "quota window started");

        Ok(QuotaOutcome::Allowed { count: 1 })
    }
}
