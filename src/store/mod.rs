//! Expiring key-value storage shared by all request handlers.
//!
//! - [`MemoryStore`]: in-process, for development, tests and single-process runs
//! - [`RedisStore`]: Redis-backed, shared across gateway processes

mod memory;
mod redis;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{StoreBackend, StoreConfig};
use crate::error::{GatewayError, Result};
use crate::lock::{self, LockHandle, LockSettings};

/// String values under keys with optional expiry.
///
/// Every call is atomic on its own. A read followed by a write is not; callers
/// that need that hold a lock from [`ExpiringStore::acquire_lock`].
#[async_trait]
pub trait ExpiringStore: Send + Sync {
    /// Value under `key`, `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Overwrite `key`, expiring `ttl` from now.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Time left before `key` expires. `None` if absent or without expiry.
    async fn remaining_ttl(&self, key: &str) -> Result<Option<Duration>>;

    /// Overwrite `key` keeping an expiry previously read with
    /// [`ExpiringStore::remaining_ttl`].
    async fn set_preserving_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Write `token` under `name` only if nothing is there.
    async fn try_lock(&self, name: &str, token: &str, hold: Duration) -> Result<bool>;

    /// Delete `name` only if it still holds `token`.
    async fn unlock(&self, name: &str, token: &str) -> Result<bool>;

    /// Poll until the lock is ours or `settings.wait_timeout` passes.
    async fn acquire_lock(&self, name: &str, settings: &LockSettings) -> Result<LockHandle> {
        lock::poll_acquire(self, name, settings).await
    }

    /// Release a held lock. `false` if it had already expired and was lost.
    async fn release(&self, handle: LockHandle) -> Result<bool> {
        self.unlock(&handle.name, &handle.token).await
    }
}

/// Build the configured backend.
pub async fn create_store(config: &StoreConfig) -> Result<Arc<dyn ExpiringStore>> {
    let store: Arc<dyn ExpiringStore> = match config.backend {
        StoreBackend::Memory => MemoryStore::init(),
        StoreBackend::Redis => {
            let url = config
                .url
                .as_deref()
                .ok_or_else(|| GatewayError::Config("redis backend requires store.url".into()))?;
            Arc::new(RedisStore::connect(url).await?)
        }
    };

    Ok(store)
}
