use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    time::Duration,
};

use async_trait::async_trait;
use tokio::{
    select,
    sync::Notify,
    time::{self, Instant},
};
use tracing::trace;

use super::ExpiringStore;
use crate::error::Result;

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |when| when > now)
    }
}

/// In-process expiring store.
///
/// Expired entries read as absent immediately; a background task drops them
/// from the map once their deadline passes.
pub struct MemoryStore {
    inner: Mutex<HashMap<String, Entry>>,
    background_task: Arc<Notify>,
}

impl MemoryStore {
    pub fn init() -> Arc<Self> {
        let store = Self {
            inner: Mutex::new(HashMap::new()),
            background_task: Arc::new(Notify::new()),
        };

        let shared_state = Arc::new(store);
        tokio::spawn(purge_expired_keys(
            Arc::downgrade(&shared_state),
            shared_state.background_task.clone(),
        ));

        shared_state
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn put(&self, key: &str, value: &str, ttl: Duration) {
        let expires_at = Instant::now() + ttl;
        self.entries().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(expires_at),
            },
        );
        self.background_task.notify_one();
    }

    /// Drop expired entries and return the next deadline, if any.
    fn rearm(&self) -> Option<Instant> {
        let mut entries = self.entries();
        let mut next = None;
        let now = Instant::now();
        entries.retain(|key, entry| {
            let live = entry.is_live(now);
            if !live {
                trace!(key = %key, "expired");
            } else if let Some(when) = entry.expires_at {
                if next.map_or(true, |n| n > when) {
                    next = Some(when);
                }
            }
            live
        });

        next
    }
}

impl Drop for MemoryStore {
    fn drop(&mut self) {
        self.background_task.notify_one();
    }
}

async fn purge_expired_keys(state: Weak<MemoryStore>, background_task: Arc<Notify>) {
    loop {
        let next = match state.upgrade() {
            Some(store) => store.rearm(),
            None => return,
        };

        if let Some(when) = next {
            select! {
                _ = time::sleep_until(when) => {}
                _ = background_task.notified() => {}
            }
        } else {
            background_task.notified().await;
        }
    }
}

#[async_trait]
impl ExpiringStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries();
        Ok(entries
            .get(key)
            .filter(|entry| entry.is_live(Instant::now()))
            .map(|entry| entry.value.clone()))
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.put(key, value, ttl);
        Ok(())
    }

    async fn remaining_ttl(&self, key: &str) -> Result<Option<Duration>> {
        let entries = self.entries();
        let now = Instant::now();
        Ok(entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .and_then(|entry| entry.expires_at)
            .map(|when| when.duration_since(now)))
    }

    async fn set_preserving_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.put(key, value, ttl);
        Ok(())
    }

    async fn try_lock(&self, name: &str, token: &str, hold: Duration) -> Result<bool> {
        let mut entries = self.entries();
        let now = Instant::now();
        if entries.get(name).is_some_and(|entry| entry.is_live(now)) {
            return Ok(false);
        }

        entries.insert(
            name.to_string(),
            Entry {
                value: token.to_string(),
                expires_at: Some(now + hold),
            },
        );
        drop(entries);
        self.background_task.notify_one();

        Ok(true)
    }

    async fn unlock(&self, name: &str, token: &str) -> Result<bool> {
        let mut entries = self.entries();
        let now = Instant::now();
        let owned = entries
            .get(name)
            .is_some_and(|entry| entry.is_live(now) && entry.value == token);
        if owned {
            entries.remove(name);
        }

        Ok(owned)
    }
}
