//! Critical section locks on top of an [`ExpiringStore`].
//!
//! A lock is a key holding a random owner token, written only if absent and
//! with its own expiry. Acquisition polls until the key can be written or the
//! wait budget runs out.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{self, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{GatewayError, Result};
use crate::store::ExpiringStore;

/// Lock name shared by every quota key under [`LockScope::Global`].
pub const GLOBAL_LOCK_NAME: &str = "OUTBOUND";

/// Which lock a quota key serializes through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LockScope {
    /// One lock for all keys.
    #[default]
    Global,
    /// One lock per counter key; unrelated senders do not contend.
    PerKey,
}

impl LockScope {
    pub fn lock_name(&self, key: &str) -> String {
        match self {
            LockScope::Global => GLOBAL_LOCK_NAME.to_string(),
            LockScope::PerKey => format!("LOCK_{key}"),
        }
    }
}

/// Timing of lock acquisition and lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockSettings {
    /// Lock expires on its own after this long, even if never released
    pub hold_timeout: Duration,
    /// Give up acquiring after this long
    pub wait_timeout: Duration,
    /// Delay between acquisition attempts
    pub poll_interval: Duration,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            hold_timeout: Duration::from_secs(10),
            wait_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Proof of a held lock. Hand it back to [`ExpiringStore::release`].
#[derive(Debug)]
#[must_use = "a held lock must be released"]
pub struct LockHandle {
    pub name: String,
    pub token: String,
}

pub(crate) async fn poll_acquire<S>(
    store: &S,
    name: &str,
    settings: &LockSettings,
) -> Result<LockHandle>
where
    S: ExpiringStore + ?Sized,
{
    let token = Uuid::new_v4().to_string();
    let started = Instant::now();
    let deadline = started + settings.wait_timeout;

    loop {
        if store.try_lock(name, &token, settings.hold_timeout).await? {
            debug!(lock = %name, waited = ?started.elapsed(), "lock acquired");
            return Ok(LockHandle {
                name: name.to_string(),
                token,
            });
        }

        let now = Instant::now();
        if now >= deadline {
            warn!(lock = %name, "lock wait timed out");
            return Err(GatewayError::LockTimeout {
                name: name.to_string(),
                waited: now.duration_since(started),
            });
        }

        time::sleep(settings.poll_interval.min(deadline - now)).await;
    }
}
