use std::time::Duration;

use ::redis::{aio::ConnectionManager, Client, Script};
use async_trait::async_trait;
use tracing::info;

use super::ExpiringStore;
use crate::error::Result;

/// Delete the lock only while it still carries our token.
const UNLOCK_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
end
return 0
"#;

/// Redis-backed store, shared by every gateway process pointed at the same
/// server.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        info!(url = %url, "connected to redis");

        Ok(Self { conn })
    }
}

fn millis(ttl: Duration) -> u64 {
    // redis rejects a zero expiry
    (ttl.as_millis() as u64).max(1)
}

#[async_trait]
impl ExpiringStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = ::redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        let () = ::redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(millis(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn remaining_ttl(&self, key: &str) -> Result<Option<Duration>> {
        let mut conn = self.conn.clone();
        let pttl: i64 = ::redis::cmd("PTTL").arg(key).query_async(&mut conn).await?;
        // -2: no such key, -1: key without expiry
        Ok((pttl >= 0).then(|| Duration::from_millis(pttl as u64)))
    }

    async fn set_preserving_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        let () = ::redis::cmd("PSETEX")
            .arg(key)
            .arg(millis(ttl))
            .arg(value)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn try_lock(&self, name: &str, token: &str, hold: Duration) -> Result<bool> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = ::redis::cmd("SET")
            .arg(name)
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(millis(hold))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn unlock(&self, name: &str, token: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let deleted: i64 = Script::new(UNLOCK_SCRIPT)
            .key(name)
            .arg(token)
            .invoke_async(&mut conn)
            .await?;
        Ok(deleted == 1)
    }
}

#[cfg(test)]
mod tests {
    //! Run against a live server with
    //! `REDIS_URL=redis://127.0.0.1:6379/15 cargo test -- --ignored`.

    use super::*;
    use uuid::Uuid;

    async fn store() -> Option<RedisStore> {
        let url = std::env::var("REDIS_URL").ok()?;
        Some(RedisStore::connect(&url).await.unwrap())
    }

    fn key(name: &str) -> String {
        format!("TEST_{}_{name}", Uuid::new_v4())
    }

    #[tokio::test]
    #[ignore = "needs REDIS_URL"]
    async fn test_value_expires() {
        let Some(store) = store().await else { return };
        let k = key("expiry");

        store
            .set_with_ttl(&k, "v", Duration::from_millis(300))
            .await
            .unwrap();
        assert_eq!(store.get(&k).await.unwrap().as_deref(), Some("v"));
        let left = store.remaining_ttl(&k).await.unwrap().unwrap();
        assert!(left > Duration::ZERO && left <= Duration::from_millis(300));

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(store.get(&k).await.unwrap(), None);
        // PTTL -2
        assert_eq!(store.remaining_ttl(&k).await.unwrap(), None);
    }

    #[tokio::test]
    #[ignore = "needs REDIS_URL"]
    async fn test_key_without_expiry_has_no_ttl() {
        let Some(store) = store().await else { return };
        let k = key("persistent");
        let mut conn = store.conn.clone();

        let () = ::redis::cmd("SET")
            .arg(&k)
            .arg("v")
            .query_async(&mut conn)
            .await
            .unwrap();
        // PTTL -1
        assert_eq!(store.remaining_ttl(&k).await.unwrap(), None);

        let () = ::redis::cmd("DEL").arg(&k).query_async(&mut conn).await.unwrap();
    }

    #[tokio::test]
    #[ignore = "needs REDIS_URL"]
    async fn test_preserving_ttl_keeps_deadline() {
        let Some(store) = store().await else { return };
        let k = key("preserve");

        store
            .set_with_ttl(&k, "1", Duration::from_secs(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let left = store.remaining_ttl(&k).await.unwrap().unwrap();
        store.set_preserving_ttl(&k, "2", left).await.unwrap();

        assert_eq!(store.get(&k).await.unwrap().as_deref(), Some("2"));
        let after = store.remaining_ttl(&k).await.unwrap().unwrap();
        assert!(after <= left);
        assert!(after < Duration::from_secs(10));
    }

    #[tokio::test]
    #[ignore = "needs REDIS_URL"]
    async fn test_unlock_requires_token() {
        let Some(store) = store().await else { return };
        let name = key("lock");
        let hold = Duration::from_secs(10);

        assert!(store.try_lock(&name, "a", hold).await.unwrap());
        assert!(!store.try_lock(&name, "b", hold).await.unwrap());
        assert!(!store.unlock(&name, "b").await.unwrap());
        assert!(store.unlock(&name, "a").await.unwrap());
        assert!(store.try_lock(&name, "b", hold).await.unwrap());
        assert!(store.unlock(&name, "b").await.unwrap());
    }

    #[tokio::test]
    #[ignore = "needs REDIS_URL"]
    async fn test_abandoned_lock_expires() {
        let Some(store) = store().await else { return };
        let name = key("lock");

        assert!(store
            .try_lock(&name, "a", Duration::from_millis(200))
            .await
            .unwrap());
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert!(store
            .try_lock(&name, "b", Duration::from_secs(10))
            .await
            .unwrap());
        assert!(!store.unlock(&name, "a").await.unwrap());
        assert!(store.unlock(&name, "b").await.unwrap());
    }
}
