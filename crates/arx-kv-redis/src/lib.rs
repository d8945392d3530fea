//! Redis key-value store implementation.
//!
//! Locks and markers live in Redis, so they are shared across worker
//! replicas and survive a single process dying (the TTL reclaims anything a
//! dead holder left behind).
//!
//! The multi-key lock is one atomic Lua script: either every key is set or
//! none is. Release is a compare-and-delete on the lease token, so a stale
//! holder can never free a key that was re-acquired after its TTL lapsed.

use std::time::{Duration, Instant};

use arx_kv::{KeyValueStore, KvError, LockGuard, LockLease};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};
use uuid::Uuid;

const ACQUIRE_SCRIPT: &str = r#"
for _, key in ipairs(KEYS) do
    if redis.call('EXISTS', key) == 1 then
        return 0
    end
end
for _, key in ipairs(KEYS) do
    redis.call('SET', key, ARGV[1], 'PX', ARGV[2])
end
return 1
"#;

const RELEASE_SCRIPT: &str = r#"
local removed = 0
for _, key in ipairs(KEYS) do
    if redis.call('GET', key) == ARGV[1] then
        removed = removed + redis.call('DEL', key)
    end
end
return removed
"#;

// Delay between attempts on a contended lock set.
const CONTENTION_RETRY: Duration = Duration::from_millis(100);

fn backend_err(e: redis::RedisError) -> KvError {
    KvError::Backend(e.to_string())
}

/// Redis-backed key-value store.
#[derive(Clone)]
pub struct RedisKv {
    conn: ConnectionManager,
}

impl RedisKv {
    /// Connect to Redis at `url` (e.g. `redis://127.0.0.1:6379`).
    pub async fn connect(url: &str) -> Result<Self, KvError> {
        let client = Client::open(url).map_err(backend_err)?;
        let conn = ConnectionManager::new(client).await.map_err(backend_err)?;
        Ok(Self { conn })
    }

    async fn try_acquire(
        &self,
        keys: &[String],
        token: &str,
        ttl: Duration,
    ) -> Result<bool, KvError> {
        let script = Script::new(ACQUIRE_SCRIPT);
        let mut invocation = script.prepare_invoke();
        for key in keys {
            invocation.key(key.as_str());
        }
        invocation.arg(token).arg(ttl.as_millis() as u64);
        let mut conn = self.conn.clone();
        let acquired: i64 = invocation.invoke_async(&mut conn).await.map_err(backend_err)?;
        Ok(acquired == 1)
    }
}

async fn release_keys(
    mut conn: ConnectionManager,
    keys: &[String],
    token: &str,
) -> Result<(), KvError> {
    let script = Script::new(RELEASE_SCRIPT);
    let mut invocation = script.prepare_invoke();
    for key in keys {
        invocation.key(key.as_str());
    }
    invocation.arg(token);
    let _removed: i64 = invocation.invoke_async(&mut conn).await.map_err(backend_err)?;
    Ok(())
}

struct RedisLease {
    conn: ConnectionManager,
    keys: Vec<String>,
    token: String,
}

#[async_trait]
impl LockLease for RedisLease {
    async fn release(&mut self) -> Result<(), KvError> {
        release_keys(self.conn.clone(), &self.keys, &self.token).await
    }

    fn abandon(&mut self) {
        // Unwound without release; best-effort delete from a spawned task,
        // the key TTL covers the case where no runtime is available.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let conn = self.conn.clone();
            let keys = std::mem::take(&mut self.keys);
            let token = std::mem::take(&mut self.token);
            handle.spawn(async move {
                let _ = release_keys(conn, &keys, &token).await;
            });
        }
    }
}

#[async_trait]
impl KeyValueStore for RedisKv {
    async fn acquire_locks(
        &self,
        keys: &[String],
        wait: Duration,
        ttl: Duration,
    ) -> Result<LockGuard, KvError> {
        let token = Uuid::new_v4().to_string();
        let deadline = Instant::now() + wait;
        loop {
            if self.try_acquire(keys, &token, ttl).await? {
                return Ok(LockGuard::new(Box::new(RedisLease {
                    conn: self.conn.clone(),
                    keys: keys.to_vec(),
                    token,
                })));
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(KvError::LockUnavailable(format!(
                    "timed out waiting for {} key(s)",
                    keys.len()
                )));
            }
            tokio::time::sleep((deadline - now).min(CONTENTION_RETRY)).await;
        }
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), KvError> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await
            .map_err(backend_err)?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(backend_err)
    }
}
