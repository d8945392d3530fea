//! In-memory key-value store implementation.
//!
//! This implementation is suitable for:
//! - Single worker deployments
//! - Development and testing
//!
//! Locks and markers live in one process. If you run multiple worker
//! replicas, use the Redis store instead so that locks are shared across the
//! fleet.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use arx_kv::{KeyValueStore, KvError, LockGuard, LockLease};
use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::timeout;

// Bounds the wait between re-checks of a contended lock; releases wake
// waiters earlier via Notify.
const CONTENTION_RECHECK: Duration = Duration::from_millis(25);

struct HeldLock {
    token: u64,
    expires_at: Instant,
}

struct Marker {
    value: String,
    expires_at: Instant,
}

#[derive(Default)]
struct KvState {
    next_token: u64,
    locks: HashMap<String, HeldLock>,
    markers: HashMap<String, Marker>,
}

struct KvInner {
    state: Mutex<KvState>,
    released: Notify,
}

/// In-memory key-value store.
#[derive(Clone)]
pub struct MemoryKv {
    inner: Arc<KvInner>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(KvInner {
                state: Mutex::new(KvState::default()),
                released: Notify::new(),
            }),
        }
    }

    /// Try to take every key at once; returns the lease token on success.
    fn try_acquire(&self, keys: &[String], ttl: Duration) -> Option<u64> {
        let now = Instant::now();
        let mut state = self.inner.state.lock().expect("kv state poisoned");
        state.locks.retain(|_, held| held.expires_at > now);
        if keys.iter().any(|key| state.locks.contains_key(key)) {
            return None;
        }
        state.next_token += 1;
        let token = state.next_token;
        for key in keys {
            state.locks.insert(
                key.clone(),
                HeldLock {
                    token,
                    expires_at: now + ttl,
                },
            );
        }
        Some(token)
    }
}

impl Default for MemoryKv {
    fn default() -> Self {
        Self::new()
    }
}

struct MemoryLease {
    keys: Vec<String>,
    token: u64,
    inner: Arc<KvInner>,
}

impl MemoryLease {
    fn free(&self) {
        {
            let mut state = self.inner.state.lock().expect("kv state poisoned");
            for key in &self.keys {
                // Only remove keys still held under this lease; an expired key
                // may have been re-acquired by another worker.
                if state.locks.get(key).map(|held| held.token) == Some(self.token) {
                    state.locks.remove(key);
                }
            }
        }
        self.inner.released.notify_waiters();
    }
}

#[async_trait]
impl LockLease for MemoryLease {
    async fn release(&mut self) -> Result<(), KvError> {
        self.free();
        Ok(())
    }

    fn abandon(&mut self) {
        self.free();
    }
}

#[async_trait]
impl KeyValueStore for MemoryKv {
    async fn acquire_locks(
        &self,
        keys: &[String],
        wait: Duration,
        ttl: Duration,
    ) -> Result<LockGuard, KvError> {
        let deadline = Instant::now() + wait;
        loop {
            if let Some(token) = self.try_acquire(keys, ttl) {
                return Ok(LockGuard::new(Box::new(MemoryLease {
                    keys: keys.to_vec(),
                    token,
                    inner: Arc::clone(&self.inner),
                })));
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(KvError::LockUnavailable(format!(
                    "timed out waiting for {} key(s)",
                    keys.len()
                )));
            }
            let slice = (deadline - now).min(CONTENTION_RECHECK);
            let _ = timeout(slice, self.inner.released.notified()).await;
        }
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), KvError> {
        let mut state = self.inner.state.lock().expect("kv state poisoned");
        state.markers.insert(
            key.to_string(),
            Marker {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let state = self.inner.state.lock().expect("kv state poisoned");
        Ok(state
            .markers
            .get(key)
            .filter(|marker| marker.expires_at > Instant::now())
            .map(|marker| marker.value.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[tokio::test]
    async fn acquire_and_release() {
        let kv = MemoryKv::new();
        let guard = kv
            .acquire_locks(
                &keys(&["a", "b"]),
                Duration::from_millis(50),
                Duration::from_secs(5),
            )
            .await
            .unwrap();
        guard.release().await.unwrap();

        // Released keys are immediately acquirable again.
        let guard = kv
            .acquire_locks(
                &keys(&["a", "b"]),
                Duration::from_millis(50),
                Duration::from_secs(5),
            )
            .await
            .unwrap();
        guard.release().await.unwrap();
    }

    #[tokio::test]
    async fn overlapping_sets_exclude_each_other() {
        let kv = MemoryKv::new();
        let guard = kv
            .acquire_locks(
                &keys(&["a", "b"]),
                Duration::from_millis(20),
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        // "b" is held, so the whole set must fail: all-or-nothing.
        let err = kv
            .acquire_locks(
                &keys(&["b", "c"]),
                Duration::from_millis(20),
                Duration::from_secs(5),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, KvError::LockUnavailable(_)));

        // "c" was never taken by the failed acquisition.
        let guard_c = kv
            .acquire_locks(
                &keys(&["c"]),
                Duration::from_millis(20),
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        guard.release().await.unwrap();
        guard_c.release().await.unwrap();
    }

    #[tokio::test]
    async fn waiter_proceeds_after_release() {
        let kv = MemoryKv::new();
        let guard = kv
            .acquire_locks(
                &keys(&["x"]),
                Duration::from_millis(20),
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        let kv2 = kv.clone();
        let waiter = tokio::spawn(async move {
            kv2.acquire_locks(&keys(&["x"]), Duration::from_secs(2), Duration::from_secs(5))
                .await
        });

        tokio::time::sleep(Duration::from_millis(30)).await;
        guard.release().await.unwrap();

        let acquired = waiter.await.unwrap();
        assert!(acquired.is_ok());
    }

    #[tokio::test]
    async fn dropping_guard_frees_keys() {
        let kv = MemoryKv::new();
        {
            let _guard = kv
                .acquire_locks(
                    &keys(&["x"]),
                    Duration::from_millis(20),
                    Duration::from_secs(5),
                )
                .await
                .unwrap();
        }
        // Drop released the key without an explicit release().
        let guard = kv
            .acquire_locks(
                &keys(&["x"]),
                Duration::from_millis(20),
                Duration::from_secs(5),
            )
            .await
            .unwrap();
        guard.release().await.unwrap();
    }

    #[tokio::test]
    async fn expired_lock_is_reacquirable() {
        let kv = MemoryKv::new();
        let guard = kv
            .acquire_locks(
                &keys(&["x"]),
                Duration::from_millis(20),
                Duration::from_millis(30),
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        let second = kv
            .acquire_locks(
                &keys(&["x"]),
                Duration::from_millis(20),
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        // The stale release must not free the key now held by `second`.
        guard.release().await.unwrap();
        let err = kv
            .acquire_locks(
                &keys(&["x"]),
                Duration::from_millis(20),
                Duration::from_secs(5),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, KvError::LockUnavailable(_)));
        second.release().await.unwrap();
    }

    #[tokio::test]
    async fn markers_expire() {
        let kv = MemoryKv::new();
        kv.set_with_expiry("k", "v", Duration::from_millis(30))
            .await
            .unwrap();
        assert_eq!(kv.get("k").await.unwrap().as_deref(), Some("v"));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(kv.get("k").await.unwrap(), None);
    }
}
