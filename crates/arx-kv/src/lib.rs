//! Key-value store abstraction for arx.
//!
//! This crate defines the `KeyValueStore` trait covering the two capabilities
//! replication needs from a shared, process-external store:
//! - an all-or-nothing mutex over a *set* of keys with an acquisition timeout
//!   and a hold TTL, and
//! - set-with-expiry / get for idempotency markers readable across workers.
//!
//! Implementations:
//! - Memory (single process, arx-kv-memory)
//! - Redis (multi-process, arx-kv-redis)

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Error type for key-value store operations.
#[derive(Debug, Error)]
pub enum KvError {
    #[error("lock unavailable: {0}")]
    LockUnavailable(String),
    #[error("backend error: {0}")]
    Backend(String),
}

/// Backend-held side of an acquired lock.
///
/// `release` frees the keys; `abandon` is the synchronous cleanup path used
/// when a [`LockGuard`] is dropped without an explicit release (panic or
/// cancellation unwind).
#[async_trait]
pub trait LockLease: Send {
    async fn release(&mut self) -> Result<(), KvError>;
    fn abandon(&mut self);
}

/// A held multi-key lock.
///
/// Callers release explicitly with [`LockGuard::release`]; dropping the guard
/// without releasing triggers the lease's `abandon` path, so the keys are
/// freed on every exit path (the backend TTL is the last resort).
pub struct LockGuard {
    lease: Option<Box<dyn LockLease>>,
}

impl LockGuard {
    pub fn new(lease: Box<dyn LockLease>) -> Self {
        Self { lease: Some(lease) }
    }

    /// Release the held keys.
    pub async fn release(mut self) -> Result<(), KvError> {
        match self.lease.take() {
            Some(mut lease) => lease.release().await,
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard").finish_non_exhaustive()
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(mut lease) = self.lease.take() {
            lease.abandon();
        }
    }
}

/// Shared key-value store: multi-key mutex plus expiring markers.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Acquire a lock over *all* of `keys` or none of them.
    ///
    /// Contending acquirers wait up to `wait`; on timeout the call fails with
    /// [`KvError::LockUnavailable`]. Acquired keys expire after `ttl` if the
    /// holder never releases them.
    async fn acquire_locks(
        &self,
        keys: &[String],
        wait: Duration,
        ttl: Duration,
    ) -> Result<LockGuard, KvError>;

    /// Set `key` to `value`, expiring after `ttl`.
    async fn set_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), KvError>;

    /// Current value of `key`, or `None` when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;
}
