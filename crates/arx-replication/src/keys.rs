//! Key-value namespace and timing constants of the replication worker.
//!
//! Two key families live under the `secret-replication` namespace: per-secret
//! lock keys and per-`(job, import)` success markers. No other consumer
//! writes to this namespace.

use std::time::Duration;

use arx_storage::{SecretId, SecretImportId};

const NAMESPACE: &str = "secret-replication";

/// Hold TTL of the per-secret replication locks.
pub const LOCK_TTL: Duration = Duration::from_secs(5);

/// How long a contending job waits for the lock set before failing.
pub const LOCK_WAIT: Duration = Duration::from_secs(10);

/// TTL of the per-import success marker. Deliberately short: it only has to
/// span the window between marker write and the queue's ack, so a redelivery
/// of the same job skips already-completed imports.
pub const SUCCESS_TTL: Duration = Duration::from_secs(10);

/// Lock key serializing replication episodes of one source secret.
pub fn replication_lock_key(secret_id: &SecretId) -> String {
    format!("{NAMESPACE}:lock:{secret_id}")
}

/// Idempotency marker for one import within one job.
pub fn replication_success_key(job_id: &str, import_id: &SecretImportId) -> String {
    format!("{NAMESPACE}:success:{job_id}:{import_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_lock_key_shape() {
        let id = SecretId(Uuid::now_v7());
        assert_eq!(
            replication_lock_key(&id),
            format!("secret-replication:lock:{}", id.0)
        );
    }

    #[test]
    fn test_success_key_distinct_per_import() {
        let a = SecretImportId(Uuid::now_v7());
        let b = SecretImportId(Uuid::now_v7());
        assert_ne!(
            replication_success_key("job", &a),
            replication_success_key("job", &b)
        );
    }
}
