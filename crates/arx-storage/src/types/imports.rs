//! Secret import types.

use chrono::{DateTime, Utc};

use super::{EnvironmentId, FolderId, SecretImportId};

/// Secret import record. The destination is `folder_id`; the source is
/// `(import_env, import_path)`. Only imports with `is_replication = true`
/// are eligible for replication.
#[derive(Clone, Debug)]
pub struct SecretImport {
    pub id: SecretImportId,
    pub folder_id: FolderId,
    pub import_env: EnvironmentId,
    pub import_path: String,
    pub is_replication: bool,
    pub last_replicated: Option<DateTime<Utc>>,
    pub replication_status: Option<String>,
    pub is_replication_success: Option<bool>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Bookkeeping written to an import row after a replication attempt.
#[derive(Clone, Debug)]
pub struct ReplicationStatusUpdate {
    pub last_replicated: DateTime<Utc>,
    pub replication_status: Option<String>,
    pub is_replication_success: bool,
}

impl ReplicationStatusUpdate {
    /// Successful attempt: clears any previous failure status.
    pub fn success(at: DateTime<Utc>) -> Self {
        Self {
            last_replicated: at,
            replication_status: None,
            is_replication_success: true,
        }
    }

    /// Failed attempt; the status message is truncated to 500 chars.
    pub fn failure(at: DateTime<Utc>, message: &str) -> Self {
        Self {
            last_replicated: at,
            replication_status: Some(message.chars().take(500).collect()),
            is_replication_success: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_truncates_status_to_500_chars() {
        let long = "e".repeat(900);
        let update = ReplicationStatusUpdate::failure(Utc::now(), &long);
        assert_eq!(update.replication_status.unwrap().chars().count(), 500);
        assert!(!update.is_replication_success);
    }

    #[test]
    fn test_success_clears_status() {
        let update = ReplicationStatusUpdate::success(Utc::now());
        assert!(update.replication_status.is_none());
        assert!(update.is_replication_success);
    }
}
