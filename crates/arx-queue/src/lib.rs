//! Queue payloads and the queue service trait.
//!
//! Two queues surround the replication worker:
//! - `secret-replication` (inbound): delivers [`ReplicationJob`]s. Delivery
//!   is at-least-once; acks are implicit on handler completion.
//! - `sync-secrets` (outbound): receives one [`SyncRequest`] per folder that
//!   just materialized changes, so further propagation and external
//!   integration syncing can run. Dedup hint sets ride along to prevent
//!   queue storms when many imports fan out.

use std::collections::HashSet;

use arx_storage::{
    AppliedSecretChange, EnvironmentId, FolderId, ProjectId, SecretId, SecretImportId,
    SecretOperation, UserId,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue closed")]
    Closed,
    #[error("backend error: {0}")]
    Backend(String),
}

/// Kind of actor that triggered a change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    User,
    Service,
    Identity,
    Platform,
}

/// One changed source secret referenced by a replication job.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SecretChange {
    pub id: SecretId,
    pub operation: SecretOperation,
}

/// Payload of the `secret-replication` queue.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReplicationJob {
    pub job_id: String,
    pub secrets: Vec<SecretChange>,
    /// Source folder the changes happened in.
    pub folder_id: FolderId,
    pub secret_path: String,
    pub environment_id: EnvironmentId,
    pub project_id: ProjectId,
    pub actor: Actor,
    pub actor_id: UserId,
    /// When present, only these imports are considered.
    #[serde(default)]
    pub pick_only_import_ids: Option<Vec<SecretImportId>>,
    /// Dedup hints carried across the replication fan-out.
    #[serde(default)]
    pub de_dupe_replication_queue: HashSet<String>,
    #[serde(default)]
    pub de_dupe_queue: HashSet<String>,
}

/// Payload of the `sync-secrets` queue: a folder that just received secret
/// changes, with the applied `(id, version, operation)` triples.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncRequest {
    pub project_id: ProjectId,
    pub secret_path: String,
    pub environment_slug: String,
    pub environment_id: EnvironmentId,
    pub folder_id: FolderId,
    pub secrets: Vec<AppliedSecretChange>,
    pub actor: Actor,
    pub actor_id: UserId,
    #[serde(default)]
    pub de_dupe_replication_queue: HashSet<String>,
    #[serde(default)]
    pub de_dupe_queue: HashSet<String>,
}

impl SyncRequest {
    /// Dedup key of this request within the `sync-secrets` queue.
    pub fn de_dupe_key(&self) -> String {
        format!("sync:{}:{}", self.environment_id.0, self.folder_id.0)
    }
}

/// Delivery side of the `secret-replication` queue, consumed by the worker
/// host's run loop. Returns `None` once the queue is closed.
#[async_trait]
pub trait JobSource: Send {
    async fn next_job(&mut self) -> Option<ReplicationJob>;
}

/// Queue runtime surface: enqueue and cancellation. Backends deliver queued
/// replication jobs to the worker host out of band (the memory backend hands
/// out a channel receiver).
#[async_trait]
pub trait QueueService: Send + Sync {
    /// Enqueue a replication job.
    async fn enqueue_replication(&self, job: ReplicationJob) -> Result<(), QueueError>;

    /// Enqueue a downstream sync for a folder that received changes.
    /// Backends honor the request's dedup hints.
    async fn enqueue_secret_sync(&self, request: SyncRequest) -> Result<(), QueueError>;

    /// Cancel a queued replication job by id. Cancelling an unknown or
    /// already-delivered job is a no-op.
    async fn cancel_replication(&self, job_id: &str) -> Result<(), QueueError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_replication_job_roundtrip() {
        let job = ReplicationJob {
            job_id: "job-1".to_string(),
            secrets: vec![SecretChange {
                id: SecretId(Uuid::now_v7()),
                operation: SecretOperation::Create,
            }],
            folder_id: FolderId(Uuid::now_v7()),
            secret_path: "/app".to_string(),
            environment_id: EnvironmentId(Uuid::now_v7()),
            project_id: ProjectId(Uuid::now_v7()),
            actor: Actor::User,
            actor_id: UserId(Uuid::now_v7()),
            pick_only_import_ids: None,
            de_dupe_replication_queue: HashSet::new(),
            de_dupe_queue: HashSet::new(),
        };

        let json = serde_json::to_string(&job).unwrap();
        let back: ReplicationJob = serde_json::from_str(&json).unwrap();
        assert_eq!(back.job_id, "job-1");
        assert_eq!(back.secrets.len(), 1);
        assert_eq!(back.actor, Actor::User);
    }

    #[test]
    fn test_optional_fields_default_when_absent() {
        let json = r#"{
            "job_id": "job-2",
            "secrets": [],
            "folder_id": "018f4e9a-1111-7000-8000-000000000001",
            "secret_path": "/",
            "environment_id": "018f4e9a-1111-7000-8000-000000000002",
            "project_id": "018f4e9a-1111-7000-8000-000000000003",
            "actor": "platform",
            "actor_id": "018f4e9a-1111-7000-8000-000000000004"
        }"#;
        let job: ReplicationJob = serde_json::from_str(json).unwrap();
        assert!(job.pick_only_import_ids.is_none());
        assert!(job.de_dupe_queue.is_empty());
    }

    #[test]
    fn test_sync_request_de_dupe_key_is_stable() {
        let env = EnvironmentId(Uuid::now_v7());
        let folder = FolderId(Uuid::now_v7());
        let request = SyncRequest {
            project_id: ProjectId(Uuid::now_v7()),
            secret_path: "/app".to_string(),
            environment_slug: "prod".to_string(),
            environment_id: env,
            folder_id: folder,
            secrets: vec![],
            actor: Actor::Platform,
            actor_id: UserId(Uuid::now_v7()),
            de_dupe_replication_queue: HashSet::new(),
            de_dupe_queue: HashSet::new(),
        };
        assert_eq!(request.de_dupe_key(), format!("sync:{}:{}", env.0, folder.0));
    }
}
