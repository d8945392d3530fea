//! The two terminal routes of the per-import protocol.
//!
//! Both routes record a classified diff against the destination's reserved
//! folder; they differ in effect. The direct route writes the replica
//! transactionally and enqueues the downstream sync. The approval route
//! files an open approval request carrying the diff and enqueues nothing:
//! syncing waits until the request is merged by an external workflow.

use std::collections::HashMap;
use std::sync::Arc;

use arx_queue::{QueueService, SyncRequest};
use arx_storage::{
    ApprovalPolicy, ApprovalSecretParams, CreateApprovalRequestParams, Folder, FolderPath,
    ProjectMembership, ReplicaSecretUpdate, ReplicaSecretWrite, ReplicaWriteBatch, SecretId,
    SecretImport, SecretOperation, Store,
};
use async_trait::async_trait;
use rand::Rng;
use tracing::debug;

use crate::classify::ClassifiedOp;
use crate::error::ReplicationError;
use crate::ReplicationJob;

/// Everything a writer needs to know about the import being replicated.
pub struct ImportContext<'a> {
    pub job: &'a ReplicationJob,
    pub import: &'a SecretImport,
    /// External-facing location of the import's destination folder.
    pub destination: &'a FolderPath,
    /// Reserved child folder the replica lives in.
    pub replica_folder: &'a Folder,
}

/// Records a classified diff against a destination.
#[async_trait]
pub trait ReplicaWriter: Send + Sync {
    async fn record(
        &self,
        ctx: &ImportContext<'_>,
        ops: &[ClassifiedOp],
    ) -> Result<(), ReplicationError>;
}

/// Direct route: transactional replica write, then one downstream sync
/// enqueue with the job's dedup hints passed through verbatim.
pub struct DirectReplicaWriter {
    store: Arc<dyn Store>,
    queue: Arc<dyn QueueService>,
}

impl DirectReplicaWriter {
    pub fn new(store: Arc<dyn Store>, queue: Arc<dyn QueueService>) -> Self {
        Self { store, queue }
    }
}

#[async_trait]
impl ReplicaWriter for DirectReplicaWriter {
    async fn record(
        &self,
        ctx: &ImportContext<'_>,
        ops: &[ClassifiedOp],
    ) -> Result<(), ReplicationError> {
        let mut batch = ReplicaWriteBatch::default();
        for op in ops {
            match (op.operation, &op.local) {
                (SecretOperation::Create, _) => {
                    batch.creates.push(ReplicaSecretWrite::from(&op.source));
                }
                (SecretOperation::Update, Some(local)) => {
                    batch.updates.push(ReplicaSecretUpdate {
                        local_id: local.id,
                        doc: ReplicaSecretWrite::from(&op.source),
                    });
                }
                (SecretOperation::Delete, Some(local)) => {
                    batch.deletes.push(local.id);
                }
                _ => {}
            }
        }

        let applied = self
            .store
            .apply_replica_changes(&ctx.replica_folder.id, &batch)
            .await?;
        debug!(
            import_id = %ctx.import.id,
            applied = applied.len(),
            "replica changes committed"
        );

        self.queue
            .enqueue_secret_sync(SyncRequest {
                project_id: ctx.job.project_id,
                secret_path: ctx.destination.path.clone(),
                environment_slug: ctx.destination.environment_slug.clone(),
                environment_id: ctx.replica_folder.env_id,
                folder_id: ctx.replica_folder.id,
                secrets: applied,
                actor: ctx.job.actor,
                actor_id: ctx.job.actor_id,
                de_dupe_replication_queue: ctx.job.de_dupe_replication_queue.clone(),
                de_dupe_queue: ctx.job.de_dupe_queue.clone(),
            })
            .await?;
        Ok(())
    }
}

/// Approval route: one open approval request carrying the diff, committed
/// under the actor's project membership.
pub struct ApprovalReplicaWriter {
    store: Arc<dyn Store>,
    policy: ApprovalPolicy,
    membership: ProjectMembership,
}

impl ApprovalReplicaWriter {
    pub fn new(store: Arc<dyn Store>, policy: ApprovalPolicy, membership: ProjectMembership) -> Self {
        Self {
            store,
            policy,
            membership,
        }
    }
}

#[async_trait]
impl ReplicaWriter for ApprovalReplicaWriter {
    async fn record(
        &self,
        ctx: &ImportContext<'_>,
        ops: &[ClassifiedOp],
    ) -> Result<(), ReplicationError> {
        // Updates and deletes reference the latest local version at request
        // time; one batched read keyed by local secret ids.
        let local_ids: Vec<SecretId> = ops
            .iter()
            .filter(|op| op.operation != SecretOperation::Create)
            .filter_map(|op| op.local.as_ref().map(|local| local.id))
            .collect();
        let latest_versions = self
            .store
            .find_latest_versions(&ctx.replica_folder.id, &local_ids)
            .await?;

        let secrets = ops
            .iter()
            .map(|op| approval_secret(op, &latest_versions))
            .collect();

        let request_id = self
            .store
            .create_replication_approval(&CreateApprovalRequestParams {
                folder_id: ctx.replica_folder.id,
                slug: new_approval_slug(),
                policy_id: self.policy.id,
                committer_id: self.membership.id,
                secrets,
            })
            .await?;
        debug!(
            import_id = %ctx.import.id,
            request_id = ?request_id,
            ops = ops.len(),
            "approval request filed for replicated changes"
        );
        Ok(())
    }
}

fn approval_secret(
    op: &ClassifiedOp,
    latest_versions: &HashMap<SecretId, arx_storage::SecretVersion>,
) -> ApprovalSecretParams {
    let local_id = match op.operation {
        SecretOperation::Create => None,
        _ => op.local.as_ref().map(|local| local.id),
    };
    ApprovalSecretParams {
        operation: op.operation,
        secret_id: local_id,
        secret_version_id: local_id
            .and_then(|id| latest_versions.get(&id))
            .map(|version| version.id),
        doc: ReplicaSecretWrite::from(&op.source),
    }
}

/// Fresh alphanumeric slug for an approval request.
fn new_approval_slug() -> String {
    rand::rng()
        .sample_iter(&rand::distr::Alphanumeric)
        .take(21)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug_is_alphanumeric() {
        let slug = new_approval_slug();
        assert_eq!(slug.len(), 21);
        assert!(slug.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_slugs_are_unique_enough() {
        assert_ne!(new_approval_slug(), new_approval_slug());
    }
}
