//! The replication worker: consumes jobs from the `secret-replication`
//! queue and produces the replication effects.
//!
//! Per job: discover subscribed imports, re-read the source versions,
//! filter for eligibility, lock the replicated set, run the per-import
//! protocol sequentially, mark the source versions replicated, release the
//! locks. Parallelism across imports comes from the queue running distinct
//! jobs concurrently; cross-job safety comes from the per-secret locks.

use std::collections::HashMap;
use std::sync::Arc;

use arx_kv::KeyValueStore;
use arx_queue::{Actor, JobSource, QueueService, ReplicationJob, SecretChange};
use arx_storage::{
    reserved_folder_name, ApprovalPolicies, CreateFolderParams, ReplicationStatusUpdate, Secret,
    SecretId, SecretImport, SecretVersion, SecretVersionId, Store,
};
use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::classify::{classify, is_eligible};
use crate::error::ReplicationError;
use crate::keys::{replication_lock_key, replication_success_key, LOCK_TTL, LOCK_WAIT, SUCCESS_TTL};
use crate::writer::{ApprovalReplicaWriter, DirectReplicaWriter, ImportContext, ReplicaWriter};

/// Orchestrator of the secret replication queue.
pub struct SecretReplicationWorker {
    store: Arc<dyn Store>,
    policies: Arc<dyn ApprovalPolicies>,
    kv: Arc<dyn KeyValueStore>,
    queue: Arc<dyn QueueService>,
}

impl SecretReplicationWorker {
    pub fn new(
        store: Arc<dyn Store>,
        policies: Arc<dyn ApprovalPolicies>,
        kv: Arc<dyn KeyValueStore>,
        queue: Arc<dyn QueueService>,
    ) -> Self {
        Self {
            store,
            policies,
            kv,
            queue,
        }
    }

    /// Consume jobs until the queue closes. Failed jobs are logged with
    /// their payload; the queue's retry policy governs re-delivery.
    pub async fn run(&self, mut jobs: impl JobSource) {
        info!("secret replication worker started");
        while let Some(job) = jobs.next_job().await {
            if let Err(error) = self.process(&job).await {
                error!(job = ?job, %error, "secret replication job failed");
            }
        }
        info!("secret replication queue closed, worker stopping");
    }

    /// Run one replication job to completion.
    pub async fn process(&self, job: &ReplicationJob) -> Result<(), ReplicationError> {
        if job.secrets.is_empty() {
            debug!(job_id = %job.job_id, "job carries no secrets");
            return Ok(());
        }

        let mut imports = self
            .store
            .find_replication_imports(&job.environment_id, &job.secret_path)
            .await?;
        if let Some(pick) = &job.pick_only_import_ids {
            imports.retain(|import| pick.contains(&import.id));
        }
        if imports.is_empty() {
            debug!(job_id = %job.job_id, "no replicated imports subscribe to this source");
            return Ok(());
        }

        // Re-read the source: earlier queued jobs may already have advanced
        // it, and the queue may coalesce duplicates.
        let secret_ids: Vec<SecretId> = job.secrets.iter().map(|change| change.id).collect();
        let versions = self
            .store
            .find_secret_versions(&job.folder_id, &secret_ids)
            .await?;
        let replicated: Vec<SecretVersion> =
            versions.into_iter().filter(is_eligible).collect();
        let sources: HashMap<SecretId, SecretVersion> = replicated
            .iter()
            .map(|version| (version.secret_id, version.clone()))
            .collect();

        // Entries without an eligible source drop out here; this is what
        // excludes personal secrets and superseded versions.
        let changes: Vec<SecretChange> = job
            .secrets
            .iter()
            .filter(|change| sources.contains_key(&change.id))
            .cloned()
            .collect();
        if changes.is_empty() {
            debug!(job_id = %job.job_id, "no eligible source versions");
            return Ok(());
        }

        let lock_keys: Vec<String> = replicated
            .iter()
            .map(|version| replication_lock_key(&version.secret_id))
            .collect();
        let lock = self.kv.acquire_locks(&lock_keys, LOCK_WAIT, LOCK_TTL).await?;

        let outcome: Result<(), ReplicationError> = async {
            self.replicate_to_imports(job, &imports, &changes, &sources)
                .await?;
            let version_ids: Vec<SecretVersionId> =
                replicated.iter().map(|version| version.id).collect();
            self.store.mark_versions_replicated(&version_ids).await?;
            Ok(())
        }
        .await;

        if let Err(release_error) = lock.release().await {
            warn!(%release_error, "failed to release replication locks");
        }
        outcome?;

        info!(
            job_id = %job.job_id,
            imports = imports.len(),
            secrets = changes.len(),
            "secret replication completed"
        );
        Ok(())
    }

    /// Sequential per-import loop. Individual failures are recorded on the
    /// import row and do not abort the job; a missing membership does.
    async fn replicate_to_imports(
        &self,
        job: &ReplicationJob,
        imports: &[SecretImport],
        changes: &[SecretChange],
        sources: &HashMap<SecretId, SecretVersion>,
    ) -> Result<(), ReplicationError> {
        for import in imports {
            match self.replicate_import(job, import, changes, sources).await {
                Ok(()) => {}
                Err(ReplicationError::MembershipMissing(user_id)) => {
                    error!(
                        import_id = %import.id,
                        user_id = %user_id,
                        "actor has no project membership, aborting job"
                    );
                    return Err(ReplicationError::MembershipMissing(user_id));
                }
                Err(import_error) => {
                    warn!(
                        import_id = %import.id,
                        error = %import_error,
                        "replication failed for import"
                    );
                    let update =
                        ReplicationStatusUpdate::failure(Utc::now(), &import_error.to_string());
                    if let Err(record_error) = self
                        .store
                        .update_import_replication_status(&import.id, &update)
                        .await
                    {
                        error!(
                            import_id = %import.id,
                            error = %record_error,
                            "failed to record replication failure"
                        );
                    }
                }
            }
        }
        Ok(())
    }

    /// The per-import protocol: idempotency check, path resolution, reserved
    /// folder materialization, local-state read, classification, routed
    /// write, success marker.
    async fn replicate_import(
        &self,
        job: &ReplicationJob,
        import: &SecretImport,
        changes: &[SecretChange],
        sources: &HashMap<SecretId, SecretVersion>,
    ) -> Result<(), ReplicationError> {
        let success_key = replication_success_key(&job.job_id, &import.id);
        if self.kv.get(&success_key).await?.is_some() {
            debug!(
                job_id = %job.job_id,
                import_id = %import.id,
                "import already replicated for this job"
            );
            return Ok(());
        }

        let destination = self
            .store
            .resolve_folder_path(&job.project_id, &import.folder_id)
            .await?
            .ok_or(ReplicationError::ImportedFolderMissing(import.id))?;

        let folder_name = reserved_folder_name(&import.id);
        let replica_folder = match self
            .store
            .find_reserved_folder(&import.folder_id, &folder_name)
            .await?
        {
            Some(folder) => folder,
            None => {
                self.store
                    .create_folder(&CreateFolderParams {
                        env_id: destination.env_id,
                        parent_id: Some(import.folder_id),
                        name: folder_name,
                        is_reserved: true,
                    })
                    .await?
            }
        };

        let blind_indexes: Vec<String> = sources
            .values()
            .filter_map(|version| version.blind_index.clone())
            .collect();
        let locals = self
            .store
            .find_secrets_by_blind_indexes(&replica_folder.id, &blind_indexes)
            .await?;
        let local_by_blind_index: HashMap<String, Secret> = locals
            .into_iter()
            .filter_map(|secret| secret.blind_index.clone().map(|bi| (bi, secret)))
            .collect();

        let ops = classify(changes, sources, &local_by_blind_index);

        let policy = self
            .policies
            .find_bound_policy(
                &job.project_id,
                &destination.environment_slug,
                &destination.path,
            )
            .await?;

        let writer: Box<dyn ReplicaWriter> = match policy {
            Some(policy) if job.actor == Actor::User => {
                let membership = self
                    .store
                    .find_project_membership(&job.project_id, &job.actor_id)
                    .await?
                    .ok_or(ReplicationError::MembershipMissing(job.actor_id))?;
                Box::new(ApprovalReplicaWriter::new(
                    Arc::clone(&self.store),
                    policy,
                    membership,
                ))
            }
            _ => Box::new(DirectReplicaWriter::new(
                Arc::clone(&self.store),
                Arc::clone(&self.queue),
            )),
        };

        let ctx = ImportContext {
            job,
            import,
            destination: &destination,
            replica_folder: &replica_folder,
        };
        writer.record(&ctx, &ops).await?;

        self.kv
            .set_with_expiry(&success_key, "1", SUCCESS_TTL)
            .await?;
        self.store
            .update_import_replication_status(&import.id, &ReplicationStatusUpdate::success(Utc::now()))
            .await?;
        Ok(())
    }
}
