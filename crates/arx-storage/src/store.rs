//! The Store trait that backends implement.

use std::collections::HashMap;

use crate::types::*;
use crate::StoreError;

/// Persistence contract of the replication worker.
///
/// Methods that perform several writes (`apply_replica_changes`,
/// `create_replication_approval`) are **internally transactional**: a backend
/// must scope each call in one transaction, so a failure leaves no partial
/// writes behind.
#[cfg_attr(feature = "test-support", mockall::automock)]
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────── Imports ────────────────────────────────

    /// Imports subscribed to `(env, path)` with `is_replication = true`.
    async fn find_replication_imports(
        &self,
        env: &EnvironmentId,
        path: &str,
    ) -> Result<Vec<SecretImport>, StoreError>;

    /// Write attempt bookkeeping onto an import row.
    async fn update_import_replication_status(
        &self,
        import_id: &SecretImportId,
        update: &ReplicationStatusUpdate,
    ) -> Result<(), StoreError>;

    // ─────────────────────────────── Versions ───────────────────────────────

    /// Latest version row per source secret in `folder_id`, restricted to
    /// `secret_ids`. Secrets with no version rows are absent from the result.
    async fn find_secret_versions(
        &self,
        folder_id: &FolderId,
        secret_ids: &[SecretId],
    ) -> Result<Vec<SecretVersion>, StoreError>;

    /// Latest version row per *local* secret, keyed by secret id.
    async fn find_latest_versions(
        &self,
        folder_id: &FolderId,
        secret_ids: &[SecretId],
    ) -> Result<HashMap<SecretId, SecretVersion>, StoreError>;

    /// Set `is_replicated = true` on the given version rows.
    async fn mark_versions_replicated(
        &self,
        version_ids: &[SecretVersionId],
    ) -> Result<(), StoreError>;

    // ─────────────────────────────── Folders ────────────────────────────────

    /// External-facing `(environment_slug, path)` of a folder, or `None` when
    /// the folder is gone.
    async fn resolve_folder_path(
        &self,
        project_id: &ProjectId,
        folder_id: &FolderId,
    ) -> Result<Option<FolderPath>, StoreError>;

    /// Reserved child folder of `parent_id` with the given name.
    async fn find_reserved_folder(
        &self,
        parent_id: &FolderId,
        name: &str,
    ) -> Result<Option<Folder>, StoreError>;

    /// Create a folder.
    async fn create_folder(&self, params: &CreateFolderParams) -> Result<Folder, StoreError>;

    // ─────────────────────────────── Secrets ────────────────────────────────

    /// Secrets in `folder_id` whose blind index is in `blind_indexes`
    /// (shared type only).
    async fn find_secrets_by_blind_indexes(
        &self,
        folder_id: &FolderId,
        blind_indexes: &[String],
    ) -> Result<Vec<Secret>, StoreError>;

    /// Apply a classified batch against a reserved folder in one transaction:
    /// bulk-insert creates (with initial versions and tag joins), bulk-update
    /// updates (field overwrite plus an appended version), and delete the
    /// listed replicated local secrets. Returns the `(id, version, operation)`
    /// triples of everything applied.
    async fn apply_replica_changes(
        &self,
        folder_id: &FolderId,
        batch: &ReplicaWriteBatch,
    ) -> Result<Vec<AppliedSecretChange>, StoreError>;

    // ─────────────────────────────── Approvals ──────────────────────────────

    /// Insert an open approval request with its secrets and tag joins in one
    /// transaction.
    async fn create_replication_approval(
        &self,
        params: &CreateApprovalRequestParams,
    ) -> Result<ApprovalRequestId, StoreError>;

    // ────────────────────────────── Memberships ─────────────────────────────

    /// Membership of `user_id` in `project_id`, if any.
    async fn find_project_membership(
        &self,
        project_id: &ProjectId,
        user_id: &UserId,
    ) -> Result<Option<ProjectMembership>, StoreError>;
}

/// Approval policy lookup. Replication only asks whether a policy binds the
/// destination; evaluating the policy is someone else's job.
#[cfg_attr(feature = "test-support", mockall::automock)]
#[async_trait::async_trait]
pub trait ApprovalPolicies: Send + Sync {
    /// Policy bound to `(project, environment_slug, secret_path)`, if any.
    async fn find_bound_policy(
        &self,
        project_id: &ProjectId,
        environment_slug: &str,
        secret_path: &str,
    ) -> Result<Option<ApprovalPolicy>, StoreError>;
}
