//! In-memory storage backend.
//!
//! This implementation is suitable for:
//! - Tests (the backend the replication integration tests run against)
//! - Development without a database
//!
//! Every trait method takes the single state mutex once, so composite writes
//! are atomic the same way the Postgres backend scopes them in one
//! transaction. Seeding and inspection helpers are inherent methods; the
//! replication worker itself only sees the `Store` / `ApprovalPolicies`
//! traits.

use std::collections::HashMap;
use std::sync::Mutex;

use arx_storage::{
    ApprovalPolicies, ApprovalPolicy, ApprovalRequest, ApprovalRequestId, ApprovalRequestSecret,
    ApprovalStatus, AppliedSecretChange, CreateApprovalRequestParams, CreateFolderParams,
    Environment, EnvironmentId, Folder, FolderId, FolderPath, ProjectId, ProjectMembership,
    ReplicaWriteBatch, ReplicationStatusUpdate, Secret, SecretId, SecretImport, SecretImportId,
    SecretOperation, SecretTagId, SecretType, SecretVersion, SecretVersionId, Store, StoreError,
    UserId,
};
use chrono::Utc;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    environments: HashMap<EnvironmentId, Environment>,
    folders: HashMap<FolderId, Folder>,
    secrets: HashMap<SecretId, Secret>,
    secret_tags: HashMap<SecretId, Vec<SecretTagId>>,
    versions: Vec<SecretVersion>,
    imports: HashMap<SecretImportId, SecretImport>,
    approvals: Vec<ApprovalRequest>,
    approval_secrets: Vec<ApprovalRequestSecret>,
    memberships: Vec<ProjectMembership>,
    policies: Vec<ApprovalPolicy>,
}

impl Inner {
    fn latest_version(&self, folder_id: &FolderId, secret_id: &SecretId) -> Option<&SecretVersion> {
        self.versions
            .iter()
            .filter(|v| v.folder_id == *folder_id && v.secret_id == *secret_id)
            .max_by_key(|v| (v.version, v.created_at))
    }
}

/// In-memory store.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ─────────────────────────── Seeding helpers ────────────────────────────

    pub fn insert_environment(&self, environment: Environment) {
        let mut inner = self.inner.lock().expect("store poisoned");
        inner.environments.insert(environment.id, environment);
    }

    pub fn insert_folder(&self, folder: Folder) {
        let mut inner = self.inner.lock().expect("store poisoned");
        inner.folders.insert(folder.id, folder);
    }

    pub fn insert_secret(&self, secret: Secret) {
        let mut inner = self.inner.lock().expect("store poisoned");
        inner.secrets.insert(secret.id, secret);
    }

    pub fn insert_version(&self, version: SecretVersion) {
        let mut inner = self.inner.lock().expect("store poisoned");
        inner.versions.push(version);
    }

    pub fn insert_import(&self, import: SecretImport) {
        let mut inner = self.inner.lock().expect("store poisoned");
        inner.imports.insert(import.id, import);
    }

    pub fn insert_membership(&self, membership: ProjectMembership) {
        let mut inner = self.inner.lock().expect("store poisoned");
        inner.memberships.push(membership);
    }

    pub fn insert_policy(&self, policy: ApprovalPolicy) {
        let mut inner = self.inner.lock().expect("store poisoned");
        inner.policies.push(policy);
    }

    // ────────────────────────── Inspection helpers ──────────────────────────

    pub fn secrets_in_folder(&self, folder_id: &FolderId) -> Vec<Secret> {
        let inner = self.inner.lock().expect("store poisoned");
        inner
            .secrets
            .values()
            .filter(|s| s.folder_id == *folder_id)
            .cloned()
            .collect()
    }

    pub fn folders_under(&self, parent_id: &FolderId) -> Vec<Folder> {
        let inner = self.inner.lock().expect("store poisoned");
        inner
            .folders
            .values()
            .filter(|f| f.parent_id == Some(*parent_id))
            .cloned()
            .collect()
    }

    pub fn import(&self, import_id: &SecretImportId) -> Option<SecretImport> {
        let inner = self.inner.lock().expect("store poisoned");
        inner.imports.get(import_id).cloned()
    }

    pub fn approval_requests(&self) -> Vec<ApprovalRequest> {
        let inner = self.inner.lock().expect("store poisoned");
        inner.approvals.clone()
    }

    pub fn approval_secrets(&self, request_id: &ApprovalRequestId) -> Vec<ApprovalRequestSecret> {
        let inner = self.inner.lock().expect("store poisoned");
        inner
            .approval_secrets
            .iter()
            .filter(|s| s.request_id == *request_id)
            .cloned()
            .collect()
    }

    pub fn version_rows(&self, secret_id: &SecretId) -> Vec<SecretVersion> {
        let inner = self.inner.lock().expect("store poisoned");
        inner
            .versions
            .iter()
            .filter(|v| v.secret_id == *secret_id)
            .cloned()
            .collect()
    }

    pub fn tags_of(&self, secret_id: &SecretId) -> Vec<SecretTagId> {
        let inner = self.inner.lock().expect("store poisoned");
        inner.secret_tags.get(secret_id).cloned().unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn find_replication_imports(
        &self,
        env: &EnvironmentId,
        path: &str,
    ) -> Result<Vec<SecretImport>, StoreError> {
        let inner = self.inner.lock().expect("store poisoned");
        let mut imports: Vec<SecretImport> = inner
            .imports
            .values()
            .filter(|i| i.is_replication && i.import_env == *env && i.import_path == path)
            .cloned()
            .collect();
        imports.sort_by_key(|i| i.created_at);
        Ok(imports)
    }

    async fn update_import_replication_status(
        &self,
        import_id: &SecretImportId,
        update: &ReplicationStatusUpdate,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("store poisoned");
        let import = inner
            .imports
            .get_mut(import_id)
            .ok_or(StoreError::NotFound)?;
        import.last_replicated = Some(update.last_replicated);
        import.replication_status = update.replication_status.clone();
        import.is_replication_success = Some(update.is_replication_success);
        import.updated_at = Utc::now();
        Ok(())
    }

    async fn find_secret_versions(
        &self,
        folder_id: &FolderId,
        secret_ids: &[SecretId],
    ) -> Result<Vec<SecretVersion>, StoreError> {
        let inner = self.inner.lock().expect("store poisoned");
        Ok(secret_ids
            .iter()
            .filter_map(|id| inner.latest_version(folder_id, id).cloned())
            .collect())
    }

    async fn find_latest_versions(
        &self,
        folder_id: &FolderId,
        secret_ids: &[SecretId],
    ) -> Result<HashMap<SecretId, SecretVersion>, StoreError> {
        let inner = self.inner.lock().expect("store poisoned");
        Ok(secret_ids
            .iter()
            .filter_map(|id| inner.latest_version(folder_id, id).map(|v| (*id, v.clone())))
            .collect())
    }

    async fn mark_versions_replicated(
        &self,
        version_ids: &[SecretVersionId],
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("store poisoned");
        for version in inner.versions.iter_mut() {
            if version_ids.contains(&version.id) {
                version.is_replicated = true;
            }
        }
        Ok(())
    }

    async fn resolve_folder_path(
        &self,
        project_id: &ProjectId,
        folder_id: &FolderId,
    ) -> Result<Option<FolderPath>, StoreError> {
        let inner = self.inner.lock().expect("store poisoned");
        let Some(folder) = inner.folders.get(folder_id) else {
            return Ok(None);
        };
        let Some(environment) = inner.environments.get(&folder.env_id) else {
            return Ok(None);
        };
        if environment.project_id != *project_id {
            return Ok(None);
        }

        // Walk to the environment root; the root folder itself contributes
        // no path segment.
        let mut segments = Vec::new();
        let mut current = folder;
        while let Some(parent_id) = current.parent_id {
            segments.push(current.name.clone());
            current = match inner.folders.get(&parent_id) {
                Some(parent) => parent,
                None => return Ok(None),
            };
        }
        segments.reverse();
        let path = if segments.is_empty() {
            "/".to_string()
        } else {
            format!("/{}", segments.join("/"))
        };

        Ok(Some(FolderPath {
            env_id: folder.env_id,
            environment_slug: environment.slug.clone(),
            path,
        }))
    }

    async fn find_reserved_folder(
        &self,
        parent_id: &FolderId,
        name: &str,
    ) -> Result<Option<Folder>, StoreError> {
        let inner = self.inner.lock().expect("store poisoned");
        Ok(inner
            .folders
            .values()
            .find(|f| f.is_reserved && f.parent_id == Some(*parent_id) && f.name == name)
            .cloned())
    }

    async fn create_folder(&self, params: &CreateFolderParams) -> Result<Folder, StoreError> {
        let mut inner = self.inner.lock().expect("store poisoned");
        if params.is_reserved
            && inner.folders.values().any(|f| {
                f.is_reserved && f.parent_id == params.parent_id && f.name == params.name
            })
        {
            return Err(StoreError::AlreadyExists);
        }
        let now = Utc::now();
        let folder = Folder {
            id: FolderId(Uuid::now_v7()),
            env_id: params.env_id,
            parent_id: params.parent_id,
            name: params.name.clone(),
            is_reserved: params.is_reserved,
            created_at: now,
            updated_at: now,
        };
        inner.folders.insert(folder.id, folder.clone());
        Ok(folder)
    }

    async fn find_secrets_by_blind_indexes(
        &self,
        folder_id: &FolderId,
        blind_indexes: &[String],
    ) -> Result<Vec<Secret>, StoreError> {
        let inner = self.inner.lock().expect("store poisoned");
        Ok(inner
            .secrets
            .values()
            .filter(|s| {
                s.folder_id == *folder_id
                    && s.secret_type == SecretType::Shared
                    && s.blind_index
                        .as_ref()
                        .is_some_and(|bi| blind_indexes.contains(bi))
            })
            .cloned()
            .collect())
    }

    async fn apply_replica_changes(
        &self,
        folder_id: &FolderId,
        batch: &ReplicaWriteBatch,
    ) -> Result<Vec<AppliedSecretChange>, StoreError> {
        let mut inner = self.inner.lock().expect("store poisoned");

        // Validate before mutating so a failure leaves no partial writes.
        for update in &batch.updates {
            let local = inner.secrets.get(&update.local_id);
            if !local.is_some_and(|s| s.folder_id == *folder_id) {
                return Err(StoreError::NotFound);
            }
        }

        let now = Utc::now();
        let mut applied = Vec::new();

        for doc in &batch.creates {
            let secret = Secret {
                id: SecretId(Uuid::now_v7()),
                folder_id: *folder_id,
                blind_index: doc.blind_index.clone(),
                secret_type: doc.secret_type,
                version: 1,
                is_replicated: true,
                key: doc.key.clone(),
                value: doc.value.clone(),
                comment: doc.comment.clone(),
                metadata: doc.metadata.clone(),
                key_encoding: doc.key_encoding,
                algorithm: doc.algorithm,
                skip_multiline_encoding: doc.skip_multiline_encoding,
                created_at: now,
                updated_at: now,
            };
            inner.versions.push(SecretVersion {
                id: SecretVersionId(Uuid::now_v7()),
                secret_id: secret.id,
                folder_id: *folder_id,
                version: 1,
                latest_replicated_version: 0,
                is_replicated: false,
                blind_index: doc.blind_index.clone(),
                secret_type: doc.secret_type,
                key: doc.key.clone(),
                value: doc.value.clone(),
                comment: doc.comment.clone(),
                metadata: doc.metadata.clone(),
                key_encoding: doc.key_encoding,
                algorithm: doc.algorithm,
                skip_multiline_encoding: doc.skip_multiline_encoding,
                tag_ids: doc.tag_ids.clone(),
                created_at: now,
            });
            inner.secret_tags.insert(secret.id, doc.tag_ids.clone());
            applied.push(AppliedSecretChange {
                id: secret.id,
                version: 1,
                operation: SecretOperation::Create,
            });
            inner.secrets.insert(secret.id, secret);
        }

        for update in &batch.updates {
            let doc = &update.doc;
            let new_version;
            {
                let secret = inner
                    .secrets
                    .get_mut(&update.local_id)
                    .ok_or(StoreError::NotFound)?;
                secret.blind_index = doc.blind_index.clone();
                secret.key = doc.key.clone();
                secret.value = doc.value.clone();
                secret.comment = doc.comment.clone();
                secret.metadata = doc.metadata.clone();
                secret.key_encoding = doc.key_encoding;
                secret.algorithm = doc.algorithm;
                secret.skip_multiline_encoding = doc.skip_multiline_encoding;
                secret.version += 1;
                secret.updated_at = now;
                new_version = secret.version;
            }
            inner.versions.push(SecretVersion {
                id: SecretVersionId(Uuid::now_v7()),
                secret_id: update.local_id,
                folder_id: *folder_id,
                version: new_version,
                latest_replicated_version: 0,
                is_replicated: false,
                blind_index: doc.blind_index.clone(),
                secret_type: doc.secret_type,
                key: doc.key.clone(),
                value: doc.value.clone(),
                comment: doc.comment.clone(),
                metadata: doc.metadata.clone(),
                key_encoding: doc.key_encoding,
                algorithm: doc.algorithm,
                skip_multiline_encoding: doc.skip_multiline_encoding,
                tag_ids: doc.tag_ids.clone(),
                created_at: now,
            });
            inner.secret_tags.insert(update.local_id, doc.tag_ids.clone());
            applied.push(AppliedSecretChange {
                id: update.local_id,
                version: new_version,
                operation: SecretOperation::Update,
            });
        }

        for local_id in &batch.deletes {
            let removable = inner
                .secrets
                .get(local_id)
                .is_some_and(|s| s.folder_id == *folder_id && s.is_replicated);
            if !removable {
                continue;
            }
            if let Some(secret) = inner.secrets.remove(local_id) {
                inner.secret_tags.remove(local_id);
                applied.push(AppliedSecretChange {
                    id: *local_id,
                    version: secret.version,
                    operation: SecretOperation::Delete,
                });
            }
        }

        Ok(applied)
    }

    async fn create_replication_approval(
        &self,
        params: &CreateApprovalRequestParams,
    ) -> Result<ApprovalRequestId, StoreError> {
        let mut inner = self.inner.lock().expect("store poisoned");
        let request_id = ApprovalRequestId(Uuid::now_v7());
        inner.approvals.push(ApprovalRequest {
            id: request_id,
            folder_id: params.folder_id,
            slug: params.slug.clone(),
            policy_id: params.policy_id,
            status: ApprovalStatus::Open,
            has_merged: false,
            committer_id: params.committer_id,
            is_replicated: true,
            created_at: Utc::now(),
        });
        for secret in &params.secrets {
            inner.approval_secrets.push(ApprovalRequestSecret {
                request_id,
                operation: secret.operation,
                secret_id: secret.secret_id,
                secret_version_id: secret.secret_version_id,
                doc: secret.doc.clone(),
                is_replicated: true,
            });
        }
        Ok(request_id)
    }

    async fn find_project_membership(
        &self,
        project_id: &ProjectId,
        user_id: &UserId,
    ) -> Result<Option<ProjectMembership>, StoreError> {
        let inner = self.inner.lock().expect("store poisoned");
        Ok(inner
            .memberships
            .iter()
            .find(|m| m.project_id == *project_id && m.user_id == *user_id)
            .cloned())
    }
}

#[async_trait::async_trait]
impl ApprovalPolicies for MemoryStore {
    async fn find_bound_policy(
        &self,
        project_id: &ProjectId,
        environment_slug: &str,
        secret_path: &str,
    ) -> Result<Option<ApprovalPolicy>, StoreError> {
        let inner = self.inner.lock().expect("store poisoned");
        Ok(inner
            .policies
            .iter()
            .find(|p| {
                p.project_id == *project_id
                    && p.environment_slug == environment_slug
                    && p.secret_path == secret_path
            })
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arx_storage::{
        CipherBlob, KeyEncoding, ReplicaSecretUpdate, ReplicaSecretWrite, SecretAlgorithm,
    };

    fn write_doc(bi: &str) -> ReplicaSecretWrite {
        ReplicaSecretWrite {
            blind_index: Some(bi.to_string()),
            secret_type: SecretType::Shared,
            key: CipherBlob {
                iv: vec![1],
                tag: vec![2],
                data: vec![3],
            },
            value: CipherBlob::default(),
            comment: CipherBlob::default(),
            metadata: None,
            key_encoding: KeyEncoding::Utf8,
            algorithm: SecretAlgorithm::Aes256Gcm,
            skip_multiline_encoding: false,
            tag_ids: vec![],
        }
    }

    fn seed_folder(store: &MemoryStore) -> (EnvironmentId, FolderId) {
        let env_id = EnvironmentId(Uuid::now_v7());
        let folder_id = FolderId(Uuid::now_v7());
        store.insert_environment(Environment {
            id: env_id,
            project_id: ProjectId(Uuid::now_v7()),
            slug: "dev".to_string(),
            name: "Development".to_string(),
        });
        store.insert_folder(Folder {
            id: folder_id,
            env_id,
            parent_id: None,
            name: "root".to_string(),
            is_reserved: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        });
        (env_id, folder_id)
    }

    #[tokio::test]
    async fn create_then_update_then_delete() {
        let store = MemoryStore::new();
        let (_env, folder_id) = seed_folder(&store);

        let applied = store
            .apply_replica_changes(
                &folder_id,
                &ReplicaWriteBatch {
                    creates: vec![write_doc("bi-1")],
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].version, 1);
        let local_id = applied[0].id;

        let applied = store
            .apply_replica_changes(
                &folder_id,
                &ReplicaWriteBatch {
                    updates: vec![ReplicaSecretUpdate {
                        local_id,
                        doc: write_doc("bi-1"),
                    }],
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(applied[0].operation, SecretOperation::Update);
        assert_eq!(applied[0].version, 2);
        assert_eq!(store.version_rows(&local_id).len(), 2);

        let applied = store
            .apply_replica_changes(
                &folder_id,
                &ReplicaWriteBatch {
                    deletes: vec![local_id],
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(applied[0].operation, SecretOperation::Delete);
        assert!(store.secrets_in_folder(&folder_id).is_empty());
    }

    #[tokio::test]
    async fn delete_skips_non_replicated_rows() {
        let store = MemoryStore::new();
        let (env_id, folder_id) = seed_folder(&store);
        let secret_id = SecretId(Uuid::now_v7());
        store.insert_secret(Secret {
            id: secret_id,
            folder_id,
            blind_index: Some("bi".to_string()),
            secret_type: SecretType::Shared,
            version: 1,
            is_replicated: false,
            key: CipherBlob::default(),
            value: CipherBlob::default(),
            comment: CipherBlob::default(),
            metadata: None,
            key_encoding: KeyEncoding::Utf8,
            algorithm: SecretAlgorithm::Aes256Gcm,
            skip_multiline_encoding: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        });
        let _ = env_id;

        let applied = store
            .apply_replica_changes(
                &folder_id,
                &ReplicaWriteBatch {
                    deletes: vec![secret_id],
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(applied.is_empty());
        assert_eq!(store.secrets_in_folder(&folder_id).len(), 1);
    }

    #[tokio::test]
    async fn failed_batch_leaves_no_partial_writes() {
        let store = MemoryStore::new();
        let (_env, folder_id) = seed_folder(&store);

        let err = store
            .apply_replica_changes(
                &folder_id,
                &ReplicaWriteBatch {
                    creates: vec![write_doc("bi-1")],
                    updates: vec![ReplicaSecretUpdate {
                        local_id: SecretId(Uuid::now_v7()),
                        doc: write_doc("missing"),
                    }],
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
        assert!(store.secrets_in_folder(&folder_id).is_empty());
    }

    #[tokio::test]
    async fn reserved_folder_create_is_unique() {
        let store = MemoryStore::new();
        let (env_id, folder_id) = seed_folder(&store);
        let params = CreateFolderParams {
            env_id,
            parent_id: Some(folder_id),
            name: "__reserve_replication_x".to_string(),
            is_reserved: true,
        };
        store.create_folder(&params).await.unwrap();
        let err = store.create_folder(&params).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists));
    }

    #[tokio::test]
    async fn resolve_folder_path_walks_parents() {
        let store = MemoryStore::new();
        let project_id = ProjectId(Uuid::now_v7());
        let env_id = EnvironmentId(Uuid::now_v7());
        store.insert_environment(Environment {
            id: env_id,
            project_id,
            slug: "prod".to_string(),
            name: "Production".to_string(),
        });
        let root = FolderId(Uuid::now_v7());
        let child = FolderId(Uuid::now_v7());
        store.insert_folder(Folder {
            id: root,
            env_id,
            parent_id: None,
            name: "root".to_string(),
            is_reserved: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        });
        store.insert_folder(Folder {
            id: child,
            env_id,
            parent_id: Some(root),
            name: "app".to_string(),
            is_reserved: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        });

        let root_path = store.resolve_folder_path(&project_id, &root).await.unwrap();
        assert_eq!(root_path.unwrap().path, "/");

        let child_path = store
            .resolve_folder_path(&project_id, &child)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(child_path.path, "/app");
        assert_eq!(child_path.environment_slug, "prod");

        // Wrong project resolves to nothing.
        let other = store
            .resolve_folder_path(&ProjectId(Uuid::now_v7()), &child)
            .await
            .unwrap();
        assert!(other.is_none());
    }
}
