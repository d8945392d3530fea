//! Postgres storage backend.
//!
//! Composite writes (`apply_replica_changes`, `create_replication_approval`)
//! each run in one transaction. Queries use the runtime sqlx API so the
//! workspace builds without a database; migrations are embedded and run on
//! `open`.

use std::collections::HashMap;

use arx_storage::{
    ApprovalPolicies, ApprovalPolicy, ApprovalPolicyId, ApprovalRequestId, AppliedSecretChange,
    CipherBlob, CreateApprovalRequestParams, CreateFolderParams, EnvironmentId, Folder, FolderId,
    FolderPath, KeyEncoding, MembershipId, ProjectId, ProjectMembership, ReplicaSecretWrite,
    ReplicaWriteBatch, ReplicationStatusUpdate, Secret, SecretAlgorithm, SecretId, SecretImport,
    SecretImportId, SecretOperation, SecretTagId, SecretType, SecretVersion, SecretVersionId,
    Store, StoreError, UserId,
};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use uuid::Uuid;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

type PgQuery<'q> = sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>;

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn open(url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await
            .map_err(map_err)?;

        MIGRATOR
            .run(&pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(Self { pool })
    }
}

fn map_err(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::RowNotFound => StoreError::NotFound,
        sqlx::Error::Database(db)
            if matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation) =>
        {
            StoreError::AlreadyExists
        }
        _ => StoreError::Backend(e.to_string()),
    }
}

// ───────────────────────────── Column codecs ─────────────────────────────

fn secret_type_str(secret_type: SecretType) -> &'static str {
    match secret_type {
        SecretType::Shared => "shared",
        SecretType::Personal => "personal",
    }
}

fn secret_type_from(s: &str) -> Result<SecretType, sqlx::Error> {
    match s {
        "shared" => Ok(SecretType::Shared),
        "personal" => Ok(SecretType::Personal),
        other => Err(sqlx::Error::Decode(
            format!("unknown secret type: {other}").into(),
        )),
    }
}

fn key_encoding_str(encoding: KeyEncoding) -> &'static str {
    match encoding {
        KeyEncoding::Utf8 => "utf8",
        KeyEncoding::Base64 => "base64",
        KeyEncoding::Hex => "hex",
    }
}

fn key_encoding_from(s: &str) -> Result<KeyEncoding, sqlx::Error> {
    match s {
        "utf8" => Ok(KeyEncoding::Utf8),
        "base64" => Ok(KeyEncoding::Base64),
        "hex" => Ok(KeyEncoding::Hex),
        other => Err(sqlx::Error::Decode(
            format!("unknown key encoding: {other}").into(),
        )),
    }
}

fn algorithm_str(algorithm: SecretAlgorithm) -> &'static str {
    match algorithm {
        SecretAlgorithm::Aes256Gcm => "aes-256-gcm",
    }
}

fn algorithm_from(s: &str) -> Result<SecretAlgorithm, sqlx::Error> {
    match s {
        "aes-256-gcm" => Ok(SecretAlgorithm::Aes256Gcm),
        other => Err(sqlx::Error::Decode(
            format!("unknown algorithm: {other}").into(),
        )),
    }
}

fn operation_str(operation: SecretOperation) -> &'static str {
    match operation {
        SecretOperation::Create => "create",
        SecretOperation::Update => "update",
        SecretOperation::Delete => "delete",
    }
}

// ───────────────────────────── Row mapping ───────────────────────────────

fn blob_from_row(row: &PgRow, prefix: &str) -> Result<CipherBlob, sqlx::Error> {
    Ok(CipherBlob {
        iv: row.try_get(format!("{prefix}_iv").as_str())?,
        tag: row.try_get(format!("{prefix}_tag").as_str())?,
        data: row.try_get(format!("{prefix}_data").as_str())?,
    })
}

fn folder_from_row(row: &PgRow) -> Result<Folder, sqlx::Error> {
    Ok(Folder {
        id: FolderId(row.try_get("id")?),
        env_id: EnvironmentId(row.try_get("env_id")?),
        parent_id: row.try_get::<Option<Uuid>, _>("parent_id")?.map(FolderId),
        name: row.try_get("name")?,
        is_reserved: row.try_get("is_reserved")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn import_from_row(row: &PgRow) -> Result<SecretImport, sqlx::Error> {
    Ok(SecretImport {
        id: SecretImportId(row.try_get("id")?),
        folder_id: FolderId(row.try_get("folder_id")?),
        import_env: EnvironmentId(row.try_get("import_env")?),
        import_path: row.try_get("import_path")?,
        is_replication: row.try_get("is_replication")?,
        last_replicated: row.try_get("last_replicated")?,
        replication_status: row.try_get("replication_status")?,
        is_replication_success: row.try_get("is_replication_success")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn secret_from_row(row: &PgRow) -> Result<Secret, sqlx::Error> {
    Ok(Secret {
        id: SecretId(row.try_get("id")?),
        folder_id: FolderId(row.try_get("folder_id")?),
        blind_index: row.try_get("blind_index")?,
        secret_type: secret_type_from(row.try_get::<String, _>("secret_type")?.as_str())?,
        version: row.try_get("version")?,
        is_replicated: row.try_get("is_replicated")?,
        key: blob_from_row(row, "key")?,
        value: blob_from_row(row, "value")?,
        comment: blob_from_row(row, "comment")?,
        metadata: row.try_get("metadata")?,
        key_encoding: key_encoding_from(row.try_get::<String, _>("key_encoding")?.as_str())?,
        algorithm: algorithm_from(row.try_get::<String, _>("algorithm")?.as_str())?,
        skip_multiline_encoding: row.try_get("skip_multiline_encoding")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn version_from_row(row: &PgRow, tag_ids: Vec<SecretTagId>) -> Result<SecretVersion, sqlx::Error> {
    Ok(SecretVersion {
        id: SecretVersionId(row.try_get("id")?),
        secret_id: SecretId(row.try_get("secret_id")?),
        folder_id: FolderId(row.try_get("folder_id")?),
        version: row.try_get("version")?,
        latest_replicated_version: row.try_get("latest_replicated_version")?,
        is_replicated: row.try_get("is_replicated")?,
        blind_index: row.try_get("blind_index")?,
        secret_type: secret_type_from(row.try_get::<String, _>("secret_type")?.as_str())?,
        key: blob_from_row(row, "key")?,
        value: blob_from_row(row, "value")?,
        comment: blob_from_row(row, "comment")?,
        metadata: row.try_get("metadata")?,
        key_encoding: key_encoding_from(row.try_get::<String, _>("key_encoding")?.as_str())?,
        algorithm: algorithm_from(row.try_get::<String, _>("algorithm")?.as_str())?,
        skip_multiline_encoding: row.try_get("skip_multiline_encoding")?,
        tag_ids,
        created_at: row.try_get("created_at")?,
    })
}

/// Bind the 15 shared document columns (blind index through multiline flag)
/// in the order every insert statement lists them.
fn bind_doc<'q>(query: PgQuery<'q>, doc: &'q ReplicaSecretWrite) -> PgQuery<'q> {
    query
        .bind(&doc.blind_index)
        .bind(secret_type_str(doc.secret_type))
        .bind(&doc.key.iv)
        .bind(&doc.key.tag)
        .bind(&doc.key.data)
        .bind(&doc.value.iv)
        .bind(&doc.value.tag)
        .bind(&doc.value.data)
        .bind(&doc.comment.iv)
        .bind(&doc.comment.tag)
        .bind(&doc.comment.data)
        .bind(&doc.metadata)
        .bind(key_encoding_str(doc.key_encoding))
        .bind(algorithm_str(doc.algorithm))
        .bind(doc.skip_multiline_encoding)
}

impl PostgresStore {
    /// Latest version row per secret, plus its tag joins.
    async fn latest_versions(
        &self,
        folder_id: &FolderId,
        secret_ids: &[SecretId],
    ) -> Result<Vec<SecretVersion>, StoreError> {
        let ids: Vec<Uuid> = secret_ids.iter().map(|id| id.0).collect();
        let rows = sqlx::query(
            "SELECT DISTINCT ON (secret_id) *
             FROM secret_versions
             WHERE folder_id = $1 AND secret_id = ANY($2)
             ORDER BY secret_id, version DESC, created_at DESC",
        )
        .bind(folder_id.0)
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;

        let version_ids: Vec<Uuid> = rows
            .iter()
            .map(|row| row.try_get("id"))
            .collect::<Result<_, _>>()
            .map_err(map_err)?;
        let tag_rows = sqlx::query(
            "SELECT version_id, tag_id FROM secret_version_tag_joins WHERE version_id = ANY($1)",
        )
        .bind(&version_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;
        let mut tags_by_version: HashMap<Uuid, Vec<SecretTagId>> = HashMap::new();
        for row in &tag_rows {
            let version_id: Uuid = row.try_get("version_id").map_err(map_err)?;
            let tag_id: Uuid = row.try_get("tag_id").map_err(map_err)?;
            tags_by_version
                .entry(version_id)
                .or_default()
                .push(SecretTagId(tag_id));
        }

        rows.iter()
            .map(|row| {
                let id: Uuid = row.try_get("id")?;
                version_from_row(row, tags_by_version.remove(&id).unwrap_or_default())
            })
            .collect::<Result<_, _>>()
            .map_err(map_err)
    }
}

#[async_trait::async_trait]
impl Store for PostgresStore {
    async fn find_replication_imports(
        &self,
        env: &EnvironmentId,
        path: &str,
    ) -> Result<Vec<SecretImport>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM secret_imports
             WHERE import_env = $1 AND import_path = $2 AND is_replication
             ORDER BY created_at",
        )
        .bind(env.0)
        .bind(path)
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;
        rows.iter().map(import_from_row).collect::<Result<_, _>>().map_err(map_err)
    }

    async fn update_import_replication_status(
        &self,
        import_id: &SecretImportId,
        update: &ReplicationStatusUpdate,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE secret_imports
             SET last_replicated = $2,
                 replication_status = $3,
                 is_replication_success = $4,
                 updated_at = now()
             WHERE id = $1",
        )
        .bind(import_id.0)
        .bind(update.last_replicated)
        .bind(&update.replication_status)
        .bind(update.is_replication_success)
        .execute(&self.pool)
        .await
        .map_err(map_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn find_secret_versions(
        &self,
        folder_id: &FolderId,
        secret_ids: &[SecretId],
    ) -> Result<Vec<SecretVersion>, StoreError> {
        self.latest_versions(folder_id, secret_ids).await
    }

    async fn find_latest_versions(
        &self,
        folder_id: &FolderId,
        secret_ids: &[SecretId],
    ) -> Result<HashMap<SecretId, SecretVersion>, StoreError> {
        let versions = self.latest_versions(folder_id, secret_ids).await?;
        Ok(versions
            .into_iter()
            .map(|version| (version.secret_id, version))
            .collect())
    }

    async fn mark_versions_replicated(
        &self,
        version_ids: &[SecretVersionId],
    ) -> Result<(), StoreError> {
        let ids: Vec<Uuid> = version_ids.iter().map(|id| id.0).collect();
        sqlx::query("UPDATE secret_versions SET is_replicated = TRUE WHERE id = ANY($1)")
            .bind(&ids)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(())
    }

    async fn resolve_folder_path(
        &self,
        project_id: &ProjectId,
        folder_id: &FolderId,
    ) -> Result<Option<FolderPath>, StoreError> {
        let rows = sqlx::query(
            "WITH RECURSIVE chain AS (
                 SELECT id, parent_id, name, env_id, 0 AS depth
                 FROM folders WHERE id = $1
                 UNION ALL
                 SELECT f.id, f.parent_id, f.name, f.env_id, chain.depth + 1
                 FROM folders f JOIN chain ON f.id = chain.parent_id
             )
             SELECT chain.parent_id, chain.name, chain.env_id, e.slug, e.project_id
             FROM chain JOIN environments e ON e.id = chain.env_id
             ORDER BY chain.depth",
        )
        .bind(folder_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;

        let Some(first) = rows.first() else {
            return Ok(None);
        };
        let row_project: Uuid = first.try_get("project_id").map_err(map_err)?;
        if row_project != project_id.0 {
            return Ok(None);
        }
        let env_id: Uuid = first.try_get("env_id").map_err(map_err)?;
        let slug: String = first.try_get("slug").map_err(map_err)?;

        // Rows run target → root; the environment root contributes no
        // path segment.
        let mut segments = Vec::new();
        for row in &rows {
            let parent: Option<Uuid> = row.try_get("parent_id").map_err(map_err)?;
            if parent.is_some() {
                segments.push(row.try_get::<String, _>("name").map_err(map_err)?);
            }
        }
        segments.reverse();
        let path = if segments.is_empty() {
            "/".to_string()
        } else {
            format!("/{}", segments.join("/"))
        };

        Ok(Some(FolderPath {
            env_id: EnvironmentId(env_id),
            environment_slug: slug,
            path,
        }))
    }

    async fn find_reserved_folder(
        &self,
        parent_id: &FolderId,
        name: &str,
    ) -> Result<Option<Folder>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM folders WHERE parent_id = $1 AND name = $2 AND is_reserved",
        )
        .bind(parent_id.0)
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_err)?;
        row.as_ref().map(folder_from_row).transpose().map_err(map_err)
    }

    async fn create_folder(&self, params: &CreateFolderParams) -> Result<Folder, StoreError> {
        let row = sqlx::query(
            "INSERT INTO folders (id, env_id, parent_id, name, is_reserved)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(params.env_id.0)
        .bind(params.parent_id.map(|id| id.0))
        .bind(&params.name)
        .bind(params.is_reserved)
        .fetch_one(&self.pool)
        .await
        .map_err(map_err)?;
        folder_from_row(&row).map_err(map_err)
    }

    async fn find_secrets_by_blind_indexes(
        &self,
        folder_id: &FolderId,
        blind_indexes: &[String],
    ) -> Result<Vec<Secret>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM secrets
             WHERE folder_id = $1 AND blind_index = ANY($2) AND secret_type = 'shared'",
        )
        .bind(folder_id.0)
        .bind(blind_indexes.to_vec())
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;
        rows.iter().map(secret_from_row).collect::<Result<_, _>>().map_err(map_err)
    }

    async fn apply_replica_changes(
        &self,
        folder_id: &FolderId,
        batch: &ReplicaWriteBatch,
    ) -> Result<Vec<AppliedSecretChange>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_err)?;
        let mut applied = Vec::new();

        for doc in &batch.creates {
            let secret_id = Uuid::now_v7();
            bind_doc(
                sqlx::query(
                    "INSERT INTO secrets (id, folder_id, version, is_replicated,
                         blind_index, secret_type,
                         key_iv, key_tag, key_data,
                         value_iv, value_tag, value_data,
                         comment_iv, comment_tag, comment_data,
                         metadata, key_encoding, algorithm, skip_multiline_encoding)
                     VALUES ($1, $2, 1, TRUE,
                         $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)",
                )
                .bind(secret_id)
                .bind(folder_id.0),
                doc,
            )
            .execute(&mut *tx)
            .await
            .map_err(map_err)?;

            insert_version(&mut tx, SecretId(secret_id), folder_id, 1, doc).await?;
            replace_secret_tags(&mut tx, SecretId(secret_id), &doc.tag_ids).await?;

            applied.push(AppliedSecretChange {
                id: SecretId(secret_id),
                version: 1,
                operation: SecretOperation::Create,
            });
        }

        for update in &batch.updates {
            let doc = &update.doc;
            let new_version: i64 = bind_doc(
                sqlx::query(
                    "UPDATE secrets
                     SET blind_index = $3, secret_type = $4,
                         key_iv = $5, key_tag = $6, key_data = $7,
                         value_iv = $8, value_tag = $9, value_data = $10,
                         comment_iv = $11, comment_tag = $12, comment_data = $13,
                         metadata = $14, key_encoding = $15, algorithm = $16,
                         skip_multiline_encoding = $17,
                         version = version + 1, updated_at = now()
                     WHERE id = $1 AND folder_id = $2
                     RETURNING version",
                )
                .bind(update.local_id.0)
                .bind(folder_id.0),
                doc,
            )
            .fetch_one(&mut *tx)
            .await
            .map_err(map_err)?
            .try_get("version")
            .map_err(map_err)?;

            insert_version(&mut tx, update.local_id, folder_id, new_version, doc).await?;
            replace_secret_tags(&mut tx, update.local_id, &doc.tag_ids).await?;

            applied.push(AppliedSecretChange {
                id: update.local_id,
                version: new_version,
                operation: SecretOperation::Update,
            });
        }

        if !batch.deletes.is_empty() {
            let ids: Vec<Uuid> = batch.deletes.iter().map(|id| id.0).collect();
            let rows = sqlx::query(
                "DELETE FROM secrets
                 WHERE id = ANY($1) AND folder_id = $2 AND is_replicated
                 RETURNING id, version",
            )
            .bind(&ids)
            .bind(folder_id.0)
            .fetch_all(&mut *tx)
            .await
            .map_err(map_err)?;
            for row in &rows {
                applied.push(AppliedSecretChange {
                    id: SecretId(row.try_get("id").map_err(map_err)?),
                    version: row.try_get("version").map_err(map_err)?,
                    operation: SecretOperation::Delete,
                });
            }
        }

        tx.commit().await.map_err(map_err)?;
        Ok(applied)
    }

    async fn create_replication_approval(
        &self,
        params: &CreateApprovalRequestParams,
    ) -> Result<ApprovalRequestId, StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_err)?;

        let request_id = Uuid::now_v7();
        sqlx::query(
            "INSERT INTO secret_approval_requests
                 (id, folder_id, slug, policy_id, status, has_merged, committer_id, is_replicated)
             VALUES ($1, $2, $3, $4, 'open', FALSE, $5, TRUE)",
        )
        .bind(request_id)
        .bind(params.folder_id.0)
        .bind(&params.slug)
        .bind(params.policy_id.0)
        .bind(params.committer_id.0)
        .execute(&mut *tx)
        .await
        .map_err(map_err)?;

        for secret in &params.secrets {
            let approval_secret_id = Uuid::now_v7();
            bind_doc(
                sqlx::query(
                    "INSERT INTO secret_approval_request_secrets
                         (id, request_id, op, secret_id, secret_version_id,
                          blind_index, secret_type,
                          key_iv, key_tag, key_data,
                          value_iv, value_tag, value_data,
                          comment_iv, comment_tag, comment_data,
                          metadata, key_encoding, algorithm, skip_multiline_encoding,
                          is_replicated)
                     VALUES ($1, $2, $3, $4, $5,
                         $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20,
                         TRUE)",
                )
                .bind(approval_secret_id)
                .bind(request_id)
                .bind(operation_str(secret.operation))
                .bind(secret.secret_id.map(|id| id.0))
                .bind(secret.secret_version_id.map(|id| id.0)),
                &secret.doc,
            )
            .execute(&mut *tx)
            .await
            .map_err(map_err)?;

            for tag_id in &secret.doc.tag_ids {
                sqlx::query(
                    "INSERT INTO secret_approval_secret_tags (approval_secret_id, tag_id)
                     VALUES ($1, $2)",
                )
                .bind(approval_secret_id)
                .bind(tag_id.0)
                .execute(&mut *tx)
                .await
                .map_err(map_err)?;
            }
        }

        tx.commit().await.map_err(map_err)?;
        Ok(ApprovalRequestId(request_id))
    }

    async fn find_project_membership(
        &self,
        project_id: &ProjectId,
        user_id: &UserId,
    ) -> Result<Option<ProjectMembership>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM project_memberships WHERE project_id = $1 AND user_id = $2",
        )
        .bind(project_id.0)
        .bind(user_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_err)?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(ProjectMembership {
            id: MembershipId(row.try_get("id").map_err(map_err)?),
            project_id: ProjectId(row.try_get("project_id").map_err(map_err)?),
            user_id: UserId(row.try_get("user_id").map_err(map_err)?),
            created_at: row.try_get("created_at").map_err(map_err)?,
        }))
    }
}

#[async_trait::async_trait]
impl ApprovalPolicies for PostgresStore {
    async fn find_bound_policy(
        &self,
        project_id: &ProjectId,
        environment_slug: &str,
        secret_path: &str,
    ) -> Result<Option<ApprovalPolicy>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM secret_approval_policies
             WHERE project_id = $1 AND environment_slug = $2 AND secret_path = $3",
        )
        .bind(project_id.0)
        .bind(environment_slug)
        .bind(secret_path)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_err)?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(ApprovalPolicy {
            id: ApprovalPolicyId(row.try_get("id").map_err(map_err)?),
            project_id: ProjectId(row.try_get("project_id").map_err(map_err)?),
            environment_slug: row.try_get("environment_slug").map_err(map_err)?,
            secret_path: row.try_get("secret_path").map_err(map_err)?,
            name: row.try_get("name").map_err(map_err)?,
        }))
    }
}

async fn insert_version(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    secret_id: SecretId,
    folder_id: &FolderId,
    version: i64,
    doc: &ReplicaSecretWrite,
) -> Result<(), StoreError> {
    let version_id = Uuid::now_v7();
    bind_doc(
        sqlx::query(
            "INSERT INTO secret_versions (id, secret_id, folder_id, version,
                 blind_index, secret_type,
                 key_iv, key_tag, key_data,
                 value_iv, value_tag, value_data,
                 comment_iv, comment_tag, comment_data,
                 metadata, key_encoding, algorithm, skip_multiline_encoding)
             VALUES ($1, $2, $3, $4,
                 $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)",
        )
        .bind(version_id)
        .bind(secret_id.0)
        .bind(folder_id.0)
        .bind(version),
        doc,
    )
    .execute(&mut **tx)
    .await
    .map_err(map_err)?;

    for tag_id in &doc.tag_ids {
        sqlx::query(
            "INSERT INTO secret_version_tag_joins (version_id, tag_id) VALUES ($1, $2)",
        )
        .bind(version_id)
        .bind(tag_id.0)
        .execute(&mut **tx)
        .await
        .map_err(map_err)?;
    }
    Ok(())
}

async fn replace_secret_tags(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    secret_id: SecretId,
    tag_ids: &[SecretTagId],
) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM secret_tag_joins WHERE secret_id = $1")
        .bind(secret_id.0)
        .execute(&mut **tx)
        .await
        .map_err(map_err)?;
    for tag_id in tag_ids {
        sqlx::query("INSERT INTO secret_tag_joins (secret_id, tag_id) VALUES ($1, $2)")
            .bind(secret_id.0)
            .bind(tag_id.0)
            .execute(&mut **tx)
            .await
            .map_err(map_err)?;
    }
    Ok(())
}
