//! The diff/identity engine: eligibility of source versions and the
//! reconciliation of incoming operations against the replica's local state.
//!
//! Secrets are identified across folders by their blind index (shared type
//! only). Whether the dashboard reported a change as a create or an update
//! is not trustworthy at the replica; existence in the reserved folder is
//! the only truth.

use std::collections::HashMap;

use arx_queue::SecretChange;
use arx_storage::{Secret, SecretId, SecretOperation, SecretType, SecretVersion};

/// A source version is applied only when it is shared, has a blind index,
/// and its version has not been superseded by an already-replicated one.
pub fn is_eligible(version: &SecretVersion) -> bool {
    version.secret_type == SecretType::Shared
        && version.blind_index.is_some()
        && (version.version == 1 || version.latest_replicated_version <= version.version)
}

/// One reconciled change against the reserved folder.
#[derive(Clone, Debug)]
pub struct ClassifiedOp {
    /// Effective operation after reconciliation.
    pub operation: SecretOperation,
    /// Source version row the fields are copied from.
    pub source: SecretVersion,
    /// Local replica secret; present for updates and deletes.
    pub local: Option<Secret>,
}

/// Reconcile the job's sanitized operations against local state:
///
/// | incoming         | local has blind index? | effective |
/// |------------------|------------------------|-----------|
/// | Create or Update | no                     | Create    |
/// | Create or Update | yes                    | Update    |
/// | Delete           | yes                    | Delete    |
/// | Delete           | no                     | (dropped) |
pub fn classify(
    changes: &[SecretChange],
    sources: &HashMap<SecretId, SecretVersion>,
    local_by_blind_index: &HashMap<String, Secret>,
) -> Vec<ClassifiedOp> {
    let mut ops = Vec::with_capacity(changes.len());
    for change in changes {
        let Some(source) = sources.get(&change.id) else {
            continue;
        };
        let Some(blind_index) = source.blind_index.as_deref() else {
            continue;
        };
        let local = local_by_blind_index.get(blind_index);
        let operation = match (change.operation, local) {
            (SecretOperation::Create | SecretOperation::Update, None) => SecretOperation::Create,
            (SecretOperation::Create | SecretOperation::Update, Some(_)) => SecretOperation::Update,
            (SecretOperation::Delete, Some(_)) => SecretOperation::Delete,
            (SecretOperation::Delete, None) => continue,
        };
        ops.push(ClassifiedOp {
            operation,
            source: source.clone(),
            local: local.cloned(),
        });
    }
    ops
}

#[cfg(test)]
mod tests {
    use super::*;
    use arx_storage::{
        CipherBlob, FolderId, KeyEncoding, SecretAlgorithm, SecretType, SecretVersionId,
    };
    use chrono::Utc;
    use uuid::Uuid;

    fn version(secret_id: SecretId, v: i64, latest_replicated: i64, bi: Option<&str>) -> SecretVersion {
        SecretVersion {
            id: SecretVersionId(Uuid::now_v7()),
            secret_id,
            folder_id: FolderId(Uuid::now_v7()),
            version: v,
            latest_replicated_version: latest_replicated,
            is_replicated: false,
            blind_index: bi.map(str::to_string),
            secret_type: SecretType::Shared,
            key: CipherBlob::default(),
            value: CipherBlob::default(),
            comment: CipherBlob::default(),
            metadata: None,
            key_encoding: KeyEncoding::Utf8,
            algorithm: SecretAlgorithm::Aes256Gcm,
            skip_multiline_encoding: false,
            tag_ids: vec![],
            created_at: Utc::now(),
        }
    }

    fn local(folder_id: FolderId, bi: &str) -> Secret {
        Secret {
            id: SecretId(Uuid::now_v7()),
            folder_id,
            blind_index: Some(bi.to_string()),
            secret_type: SecretType::Shared,
            version: 3,
            is_replicated: true,
            key: CipherBlob::default(),
            value: CipherBlob::default(),
            comment: CipherBlob::default(),
            metadata: None,
            key_encoding: KeyEncoding::Utf8,
            algorithm: SecretAlgorithm::Aes256Gcm,
            skip_multiline_encoding: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_eligibility() {
        let id = SecretId(Uuid::now_v7());
        // First version always passes.
        assert!(is_eligible(&version(id, 1, 5, Some("bi"))));
        // Later versions pass while not superseded.
        assert!(is_eligible(&version(id, 4, 4, Some("bi"))));
        assert!(is_eligible(&version(id, 4, 2, Some("bi"))));
        // Superseded version is skipped.
        assert!(!is_eligible(&version(id, 4, 5, Some("bi"))));
        // Missing blind index is never eligible.
        assert!(!is_eligible(&version(id, 1, 0, None)));
        // Personal secrets never replicate.
        let mut personal = version(id, 1, 0, Some("bi"));
        personal.secret_type = SecretType::Personal;
        assert!(!is_eligible(&personal));
    }

    #[test]
    fn test_classification_table() {
        let folder = FolderId(Uuid::now_v7());
        let create_id = SecretId(Uuid::now_v7());
        let update_id = SecretId(Uuid::now_v7());
        let delete_id = SecretId(Uuid::now_v7());
        let dropped_id = SecretId(Uuid::now_v7());

        let sources: HashMap<SecretId, SecretVersion> = [
            (create_id, version(create_id, 1, 0, Some("bi-new"))),
            (update_id, version(update_id, 2, 1, Some("bi-known"))),
            (delete_id, version(delete_id, 2, 2, Some("bi-gone"))),
            (dropped_id, version(dropped_id, 1, 0, Some("bi-absent"))),
        ]
        .into_iter()
        .collect();

        let local_by_bi: HashMap<String, Secret> = [
            ("bi-known".to_string(), local(folder, "bi-known")),
            ("bi-gone".to_string(), local(folder, "bi-gone")),
        ]
        .into_iter()
        .collect();

        let changes = vec![
            SecretChange {
                id: create_id,
                operation: SecretOperation::Update, // update with no local copy
            },
            SecretChange {
                id: update_id,
                operation: SecretOperation::Create, // create with a local copy
            },
            SecretChange {
                id: delete_id,
                operation: SecretOperation::Delete,
            },
            SecretChange {
                id: dropped_id,
                operation: SecretOperation::Delete, // delete with no local copy
            },
        ];

        let ops = classify(&changes, &sources, &local_by_bi);
        assert_eq!(ops.len(), 3);
        assert_eq!(ops[0].operation, SecretOperation::Create);
        assert!(ops[0].local.is_none());
        assert_eq!(ops[1].operation, SecretOperation::Update);
        assert!(ops[1].local.is_some());
        assert_eq!(ops[2].operation, SecretOperation::Delete);
        assert!(ops[2].local.is_some());
    }

    #[test]
    fn test_changes_without_source_are_skipped() {
        let ops = classify(
            &[SecretChange {
                id: SecretId(Uuid::now_v7()),
                operation: SecretOperation::Create,
            }],
            &HashMap::new(),
            &HashMap::new(),
        );
        assert!(ops.is_empty());
    }
}
