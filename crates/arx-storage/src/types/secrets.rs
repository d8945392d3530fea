//! Secret and secret-version types.
//!
//! Ciphertexts are opaque to this subsystem: replication copies the
//! `(iv, tag, data)` triples verbatim and never decrypts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{FolderId, SecretId, SecretTagId, SecretVersionId};

/// Secret visibility. Personal secrets never replicate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretType {
    Shared,
    Personal,
}

/// Change operation carried by queue payloads and classified diffs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretOperation {
    Create,
    Update,
    Delete,
}

/// Encoding of the plaintext that produced a ciphertext.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyEncoding {
    #[default]
    Utf8,
    Base64,
    Hex,
}

/// Symmetric algorithm tag stored alongside each ciphertext.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SecretAlgorithm {
    #[default]
    Aes256Gcm,
}

/// One opaque ciphertext: IV, auth tag, and AEAD output.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CipherBlob {
    pub iv: Vec<u8>,
    pub tag: Vec<u8>,
    pub data: Vec<u8>,
}

/// Secret record.
///
/// Invariant: within one folder, `(blind_index, SecretType::Shared)` is
/// unique.
#[derive(Clone, Debug)]
pub struct Secret {
    pub id: SecretId,
    pub folder_id: FolderId,
    pub blind_index: Option<String>,
    pub secret_type: SecretType,
    pub version: i64,
    pub is_replicated: bool,
    pub key: CipherBlob,
    pub value: CipherBlob,
    pub comment: CipherBlob,
    pub metadata: Option<serde_json::Value>,
    pub key_encoding: KeyEncoding,
    pub algorithm: SecretAlgorithm,
    pub skip_multiline_encoding: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Secret version record.
///
/// `latest_replicated_version` records the highest source version already
/// propagated from this secret (0 when never replicated).
#[derive(Clone, Debug)]
pub struct SecretVersion {
    pub id: SecretVersionId,
    pub secret_id: SecretId,
    pub folder_id: FolderId,
    pub version: i64,
    pub latest_replicated_version: i64,
    pub is_replicated: bool,
    pub blind_index: Option<String>,
    pub secret_type: SecretType,
    pub key: CipherBlob,
    pub value: CipherBlob,
    pub comment: CipherBlob,
    pub metadata: Option<serde_json::Value>,
    pub key_encoding: KeyEncoding,
    pub algorithm: SecretAlgorithm,
    pub skip_multiline_encoding: bool,
    pub tag_ids: Vec<SecretTagId>,
    pub created_at: DateTime<Utc>,
}

/// Field set copied from a source version into a replica write or an
/// approval-request secret.
#[derive(Clone, Debug)]
pub struct ReplicaSecretWrite {
    pub blind_index: Option<String>,
    pub secret_type: SecretType,
    pub key: CipherBlob,
    pub value: CipherBlob,
    pub comment: CipherBlob,
    pub metadata: Option<serde_json::Value>,
    pub key_encoding: KeyEncoding,
    pub algorithm: SecretAlgorithm,
    pub skip_multiline_encoding: bool,
    pub tag_ids: Vec<SecretTagId>,
}

impl From<&SecretVersion> for ReplicaSecretWrite {
    fn from(source: &SecretVersion) -> Self {
        Self {
            blind_index: source.blind_index.clone(),
            secret_type: source.secret_type,
            key: source.key.clone(),
            value: source.value.clone(),
            comment: source.comment.clone(),
            metadata: source.metadata.clone(),
            key_encoding: source.key_encoding,
            algorithm: source.algorithm,
            skip_multiline_encoding: source.skip_multiline_encoding,
            tag_ids: source.tag_ids.clone(),
        }
    }
}

/// Update of one local replica secret with fields from a source version.
#[derive(Clone, Debug)]
pub struct ReplicaSecretUpdate {
    pub local_id: SecretId,
    pub doc: ReplicaSecretWrite,
}

/// One transactional batch of replica writes against a reserved folder.
///
/// `deletes` holds *local* secret ids (the replica's own ids, resolved
/// through the blind index), constrained to replicated rows in the target
/// folder.
#[derive(Clone, Debug, Default)]
pub struct ReplicaWriteBatch {
    pub creates: Vec<ReplicaSecretWrite>,
    pub updates: Vec<ReplicaSecretUpdate>,
    pub deletes: Vec<SecretId>,
}

impl ReplicaWriteBatch {
    pub fn is_empty(&self) -> bool {
        self.creates.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }
}

/// `(id, version, operation)` triple produced by a committed replica write,
/// fed to the downstream sync queue.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedSecretChange {
    pub id: SecretId,
    pub version: i64,
    pub operation: SecretOperation,
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_secret_operation_serde_snake_case() {
        assert_eq!(
            serde_json::to_string(&SecretOperation::Create).unwrap(),
            "\"create\""
        );
        let op: SecretOperation = serde_json::from_str("\"delete\"").unwrap();
        assert_eq!(op, SecretOperation::Delete);
    }

    #[test]
    fn test_replica_write_copies_all_source_fields() {
        let version = SecretVersion {
            id: SecretVersionId(Uuid::now_v7()),
            secret_id: SecretId(Uuid::now_v7()),
            folder_id: FolderId(Uuid::now_v7()),
            version: 3,
            latest_replicated_version: 2,
            is_replicated: false,
            blind_index: Some("bi".to_string()),
            secret_type: SecretType::Shared,
            key: CipherBlob {
                iv: vec![1],
                tag: vec![2],
                data: vec![3],
            },
            value: CipherBlob {
                iv: vec![4],
                tag: vec![5],
                data: vec![6],
            },
            comment: CipherBlob::default(),
            metadata: Some(serde_json::json!({"owner": "ops"})),
            key_encoding: KeyEncoding::Base64,
            algorithm: SecretAlgorithm::Aes256Gcm,
            skip_multiline_encoding: true,
            tag_ids: vec![SecretTagId(Uuid::now_v7())],
            created_at: Utc::now(),
        };

        let write = ReplicaSecretWrite::from(&version);
        assert_eq!(write.blind_index.as_deref(), Some("bi"));
        assert_eq!(write.key.data, vec![3]);
        assert_eq!(write.value.iv, vec![4]);
        assert_eq!(write.key_encoding, KeyEncoding::Base64);
        assert!(write.skip_multiline_encoding);
        assert_eq!(write.tag_ids, version.tag_ids);
    }

    #[test]
    fn test_empty_batch() {
        assert!(ReplicaWriteBatch::default().is_empty());
    }
}
