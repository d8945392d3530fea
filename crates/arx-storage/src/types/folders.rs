//! Folder types and reserved-folder naming.

use chrono::{DateTime, Utc};

use super::{EnvironmentId, FolderId, SecretImportId};

/// Prefix of the reserved child folder that hosts replicated copies for one
/// import. The name is a stable, parseable key; external collaborators rely
/// on this prefix to identify reserved folders.
pub const RESERVED_FOLDER_PREFIX: &str = "__reserve_replication_";

/// Reserved folder name for a replicated import.
pub fn reserved_folder_name(import_id: &SecretImportId) -> String {
    format!("{RESERVED_FOLDER_PREFIX}{}", import_id.0)
}

/// Folder record.
#[derive(Clone, Debug)]
pub struct Folder {
    pub id: FolderId,
    pub env_id: EnvironmentId,
    pub parent_id: Option<FolderId>,
    pub name: String,
    pub is_reserved: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parameters for creating a folder.
#[derive(Clone, Debug)]
pub struct CreateFolderParams {
    pub env_id: EnvironmentId,
    pub parent_id: Option<FolderId>,
    pub name: String,
    pub is_reserved: bool,
}

/// External-facing location of a folder: environment slug plus `/`-joined
/// path from the environment root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FolderPath {
    pub env_id: EnvironmentId,
    pub environment_slug: String,
    pub path: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_reserved_folder_name_embeds_import_id() {
        let import_id = SecretImportId(Uuid::now_v7());
        let name = reserved_folder_name(&import_id);
        assert!(name.starts_with(RESERVED_FOLDER_PREFIX));
        assert!(name.ends_with(&import_id.0.to_string()));
    }
}
