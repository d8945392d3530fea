//! Approval policy and approval request types.
//!
//! Policy *evaluation* happens elsewhere; replication only looks up whether
//! a policy binds a destination and, if so, records the classified diff as
//! an open approval request instead of writing directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    ApprovalPolicyId, ApprovalRequestId, FolderId, MembershipId, ProjectId, ReplicaSecretWrite,
    SecretId, SecretOperation, SecretVersionId,
};

/// A policy bound to `(project, environment, path)`.
#[derive(Clone, Debug)]
pub struct ApprovalPolicy {
    pub id: ApprovalPolicyId,
    pub project_id: ProjectId,
    pub environment_slug: String,
    pub secret_path: String,
    pub name: String,
}

/// Approval request lifecycle status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Open,
    Closed,
    Merged,
}

/// Approval request record.
#[derive(Clone, Debug)]
pub struct ApprovalRequest {
    pub id: ApprovalRequestId,
    pub folder_id: FolderId,
    pub slug: String,
    pub policy_id: ApprovalPolicyId,
    pub status: ApprovalStatus,
    pub has_merged: bool,
    pub committer_id: MembershipId,
    pub is_replicated: bool,
    pub created_at: DateTime<Utc>,
}

/// One secret change attached to an approval request.
#[derive(Clone, Debug)]
pub struct ApprovalRequestSecret {
    pub request_id: ApprovalRequestId,
    pub operation: SecretOperation,
    /// Local secret this change targets; `None` for creates.
    pub secret_id: Option<SecretId>,
    /// Latest local version at request time; `None` for creates.
    pub secret_version_id: Option<SecretVersionId>,
    pub doc: ReplicaSecretWrite,
    pub is_replicated: bool,
}

/// One classified op to attach to a new approval request.
#[derive(Clone, Debug)]
pub struct ApprovalSecretParams {
    pub operation: SecretOperation,
    pub secret_id: Option<SecretId>,
    pub secret_version_id: Option<SecretVersionId>,
    pub doc: ReplicaSecretWrite,
}

/// Parameters for creating a replication approval request together with its
/// secrets (and their tag joins) in one transaction.
#[derive(Clone, Debug)]
pub struct CreateApprovalRequestParams {
    pub folder_id: FolderId,
    pub slug: String,
    pub policy_id: ApprovalPolicyId,
    pub committer_id: MembershipId,
    pub secrets: Vec<ApprovalSecretParams>,
}
