//! Project-scoped types: environments and memberships.

use chrono::{DateTime, Utc};

use super::{EnvironmentId, MembershipId, ProjectId, UserId};

/// Environment record (the slice replication needs: identity and slug).
#[derive(Clone, Debug)]
pub struct Environment {
    pub id: EnvironmentId,
    pub project_id: ProjectId,
    pub slug: String,
    pub name: String,
}

/// Project membership; approval requests are committed under a membership,
/// not a bare user id.
#[derive(Clone, Debug)]
pub struct ProjectMembership {
    pub id: MembershipId,
    pub project_id: ProjectId,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
}
