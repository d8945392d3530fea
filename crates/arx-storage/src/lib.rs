//! Persistence contracts of the replication subsystem.
//!
//! The worker reaches its database only through the [`Store`] and
//! [`ApprovalPolicies`] traits defined here; arx-store-memory and
//! arx-store-postgres supply the backends. Composite writes (the replica
//! write fan-out, approval-request creation) are internally transactional,
//! so the worker observes each one as a unit: either the whole classified
//! diff landed or none of it did.

use thiserror::Error;

pub mod store;
pub mod types;

// Re-export the traits from the store module
pub use store::{ApprovalPolicies, Store};

// Re-export all types from the types module
pub use types::*;

/// Uniform error type for storage backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A row the operation depends on is gone: the import row during
    /// bookkeeping, or a local secret targeted by an update. Destination
    /// folders that vanish are reported as `Ok(None)` by the path
    /// resolution instead, since that is an expected race.
    #[error("record no longer exists")]
    NotFound,
    /// A uniqueness rule rejected the write: a second reserved folder for
    /// the same import name under one parent, or a second shared secret
    /// with the same blind index in one folder. Surfacing this lets a
    /// racing job detect that a peer materialized the row first.
    #[error("record already present")]
    AlreadyExists,
    /// Everything the backend cannot express as one of the above
    /// (connection loss, failed transaction, malformed row).
    #[error("backend error: {0}")]
    Backend(String),
}

// Re-export mockall mocks when the test-support feature is enabled
#[cfg(feature = "test-support")]
pub use store::{MockApprovalPolicies, MockStore};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_are_stable() {
        assert_eq!(StoreError::NotFound.to_string(), "record no longer exists");
        assert_eq!(
            StoreError::AlreadyExists.to_string(),
            "record already present"
        );
        assert_eq!(
            StoreError::Backend("tx aborted".to_string()).to_string(),
            "backend error: tx aborted"
        );
    }
}
