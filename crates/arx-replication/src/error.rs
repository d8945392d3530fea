//! Error type of the replication worker.
//!
//! Per-import errors are caught by the worker loop and recorded on the
//! import row; `MembershipMissing` aborts the whole job; everything that
//! escapes `process` surfaces on the queue's failed channel.

use arx_kv::KvError;
use arx_queue::QueueError;
use arx_storage::{SecretImportId, StoreError, UserId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReplicationError {
    /// Destination folder vanished between subscriber discovery and path
    /// resolution.
    #[error("imported folder missing for import {0}")]
    ImportedFolderMissing(SecretImportId),

    /// The acting user has no membership in the project, so they cannot
    /// commit approval requests.
    #[error("no project membership for user {0}")]
    MembershipMissing(UserId),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("key-value store error: {0}")]
    Kv(#[from] KvError),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
}
