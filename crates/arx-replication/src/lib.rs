//! Secret replication worker.
//!
//! Propagates encrypted secrets from a source folder to every destination
//! folder subscribed via a replicated import. Replication preserves
//! per-secret causal ordering (a distributed per-secret lock), is idempotent
//! under retry (per-`(job, import)` success markers), respects approval
//! policies (filing approval requests instead of writing when a policy binds
//! the destination), and cascades further replication through the downstream
//! sync queue.

pub mod classify;
pub mod error;
pub mod keys;
pub mod worker;
pub mod writer;

pub use arx_queue::{Actor, ReplicationJob, SecretChange, SyncRequest};
pub use classify::{classify, is_eligible, ClassifiedOp};
pub use error::ReplicationError;
pub use worker::SecretReplicationWorker;
pub use writer::{ApprovalReplicaWriter, DirectReplicaWriter, ImportContext, ReplicaWriter};
