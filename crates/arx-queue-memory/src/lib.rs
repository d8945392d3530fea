//! In-process queue backend using tokio channels.
//!
//! Suitable for a single worker process and for tests. Replication jobs flow
//! over an unbounded channel to a [`JobReceiver`] handed to the worker host;
//! cancellation marks job ids so the receiver skips them on delivery.
//!
//! Downstream sync requests are retained for inspection rather than
//! delivered anywhere: the `sync-secrets` consumer is outside this
//! subsystem. The dedup hint check still runs here so fan-out behavior is
//! observable in tests.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use arx_queue::{JobSource, QueueError, QueueService, ReplicationJob, SyncRequest};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Default)]
struct QueueState {
    cancelled: HashSet<String>,
    sync_requests: Vec<SyncRequest>,
}

/// In-process queue service.
pub struct MemoryQueue {
    jobs_tx: mpsc::UnboundedSender<ReplicationJob>,
    state: Arc<Mutex<QueueState>>,
}

/// Receiving end of the replication queue.
pub struct JobReceiver {
    jobs_rx: mpsc::UnboundedReceiver<ReplicationJob>,
    state: Arc<Mutex<QueueState>>,
}

impl MemoryQueue {
    /// Create the queue and its delivery end.
    pub fn new() -> (Arc<Self>, JobReceiver) {
        let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();
        let state = Arc::new(Mutex::new(QueueState::default()));
        let queue = Arc::new(Self {
            jobs_tx,
            state: Arc::clone(&state),
        });
        (queue, JobReceiver { jobs_rx, state })
    }

    /// Take every sync request enqueued so far.
    pub fn drain_sync_requests(&self) -> Vec<SyncRequest> {
        let mut state = self.state.lock().expect("queue state poisoned");
        std::mem::take(&mut state.sync_requests)
    }

    /// Number of sync requests currently retained.
    pub fn sync_request_count(&self) -> usize {
        let state = self.state.lock().expect("queue state poisoned");
        state.sync_requests.len()
    }
}

#[async_trait]
impl QueueService for MemoryQueue {
    async fn enqueue_replication(&self, job: ReplicationJob) -> Result<(), QueueError> {
        self.jobs_tx.send(job).map_err(|_| QueueError::Closed)
    }

    async fn enqueue_secret_sync(&self, mut request: SyncRequest) -> Result<(), QueueError> {
        let key = request.de_dupe_key();
        if request.de_dupe_queue.contains(&key) {
            debug!(key, "sync request deduplicated");
            return Ok(());
        }
        request.de_dupe_queue.insert(key);
        let mut state = self.state.lock().expect("queue state poisoned");
        state.sync_requests.push(request);
        Ok(())
    }

    async fn cancel_replication(&self, job_id: &str) -> Result<(), QueueError> {
        let mut state = self.state.lock().expect("queue state poisoned");
        state.cancelled.insert(job_id.to_string());
        Ok(())
    }
}

#[async_trait]
impl JobSource for JobReceiver {
    async fn next_job(&mut self) -> Option<ReplicationJob> {
        loop {
            let job = self.jobs_rx.recv().await?;
            let cancelled = {
                let mut state = self.state.lock().expect("queue state poisoned");
                state.cancelled.remove(&job.job_id)
            };
            if cancelled {
                debug!(job_id = %job.job_id, "skipping cancelled replication job");
                continue;
            }
            return Some(job);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arx_storage::{EnvironmentId, FolderId, ProjectId, SecretId, SecretOperation, UserId};
    use arx_queue::{Actor, SecretChange};
    use uuid::Uuid;

    fn test_job(job_id: &str) -> ReplicationJob {
        ReplicationJob {
            job_id: job_id.to_string(),
            secrets: vec![SecretChange {
                id: SecretId(Uuid::now_v7()),
                operation: SecretOperation::Update,
            }],
            folder_id: FolderId(Uuid::now_v7()),
            secret_path: "/".to_string(),
            environment_id: EnvironmentId(Uuid::now_v7()),
            project_id: ProjectId(Uuid::now_v7()),
            actor: Actor::Platform,
            actor_id: UserId(Uuid::now_v7()),
            pick_only_import_ids: None,
            de_dupe_replication_queue: HashSet::new(),
            de_dupe_queue: HashSet::new(),
        }
    }

    fn test_sync_request() -> SyncRequest {
        SyncRequest {
            project_id: ProjectId(Uuid::now_v7()),
            secret_path: "/app".to_string(),
            environment_slug: "prod".to_string(),
            environment_id: EnvironmentId(Uuid::now_v7()),
            folder_id: FolderId(Uuid::now_v7()),
            secrets: vec![],
            actor: Actor::Platform,
            actor_id: UserId(Uuid::now_v7()),
            de_dupe_replication_queue: HashSet::new(),
            de_dupe_queue: HashSet::new(),
        }
    }

    #[tokio::test]
    async fn enqueue_and_receive() {
        let (queue, mut receiver) = MemoryQueue::new();
        queue.enqueue_replication(test_job("j1")).await.unwrap();
        let job = receiver.next_job().await.unwrap();
        assert_eq!(job.job_id, "j1");
    }

    #[tokio::test]
    async fn cancelled_job_is_skipped() {
        let (queue, mut receiver) = MemoryQueue::new();
        queue.enqueue_replication(test_job("j1")).await.unwrap();
        queue.enqueue_replication(test_job("j2")).await.unwrap();
        queue.cancel_replication("j1").await.unwrap();

        let job = receiver.next_job().await.unwrap();
        assert_eq!(job.job_id, "j2");
    }

    #[tokio::test]
    async fn sync_request_dedup_hint_drops_repeat() {
        let (queue, _receiver) = MemoryQueue::new();
        let request = test_sync_request();

        queue.enqueue_secret_sync(request.clone()).await.unwrap();
        let stored = queue.drain_sync_requests();
        assert_eq!(stored.len(), 1);

        // Re-enqueue carrying the recorded hint set: deduplicated.
        queue
            .enqueue_secret_sync(stored[0].clone())
            .await
            .unwrap();
        assert_eq!(queue.sync_request_count(), 0);
    }

    #[tokio::test]
    async fn closed_queue_reports_error() {
        let (queue, receiver) = MemoryQueue::new();
        drop(receiver);
        let err = queue.enqueue_replication(test_job("j1")).await.unwrap_err();
        assert!(matches!(err, QueueError::Closed));
    }
}
