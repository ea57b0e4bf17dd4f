// Asynchronous warmup submission
//
// Callers hand a WarmupJob to a WarmupDispatcher and return immediately.
// WarmupQueue is the in-process dispatcher: a bounded channel drained by
// one worker task that runs Transformer::warmup_cache for each job.
// Failed jobs are recorded and logged, never retried here. Only the most
// recent finished records are kept.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::format::ImageFormat;
use crate::transformer::Transformer;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Request to pre-compute derivatives of one source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WarmupJob {
    pub id: String,
    pub source_id: String,
    pub stacks: Vec<String>,
    /// Empty means each stack's default output format
    #[serde(default)]
    pub formats: Vec<ImageFormat>,
}

impl WarmupJob {
    pub fn new(
        source_id: impl Into<String>,
        stacks: Vec<String>,
        formats: Vec<ImageFormat>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source_id: source_id.into(),
            stacks,
            formats,
        }
    }
}

/// Progress of a submitted job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub job: WarmupJob,
    pub status: JobStatus,
    pub derivatives: usize,
    pub created_at: SystemTime,
    pub start_time: Option<SystemTime>,
    pub end_time: Option<SystemTime>,
    pub error_message: Option<String>,
}

impl JobRecord {
    fn new(job: WarmupJob) -> Self {
        Self {
            job,
            status: JobStatus::Pending,
            derivatives: 0,
            created_at: SystemTime::now(),
            start_time: None,
            end_time: None,
            error_message: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Warmup queue is full")]
    QueueFull,

    #[error("Warmup queue is closed")]
    Closed,
}

/// Fire-and-forget submission of warmup jobs
pub trait WarmupDispatcher: Send + Sync {
    /// Queue `job`, returning its id
    fn dispatch(&self, job: WarmupJob) -> Result<String, DispatchError>;
}

/// Job records plus the order in which jobs reached a terminal status
#[derive(Debug)]
struct JobTable {
    records: HashMap<String, JobRecord>,
    finished: VecDeque<String>,
    history_limit: usize,
}

impl JobTable {
    fn new(history_limit: usize) -> Self {
        Self {
            records: HashMap::new(),
            finished: VecDeque::new(),
            history_limit,
        }
    }

    /// Remember that `id` finished, evicting the oldest finished records
    /// beyond the history limit
    fn finish(&mut self, id: &str) {
        self.finished.push_back(id.to_string());
        while self.finished.len() > self.history_limit {
            if let Some(evicted) = self.finished.pop_front() {
                self.records.remove(&evicted);
            }
        }
    }
}

type SharedJobTable = Arc<Mutex<JobTable>>;

fn lock(jobs: &SharedJobTable) -> MutexGuard<'_, JobTable> {
    // A panicked holder leaves the table itself consistent
    jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-process warmup dispatcher backed by a bounded queue
#[derive(Debug, Clone)]
pub struct WarmupQueue {
    sender: mpsc::Sender<String>,
    jobs: SharedJobTable,
}

impl WarmupQueue {
    /// Start the worker task; must be called inside a Tokio runtime
    ///
    /// At most `history_limit` completed, failed or cancelled jobs stay
    /// visible through [`get_job`](Self::get_job).
    pub fn start(
        transformer: Transformer,
        capacity: usize,
        history_limit: usize,
    ) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let jobs = Arc::new(Mutex::new(JobTable::new(history_limit)));
        let worker = tokio::spawn(worker(transformer, receiver, Arc::clone(&jobs)));
        (Self { sender, jobs }, worker)
    }

    pub fn get_job(&self, id: &str) -> Option<JobRecord> {
        lock(&self.jobs).records.get(id).cloned()
    }

    pub fn list_jobs(&self) -> Vec<JobRecord> {
        lock(&self.jobs).records.values().cloned().collect()
    }

    /// Cancel a job that has not started yet
    pub fn cancel_job(&self, id: &str) -> bool {
        let mut jobs = lock(&self.jobs);
        match jobs.records.get_mut(id) {
            Some(record) if record.status == JobStatus::Pending => {
                record.status = JobStatus::Cancelled;
                record.end_time = Some(SystemTime::now());
                jobs.finish(id);
                true
            }
            _ => false,
        }
    }
}

impl WarmupDispatcher for WarmupQueue {
    fn dispatch(&self, job: WarmupJob) -> Result<String, DispatchError> {
        let id = job.id.clone();
        lock(&self.jobs)
            .records
            .insert(id.clone(), JobRecord::new(job));

        if let Err(err) = self.sender.try_send(id.clone()) {
            lock(&self.jobs).records.remove(&id);
            return Err(match err {
                mpsc::error::TrySendError::Full(_) => DispatchError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => DispatchError::Closed,
            });
        }
        tracing::debug!(job_id = %id, "Warmup job queued");
        Ok(id)
    }
}

async fn worker(
    transformer: Transformer,
    mut receiver: mpsc::Receiver<String>,
    jobs: SharedJobTable,
) {
    while let Some(id) = receiver.recv().await {
        let job = {
            let mut table = lock(&jobs);
            let Some(record) = table.records.get_mut(&id) else {
                continue;
            };
            if record.status == JobStatus::Cancelled {
                continue;
            }
            record.status = JobStatus::Running;
            record.start_time = Some(SystemTime::now());
            record.job.clone()
        };

        let result = transformer
            .warmup_cache(&job.source_id, &job.stacks, &job.formats)
            .await;

        let mut table = lock(&jobs);
        let Some(record) = table.records.get_mut(&id) else {
            continue;
        };
        record.end_time = Some(SystemTime::now());
        match result {
            Ok(keys) => {
                record.status = JobStatus::Completed;
                record.derivatives = keys.len();
                tracing::info!(
                    job_id = %id,
                    source_id = %job.source_id,
                    derivatives = keys.len(),
                    "Warmup job completed"
                );
            }
            Err(err) => {
                record.status = JobStatus::Failed;
                record.error_message = Some(err.to_string());
                tracing::warn!(
                    job_id = %id,
                    source_id = %job.source_id,
                    error = %err,
                    "Warmup job failed"
                );
            }
        }
        table.finish(&id);
    }
}
