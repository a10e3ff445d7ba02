// crates/counsel-server/src/graph/worker.rs
// Background similarity computation worker
//
// A single consumer drains two bounded queues (high before low),
// computing and persisting similarity edges for freshly stored
// decisions. Edge writes are idempotent upserts, so jobs lost at
// shutdown can be recomputed on the next start.

use super::store::GraphStore;
use crate::error::{CounselError, Result};
use crate::similarity::SimilarityDetector;
use chrono::{DateTime, Utc};
use counsel_types::DecisionSimilarity;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info, warn};

/// Sleep between polls when both queues are empty.
const IDLE_SLEEP: Duration = Duration::from_millis(100);
/// Backoff after an unexpected loop error.
const ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Job priority; high-priority jobs are drained first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPriority {
    High,
    Low,
}

/// One queued similarity computation.
#[derive(Debug, Clone)]
pub struct SimilarityJob {
    pub decision_id: String,
    pub priority: JobPriority,
    pub created_at: DateTime<Utc>,
    pub job_id: String,
}

impl SimilarityJob {
    fn new(decision_id: String, priority: JobPriority) -> Self {
        Self {
            decision_id,
            priority,
            created_at: Utc::now(),
            job_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

/// Snapshot of worker state and counters.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStats {
    pub running: bool,
    pub high_pending: usize,
    pub low_pending: usize,
    pub active_jobs: usize,
    pub jobs_processed: u64,
    pub jobs_failed: u64,
    pub similarities_computed: u64,
    pub max_queue_size: usize,
    pub batch_size: usize,
    pub similarity_threshold: f64,
}

struct WorkerShared {
    store: Arc<GraphStore>,
    detector: Arc<SimilarityDetector>,
    running: AtomicBool,
    high_pending: AtomicUsize,
    low_pending: AtomicUsize,
    active: Mutex<Option<String>>,
    jobs_processed: AtomicU64,
    jobs_failed: AtomicU64,
    similarities_computed: AtomicU64,
    batch_size: usize,
    threshold: f64,
}

/// Background worker for similarity edge computation.
pub struct SimilarityWorker {
    shared: Arc<WorkerShared>,
    high_tx: mpsc::Sender<SimilarityJob>,
    low_tx: mpsc::Sender<SimilarityJob>,
    receivers: Mutex<Option<(mpsc::Receiver<SimilarityJob>, mpsc::Receiver<SimilarityJob>)>>,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    max_queue_size: usize,
}

impl SimilarityWorker {
    pub fn new(
        store: Arc<GraphStore>,
        detector: Arc<SimilarityDetector>,
        max_queue_size: usize,
        batch_size: usize,
        threshold: f64,
    ) -> Self {
        let (high_tx, high_rx) = mpsc::channel(max_queue_size.max(1));
        let (low_tx, low_rx) = mpsc::channel(max_queue_size.max(1));
        info!(
            max_queue_size,
            batch_size, threshold, "Initialized similarity worker"
        );
        Self {
            shared: Arc::new(WorkerShared {
                store,
                detector,
                running: AtomicBool::new(false),
                high_pending: AtomicUsize::new(0),
                low_pending: AtomicUsize::new(0),
                active: Mutex::new(None),
                jobs_processed: AtomicU64::new(0),
                jobs_failed: AtomicU64::new(0),
                similarities_computed: AtomicU64::new(0),
                batch_size,
                threshold,
            }),
            high_tx,
            low_tx,
            receivers: Mutex::new(Some((high_rx, low_rx))),
            task: Mutex::new(None),
            max_queue_size,
        }
    }

    /// Spawn the processing task. Idempotent.
    pub async fn start(&self) {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            warn!("Similarity worker already running, ignoring start()");
            return;
        }
        let Some((high_rx, low_rx)) = self.receivers.lock().await.take() else {
            warn!("Similarity worker was already started once; restart not supported");
            return;
        };
        let shared = self.shared.clone();
        let handle = tokio::spawn(process_queue(shared, high_rx, low_rx));
        *self.task.lock().await = Some(handle);
        info!("Similarity worker started");
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Queue a similarity computation for a decision.
    ///
    /// Queue capacity is reserved immediately (so a full queue surfaces
    /// as `QueueFull` to the caller, who may fall back to synchronous
    /// computation); the job itself lands on the queue after
    /// `delay_seconds`, leaving a window for write batching.
    pub fn enqueue(
        &self,
        decision_id: &str,
        priority: JobPriority,
        delay_seconds: u64,
    ) -> Result<()> {
        if !self.is_running() {
            warn!(
                decision_id,
                "Attempted to enqueue job but worker is not running"
            );
            return Err(CounselError::Worker("worker is not running".into()));
        }

        let (tx, pending) = match priority {
            JobPriority::High => (&self.high_tx, &self.shared.high_pending),
            JobPriority::Low => (&self.low_tx, &self.shared.low_pending),
        };

        let permit = tx
            .clone()
            .try_reserve_owned()
            .map_err(|_| CounselError::QueueFull)?;
        pending.fetch_add(1, Ordering::SeqCst);

        let job = SimilarityJob::new(decision_id.to_string(), priority);
        debug!(job_id = %job.job_id, decision_id, ?priority, "Enqueued similarity job");

        if delay_seconds == 0 {
            permit.send(job);
        } else {
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(delay_seconds)).await;
                permit.send(job);
            });
        }
        Ok(())
    }

    /// Graceful shutdown: stop accepting work, wait for the active job
    /// up to `timeout`, then cancel the consumer. Jobs still queued are
    /// discarded with a warning; they can be recomputed later.
    pub async fn stop(&self, timeout: Duration) {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            warn!("Similarity worker not running, ignoring stop()");
            return;
        }
        info!("Stopping similarity worker...");

        let deadline = tokio::time::Instant::now() + timeout;
        while self.shared.active.lock().await.is_some() {
            if tokio::time::Instant::now() >= deadline {
                warn!("Timeout reached with a similarity job still active");
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        if let Some(handle) = self.task.lock().await.take() {
            handle.abort();
            let _ = handle.await;
        }

        let high = self.shared.high_pending.load(Ordering::SeqCst);
        let low = self.shared.low_pending.load(Ordering::SeqCst);
        if high + low > 0 {
            warn!(
                high_pending = high,
                low_pending = low,
                "Similarity worker stopped with jobs still pending"
            );
        }
        info!(
            processed = self.shared.jobs_processed.load(Ordering::SeqCst),
            failed = self.shared.jobs_failed.load(Ordering::SeqCst),
            "Similarity worker stopped"
        );
    }

    pub async fn stats(&self) -> WorkerStats {
        WorkerStats {
            running: self.is_running(),
            high_pending: self.shared.high_pending.load(Ordering::SeqCst),
            low_pending: self.shared.low_pending.load(Ordering::SeqCst),
            active_jobs: usize::from(self.shared.active.lock().await.is_some()),
            jobs_processed: self.shared.jobs_processed.load(Ordering::SeqCst),
            jobs_failed: self.shared.jobs_failed.load(Ordering::SeqCst),
            similarities_computed: self.shared.similarities_computed.load(Ordering::SeqCst),
            max_queue_size: self.max_queue_size,
            batch_size: self.shared.batch_size,
            similarity_threshold: self.shared.threshold,
        }
    }
}

/// Main consumer loop: high-priority first, then low, else idle sleep.
async fn process_queue(
    shared: Arc<WorkerShared>,
    mut high_rx: mpsc::Receiver<SimilarityJob>,
    mut low_rx: mpsc::Receiver<SimilarityJob>,
) {
    info!("Similarity worker loop started");
    while shared.running.load(Ordering::SeqCst) {
        let job = match high_rx.try_recv() {
            Ok(job) => {
                shared.high_pending.fetch_sub(1, Ordering::SeqCst);
                Some(job)
            }
            Err(_) => match low_rx.try_recv() {
                Ok(job) => {
                    shared.low_pending.fetch_sub(1, Ordering::SeqCst);
                    Some(job)
                }
                Err(_) => None,
            },
        };

        let Some(job) = job else {
            tokio::time::sleep(IDLE_SLEEP).await;
            continue;
        };

        *shared.active.lock().await = Some(job.job_id.clone());
        match compute_similarities(&shared, &job.decision_id).await {
            Ok(stored) => {
                shared.jobs_processed.fetch_add(1, Ordering::SeqCst);
                shared
                    .similarities_computed
                    .fetch_add(stored, Ordering::SeqCst);
                debug!(job_id = %job.job_id, stored, "Similarity job completed");
            }
            Err(e) => {
                shared.jobs_failed.fetch_add(1, Ordering::SeqCst);
                error!(job_id = %job.job_id, decision_id = %job.decision_id, "Similarity job failed: {e}");
                *shared.active.lock().await = None;
                tokio::time::sleep(ERROR_BACKOFF).await;
                continue;
            }
        }
        *shared.active.lock().await = None;
    }
    info!("Similarity worker loop exited");
}

/// Compare one decision's question against the recent window and upsert
/// edges at or above the threshold. A single candidate failure does not
/// abort the job.
async fn compute_similarities(shared: &WorkerShared, decision_id: &str) -> Result<u64> {
    let decision = shared
        .store
        .get_decision(decision_id)
        .await?
        .ok_or_else(|| CounselError::Worker(format!("decision {decision_id} not found")))?;

    // +1 accounts for the decision itself appearing in the window
    let recent = shared
        .store
        .list_decisions(shared.batch_size + 1, 0)
        .await?;

    let mut stored = 0u64;
    for existing in &recent {
        if existing.id == decision_id {
            continue;
        }
        let score = shared
            .detector
            .compute(&decision.question, &existing.question)
            .await;
        if score < shared.threshold {
            continue;
        }
        let edge = DecisionSimilarity {
            source_id: decision_id.to_string(),
            target_id: existing.id.clone(),
            similarity_score: score.clamp(0.0, 1.0),
            computed_at: Utc::now(),
        };
        match shared.store.save_similarity(edge).await {
            Ok(()) => stored += 1,
            Err(e) => {
                error!(
                    target_id = %existing.id,
                    "Error storing similarity edge (continuing): {e}"
                );
            }
        }
    }

    info!(
        decision_id,
        stored,
        compared = recent.len().saturating_sub(1),
        "Computed similarities"
    );
    Ok(stored)
}

/// Synchronous (inline) variant used when no worker is available or the
/// queue is full.
pub async fn compute_similarities_inline(
    store: &Arc<GraphStore>,
    detector: &Arc<SimilarityDetector>,
    decision_id: &str,
    batch_size: usize,
    threshold: f64,
) -> Result<u64> {
    let shared = WorkerShared {
        store: store.clone(),
        detector: detector.clone(),
        running: AtomicBool::new(false),
        high_pending: AtomicUsize::new(0),
        low_pending: AtomicUsize::new(0),
        active: Mutex::new(None),
        jobs_processed: AtomicU64::new(0),
        jobs_failed: AtomicU64::new(0),
        similarities_computed: AtomicU64::new(0),
        batch_size,
        threshold,
    };
    compute_similarities(&shared, decision_id).await
}
