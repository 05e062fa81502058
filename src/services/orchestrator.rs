//! Job orchestration over an elastic worker pool.
//!
//! Jobs wait in a single bounded priority queue and are consumed by
//! `min_workers..=max_workers` tokio tasks. Each worker runs one job end to
//! end (score, track, optional shadow comparison) before taking the next.
//!
//! # Job lifecycle
//! `queued -> running -> {completed | failed | cancelled}`. A queued job can
//! be cancelled directly; a running job only observes cancellation between
//! steps. Every status change is published on a per-job `watch` channel so
//! callers can await completion.
//!
//! # Pool elasticity
//! A submission that pushes the queue past `high_water_mark` spawns an extra
//! worker (up to `max_workers`). A worker above `min_workers` that stays idle
//! for `idle_grace_ms` exits.
//!
//! # Retention
//! Finished job records stay queryable until `job_retention` newer jobs
//! have finished; after that `status` and `wait` report `JobNotFound`.
//! A panic anywhere in a job fails that job and leaves the worker running.

use dashmap::DashMap;
use futures::FutureExt;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, watch, Notify};
use tokio::task::JoinHandle;
use tracing::instrument;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    AnalysisRequest, Config, ConfidenceResult, Dimension, EngineEvent, EventPayload, JobId,
    JobQueue, JobRecord, JobResult, JobStatus, OrchestratorConfig, ShadowMetrics,
};
use crate::domain::ports::{EmbeddingProvider, HistoryStore, InMemoryHistoryStore, NullEmbeddingProvider};
use crate::services::convergence_detector::ConvergenceDetector;
use crate::services::event_bus::{EventBus, EventBusConfig};
use crate::services::scorer::{panic_message, FeedbackSample, ResultCache, Scorer, WeightOptimizer};
use crate::services::shadow_controller::ShadowController;
use crate::services::tracker::Tracker;
use crate::services::weight_store::{WeightSnapshot, WeightStore};

#[derive(Debug)]
struct QueuedJob {
    id: JobId,
    request: AnalysisRequest,
}

struct JobSlot {
    cancel_requested: AtomicBool,
    record: watch::Sender<JobRecord>,
}

enum Outcome {
    Completed(JobResult),
    Cancelled,
    Failed(DomainError),
}

/// Builder wiring the engine components from a [`Config`].
pub struct OrchestratorBuilder {
    config: Config,
    store: Option<Arc<dyn HistoryStore>>,
    embeddings: Option<Arc<dyn EmbeddingProvider>>,
    scorer: Option<Scorer>,
    events: Option<Arc<EventBus>>,
}

impl OrchestratorBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            store: None,
            embeddings: None,
            scorer: None,
            events: None,
        }
    }

    /// History persistence (defaults to in-memory).
    pub fn with_store(mut self, store: Arc<dyn HistoryStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Embedding provider for the built-in semantic scorer.
    pub fn with_embeddings(mut self, embeddings: Arc<dyn EmbeddingProvider>) -> Self {
        self.embeddings = Some(embeddings);
        self
    }

    /// Use a preassembled scorer instead of the built-in one.
    pub fn with_scorer(mut self, scorer: Scorer) -> Self {
        self.scorer = Some(scorer);
        self
    }

    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Assemble the components and spawn `min_workers` workers.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self) -> Orchestrator {
        let config = self.config;
        let events = self.events.unwrap_or_else(|| {
            Arc::new(EventBus::new(EventBusConfig {
                channel_capacity: config.orchestrator.event_channel_capacity,
            }))
        });
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryHistoryStore::new()));
        let scorer = self.scorer.unwrap_or_else(|| {
            let embeddings = self
                .embeddings
                .unwrap_or_else(|| Arc::new(NullEmbeddingProvider::new()));
            Scorer::new(config.scoring.clone(), embeddings)
        });

        let tracker = Tracker::new(
            config.tracker.clone(),
            ConvergenceDetector::new(config.convergence.clone()),
            store,
            Arc::clone(&events),
        );
        let shadow = ShadowController::new(config.shadow.clone(), Arc::clone(&events));

        let inner = Arc::new(Inner {
            pool: config.orchestrator.clone(),
            max_consecutive_timeouts: config.scoring.max_consecutive_timeouts,
            timeout_ms: config.scoring.per_call_timeout_ms,
            weights: WeightStore::new(config.scoring.default_weights),
            optimizer: WeightOptimizer::new(config.optimizer.clone()),
            cache: ResultCache::new(config.scoring.cache_ttl(), config.scoring.cache_capacity),
            scorer,
            tracker,
            shadow,
            events,
            queue: Mutex::new(QueueState {
                jobs: JobQueue::bounded(config.orchestrator.max_queue_depth),
                shutting_down: false,
            }),
            jobs: DashMap::new(),
            finished: Mutex::new(VecDeque::new()),
            wake: Notify::new(),
            handles: Mutex::new(Vec::new()),
            worker_count: AtomicUsize::new(0),
            next_worker_id: AtomicUsize::new(0),
            timeout_streaks: Mutex::new([0; 4]),
        });

        let min_workers = inner.pool.min_workers.max(1);
        for _ in 0..min_workers {
            inner.worker_count.fetch_add(1, Ordering::SeqCst);
            inner.spawn_worker();
        }
        tracing::info!(
            workers = min_workers,
            max_workers = inner.pool.max_workers,
            max_queue_depth = inner.pool.max_queue_depth,
            "Orchestrator started"
        );

        Orchestrator { inner }
    }
}

struct QueueState {
    jobs: JobQueue<QueuedJob>,
    shutting_down: bool,
}

struct Inner {
    pool: OrchestratorConfig,
    max_consecutive_timeouts: u32,
    timeout_ms: u64,
    scorer: Scorer,
    tracker: Tracker,
    shadow: ShadowController,
    weights: WeightStore,
    optimizer: WeightOptimizer,
    cache: ResultCache,
    events: Arc<EventBus>,
    queue: Mutex<QueueState>,
    jobs: DashMap<JobId, Arc<JobSlot>>,
    /// Finished job ids, oldest first, bounded by `job_retention`.
    finished: Mutex<VecDeque<JobId>>,
    wake: Notify,
    handles: Mutex<Vec<JoinHandle<()>>>,
    worker_count: AtomicUsize,
    next_worker_id: AtomicUsize,
    /// Consecutive jobs on which each dimension timed out.
    timeout_streaks: Mutex<[u32; 4]>,
}

/// Cloneable handle to a running engine.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn builder(config: Config) -> OrchestratorBuilder {
        OrchestratorBuilder::new(config)
    }

    /// Start with in-memory history and no embedding provider.
    pub fn start(config: Config) -> Self {
        OrchestratorBuilder::new(config).start()
    }

    /// Queue a request.
    ///
    /// Fails synchronously with `InvalidInput`, `QueueFull` (queue left
    /// unchanged) or `ShuttingDown`.
    #[instrument(skip(self, request), fields(entity_id = %request.entity_id()), err)]
    pub fn submit(&self, request: AnalysisRequest) -> DomainResult<JobId> {
        request.validate()?;

        let id = JobId::new();
        let priority = request.priority;
        let (record, _) = watch::channel(JobRecord::new(id, &request));
        let slot = Arc::new(JobSlot {
            cancel_requested: AtomicBool::new(false),
            record,
        });

        let depth = {
            let mut queue = self.inner.lock_queue();
            if queue.shutting_down {
                return Err(DomainError::ShuttingDown);
            }
            // Registered before enqueue so a worker always finds the slot.
            self.inner.jobs.insert(id, slot);
            if let Err(err) = queue.jobs.try_enqueue(QueuedJob { id, request }, priority) {
                self.inner.jobs.remove(&id);
                tracing::warn!(error = %err, "Rejected submission");
                return Err(err);
            }
            queue.jobs.len()
        };

        tracing::debug!(job_id = %id, priority, depth, "Job queued");
        self.inner.wake.notify_one();
        self.inner.maybe_scale_up(depth);
        Ok(id)
    }

    /// Cancel a job.
    ///
    /// A queued job is removed and cancelled at once; a running job is
    /// flagged and stops at its next step boundary. Cancelling a finished
    /// job is an `InvalidStateTransition`.
    pub fn cancel(&self, job_id: JobId) -> DomainResult<()> {
        let slot = self.inner.slot(job_id)?;

        let removed = self
            .inner
            .lock_queue()
            .jobs
            .remove_first(|job| job.id == job_id);
        if removed.is_some() {
            self.inner.finish(job_id, &slot, Outcome::Cancelled);
            return Ok(());
        }

        let status = slot.record.borrow().status;
        if status.is_terminal() {
            return Err(DomainError::InvalidStateTransition {
                from: status,
                to: JobStatus::Cancelled,
            });
        }
        slot.cancel_requested.store(true, Ordering::SeqCst);
        tracing::debug!(job_id = %job_id, "Cancellation requested for running job");
        Ok(())
    }

    pub fn status(&self, job_id: JobId) -> DomainResult<JobRecord> {
        let slot = self.inner.slot(job_id)?;
        let record = slot.record.borrow().clone();
        Ok(record)
    }

    /// Wait until the job reaches a terminal state.
    pub async fn wait(&self, job_id: JobId) -> DomainResult<JobRecord> {
        let mut rx = self.inner.slot(job_id)?.record.subscribe();
        let record = rx
            .wait_for(|record| record.status.is_terminal())
            .await
            .map_err(|_| DomainError::ShuttingDown)?
            .clone();
        Ok(record)
    }

    pub fn queue_depth(&self) -> usize {
        self.inner.lock_queue().jobs.len()
    }

    pub fn worker_count(&self) -> usize {
        self.inner.worker_count.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.inner.events.subscribe()
    }

    pub fn events(&self) -> Arc<EventBus> {
        Arc::clone(&self.inner.events)
    }

    pub fn tracker(&self) -> &Tracker {
        &self.inner.tracker
    }

    pub fn shadow(&self) -> &ShadowController {
        &self.inner.shadow
    }

    pub fn shadow_metrics(&self) -> ShadowMetrics {
        self.inner.shadow.metrics()
    }

    pub fn weights(&self) -> Arc<WeightSnapshot> {
        self.inner.weights.snapshot()
    }

    /// Run one optimizer step over `feedback` and publish new weights.
    pub fn apply_feedback(&self, feedback: &[FeedbackSample]) -> DomainResult<Arc<WeightSnapshot>> {
        self.inner
            .weights
            .apply_feedback(&self.inner.optimizer, feedback)
    }

    /// Latest completed result for the entity, if still fresh.
    pub fn cached_result(&self, entity_id: &str) -> Option<ConfidenceResult> {
        self.inner.cache.get(entity_id, self.inner.weights.version())
    }

    /// Stop accepting work, cancel queued jobs, let running jobs finish and
    /// join every worker.
    pub async fn shutdown(&self) {
        let drained = {
            let mut queue = self.inner.lock_queue();
            queue.shutting_down = true;
            queue.jobs.drain()
        };
        tracing::info!(cancelled = drained.len(), "Orchestrator shutting down");

        for job in drained {
            if let Ok(slot) = self.inner.slot(job.id) {
                self.inner.finish(job.id, &slot, Outcome::Cancelled);
            }
        }

        self.inner.wake.notify_waiters();
        loop {
            let handles = std::mem::take(&mut *self.inner.lock_handles());
            if handles.is_empty() {
                break;
            }
            for handle in handles {
                if let Err(err) = handle.await {
                    tracing::error!(error = %err, "Worker task ended abnormally");
                }
            }
        }
        tracing::info!("Orchestrator stopped");
    }
}

impl Inner {
    fn lock_queue(&self) -> MutexGuard<'_, QueueState> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_handles(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn slot(&self, job_id: JobId) -> DomainResult<Arc<JobSlot>> {
        self.jobs
            .get(&job_id)
            .map(|slot| Arc::clone(slot.value()))
            .ok_or(DomainError::JobNotFound(job_id))
    }

    /// Caller must already have counted the worker in `worker_count`.
    fn spawn_worker(self: &Arc<Self>) {
        let worker_id = self.next_worker_id.fetch_add(1, Ordering::SeqCst);
        let inner = Arc::clone(self);
        let handle = tokio::spawn(async move { inner.worker_loop(worker_id).await });
        self.lock_handles().push(handle);
    }

    fn maybe_scale_up(self: &Arc<Self>, depth: usize) {
        if depth <= self.pool.high_water_mark {
            return;
        }
        let max = self.pool.max_workers.max(1);
        let grown = self
            .worker_count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < max).then_some(n + 1));
        if let Ok(previous) = grown {
            self.spawn_worker();
            tracing::info!(workers = previous + 1, depth, "Scaled worker pool up");
            self.events.publish(EventPayload::WorkerPoolResized {
                workers: previous + 1,
            });
        }
    }

    /// Leave the pool if it is above its minimum size.
    fn try_retire(&self) -> bool {
        let min = self.pool.min_workers.max(1);
        let shrunk = self
            .worker_count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n > min).then(|| n - 1));
        if let Ok(previous) = shrunk {
            tracing::info!(workers = previous - 1, "Idle worker retired");
            self.events.publish(EventPayload::WorkerPoolResized {
                workers: previous - 1,
            });
            return true;
        }
        false
    }

    async fn worker_loop(self: Arc<Self>, worker_id: usize) {
        tracing::debug!(worker_id, "Worker started");
        let idle_grace = self.pool.idle_grace();

        loop {
            let wake = self.wake.notified();
            tokio::pin!(wake);
            wake.as_mut().enable();

            let next = {
                let mut queue = self.lock_queue();
                match queue.jobs.dequeue() {
                    Some(job) => Some(job),
                    None if queue.shutting_down => {
                        drop(queue);
                        self.worker_count.fetch_sub(1, Ordering::SeqCst);
                        break;
                    }
                    None => None,
                }
            };

            match next {
                Some(job) => self.run_job(job).await,
                None => {
                    if tokio::time::timeout(idle_grace, wake).await.is_err() && self.try_retire() {
                        break;
                    }
                }
            }
        }
        tracing::debug!(worker_id, "Worker stopped");
    }

    #[instrument(skip(self, job), fields(job_id = %job.id, entity_id = %job.request.entity_id()))]
    async fn run_job(&self, job: QueuedJob) {
        let Ok(slot) = self.slot(job.id) else {
            tracing::warn!("Dequeued job has no record");
            return;
        };

        let mut started = true;
        slot.record.send_modify(|record| {
            if let Err(err) = record.transition_to(JobStatus::Running) {
                tracing::warn!(error = %err, "Skipping job that cannot start");
                started = false;
            }
        });
        if !started {
            return;
        }

        let outcome = AssertUnwindSafe(self.execute(&job.request, &slot))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                let message = panic_message(panic.as_ref());
                tracing::error!(panic = %message, "Job panicked");
                Outcome::Failed(DomainError::JobPanicked(message))
            });
        self.finish(job.id, &slot, outcome);
    }

    async fn execute(&self, request: &AnalysisRequest, slot: &JobSlot) -> Outcome {
        let cancelled = || slot.cancel_requested.load(Ordering::SeqCst);
        if cancelled() {
            return Outcome::Cancelled;
        }

        let entity_id = request.entity_id();
        let snapshot = self.weights.snapshot();
        let mut confidence = match self.scorer.score(&request.input, &snapshot.weights).await {
            Ok(confidence) => confidence,
            Err(err) => return Outcome::Failed(err),
        };
        confidence.weights_version = snapshot.version;

        if let Err(err) = self.check_timeout_streaks(&confidence) {
            return Outcome::Failed(err);
        }
        if cancelled() {
            return Outcome::Cancelled;
        }

        let tracked = match self.tracker.record(entity_id, confidence).await {
            Ok(tracked) => tracked,
            Err(err) => return Outcome::Failed(err),
        };
        if cancelled() {
            return Outcome::Cancelled;
        }

        let shadow = request
            .baseline_score
            .map(|baseline| self.shadow.maybe_compare(entity_id, &tracked.result, baseline));

        self.cache.insert(tracked.result.clone());
        Outcome::Completed(JobResult {
            confidence: tracked.result,
            convergence: tracked.convergence,
            shadow,
        })
    }

    /// Fail once a dimension has timed out on too many consecutive jobs.
    fn check_timeout_streaks(&self, confidence: &ConfidenceResult) -> DomainResult<()> {
        let mut streaks = self
            .timeout_streaks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let limit = self.max_consecutive_timeouts.max(1);

        let mut exhausted = None;
        for dimension in Dimension::ALL {
            let streak = &mut streaks[dimension.index()];
            if confidence.timed_out(dimension) {
                *streak += 1;
                if *streak >= limit && exhausted.is_none() {
                    exhausted = Some(dimension);
                }
            } else {
                *streak = 0;
            }
        }

        match exhausted {
            Some(dimension) => {
                streaks[dimension.index()] = 0;
                Err(DomainError::Timeout {
                    operation: format!("{dimension} scoring ({limit} consecutive timeouts)"),
                    timeout_ms: self.timeout_ms,
                })
            }
            None => Ok(()),
        }
    }

    fn finish(&self, job_id: JobId, slot: &JobSlot, outcome: Outcome) {
        let (status, payload) = match &outcome {
            Outcome::Completed(result) => (
                JobStatus::Completed,
                EventPayload::JobCompleted {
                    job_id,
                    entity_id: result.confidence.entity_id.clone(),
                    overall: result.confidence.overall,
                },
            ),
            Outcome::Cancelled => (
                JobStatus::Cancelled,
                EventPayload::JobCancelled {
                    job_id,
                    entity_id: slot.record.borrow().entity_id.clone(),
                },
            ),
            Outcome::Failed(err) => (
                JobStatus::Failed,
                EventPayload::JobFailed {
                    job_id,
                    entity_id: slot.record.borrow().entity_id.clone(),
                    error: err.to_string(),
                },
            ),
        };

        let mut applied = false;
        slot.record.send_modify(|record| {
            if let Err(err) = record.transition_to(status) {
                tracing::warn!(job_id = %job_id, error = %err, "Dropping late job outcome");
                return;
            }
            applied = true;
            match outcome {
                Outcome::Completed(result) => record.result = Some(result),
                Outcome::Failed(err) => record.error = Some(err.to_string()),
                Outcome::Cancelled => {}
            }
        });
        if !applied {
            return;
        }

        match status {
            JobStatus::Failed => tracing::warn!(job_id = %job_id, "Job failed"),
            _ => tracing::debug!(job_id = %job_id, status = %status, "Job finished"),
        }
        self.events.publish(payload);
        self.retain_finished(job_id);
    }

    /// Drop the oldest finished records beyond `job_retention`.
    fn retain_finished(&self, job_id: JobId) {
        let mut finished = self.finished.lock().unwrap_or_else(PoisonError::into_inner);
        finished.push_back(job_id);
        let limit = self.pool.job_retention.max(1);
        while finished.len() > limit {
            if let Some(expired) = finished.pop_front() {
                self.jobs.remove(&expired);
            }
        }
    }
}
