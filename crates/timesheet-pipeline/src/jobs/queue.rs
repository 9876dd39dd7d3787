use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::domain::{CancelOutcome, Job, JobId, JobStatus, JobStatusView, ReportJobRequest};
use super::registry::{JobEntry, JobOutcome, JobRegistry};
use super::worker::ChunkRunner;
use crate::access::{CallerIdentity, TokenClaims};
use crate::config::PipelineConfig;
use crate::error::{scope_label, PipelineError};
use crate::masking::{AttributeStore, RulesetStore};
use crate::pipeline::{CountyExtractionOrchestrator, ExtractionRequest, TimesheetRepository};
use crate::reports::{ReportAssembler, ReportPayload};

/// Fresh ids tried before queueing gives up on a collision streak.
const ID_ATTEMPTS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobSettings {
    pub default_chunk_size: usize,
    pub max_chunk_size: usize,
    /// Records read per job, whatever the query matches.
    pub max_records: usize,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for JobSettings {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            default_chunk_size: config.default_chunk_size,
            max_chunk_size: config.max_chunk_size,
            max_records: config.job_max_records,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
struct PendingJob {
    priority: i32,
    sequence: u64,
    id: JobId,
}

// Higher priority first, then submission order.
impl Ord for PendingJob {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for PendingJob {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct QueueInner<R, S, A> {
    orchestrator: Arc<CountyExtractionOrchestrator<R, S, A>>,
    assembler: ReportAssembler,
    registry: JobRegistry,
    pending: Mutex<BinaryHeap<PendingJob>>,
    wakeup: Notify,
    shutdown: watch::Sender<bool>,
    sequence: AtomicU64,
    settings: JobSettings,
}

/// Asynchronous, cancellable report jobs over the extraction pipeline.
///
/// Each job is processed by exactly one worker. Progress and status live in
/// the job registry, whose single owner task applies every change.
pub struct JobQueue<R, S, A> {
    inner: Arc<QueueInner<R, S, A>>,
}

impl<R, S, A> Clone for JobQueue<R, S, A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R, S, A> JobQueue<R, S, A>
where
    R: TimesheetRepository + 'static,
    S: RulesetStore + 'static,
    A: AttributeStore + 'static,
{
    /// Must be called from within a Tokio runtime.
    pub fn new(
        orchestrator: Arc<CountyExtractionOrchestrator<R, S, A>>,
        settings: JobSettings,
    ) -> Self {
        // A chunk larger than one fetch would silently skip records.
        let fetch_max = orchestrator.fetch_limits().max_limit;
        let max_chunk_size = settings.max_chunk_size.clamp(1, fetch_max);
        let settings = JobSettings {
            max_chunk_size,
            default_chunk_size: settings.default_chunk_size.clamp(1, max_chunk_size),
            max_records: settings.max_records.max(1),
        };
        let (shutdown, _) = watch::channel(false);

        Self {
            inner: Arc::new(QueueInner {
                orchestrator,
                assembler: ReportAssembler,
                registry: JobRegistry::spawn(),
                pending: Mutex::new(BinaryHeap::new()),
                wakeup: Notify::new(),
                shutdown,
                sequence: AtomicU64::new(0),
                settings,
            }),
        }
    }

    pub fn settings(&self) -> JobSettings {
        self.inner.settings
    }

    pub fn orchestrator(&self) -> &Arc<CountyExtractionOrchestrator<R, S, A>> {
        &self.inner.orchestrator
    }

    /// Validates the caller and request, records a `QUEUED` job, and wakes a
    /// worker. Nothing is fetched here.
    pub async fn queue(
        &self,
        claims: &TokenClaims,
        request: ReportJobRequest,
    ) -> Result<JobId, PipelineError> {
        let orchestrator = &self.inner.orchestrator;
        let identity = orchestrator.identify(claims)?;

        if let Some(requested) = request.role {
            if requested != identity.role {
                warn!(
                    requested = %requested,
                    resolved = %identity.role,
                    "job request role ignored in favour of token role"
                );
            }
        }

        let chunk_size = self.chunk_size(request.chunk_size)?;
        let extraction = ExtractionRequest {
            report_type: request.report_type,
            date_range: request.date_range,
            filters: request.filters,
        };
        let plan = orchestrator.plan(&identity, &extraction)?;

        let created_at = Utc::now();
        let mut registered = None;
        for _ in 0..ID_ATTEMPTS {
            let entry = JobEntry {
                job: Job::new(JobId::generate(), &plan, chunk_size, request.priority, created_at),
                plan: plan.clone(),
                result: None,
            };
            let job = entry.job.clone();
            if self.inner.registry.register(entry).await? {
                registered = Some(job);
                break;
            }
        }
        let job = registered.ok_or(PipelineError::JobIdUnavailable)?;
        let id = job.id.clone();
        info!(
            job_id = %id,
            role = %identity.role,
            county = scope_label(job.county_scope.as_ref()),
            report_type = %job.report_type,
            chunk_size,
            priority = job.priority,
            "report job queued"
        );

        let sequence = self.inner.sequence.fetch_add(1, AtomicOrdering::Relaxed);
        self.inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(PendingJob {
                priority: request.priority,
                sequence,
                id: id.clone(),
            });
        self.inner.wakeup.notify_one();

        Ok(id)
    }

    pub fn status(
        &self,
        caller: &CallerIdentity,
        id: &JobId,
    ) -> Result<JobStatusView, PipelineError> {
        self.visible_job(caller, id).map(|job| job.status_view())
    }

    /// The assembled report, only once the job has completed.
    pub fn result(
        &self,
        caller: &CallerIdentity,
        id: &JobId,
    ) -> Result<Arc<ReportPayload>, PipelineError> {
        let job = self.visible_job(caller, id)?;
        let result = self
            .inner
            .registry
            .read(|jobs| jobs.get(id).and_then(|entry| entry.result.clone()));

        match (job.status, result) {
            (JobStatus::Completed, Some(payload)) => Ok(payload),
            (status, _) => Err(PipelineError::JobNotReady {
                job_id: id.clone(),
                status,
            }),
        }
    }

    pub async fn cancel(
        &self,
        caller: &CallerIdentity,
        id: &JobId,
    ) -> Result<CancelOutcome, PipelineError> {
        self.visible_job(caller, id)?;
        self.inner
            .registry
            .cancel(id)
            .await?
            .ok_or_else(|| PipelineError::JobNotFound(id.clone()))
    }

    /// Jobs the caller may see, newest first.
    pub fn list(&self, caller: &CallerIdentity, status: Option<JobStatus>) -> Vec<JobStatusView> {
        let mut jobs: Vec<JobStatusView> = self.inner.registry.read(|jobs| {
            jobs.values()
                .map(|entry| &entry.job)
                .filter(|job| visible_to(caller, job))
                .filter(|job| status.map_or(true, |wanted| job.status == wanted))
                .map(Job::status_view)
                .collect()
        });
        jobs.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.job_id.as_str().cmp(b.job_id.as_str()))
        });
        jobs
    }

    /// Drops finished jobs completed before `older_than`. Global roles only.
    pub async fn purge_terminal(
        &self,
        caller: &CallerIdentity,
        older_than: DateTime<Utc>,
    ) -> Result<usize, PipelineError> {
        if !caller.role.is_global() {
            return Err(PipelineError::Authorization {
                role: caller.role,
                action: "purge report jobs",
            });
        }
        self.inner.registry.purge(older_than).await
    }

    pub fn pending_len(&self) -> usize {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Spawns `count` workers that drain the queue until [`Self::shutdown`].
    pub fn start_workers(&self, count: usize) -> Vec<JoinHandle<()>> {
        (0..count.max(1))
            .map(|worker| {
                let queue = self.clone();
                tokio::spawn(async move { queue.work(worker).await })
            })
            .collect()
    }

    /// Processes everything queued so far on the calling task.
    pub async fn run_pending(&self) -> usize {
        let mut processed = 0;
        while let Some(id) = self.next_pending() {
            self.process(id).await;
            processed += 1;
        }
        processed
    }

    /// Workers finish their current job and exit. Queued jobs stay queued.
    pub fn shutdown(&self) {
        self.inner.shutdown.send_replace(true);
        self.inner.wakeup.notify_waiters();
    }

    async fn work(self, worker: usize) {
        let mut shutdown = self.inner.shutdown.subscribe();
        debug!(worker, "report worker started");
        loop {
            if *shutdown.borrow_and_update() {
                break;
            }
            match self.next_pending() {
                Some(id) => self.process(id).await,
                None => {
                    tokio::select! {
                        _ = self.inner.wakeup.notified() => {}
                        _ = shutdown.changed() => {}
                    }
                }
            }
        }
        debug!(worker, "report worker stopped");
    }

    fn next_pending(&self) -> Option<JobId> {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .map(|pending| pending.id)
    }

    async fn process(&self, id: JobId) {
        let registry = &self.inner.registry;
        let (plan, chunk_size) = match registry.start(&id).await {
            Ok(Some(order)) => order,
            Ok(None) => {
                debug!(job_id = %id, "skipping job that is no longer queued");
                return;
            }
            Err(err) => {
                warn!(job_id = %id, error = %err, "unable to start report job");
                return;
            }
        };

        let runner = ChunkRunner {
            orchestrator: Arc::clone(&self.inner.orchestrator),
            assembler: self.inner.assembler,
            registry: registry.clone(),
            max_records: self.inner.settings.max_records,
        };
        let job_id = id.clone();
        let outcome = tokio::task::spawn_blocking(move || runner.run(&job_id, &plan, chunk_size))
            .await
            .unwrap_or_else(|err| {
                let err = PipelineError::Assembly(format!("worker aborted: {err}"));
                JobOutcome::Failed(err.to_string())
            });

        if let Err(err) = registry.finish(&id, outcome).await {
            warn!(job_id = %id, error = %err, "unable to record report job outcome");
        }
    }

    fn chunk_size(&self, requested: Option<usize>) -> Result<usize, PipelineError> {
        let settings = self.inner.settings;
        match requested {
            None => Ok(settings.default_chunk_size),
            Some(0) => Err(PipelineError::Validation(
                "chunk_size must be greater than zero".to_string(),
            )),
            Some(size) if size > settings.max_chunk_size => Err(PipelineError::Validation(format!(
                "chunk_size {size} exceeds the maximum of {}",
                settings.max_chunk_size
            ))),
            Some(size) => Ok(size),
        }
    }

    fn visible_job(&self, caller: &CallerIdentity, id: &JobId) -> Result<Job, PipelineError> {
        self.inner
            .registry
            .job(id)
            .filter(|job| visible_to(caller, job))
            .ok_or_else(|| PipelineError::JobNotFound(id.clone()))
    }
}

/// Global roles see every job. Everyone else sees jobs scoped to their own
/// county, and self-scoped roles only the jobs they queued.
fn visible_to(caller: &CallerIdentity, job: &Job) -> bool {
    if caller.role.is_global() {
        return true;
    }
    if !caller.can_see_county(job.county_scope.as_ref()) {
        return false;
    }
    !caller.role.is_self_scoped()
        || (job.requested_by.is_some() && job.requested_by == caller.user_id)
}
