use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::domain::{CancelOutcome, Job, JobId, JobStatus};
use crate::error::PipelineError;
use crate::pipeline::ExtractionPlan;
use crate::reports::ReportPayload;

/// Everything the registry keeps per job.
#[derive(Debug, Clone)]
pub(crate) struct JobEntry {
    pub(crate) job: Job,
    pub(crate) plan: ExtractionPlan,
    pub(crate) result: Option<Arc<ReportPayload>>,
}

/// How a worker left a job.
#[derive(Debug)]
pub(crate) enum JobOutcome {
    Completed(Arc<ReportPayload>),
    Failed(String),
    Cancelled,
}

enum JobCommand {
    Register {
        entry: Box<JobEntry>,
        ack: oneshot::Sender<bool>,
    },
    Start {
        id: JobId,
        ack: oneshot::Sender<Option<(ExtractionPlan, usize)>>,
    },
    Progress {
        id: JobId,
        processed: usize,
        total: usize,
        progress: u8,
    },
    Finish {
        id: JobId,
        outcome: JobOutcome,
        ack: oneshot::Sender<()>,
    },
    Cancel {
        id: JobId,
        ack: oneshot::Sender<Option<CancelOutcome>>,
    },
    Purge {
        older_than: DateTime<Utc>,
        ack: oneshot::Sender<usize>,
    },
}

/// Handle to the job table. One spawned task owns every write; reads go
/// through the lock-guarded accessors here and never see a half-applied
/// command.
#[derive(Clone)]
pub(crate) struct JobRegistry {
    commands: mpsc::UnboundedSender<JobCommand>,
    jobs: Arc<RwLock<HashMap<JobId, JobEntry>>>,
}

impl JobRegistry {
    /// Must be called from within a Tokio runtime.
    pub(crate) fn spawn() -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();
        let jobs = Arc::new(RwLock::new(HashMap::new()));
        let owner = RegistryOwner {
            jobs: Arc::clone(&jobs),
        };
        tokio::spawn(owner.run(receiver));
        Self { commands, jobs }
    }

    pub(crate) fn read<T>(&self, f: impl FnOnce(&HashMap<JobId, JobEntry>) -> T) -> T {
        let guard = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    pub(crate) fn job(&self, id: &JobId) -> Option<Job> {
        self.read(|jobs| jobs.get(id).map(|entry| entry.job.clone()))
    }

    pub(crate) fn cancel_requested(&self, id: &JobId) -> bool {
        self.read(|jobs| jobs.get(id).is_some_and(|entry| entry.job.cancel_requested))
    }

    /// Adds a new job. `false` when the id is already taken; the existing
    /// job is left untouched.
    pub(crate) async fn register(&self, entry: JobEntry) -> Result<bool, PipelineError> {
        self.request(|ack| JobCommand::Register {
            entry: Box::new(entry),
            ack,
        })
        .await
    }

    /// Moves a queued job to processing and hands back its plan and chunk
    /// size. `None` when the job is gone or no longer queued.
    pub(crate) async fn start(
        &self,
        id: &JobId,
    ) -> Result<Option<(ExtractionPlan, usize)>, PipelineError> {
        self.request(|ack| JobCommand::Start {
            id: id.clone(),
            ack,
        })
        .await
    }

    /// Fire-and-forget; safe to call from blocking code.
    pub(crate) fn report_progress(&self, id: &JobId, processed: usize, total: usize, progress: u8) {
        let command = JobCommand::Progress {
            id: id.clone(),
            processed,
            total,
            progress,
        };
        if self.commands.send(command).is_err() {
            warn!(job_id = %id, "job registry stopped; progress update dropped");
        }
    }

    pub(crate) async fn finish(&self, id: &JobId, outcome: JobOutcome) -> Result<(), PipelineError> {
        self.request(|ack| JobCommand::Finish {
            id: id.clone(),
            outcome,
            ack,
        })
        .await
    }

    pub(crate) async fn cancel(&self, id: &JobId) -> Result<Option<CancelOutcome>, PipelineError> {
        self.request(|ack| JobCommand::Cancel {
            id: id.clone(),
            ack,
        })
        .await
    }

    pub(crate) async fn purge(&self, older_than: DateTime<Utc>) -> Result<usize, PipelineError> {
        self.request(|ack| JobCommand::Purge { older_than, ack })
            .await
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> JobCommand,
    ) -> Result<T, PipelineError> {
        let (ack, reply) = oneshot::channel();
        self.commands
            .send(command(ack))
            .map_err(|_| PipelineError::QueueClosed)?;
        reply.await.map_err(|_| PipelineError::QueueClosed)
    }
}

struct RegistryOwner {
    jobs: Arc<RwLock<HashMap<JobId, JobEntry>>>,
}

impl RegistryOwner {
    async fn run(self, mut commands: mpsc::UnboundedReceiver<JobCommand>) {
        while let Some(command) = commands.recv().await {
            self.apply(command);
        }
        debug!("job registry stopped");
    }

    fn apply(&self, command: JobCommand) {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        let now = Utc::now();

        match command {
            JobCommand::Register { entry, ack } => {
                let inserted = match jobs.entry(entry.job.id.clone()) {
                    Entry::Occupied(existing) => {
                        warn!(job_id = %existing.key(), "job id already registered");
                        false
                    }
                    Entry::Vacant(slot) => {
                        slot.insert(*entry);
                        true
                    }
                };
                let _ = ack.send(inserted);
            }
            JobCommand::Start { id, ack } => {
                let started = jobs.get_mut(&id).and_then(|entry| {
                    entry
                        .job
                        .transition(JobStatus::Processing, now)
                        .then(|| (entry.plan.clone(), entry.job.chunk_size))
                });
                let _ = ack.send(started);
            }
            JobCommand::Progress {
                id,
                processed,
                total,
                progress,
            } => {
                if let Some(entry) = jobs.get_mut(&id) {
                    if entry.job.status == JobStatus::Processing {
                        entry.job.processed_records = processed;
                        entry.job.total_records = total;
                        entry.job.set_progress(progress);
                    }
                }
            }
            JobCommand::Finish { id, outcome, ack } => {
                if let Some(entry) = jobs.get_mut(&id) {
                    finish(entry, outcome, now);
                }
                let _ = ack.send(());
            }
            JobCommand::Cancel { id, ack } => {
                let outcome = jobs.get_mut(&id).map(|entry| cancel(&mut entry.job, now));
                let _ = ack.send(outcome);
            }
            JobCommand::Purge { older_than, ack } => {
                let before = jobs.len();
                jobs.retain(|_, entry| {
                    !(entry.job.status.is_terminal()
                        && entry
                            .job
                            .completed_at
                            .is_some_and(|completed| completed < older_than))
                });
                let purged = before - jobs.len();
                if purged > 0 {
                    info!(purged, "purged finished report jobs");
                }
                let _ = ack.send(purged);
            }
        }
    }
}

fn finish(entry: &mut JobEntry, outcome: JobOutcome, now: DateTime<Utc>) {
    let job = &mut entry.job;
    match outcome {
        // A cancel that arrived during the last chunk still wins.
        JobOutcome::Completed(_) | JobOutcome::Cancelled if job.cancel_requested => {
            if job.transition(JobStatus::Cancelled, now) {
                info!(job_id = %job.id, progress = job.progress, "report job cancelled");
            }
        }
        JobOutcome::Cancelled => {
            if job.transition(JobStatus::Cancelled, now) {
                info!(job_id = %job.id, progress = job.progress, "report job cancelled");
            }
        }
        JobOutcome::Completed(payload) => {
            if job.transition(JobStatus::Completed, now) {
                info!(
                    job_id = %job.id,
                    role = %job.user_role,
                    records = payload.records.len(),
                    "report job completed"
                );
                entry.result = Some(payload);
            }
        }
        JobOutcome::Failed(message) => {
            if job.transition(JobStatus::Failed, now) {
                warn!(job_id = %job.id, role = %job.user_role, error = %message, "report job failed");
                job.error_message = Some(message);
            }
        }
    }
}

fn cancel(job: &mut Job, now: DateTime<Utc>) -> CancelOutcome {
    match job.status {
        JobStatus::Queued => {
            job.transition(JobStatus::Cancelled, now);
            info!(job_id = %job.id, "queued report job cancelled");
            CancelOutcome::Cancelled
        }
        JobStatus::Processing => {
            job.cancel_requested = true;
            info!(job_id = %job.id, progress = job.progress, "cancellation requested");
            CancelOutcome::CancellationRequested
        }
        status => CancelOutcome::AlreadyFinished(status),
    }
}
