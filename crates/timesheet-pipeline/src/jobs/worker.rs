use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use super::domain::JobId;
use super::registry::{JobOutcome, JobRegistry};
use crate::error::{scope_label, PipelineError};
use crate::masking::{AttributeStore, MaskedRecord, RulesetStore};
use crate::pipeline::{CountyExtractionOrchestrator, ExtractionPlan, TimesheetRepository};
use crate::reports::{ExtractionSummary, ReportAssembler};

/// Executes one job, chunk by chunk, on a blocking thread.
pub(crate) struct ChunkRunner<R, S, A> {
    pub(crate) orchestrator: Arc<CountyExtractionOrchestrator<R, S, A>>,
    pub(crate) assembler: ReportAssembler,
    pub(crate) registry: JobRegistry,
    pub(crate) max_records: usize,
}

impl<R, S, A> ChunkRunner<R, S, A>
where
    R: TimesheetRepository + 'static,
    S: RulesetStore + 'static,
    A: AttributeStore + 'static,
{
    pub(crate) fn run(&self, id: &JobId, plan: &ExtractionPlan, chunk_size: usize) -> JobOutcome {
        match self.execute(id, plan, chunk_size) {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(
                    job_id = %id,
                    role = %plan.identity.role,
                    county = scope_label(plan.identity.county.as_ref()),
                    error = %err,
                    "report job chunk failed"
                );
                JobOutcome::Failed(err.to_string())
            }
        }
    }

    fn execute(
        &self,
        id: &JobId,
        plan: &ExtractionPlan,
        chunk_size: usize,
    ) -> Result<JobOutcome, PipelineError> {
        let chunk_size = chunk_size.max(1);
        let mut total = self.orchestrator.count(plan)?.saturating_sub(plan.query.offset);
        total = total.min(self.max_records);
        if let Some(limit) = plan.query.limit {
            total = total.min(limit);
        }
        let total_chunks = total.div_ceil(chunk_size).max(1);

        let ruleset = self.orchestrator.resolve_ruleset(plan)?;
        let mut summary = ExtractionSummary::default();
        let mut records: Vec<MaskedRecord> = Vec::with_capacity(total);
        let mut processed = 0;

        for index in 0..total_chunks {
            if self.registry.cancel_requested(id) {
                debug!(job_id = %id, chunk = index, "cancellation observed");
                return Ok(JobOutcome::Cancelled);
            }

            let start = index * chunk_size;
            let take = chunk_size.min(total.saturating_sub(start));
            if take > 0 {
                let page = plan.query.page(plan.query.offset + start, take);
                let fetched = self.orchestrator.fetch_scoped(plan, &page)?;
                let masked = self.orchestrator.mask(&ruleset, &fetched.records);
                summary.absorb(&ruleset, &masked);
                processed += fetched.records.len();
                records.extend(masked);
            }

            let progress = ((index + 1) * 100 / total_chunks) as u8;
            self.registry.report_progress(id, processed, total, progress);
            debug!(
                job_id = %id,
                chunk = index + 1,
                total_chunks,
                processed,
                "report chunk processed"
            );
        }

        if self.registry.cancel_requested(id) {
            return Ok(JobOutcome::Cancelled);
        }

        let payload = self.assembler.assemble(&ruleset, records, Utc::now());
        if payload.summary != summary {
            return Err(PipelineError::Assembly(format!(
                "assembled summary for job {id} disagrees with chunk totals"
            )));
        }
        Ok(JobOutcome::Completed(Arc::new(payload)))
    }
}
