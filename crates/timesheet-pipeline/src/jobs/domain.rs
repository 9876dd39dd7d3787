use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::access::{CountyId, Role};
use crate::pipeline::{DateRange, ExtractionPlan, QueryFilters};

/// Identifier handed back when a report job is queued.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    pub fn generate() -> Self {
        let raw = uuid::Uuid::new_v4().simple().to_string().to_ascii_uppercase();
        Self(format!("JOB_{}", &raw[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub const fn ordered() -> [JobStatus; 5] {
        [
            JobStatus::Queued,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Cancelled,
        ]
    }

    pub const fn label(self) -> &'static str {
        match self {
            JobStatus::Queued => "QUEUED",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::Cancelled => "CANCELLED",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Lifecycle only moves forward; terminal states never change.
    pub const fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (
                JobStatus::Queued,
                JobStatus::Processing | JobStatus::Failed | JobStatus::Cancelled
            ) | (
                JobStatus::Processing,
                JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
            )
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Body of a report job submission. `role` is advisory: the role resolved
/// from the token always wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportJobRequest {
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub report_type: Option<String>,
    #[serde(default)]
    pub date_range: Option<DateRange>,
    #[serde(default)]
    pub chunk_size: Option<usize>,
    #[serde(default)]
    pub priority: i32,
    #[serde(flatten)]
    pub filters: QueryFilters,
}

/// Lifecycle record of one report job. Only the job registry mutates it.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    pub user_role: Role,
    pub county_scope: Option<CountyId>,
    pub report_type: String,
    pub requested_by: Option<String>,
    pub priority: i32,
    pub chunk_size: usize,
    pub total_records: usize,
    pub processed_records: usize,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub cancel_requested: bool,
}

impl Job {
    pub fn new(
        id: JobId,
        plan: &ExtractionPlan,
        chunk_size: usize,
        priority: i32,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            status: JobStatus::Queued,
            progress: 0,
            user_role: plan.identity.role,
            county_scope: plan.query.county_filter.clone(),
            report_type: plan.report_type.clone(),
            requested_by: plan.identity.user_id.clone(),
            priority,
            chunk_size,
            total_records: 0,
            processed_records: 0,
            created_at,
            started_at: None,
            completed_at: None,
            error_message: None,
            cancel_requested: false,
        }
    }

    /// Applies `next` if the lifecycle allows it. Returns whether it did.
    pub fn transition(&mut self, next: JobStatus, at: DateTime<Utc>) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        match next {
            JobStatus::Processing => self.started_at = Some(at),
            JobStatus::Completed => {
                self.progress = 100;
                self.completed_at = Some(at);
            }
            JobStatus::Failed | JobStatus::Cancelled => self.completed_at = Some(at),
            JobStatus::Queued => {}
        }
        true
    }

    /// Progress never goes backwards.
    pub fn set_progress(&mut self, progress: u8) {
        self.progress = self.progress.max(progress.min(100));
    }

    pub fn status_view(&self) -> JobStatusView {
        JobStatusView {
            job_id: self.id.clone(),
            status: self.status,
            progress: self.progress,
            user_role: self.user_role,
            county_scope: self.county_scope.clone(),
            report_type: self.report_type.clone(),
            priority: self.priority,
            total_records: self.total_records,
            processed_records: self.processed_records,
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            error_message: self.error_message.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatusView {
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    pub user_role: Role,
    pub county_scope: Option<CountyId>,
    pub report_type: String,
    pub priority: i32,
    pub total_records: usize,
    pub processed_records: usize,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The job had not started and is now cancelled.
    Cancelled,
    /// The job is running; it stops at the next chunk boundary.
    CancellationRequested,
    AlreadyFinished(JobStatus),
}

impl CancelOutcome {
    pub const fn label(self) -> &'static str {
        match self {
            CancelOutcome::Cancelled => "cancelled",
            CancelOutcome::CancellationRequested => "cancellation_requested",
            CancelOutcome::AlreadyFinished(_) => "already_finished",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_prefixed_and_distinct() {
        let first = JobId::generate();
        let second = JobId::generate();
        assert!(first.as_str().starts_with("JOB_"));
        assert_eq!(first.as_str().len(), 12);
        assert_ne!(first, second);
    }

    #[test]
    fn terminal_states_never_transition() {
        for terminal in [JobStatus::Completed, JobStatus::Failed, JobStatus::Cancelled] {
            for next in JobStatus::ordered() {
                assert!(!terminal.can_transition_to(next));
            }
        }
        assert!(!JobStatus::Processing.can_transition_to(JobStatus::Queued));
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Cancelled));
    }

    #[test]
    fn status_serializes_as_label() {
        for status in JobStatus::ordered() {
            let encoded = serde_json::to_value(status).expect("serializes");
            assert_eq!(encoded, serde_json::Value::String(status.label().to_string()));
        }
    }
}
