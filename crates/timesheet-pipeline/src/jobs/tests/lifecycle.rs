use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;

use super::common::*;
use crate::access::{CountyId, Role};
use crate::error::PipelineError;
use crate::jobs::{CancelOutcome, JobId, JobSettings, JobStatus, ReportJobRequest};
use crate::pipeline::QueryFilters;

#[tokio::test]
async fn queued_job_reports_queued_until_a_worker_runs() {
    let queue = queue_with(repository(3), small_chunks());
    let worker = caller(Role::CaseWorker, Some("ALAMEDA"), "cw-1");

    let id = queue
        .queue(
            &claims("CASE_WORKER", Some("ALAMEDA"), "cw-1"),
            ReportJobRequest::default(),
        )
        .await
        .expect("queues");

    let view = queue.status(&worker, &id).expect("visible");
    assert_eq!(view.status, JobStatus::Queued);
    assert_eq!(view.progress, 0);
    assert_eq!(view.report_type, "TIMESHEET_REPORT");
    assert_eq!(queue.pending_len(), 1);

    let err = queue.result(&worker, &id).expect_err("not ready");
    assert!(matches!(
        err,
        PipelineError::JobNotReady {
            status: JobStatus::Queued,
            ..
        }
    ));
}

#[tokio::test]
async fn completed_job_covers_every_scoped_record() {
    let queue = queue_with(repository(5), small_chunks());
    let worker = caller(Role::CaseWorker, Some("ALAMEDA"), "cw-1");
    let id = queue
        .queue(
            &claims("CASE_WORKER", Some("ALAMEDA"), "cw-1"),
            ReportJobRequest::default(),
        )
        .await
        .expect("queues");

    assert_eq!(queue.run_pending().await, 1);

    let view = queue.status(&worker, &id).expect("visible");
    assert_eq!(view.status, JobStatus::Completed);
    assert_eq!(view.progress, 100);
    assert_eq!(view.total_records, 5);
    assert_eq!(view.processed_records, 5);
    assert!(view.completed_at.is_some());

    let report = queue.result(&worker, &id).expect("ready");
    assert_eq!(report.role, Role::CaseWorker);
    assert_eq!(report.records.len(), 5);
    assert_eq!(report.statistics.record_count, 5);
    assert!(report
        .records
        .iter()
        .all(|record| record.get("countyId") == Some(&json!("ALAMEDA"))));
}

#[tokio::test]
async fn token_role_and_county_override_the_request() {
    let queue = queue_with(repository(2), small_chunks());
    let request = ReportJobRequest {
        role: Some(Role::Admin),
        filters: QueryFilters {
            county_id: Some("FRESNO".to_string()),
            ..QueryFilters::default()
        },
        ..ReportJobRequest::default()
    };
    let id = queue
        .queue(&claims("SUPERVISOR", Some("ALAMEDA"), "sup-1"), request)
        .await
        .expect("queues");

    let view = queue.status(&admin(), &id).expect("visible");
    assert_eq!(view.user_role, Role::Supervisor);
    assert_eq!(view.county_scope, Some(CountyId::new("ALAMEDA")));
}

#[tokio::test]
async fn restricted_role_without_county_is_rejected_before_queueing() {
    let queue = queue_with(repository(2), small_chunks());
    let err = queue
        .queue(
            &claims("CASE_WORKER", None, "cw-1"),
            ReportJobRequest::default(),
        )
        .await
        .expect_err("county required");

    assert!(matches!(err, PipelineError::CountyRequired { .. }));
    assert!(queue.list(&admin(), None).is_empty());
    assert_eq!(queue.pending_len(), 0);
}

#[tokio::test]
async fn chunk_size_outside_bounds_is_a_validation_error() {
    let queue = queue_with(repository(1), small_chunks());
    for chunk_size in [0, 11] {
        let request = ReportJobRequest {
            chunk_size: Some(chunk_size),
            ..ReportJobRequest::default()
        };
        let err = queue
            .queue(&claims("ADMIN", None, "admin-1"), request)
            .await
            .expect_err("rejected");
        assert!(matches!(err, PipelineError::Validation(_)));
    }
}

#[tokio::test]
async fn cancel_before_processing_is_final() {
    let queue = queue_with(repository(3), small_chunks());
    let id = queue
        .queue(&claims("ADMIN", None, "admin-1"), ReportJobRequest::default())
        .await
        .expect("queues");

    let outcome = queue.cancel(&admin(), &id).await.expect("cancels");
    assert_eq!(outcome, CancelOutcome::Cancelled);

    queue.run_pending().await;

    let view = queue.status(&admin(), &id).expect("visible");
    assert_eq!(view.status, JobStatus::Cancelled);
    assert_eq!(view.processed_records, 0);
    let err = queue.result(&admin(), &id).expect_err("never ready");
    assert!(matches!(
        err,
        PipelineError::JobNotReady {
            status: JobStatus::Cancelled,
            ..
        }
    ));

    let again = queue.cancel(&admin(), &id).await.expect("idempotent");
    assert_eq!(again, CancelOutcome::AlreadyFinished(JobStatus::Cancelled));
}

#[tokio::test]
async fn concurrent_jobs_have_independent_lifecycles() {
    let queue = queue_with(repository(4), small_chunks());
    let token = claims("CASE_WORKER", Some("FRESNO"), "cw-9");
    let worker = caller(Role::CaseWorker, Some("FRESNO"), "cw-9");

    let (first, second) = tokio::join!(
        queue.queue(&token, ReportJobRequest::default()),
        queue.queue(&token, ReportJobRequest::default()),
    );
    let first = first.expect("queues");
    let second = second.expect("queues");
    assert_ne!(first, second);

    queue.cancel(&worker, &first).await.expect("cancels");
    queue.run_pending().await;

    assert_eq!(
        queue.status(&worker, &first).expect("visible").status,
        JobStatus::Cancelled
    );
    assert_eq!(
        queue.status(&worker, &second).expect("visible").status,
        JobStatus::Completed
    );
}

#[tokio::test]
async fn chunk_failure_fails_the_job_and_discards_partial_output() {
    let queue = queue_with(Arc::new(BrokenRepository), small_chunks());
    let id = queue
        .queue(&claims("ADMIN", None, "admin-1"), ReportJobRequest::default())
        .await
        .expect("queues");

    queue.run_pending().await;

    let view = queue.status(&admin(), &id).expect("visible");
    assert_eq!(view.status, JobStatus::Failed);
    let message = view.error_message.expect("captured");
    assert!(message.contains("read timed out"));
    assert!(message.contains("ADMIN"));
    assert!(matches!(
        queue.result(&admin(), &id),
        Err(PipelineError::JobNotReady {
            status: JobStatus::Failed,
            ..
        })
    ));
}

#[tokio::test]
async fn record_cap_bounds_the_job() {
    let settings = JobSettings {
        max_records: 3,
        ..small_chunks()
    };
    let queue = queue_with(repository(5), settings);
    let id = queue
        .queue(&claims("ADMIN", None, "admin-1"), ReportJobRequest::default())
        .await
        .expect("queues");

    queue.run_pending().await;

    let report = queue.result(&admin(), &id).expect("ready");
    assert_eq!(report.records.len(), 3);
    assert_eq!(queue.status(&admin(), &id).expect("visible").total_records, 3);
}

#[tokio::test]
async fn purge_removes_finished_jobs_for_global_roles_only() {
    let queue = queue_with(repository(1), small_chunks());
    let finished = queue
        .queue(&claims("ADMIN", None, "admin-1"), ReportJobRequest::default())
        .await
        .expect("queues");
    queue.run_pending().await;
    let waiting = queue
        .queue(&claims("ADMIN", None, "admin-1"), ReportJobRequest::default())
        .await
        .expect("queues");

    let worker = caller(Role::CaseWorker, Some("ALAMEDA"), "cw-1");
    let err = queue
        .purge_terminal(&worker, Utc::now())
        .await
        .expect_err("not allowed");
    assert!(matches!(err, PipelineError::Authorization { .. }));

    let purged = queue
        .purge_terminal(&admin(), Utc::now() + Duration::seconds(1))
        .await
        .expect("purges");
    assert_eq!(purged, 1);
    assert!(matches!(
        queue.status(&admin(), &finished),
        Err(PipelineError::JobNotFound(_))
    ));
    assert_eq!(
        queue.status(&admin(), &waiting).expect("kept").status,
        JobStatus::Queued
    );
}

#[tokio::test]
async fn unknown_job_is_not_found_not_not_ready() {
    let queue = queue_with(repository(1), small_chunks());
    let missing = JobId("JOB_MISSING0".to_string());
    assert!(matches!(
        queue.status(&admin(), &missing),
        Err(PipelineError::JobNotFound(_))
    ));
    assert!(matches!(
        queue.result(&admin(), &missing),
        Err(PipelineError::JobNotFound(_))
    ));
    assert!(matches!(
        queue.cancel(&admin(), &missing).await,
        Err(PipelineError::JobNotFound(_))
    ));
}
