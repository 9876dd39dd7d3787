use std::sync::Arc;
use std::time::Duration;

use super::common::*;
use crate::access::Role;
use crate::error::PipelineError;
use crate::jobs::{CancelOutcome, JobSettings, JobStatus, ReportJobRequest};
use crate::pipeline::QueryFilters;

#[tokio::test]
async fn worker_pool_completes_queued_jobs() {
    let queue = queue_with(repository(6), small_chunks());
    let handles = queue.start_workers(2);

    let mut ids = Vec::new();
    for _ in 0..3 {
        let id = queue
            .queue(&claims("ADMIN", None, "admin-1"), ReportJobRequest::default())
            .await
            .expect("queues");
        ids.push(id);
    }

    for id in &ids {
        let view = wait_until(&queue, &admin(), id, |view| view.status.is_terminal()).await;
        assert_eq!(view.status, JobStatus::Completed);
        assert_eq!(view.processed_records, 12);
    }

    queue.shutdown();
    for handle in handles {
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("worker stops")
            .expect("worker exits cleanly");
    }
}

#[tokio::test]
async fn cancellation_waits_for_the_chunk_boundary() {
    let (repository, release) = GatedRepository::new(records(3));
    let repository = Arc::new(repository);
    let settings = JobSettings {
        default_chunk_size: 1,
        ..small_chunks()
    };
    let queue = queue_with(repository.clone(), settings);
    let worker = caller(Role::CaseWorker, Some("ALAMEDA"), "cw-1");
    let id = queue
        .queue(
            &claims("CASE_WORKER", Some("ALAMEDA"), "cw-1"),
            ReportJobRequest::default(),
        )
        .await
        .expect("queues");
    let handles = queue.start_workers(1);

    for _ in 0..500 {
        if repository.entered() > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(repository.entered(), 1);
    assert_eq!(
        queue.status(&worker, &id).expect("visible").status,
        JobStatus::Processing
    );

    let outcome = queue.cancel(&worker, &id).await.expect("cancel accepted");
    assert_eq!(outcome, CancelOutcome::CancellationRequested);
    assert_eq!(
        queue.status(&worker, &id).expect("visible").status,
        JobStatus::Processing
    );

    drop(release);
    let view = wait_until(&queue, &worker, &id, |view| view.status.is_terminal()).await;
    assert_eq!(view.status, JobStatus::Cancelled);
    assert_eq!(view.processed_records, 1);
    assert!(view.progress < 100);
    assert_eq!(repository.entered(), 1);
    assert!(matches!(
        queue.result(&worker, &id),
        Err(PipelineError::JobNotReady {
            status: JobStatus::Cancelled,
            ..
        })
    ));

    queue.shutdown();
    for handle in handles {
        handle.await.expect("worker exits cleanly");
    }
}

#[tokio::test]
async fn progress_never_moves_backwards() {
    let (repository, release) = GatedRepository::new(records(4));
    drop(release);
    let settings = JobSettings {
        default_chunk_size: 1,
        ..small_chunks()
    };
    let queue = queue_with(Arc::new(repository), settings);
    let id = queue
        .queue(&claims("ADMIN", None, "admin-1"), ReportJobRequest::default())
        .await
        .expect("queues");
    let handles = queue.start_workers(1);

    let mut seen = Vec::new();
    for _ in 0..500 {
        let view = queue.status(&admin(), &id).expect("visible");
        seen.push(view.progress);
        if view.status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    assert!(seen.windows(2).all(|pair| pair[0] <= pair[1]));
    assert_eq!(seen.last(), Some(&100));

    queue.shutdown();
    for handle in handles {
        handle.await.expect("worker exits cleanly");
    }
}

#[tokio::test]
async fn higher_priority_jobs_run_first() {
    let repository = Arc::new(RecordingRepository::new(records(2)));
    let queue = queue_with(repository.clone(), small_chunks());
    for (county, priority) in [("ALAMEDA", 0), ("FRESNO", 5)] {
        let request = ReportJobRequest {
            priority,
            filters: QueryFilters {
                county_id: Some(county.to_string()),
                ..QueryFilters::default()
            },
            ..ReportJobRequest::default()
        };
        queue
            .queue(&claims("ADMIN", None, "admin-1"), request)
            .await
            .expect("queues");
    }

    assert_eq!(queue.run_pending().await, 2);
    let order: Vec<String> = repository.counted().into_iter().flatten().collect();
    assert_eq!(order.first().map(String::as_str), Some("FRESNO"));
    assert_eq!(order.last().map(String::as_str), Some("ALAMEDA"));
}
