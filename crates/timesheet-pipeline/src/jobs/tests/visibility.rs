use super::common::*;
use crate::access::Role;
use crate::error::PipelineError;
use crate::jobs::{JobStatus, ReportJobRequest};

#[tokio::test]
async fn other_county_sees_nothing() {
    let queue = queue_with(repository(2), small_chunks());
    let id = queue
        .queue(
            &claims("SUPERVISOR", Some("ALAMEDA"), "sup-1"),
            ReportJobRequest::default(),
        )
        .await
        .expect("queues");

    let outsider = caller(Role::Supervisor, Some("FRESNO"), "sup-2");
    assert!(matches!(
        queue.status(&outsider, &id),
        Err(PipelineError::JobNotFound(_))
    ));
    assert!(matches!(
        queue.cancel(&outsider, &id).await,
        Err(PipelineError::JobNotFound(_))
    ));
    assert!(queue.list(&outsider, None).is_empty());

    let colleague = caller(Role::CaseWorker, Some("alameda"), "cw-3");
    assert_eq!(queue.list(&colleague, None).len(), 1);
}

#[tokio::test]
async fn global_roles_list_every_job() {
    let queue = queue_with(repository(2), small_chunks());
    for (role, county) in [("SUPERVISOR", "ALAMEDA"), ("CASE_WORKER", "FRESNO")] {
        queue
            .queue(&claims(role, Some(county), "someone"), ReportJobRequest::default())
            .await
            .expect("queues");
    }
    queue
        .queue(&claims("ADMIN", None, "admin-1"), ReportJobRequest::default())
        .await
        .expect("queues");

    assert_eq!(queue.list(&admin(), None).len(), 3);
    let scheduler = caller(Role::SystemScheduler, None, "service-account-reports");
    assert_eq!(queue.list(&scheduler, Some(JobStatus::Queued)).len(), 3);
    assert!(queue.list(&scheduler, Some(JobStatus::Completed)).is_empty());

    // An unscoped admin job is invisible to county-restricted roles.
    let worker = caller(Role::CaseWorker, Some("FRESNO"), "cw-1");
    assert_eq!(queue.list(&worker, None).len(), 1);
}

#[tokio::test]
async fn self_scoped_roles_only_see_their_own_jobs() {
    let queue = queue_with(repository(2), small_chunks());
    let mine = queue
        .queue(
            &claims("PROVIDER", Some("ALAMEDA"), "user-A0"),
            ReportJobRequest::default(),
        )
        .await
        .expect("queues");
    queue
        .queue(
            &claims("PROVIDER", Some("ALAMEDA"), "user-A1"),
            ReportJobRequest::default(),
        )
        .await
        .expect("queues");

    let provider = caller(Role::Provider, Some("ALAMEDA"), "user-A0");
    let listed = queue.list(&provider, None);
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].job_id, mine);

    queue.run_pending().await;
    let report = queue.result(&provider, &mine).expect("ready");
    assert_eq!(report.records.len(), 1);

    let supervisor = caller(Role::Supervisor, Some("ALAMEDA"), "sup-1");
    assert_eq!(queue.list(&supervisor, None).len(), 2);
}
