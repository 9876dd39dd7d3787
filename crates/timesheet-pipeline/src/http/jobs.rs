use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::json;

use super::PipelineState;
use crate::error::PipelineError;
use crate::jobs::{CancelOutcome, JobId, JobStatus, ReportJobRequest};
use crate::masking::{AttributeStore, RulesetStore};
use crate::pipeline::TimesheetRepository;

#[derive(Debug, Default, Deserialize)]
pub struct ListJobsQuery {
    #[serde(default)]
    pub status: Option<JobStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PurgeQuery {
    #[serde(default)]
    pub older_than_minutes: Option<i64>,
}

pub(crate) async fn queue_handler<R, S, A>(
    State(state): State<Arc<PipelineState<R, S, A>>>,
    headers: HeaderMap,
    Json(request): Json<ReportJobRequest>,
) -> Result<Response, PipelineError>
where
    R: TimesheetRepository + 'static,
    S: RulesetStore + 'static,
    A: AttributeStore + 'static,
{
    let claims = super::bearer_claims(&headers)?;
    let job_id = state.jobs.queue(&claims, request).await?;
    let payload = json!({
        "job_id": job_id,
        "status": JobStatus::Queued,
    });
    Ok((StatusCode::ACCEPTED, Json(payload)).into_response())
}

pub(crate) async fn list_handler<R, S, A>(
    State(state): State<Arc<PipelineState<R, S, A>>>,
    headers: HeaderMap,
    Query(query): Query<ListJobsQuery>,
) -> Result<Response, PipelineError>
where
    R: TimesheetRepository + 'static,
    S: RulesetStore + 'static,
    A: AttributeStore + 'static,
{
    let (_, caller) = state.authenticate(&headers)?;
    let jobs = state.jobs.list(&caller, query.status);
    Ok((StatusCode::OK, Json(json!({ "jobs": jobs }))).into_response())
}

pub(crate) async fn status_handler<R, S, A>(
    State(state): State<Arc<PipelineState<R, S, A>>>,
    headers: HeaderMap,
    Path(job_id): Path<String>,
) -> Result<Response, PipelineError>
where
    R: TimesheetRepository + 'static,
    S: RulesetStore + 'static,
    A: AttributeStore + 'static,
{
    let (_, caller) = state.authenticate(&headers)?;
    let view = state.jobs.status(&caller, &JobId(job_id))?;
    Ok((StatusCode::OK, Json(view)).into_response())
}

pub(crate) async fn result_handler<R, S, A>(
    State(state): State<Arc<PipelineState<R, S, A>>>,
    headers: HeaderMap,
    Path(job_id): Path<String>,
) -> Result<Response, PipelineError>
where
    R: TimesheetRepository + 'static,
    S: RulesetStore + 'static,
    A: AttributeStore + 'static,
{
    let (_, caller) = state.authenticate(&headers)?;
    let report = state.jobs.result(&caller, &JobId(job_id))?;
    Ok((StatusCode::OK, Json(report.as_ref())).into_response())
}

pub(crate) async fn cancel_handler<R, S, A>(
    State(state): State<Arc<PipelineState<R, S, A>>>,
    headers: HeaderMap,
    Path(job_id): Path<String>,
) -> Result<Response, PipelineError>
where
    R: TimesheetRepository + 'static,
    S: RulesetStore + 'static,
    A: AttributeStore + 'static,
{
    let (_, caller) = state.authenticate(&headers)?;
    let id = JobId(job_id);
    let outcome = state.jobs.cancel(&caller, &id).await?;
    let status = match outcome {
        CancelOutcome::Cancelled => JobStatus::Cancelled,
        CancelOutcome::CancellationRequested => JobStatus::Processing,
        CancelOutcome::AlreadyFinished(status) => status,
    };
    let payload = json!({
        "job_id": id,
        "outcome": outcome.label(),
        "status": status,
    });
    Ok((StatusCode::OK, Json(payload)).into_response())
}

pub(crate) async fn purge_handler<R, S, A>(
    State(state): State<Arc<PipelineState<R, S, A>>>,
    headers: HeaderMap,
    Query(query): Query<PurgeQuery>,
) -> Result<Response, PipelineError>
where
    R: TimesheetRepository + 'static,
    S: RulesetStore + 'static,
    A: AttributeStore + 'static,
{
    let (_, caller) = state.authenticate(&headers)?;
    let minutes = query.older_than_minutes.unwrap_or(0);
    if minutes < 0 {
        return Err(PipelineError::Validation(
            "older_than_minutes must not be negative".to_string(),
        ));
    }
    let older_than = Duration::try_minutes(minutes)
        .and_then(|window| Utc::now().checked_sub_signed(window))
        .ok_or_else(|| {
            PipelineError::Validation("older_than_minutes is out of range".to_string())
        })?;
    let purged = state.jobs.purge_terminal(&caller, older_than).await?;
    Ok((StatusCode::OK, Json(json!({ "purged": purged }))).into_response())
}
