use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use super::PipelineState;
use crate::access::AccessPattern;
use crate::error::PipelineError;
use crate::masking::{AttributeStore, RulesetStore};
use crate::pipeline::{ExtractionRequest, TimesheetRepository};

/// Synchronous extraction. The fetch may block, so it runs off the reactor.
pub(crate) async fn extract_handler<R, S, A>(
    State(state): State<Arc<PipelineState<R, S, A>>>,
    headers: HeaderMap,
    Json(request): Json<ExtractionRequest>,
) -> Result<Response, PipelineError>
where
    R: TimesheetRepository + 'static,
    S: RulesetStore + 'static,
    A: AttributeStore + 'static,
{
    let claims = super::bearer_claims(&headers)?;
    let orchestrator = Arc::clone(state.jobs.orchestrator());
    let result = tokio::task::spawn_blocking(move || orchestrator.extract(&claims, &request))
        .await
        .map_err(|err| PipelineError::Assembly(format!("extraction aborted: {err}")))??;
    Ok((StatusCode::OK, Json(result)).into_response())
}

pub(crate) async fn access_pattern_handler<R, S, A>(
    State(state): State<Arc<PipelineState<R, S, A>>>,
    headers: HeaderMap,
) -> Result<Response, PipelineError>
where
    R: TimesheetRepository + 'static,
    S: RulesetStore + 'static,
    A: AttributeStore + 'static,
{
    let (_, caller) = state.authenticate(&headers)?;
    let orchestrator = state.jobs.orchestrator();
    let ruleset = orchestrator.masking().resolve_for_caller(
        &caller,
        caller.role,
        orchestrator.default_report_type(),
    )?;
    let payload = json!({
        "role": caller.role,
        "county": caller.county,
        "report_type": ruleset.report_type,
        "baseline": state.rules.determine_access_pattern(caller.role),
        "effective": AccessPattern::from_ruleset(&ruleset),
    });
    Ok((StatusCode::OK, Json(payload)).into_response())
}
