use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use super::PipelineState;
use crate::access::Role;
use crate::error::PipelineError;
use crate::masking::{AttributeStore, RulesetStore, RulesetUpdate};
use crate::pipeline::TimesheetRepository;

#[derive(Debug, Default, Deserialize)]
pub struct ReportTypeQuery {
    #[serde(default)]
    pub report_type: Option<String>,
}

fn target_role(raw: &str) -> Result<Role, PipelineError> {
    raw.parse::<Role>()
        .map_err(|err| PipelineError::Validation(err.to_string()))
}

fn report_type<R, S, A>(state: &PipelineState<R, S, A>, query: ReportTypeQuery) -> String
where
    R: TimesheetRepository + 'static,
    S: RulesetStore + 'static,
    A: AttributeStore + 'static,
{
    query
        .report_type
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| state.jobs.orchestrator().default_report_type().to_string())
}

pub(crate) async fn fields_handler<R, S, A>(
    State(state): State<Arc<PipelineState<R, S, A>>>,
    headers: HeaderMap,
) -> Result<Response, PipelineError>
where
    R: TimesheetRepository + 'static,
    S: RulesetStore + 'static,
    A: AttributeStore + 'static,
{
    state.authenticate(&headers)?;
    let schema = state.jobs.orchestrator().masking().schema();
    let payload = json!({
        "schema_version": schema.version(),
        "fields": schema.fields(),
    });
    Ok((StatusCode::OK, Json(payload)).into_response())
}

pub(crate) async fn rules_handler<R, S, A>(
    State(state): State<Arc<PipelineState<R, S, A>>>,
    headers: HeaderMap,
    Path(role): Path<String>,
    Query(query): Query<ReportTypeQuery>,
) -> Result<Response, PipelineError>
where
    R: TimesheetRepository + 'static,
    S: RulesetStore + 'static,
    A: AttributeStore + 'static,
{
    let (_, caller) = state.authenticate(&headers)?;
    let role = target_role(&role)?;
    let report_type = report_type(&state, query);
    let ruleset = state
        .jobs
        .orchestrator()
        .masking()
        .resolve_for_caller(&caller, role, &report_type)?;
    Ok((StatusCode::OK, Json(ruleset)).into_response())
}

pub(crate) async fn update_handler<R, S, A>(
    State(state): State<Arc<PipelineState<R, S, A>>>,
    headers: HeaderMap,
    Path(role): Path<String>,
    Json(update): Json<RulesetUpdate>,
) -> Result<Response, PipelineError>
where
    R: TimesheetRepository + 'static,
    S: RulesetStore + 'static,
    A: AttributeStore + 'static,
{
    let (_, caller) = state.authenticate(&headers)?;
    let role = target_role(&role)?;
    let ruleset = state
        .jobs
        .orchestrator()
        .masking()
        .update(&caller, role, update)?;
    Ok((StatusCode::OK, Json(ruleset)).into_response())
}

pub(crate) async fn statistics_handler<R, S, A>(
    State(state): State<Arc<PipelineState<R, S, A>>>,
    headers: HeaderMap,
    Path(role): Path<String>,
    Query(query): Query<ReportTypeQuery>,
) -> Result<Response, PipelineError>
where
    R: TimesheetRepository + 'static,
    S: RulesetStore + 'static,
    A: AttributeStore + 'static,
{
    let (_, caller) = state.authenticate(&headers)?;
    let role = target_role(&role)?;
    let report_type = report_type(&state, query);
    let masking = state.jobs.orchestrator().masking();
    let ruleset = masking.resolve_for_caller(&caller, role, &report_type)?;
    Ok((StatusCode::OK, Json(masking.statistics(&ruleset))).into_response())
}
