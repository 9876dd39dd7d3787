//! HTTP surface for extraction, report jobs, and masking administration.
//! Every route authenticates from the bearer token before doing anything else.

pub mod extraction;
pub mod jobs;
pub mod masking;


use std::sync::Arc;

use axum::http::{header, HeaderMap};
use axum::routing::{get, post};
use axum::Router;

use crate::access::{CallerIdentity, ClaimsResolver, RulesEngine, TokenClaims};
use crate::error::PipelineError;
use crate::jobs::JobQueue;
use crate::masking::{AttributeStore, RulesetStore};
use crate::pipeline::TimesheetRepository;

/// Shared state behind the pipeline routes.
pub struct PipelineState<R, S, A> {
    pub jobs: JobQueue<R, S, A>,
    pub rules: RulesEngine,
}

impl<R, S, A> PipelineState<R, S, A>
where
    R: TimesheetRepository + 'static,
    S: RulesetStore + 'static,
    A: AttributeStore + 'static,
{
    pub fn new(jobs: JobQueue<R, S, A>, rules: RulesEngine) -> Self {
        Self { jobs, rules }
    }

    /// Decodes the bearer token and resolves the caller it names.
    pub fn authenticate(
        &self,
        headers: &HeaderMap,
    ) -> Result<(TokenClaims, CallerIdentity), PipelineError> {
        let claims = bearer_claims(headers)?;
        let identity = self.jobs.orchestrator().identify(&claims)?;
        Ok((claims, identity))
    }
}

pub fn bearer_claims(headers: &HeaderMap) -> Result<TokenClaims, PipelineError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| PipelineError::Authentication("missing bearer token".to_string()))?;
    let raw = value.to_str().map_err(|_| {
        PipelineError::Authentication("authorization header is not valid text".to_string())
    })?;
    ClaimsResolver::decode_bearer(raw)
}

pub fn pipeline_router<R, S, A>(state: Arc<PipelineState<R, S, A>>) -> Router
where
    R: TimesheetRepository + 'static,
    S: RulesetStore + 'static,
    A: AttributeStore + 'static,
{
    Router::new()
        .route(
            "/api/v1/reports/jobs",
            post(jobs::queue_handler::<R, S, A>)
                .get(jobs::list_handler::<R, S, A>)
                .delete(jobs::purge_handler::<R, S, A>),
        )
        .route(
            "/api/v1/reports/jobs/:job_id",
            get(jobs::status_handler::<R, S, A>),
        )
        .route(
            "/api/v1/reports/jobs/:job_id/result",
            get(jobs::result_handler::<R, S, A>),
        )
        .route(
            "/api/v1/reports/jobs/:job_id/cancel",
            post(jobs::cancel_handler::<R, S, A>),
        )
        .route(
            "/api/v1/masking/fields",
            get(masking::fields_handler::<R, S, A>),
        )
        .route(
            "/api/v1/masking/rules/:role",
            get(masking::rules_handler::<R, S, A>).put(masking::update_handler::<R, S, A>),
        )
        .route(
            "/api/v1/masking/rules/:role/statistics",
            get(masking::statistics_handler::<R, S, A>),
        )
        .route(
            "/api/v1/extractions",
            post(extraction::extract_handler::<R, S, A>),
        )
        .route(
            "/api/v1/access/pattern",
            get(extraction::access_pattern_handler::<R, S, A>),
        )
        .with_state(state)
}
