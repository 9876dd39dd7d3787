use crate::access::{CountyId, Role};
use crate::config::ConfigError;
use crate::jobs::{JobId, JobStatus};
use crate::masking::RulesetError;
use crate::pipeline::{CsvImportError, RepositoryError};
use crate::telemetry::TelemetryError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

/// Failure taxonomy shared by every pipeline stage. Messages carry role,
/// county, and job context only, never record values.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("identity token carries no recognised role")]
    RoleResolution,
    #[error("role {role} requires a county claim")]
    CountyRequired { role: Role },
    #[error("role {role} is not permitted to {action}")]
    Authorization { role: Role, action: &'static str },
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("job {0} not found")]
    JobNotFound(JobId),
    #[error("job {job_id} is {status} and has no result")]
    JobNotReady { job_id: JobId, status: JobStatus },
    #[error("fetch failed for role {role} in county {}: {source}", scope_label(.county.as_ref()))]
    Fetch {
        role: Role,
        county: Option<CountyId>,
        #[source]
        source: RepositoryError,
    },
    #[error("report assembly failed: {0}")]
    Assembly(String),
    #[error("job queue is shut down")]
    QueueClosed,
    #[error("no unused job id could be allocated")]
    JobIdUnavailable,
    #[error(transparent)]
    Ruleset(#[from] RulesetError),
}

impl PipelineError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            PipelineError::Authentication(_) => StatusCode::UNAUTHORIZED,
            PipelineError::RoleResolution
            | PipelineError::CountyRequired { .. }
            | PipelineError::Authorization { .. } => StatusCode::FORBIDDEN,
            PipelineError::Validation(_) => StatusCode::BAD_REQUEST,
            PipelineError::JobNotFound(_) => StatusCode::NOT_FOUND,
            PipelineError::JobNotReady { .. } => StatusCode::CONFLICT,
            PipelineError::QueueClosed | PipelineError::JobIdUnavailable => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            PipelineError::Ruleset(RulesetError::Malformed { .. })
            | PipelineError::Ruleset(RulesetError::UnknownMaskingType(_))
            | PipelineError::Ruleset(RulesetError::UnknownAccessLevel(_))
            | PipelineError::Ruleset(RulesetError::InvalidEnabled(_)) => StatusCode::BAD_REQUEST,
            PipelineError::Fetch { .. }
            | PipelineError::Assembly(_)
            | PipelineError::Ruleset(RulesetError::Store(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            PipelineError::JobNotReady { job_id, status } => json!({
                "error": self.to_string(),
                "job_id": job_id,
                "status": status,
            }),
            _ => json!({ "error": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

pub(crate) fn scope_label(county: Option<&CountyId>) -> &str {
    county.map(CountyId::as_str).unwrap_or("ALL")
}

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Server(axum::Error),
    Pipeline(PipelineError),
    Import(CsvImportError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Server(err) => write!(f, "server error: {}", err),
            AppError::Pipeline(err) => write!(f, "pipeline error: {}", err),
            AppError::Import(err) => write!(f, "timesheet import error: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Server(err) => Some(err),
            AppError::Pipeline(err) => Some(err),
            AppError::Import(err) => Some(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Pipeline(err) => err.into_response(),
            AppError::Import(_) => {
                let body = Json(json!({ "error": self.to_string() }));
                (StatusCode::BAD_REQUEST, body).into_response()
            }
            AppError::Config(_)
            | AppError::Telemetry(_)
            | AppError::Io(_)
            | AppError::Server(_) => {
                let body = Json(json!({ "error": self.to_string() }));
                (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
            }
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<axum::Error> for AppError {
    fn from(value: axum::Error) -> Self {
        Self::Server(value)
    }
}

impl From<PipelineError> for AppError {
    fn from(value: PipelineError) -> Self {
        Self::Pipeline(value)
    }
}

impl From<CsvImportError> for AppError {
    fn from(value: CsvImportError) -> Self {
        Self::Import(value)
    }
}
