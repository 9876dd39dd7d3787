//! County-scoped timesheet extraction with role-based field masking and
//! asynchronous report jobs.

pub mod access;
pub mod config;
pub mod error;
pub mod http;
pub mod jobs;
pub mod masking;
pub mod pipeline;
pub mod reports;
pub mod telemetry;
pub mod timesheet;

pub use access::{CallerIdentity, ClaimsResolver, CountyId, Role, TokenClaims};
pub use error::{AppError, PipelineError};
