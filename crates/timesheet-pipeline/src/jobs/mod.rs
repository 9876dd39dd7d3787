//! Report generation as asynchronous, cancellable, progress-tracked jobs.

pub mod domain;
pub mod queue;
mod registry;
mod worker;

#[cfg(test)]
mod tests;

pub use domain::{CancelOutcome, Job, JobId, JobStatus, JobStatusView, ReportJobRequest};
pub use queue::{JobQueue, JobSettings};
