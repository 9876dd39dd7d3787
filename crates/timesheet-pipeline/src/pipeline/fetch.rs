use std::cmp::Reverse;
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use tracing::debug;

use super::query::QueryParameters;
use crate::error::PipelineError;
use crate::timesheet::TimesheetRecord;

/// Timesheet storage. Implementations may block on I/O.
pub trait TimesheetRepository: Send + Sync {
    /// Matching records, most recent first, starting at `offset`, at most `limit`.
    fn query(
        &self,
        params: &QueryParameters,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<TimesheetRecord>, RepositoryError>;

    fn count(&self, params: &QueryParameters) -> Result<usize, RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Upper bounds on a single fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchLimits {
    pub default_limit: usize,
    pub max_limit: usize,
}

impl FetchLimits {
    pub fn new(default_limit: usize, max_limit: usize) -> Self {
        let max_limit = max_limit.max(1);
        Self {
            default_limit: default_limit.clamp(1, max_limit),
            max_limit,
        }
    }

    pub fn bound(&self, requested: Option<usize>) -> usize {
        match requested {
            Some(limit) => limit.clamp(1, self.max_limit),
            None => self.default_limit,
        }
    }
}

impl Default for FetchLimits {
    fn default() -> Self {
        Self::new(500, 5000)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchResult {
    pub records: Vec<TimesheetRecord>,
    pub total_count: usize,
}

/// Executes bounded fetches. Never returns more than the bound.
pub struct DataFetcher<R> {
    repository: Arc<R>,
    limits: FetchLimits,
}

impl<R> DataFetcher<R>
where
    R: TimesheetRepository + 'static,
{
    pub fn new(repository: Arc<R>, limits: FetchLimits) -> Self {
        Self { repository, limits }
    }

    pub fn limits(&self) -> FetchLimits {
        self.limits
    }

    pub fn fetch(&self, params: &QueryParameters) -> Result<FetchResult, PipelineError> {
        let bound = self.limits.bound(params.limit);
        let mut records = self
            .repository
            .query(params, params.offset, bound)
            .map_err(|source| fetch_error(params, source))?;
        records.truncate(bound);

        let total_count = self
            .repository
            .count(params)
            .map_err(|source| fetch_error(params, source))?;

        debug!(
            role = %params.role,
            returned = records.len(),
            total_count,
            bound,
            "fetched timesheets"
        );

        Ok(FetchResult {
            records,
            total_count,
        })
    }

    pub fn count(&self, params: &QueryParameters) -> Result<usize, PipelineError> {
        self.repository
            .count(params)
            .map_err(|source| fetch_error(params, source))
    }
}

fn fetch_error(params: &QueryParameters, source: RepositoryError) -> PipelineError {
    PipelineError::Fetch {
        role: params.role,
        county: params.county_filter.clone(),
        source,
    }
}

/// Process-local repository ordered most-recent-first.
#[derive(Debug, Default, Clone)]
pub struct InMemoryTimesheetRepository {
    records: Arc<RwLock<Vec<TimesheetRecord>>>,
}

impl InMemoryTimesheetRepository {
    pub fn with_records(records: impl IntoIterator<Item = TimesheetRecord>) -> Self {
        let repository = Self::default();
        repository.extend(records);
        repository
    }

    pub fn extend(&self, records: impl IntoIterator<Item = TimesheetRecord>) {
        let mut guard = self.records.write().unwrap_or_else(PoisonError::into_inner);
        guard.extend(records);
        guard.sort_by_key(|record| Reverse(record.recency()));
    }

    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TimesheetRepository for InMemoryTimesheetRepository {
    fn query(
        &self,
        params: &QueryParameters,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<TimesheetRecord>, RepositoryError> {
        let guard = self.records.read().unwrap_or_else(PoisonError::into_inner);
        Ok(guard
            .iter()
            .filter(|record| params.matches(record))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    fn count(&self, params: &QueryParameters) -> Result<usize, RepositoryError> {
        let guard = self.records.read().unwrap_or_else(PoisonError::into_inner);
        Ok(guard.iter().filter(|record| params.matches(record)).count())
    }
}
