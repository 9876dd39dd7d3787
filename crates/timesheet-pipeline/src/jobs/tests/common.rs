use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::access::{
    CallerIdentity, ClaimValue, ClaimsResolver, CountyId, Role, RoleClaims, TokenClaims,
};
use crate::jobs::{JobId, JobQueue, JobSettings, JobStatusView};
use crate::masking::{FieldMaskingEngine, InMemoryAttributeStore, InMemoryRulesetStore};
use crate::pipeline::{
    CountyExtractionOrchestrator, DataFetcher, FetchLimits, InMemoryTimesheetRepository,
    QueryParameters, RepositoryError, TimesheetRepository,
};
use crate::timesheet::fixtures::record;
use crate::timesheet::TimesheetRecord;

pub(super) type TestQueue<R> = JobQueue<R, InMemoryRulesetStore, InMemoryAttributeStore>;

pub(super) const CLIENT_ID: &str = "trial-app";

pub(super) fn claims(role: &str, county: Option<&str>, subject: &str) -> TokenClaims {
    TokenClaims {
        sub: Some(subject.to_string()),
        resource_access: HashMap::from([(
            CLIENT_ID.to_string(),
            RoleClaims {
                roles: vec![role.to_string()],
            },
        )]),
        county_id: county.map(|county| ClaimValue::Single(county.to_string())),
        ..TokenClaims::default()
    }
}

pub(super) fn caller(role: Role, county: Option<&str>, subject: &str) -> CallerIdentity {
    CallerIdentity {
        role,
        county: county.map(CountyId::new),
        user_id: Some(subject.to_string()),
        embedded_rules: Vec::new(),
    }
}

pub(super) fn admin() -> CallerIdentity {
    caller(Role::Admin, None, "admin-1")
}

/// `per_county` records in each of ALAMEDA and FRESNO.
pub(super) fn records(per_county: usize) -> Vec<TimesheetRecord> {
    (0..per_county)
        .flat_map(|index| {
            let day = 1 + (index % 28) as u32;
            [
                record(&format!("A{index}"), "ALAMEDA", day),
                record(&format!("F{index}"), "FRESNO", day),
            ]
        })
        .collect()
}

pub(super) fn repository(per_county: usize) -> Arc<InMemoryTimesheetRepository> {
    Arc::new(InMemoryTimesheetRepository::with_records(records(per_county)))
}

pub(super) fn queue_with<R>(repository: Arc<R>, settings: JobSettings) -> TestQueue<R>
where
    R: TimesheetRepository + 'static,
{
    let masking = Arc::new(FieldMaskingEngine::new(
        Arc::new(InMemoryRulesetStore::default()),
        Arc::new(InMemoryAttributeStore::default()),
    ));
    let orchestrator = Arc::new(CountyExtractionOrchestrator::new(
        ClaimsResolver::new(CLIENT_ID),
        DataFetcher::new(repository, FetchLimits::default()),
        masking,
        "TIMESHEET_REPORT",
    ));
    JobQueue::new(orchestrator, settings)
}

pub(super) fn small_chunks() -> JobSettings {
    JobSettings {
        default_chunk_size: 2,
        max_chunk_size: 10,
        max_records: 1_000,
    }
}

pub(super) async fn wait_until<R>(
    queue: &TestQueue<R>,
    caller: &CallerIdentity,
    id: &JobId,
    done: impl Fn(&JobStatusView) -> bool,
) -> JobStatusView
where
    R: TimesheetRepository + 'static,
{
    for _ in 0..500 {
        let view = queue.status(caller, id).expect("job visible");
        if done(&view) {
            return view;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {id} did not reach the expected state");
}

/// Blocks every `query` until the test releases it.
pub(super) struct GatedRepository {
    inner: InMemoryTimesheetRepository,
    entered: AtomicUsize,
    gate: Mutex<mpsc::Receiver<()>>,
}

impl GatedRepository {
    pub(super) fn new(records: Vec<TimesheetRecord>) -> (Self, mpsc::Sender<()>) {
        let (release, gate) = mpsc::channel();
        let repository = Self {
            inner: InMemoryTimesheetRepository::with_records(records),
            entered: AtomicUsize::new(0),
            gate: Mutex::new(gate),
        };
        (repository, release)
    }

    pub(super) fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }
}

impl TimesheetRepository for GatedRepository {
    fn query(
        &self,
        params: &QueryParameters,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<TimesheetRecord>, RepositoryError> {
        self.entered.fetch_add(1, Ordering::SeqCst);
        // A dropped sender opens the gate for good.
        let _ = self
            .gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .recv();
        self.inner.query(params, offset, limit)
    }

    fn count(&self, params: &QueryParameters) -> Result<usize, RepositoryError> {
        self.inner.count(params)
    }
}

/// Remembers the county of every count call, in order.
#[derive(Default)]
pub(super) struct RecordingRepository {
    inner: InMemoryTimesheetRepository,
    counted: Mutex<Vec<Option<String>>>,
}

impl RecordingRepository {
    pub(super) fn new(records: Vec<TimesheetRecord>) -> Self {
        Self {
            inner: InMemoryTimesheetRepository::with_records(records),
            counted: Mutex::default(),
        }
    }

    pub(super) fn counted(&self) -> Vec<Option<String>> {
        self.counted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl TimesheetRepository for RecordingRepository {
    fn query(
        &self,
        params: &QueryParameters,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<TimesheetRecord>, RepositoryError> {
        self.inner.query(params, offset, limit)
    }

    fn count(&self, params: &QueryParameters) -> Result<usize, RepositoryError> {
        self.counted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(params.county_filter.as_ref().map(|county| county.to_string()));
        self.inner.count(params)
    }
}

/// Counts succeed, every page read fails.
pub(super) struct BrokenRepository;

impl TimesheetRepository for BrokenRepository {
    fn query(
        &self,
        _: &QueryParameters,
        _: usize,
        _: usize,
    ) -> Result<Vec<TimesheetRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("read timed out".to_string()))
    }

    fn count(&self, _: &QueryParameters) -> Result<usize, RepositoryError> {
        Ok(4)
    }
}
