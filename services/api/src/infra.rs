use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use timesheet_pipeline::access::{ClaimValue, ClaimsResolver, Role, RoleClaims, RulesEngine};
use timesheet_pipeline::config::AppConfig;
use timesheet_pipeline::error::{AppError, PipelineError};
use timesheet_pipeline::http::PipelineState;
use timesheet_pipeline::jobs::{JobQueue, JobSettings};
use timesheet_pipeline::masking::{
    AttributeStore, FieldMaskingEngine, InMemoryAttributeStore, InMemoryRulesetStore,
    RulesetError, RulesetStore, StoreError,
};
use timesheet_pipeline::pipeline::{
    load_timesheets, CountyExtractionOrchestrator, DataFetcher, FetchLimits,
    InMemoryTimesheetRepository,
};
use timesheet_pipeline::timesheet::{TimesheetRecord, TimesheetStatus};
use timesheet_pipeline::TokenClaims;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) type Pipeline =
    PipelineState<InMemoryTimesheetRepository, InMemoryRulesetStore, InMemoryAttributeStore>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DataSource {
    Csv,
    Synthetic,
}

impl DataSource {
    pub(crate) const fn label(self) -> &'static str {
        match self {
            DataSource::Csv => "csv export",
            DataSource::Synthetic => "synthetic demo data",
        }
    }
}

/// Records from a CSV export when one is given, otherwise synthetic data
/// dated relative to `now`.
pub(crate) fn load_records(
    seed_csv: Option<&Path>,
    now: DateTime<Utc>,
) -> Result<(Vec<TimesheetRecord>, DataSource), AppError> {
    match seed_csv {
        Some(path) => Ok((load_timesheets(path)?, DataSource::Csv)),
        None => Ok((synthetic_timesheets(now), DataSource::Synthetic)),
    }
}

/// Wires repository, stores, orchestrator, and job queue from configuration.
/// Must be called from within a Tokio runtime.
pub(crate) fn build_pipeline(
    config: &AppConfig,
    records: Vec<TimesheetRecord>,
) -> Result<Arc<Pipeline>, AppError> {
    let record_count = records.len();
    let repository = Arc::new(InMemoryTimesheetRepository::with_records(records));

    let rules = RulesEngine::default();
    let rulesets = Arc::new(InMemoryRulesetStore::default());
    let attributes = Arc::new(InMemoryAttributeStore::default());
    let baseline_rulesets = seed_baseline_rulesets(
        &rules,
        rulesets.as_ref(),
        attributes.as_ref(),
        &config.identity.default_report_type,
    )?;

    let masking = Arc::new(FieldMaskingEngine::new(rulesets, attributes));
    let limits = FetchLimits::new(
        config.pipeline.fetch_default_limit,
        config.pipeline.fetch_max_limit,
    );
    let orchestrator = Arc::new(CountyExtractionOrchestrator::new(
        ClaimsResolver::new(config.identity.client_id.as_str()),
        DataFetcher::new(repository, limits),
        masking,
        config.identity.default_report_type.as_str(),
    ));
    let jobs = JobQueue::new(orchestrator, JobSettings::from(&config.pipeline));

    info!(
        records = record_count,
        baseline_rulesets,
        "timesheet pipeline initialised"
    );
    Ok(Arc::new(PipelineState::new(jobs, rules)))
}

/// Persists the role baseline for every non-global role that has no
/// configuration yet. Global roles stay unrestricted.
pub(crate) fn seed_baseline_rulesets<S, A>(
    rules: &RulesEngine,
    store: &S,
    attributes: &A,
    report_type: &str,
) -> Result<usize, AppError>
where
    S: RulesetStore,
    A: AttributeStore,
{
    let store_error = |err: StoreError| AppError::from(PipelineError::from(RulesetError::from(err)));
    let mut seeded = 0;
    for role in Role::ordered() {
        if role.is_global() {
            continue;
        }
        let existing = store.load(role, report_type).map_err(store_error)?;
        if existing.is_some_and(|encoded| !encoded.is_empty()) {
            continue;
        }
        let encoded = rules.baseline_ruleset(role, report_type).encode();
        attributes
            .sync(role, report_type, &encoded)
            .map_err(store_error)?;
        store.save(role, report_type, encoded).map_err(store_error)?;
        seeded += 1;
    }
    Ok(seeded)
}

/// Token claims for command-line runs, shaped like the identity provider's.
pub(crate) fn local_claims(
    client_id: &str,
    role: Role,
    county: Option<&str>,
    user: Option<&str>,
) -> TokenClaims {
    let mut claims = TokenClaims {
        sub: Some(user.unwrap_or("cli-user").to_string()),
        county_id: county.map(|county| ClaimValue::Single(county.to_string())),
        ..TokenClaims::default()
    };
    claims.resource_access.insert(
        client_id.to_string(),
        RoleClaims {
            roles: vec![role.label().to_string()],
        },
    );
    claims
}

pub(crate) const DEMO_COUNTIES: [&str; 3] = ["ALAMEDA", "FRESNO", "KERN"];

const DEMO_NAMES: [&str; 6] = [
    "Maria Lopez",
    "James Carter",
    "Linh Nguyen",
    "Aisha Bello",
    "Tomas Silva",
    "Grace Kim",
];

const DEMO_STATUSES: [TimesheetStatus; 4] = [
    TimesheetStatus::Submitted,
    TimesheetStatus::Approved,
    TimesheetStatus::Draft,
    TimesheetStatus::RevisionRequested,
];

/// Deterministic sample data: two pay periods for six providers per county,
/// dated relative to `now`.
pub(crate) fn synthetic_timesheets(now: DateTime<Utc>) -> Vec<TimesheetRecord> {
    let mut records = Vec::new();
    for (county_index, county) in DEMO_COUNTIES.iter().enumerate() {
        for (provider_index, name) in DEMO_NAMES.iter().enumerate() {
            for period in 0..2_i64 {
                let sequence = records.len();
                let period_end = now.date_naive() - Duration::days(1 + 14 * period);
                let period_start = period_end - Duration::days(13);
                let submitted_at = now
                    - Duration::days(14 * period)
                    - Duration::hours((county_index * 6 + provider_index) as i64);
                let regular_hours = 30.0 + ((sequence * 7) % 11) as f64;
                let overtime_hours = (sequence % 3) as f64;
                let status = DEMO_STATUSES[sequence % DEMO_STATUSES.len()];
                let employee = format!("EMP-{}{:02}", &county[..2], provider_index + 1);

                records.push(TimesheetRecord {
                    id: format!("TS-{:04}", sequence + 1),
                    employee_id: employee.clone(),
                    employee_name: (*name).to_string(),
                    user_id: format!("user-{}", employee.to_ascii_lowercase()),
                    ssn: Some(format!("{:09}", 512_340_000 + sequence * 137)),
                    department: Some(if provider_index % 2 == 0 { "IHSS" } else { "WPCS" }.to_string()),
                    county_id: (*county).to_string(),
                    pay_period_start: period_start,
                    pay_period_end: period_end,
                    regular_hours,
                    overtime_hours,
                    sick_hours: 0.0,
                    vacation_hours: 0.0,
                    holiday_hours: 0.0,
                    total_hours: regular_hours + overtime_hours,
                    status,
                    comments: None,
                    supervisor_comments: None,
                    submitted_at: (status != TimesheetStatus::Draft).then_some(submitted_at),
                    submitted_by: Some((*name).to_string()),
                    approved_at: (status == TimesheetStatus::Approved)
                        .then(|| submitted_at + Duration::hours(20)),
                    approved_by: (status == TimesheetStatus::Approved)
                        .then(|| format!("{} County Supervisor", county)),
                    created_at: submitted_at - Duration::hours(2),
                    updated_at: submitted_at,
                    provider_gender: Some(if provider_index % 2 == 0 { "F" } else { "M" }.to_string()),
                    provider_ethnicity: Some("Not Reported".to_string()),
                    provider_age_group: Some(["18-34", "35-54", "55+"][provider_index % 3].to_string()),
                    provider_date_of_birth: NaiveDate::from_ymd_opt(
                        1960 + (provider_index as i32) * 6,
                        1 + (provider_index as u32 % 12),
                        10,
                    ),
                    recipient_gender: None,
                    recipient_ethnicity: None,
                    recipient_age_group: Some("65+".to_string()),
                    recipient_date_of_birth: None,
                });
            }
        }
    }
    records
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

pub(crate) fn parse_role(raw: &str) -> Result<Role, String> {
    raw.parse::<Role>().map_err(|err| err.to_string())
}

/// Fixed clock for reproducible demo output.
pub(crate) fn demo_clock() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 31, 17, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}
