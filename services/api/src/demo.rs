use crate::infra::{
    build_pipeline, demo_clock, load_records, local_claims, parse_date, parse_role,
    seed_baseline_rulesets, DataSource,
};
use chrono::{NaiveDate, Utc};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use timesheet_pipeline::access::{AccessPattern, Role, RulesEngine};
use timesheet_pipeline::config::AppConfig;
use timesheet_pipeline::error::AppError;
use timesheet_pipeline::jobs::{JobStatus, ReportJobRequest};
use timesheet_pipeline::masking::{
    FieldMaskingEngine, FieldMaskingRuleset, InMemoryAttributeStore, InMemoryRulesetStore,
};
use timesheet_pipeline::pipeline::{DateRange, ExtractionRequest, QueryFilters};

#[derive(Args, Debug)]
pub(crate) struct ExtractArgs {
    /// Role to extract as (ADMIN, SUPERVISOR, CASE_WORKER, PROVIDER, RECIPIENT, SYSTEM_SCHEDULER)
    #[arg(long, value_parser = parse_role)]
    pub(crate) role: Role,
    /// County carried by the caller's token
    #[arg(long)]
    pub(crate) county: Option<String>,
    /// User id carried by the caller's token
    #[arg(long)]
    pub(crate) user: Option<String>,
    /// Report type whose masking rules apply
    #[arg(long)]
    pub(crate) report_type: Option<String>,
    /// First pay-period date to include (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub(crate) from: Option<NaiveDate>,
    /// Last pay-period date to include (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub(crate) to: Option<NaiveDate>,
    /// Maximum number of records to return
    #[arg(long)]
    pub(crate) limit: Option<usize>,
    /// Timesheet CSV export to read instead of synthetic data
    #[arg(long)]
    pub(crate) seed_csv: Option<PathBuf>,
    /// Print the masked records as JSON
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug)]
pub(crate) struct RulesArgs {
    /// Role whose rules should be shown
    #[arg(long, value_parser = parse_role)]
    pub(crate) role: Role,
    /// Report type to resolve rules for
    #[arg(long)]
    pub(crate) report_type: Option<String>,
}

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Timesheet CSV export to read instead of synthetic data
    #[arg(long)]
    pub(crate) seed_csv: Option<PathBuf>,
    /// Records processed per chunk for each demo job
    #[arg(long)]
    pub(crate) chunk_size: Option<usize>,
}

pub(crate) async fn run_extract(args: ExtractArgs) -> Result<(), AppError> {
    let ExtractArgs {
        role,
        county,
        user,
        report_type,
        from,
        to,
        limit,
        seed_csv,
        json,
    } = args;

    let config = AppConfig::load()?;
    let date_range = match (from, to) {
        (Some(start), Some(end)) => Some(DateRange::new(start, end)?),
        (Some(start), None) => Some(DateRange::new(start, Utc::now().date_naive())?),
        (None, Some(end)) => Some(DateRange::new(NaiveDate::MIN, end)?),
        (None, None) => None,
    };

    let (records, source) = load_records(seed_csv.as_deref(), Utc::now())?;
    let pipeline = build_pipeline(&config, records)?;
    let claims = local_claims(
        &config.identity.client_id,
        role,
        county.as_deref(),
        user.as_deref(),
    );
    let request = ExtractionRequest {
        report_type,
        date_range,
        filters: QueryFilters {
            limit,
            ..QueryFilters::default()
        },
    };

    let orchestrator = Arc::clone(pipeline.jobs.orchestrator());
    let result = tokio::task::spawn_blocking(move || orchestrator.extract(&claims, &request))
        .await
        .map_err(|err| AppError::Io(std::io::Error::other(err)))??;

    println!("Timesheet extraction ({})", source.label());
    println!(
        "- role {} | county {} | report {}",
        result.role,
        result
            .county
            .as_ref()
            .map(|county| county.as_str())
            .unwrap_or("ALL"),
        result.report_type
    );
    println!(
        "- {} of {} matching records returned | {} masked",
        result.records.len(),
        result.total_count,
        result.summary.masked_records
    );
    println!("Status distribution:");
    for (status, count) in &result.summary.status_distribution {
        println!("  - {status}: {count}");
    }
    println!("Hidden fields: {}", result.field_visibility.hidden.join(", "));

    if json {
        match serde_json::to_string_pretty(&result.records) {
            Ok(rendered) => println!("{rendered}"),
            Err(err) => println!("Records unavailable: {err}"),
        }
    }
    Ok(())
}

pub(crate) fn run_rules(args: RulesArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let report_type = args
        .report_type
        .unwrap_or_else(|| config.identity.default_report_type.clone());

    let rules = RulesEngine::default();
    let store = Arc::new(InMemoryRulesetStore::default());
    let attributes = Arc::new(InMemoryAttributeStore::default());
    seed_baseline_rulesets(&rules, store.as_ref(), attributes.as_ref(), &report_type)?;
    let masking = FieldMaskingEngine::new(store, attributes);
    let effective = masking.resolve(args.role, &report_type)?;

    let baseline = rules.determine_access_pattern(args.role);
    println!("Access pattern for {} ({report_type})", args.role);
    render_pattern("Baseline", &baseline);
    render_pattern("Effective", &AccessPattern::from_ruleset(&effective));
    render_ruleset(&effective);
    Ok(())
}

fn render_pattern(heading: &str, pattern: &AccessPattern) {
    println!(
        "{heading}: {:?} | {} allowed | {} masked | {} hidden",
        pattern.access_level,
        pattern.allowed_fields.len(),
        pattern.masked_fields.len(),
        pattern.hidden_fields.len()
    );
}

fn render_ruleset(ruleset: &FieldMaskingRuleset) {
    println!("Rules (schema v{}):", ruleset.schema_version);
    for rule in &ruleset.rules {
        println!(
            "  - {:<24} {:<14} {}",
            rule.field_name,
            rule.access_level.label(),
            rule.masking_type.label()
        );
    }
}

struct DemoCaller {
    role: Role,
    county: Option<&'static str>,
    user: Option<&'static str>,
    priority: i32,
}

const DEMO_CALLERS: [DemoCaller; 4] = [
    DemoCaller {
        role: Role::Supervisor,
        county: Some("ALAMEDA"),
        user: None,
        priority: 0,
    },
    DemoCaller {
        role: Role::CaseWorker,
        county: Some("FRESNO"),
        user: None,
        priority: 0,
    },
    DemoCaller {
        role: Role::Provider,
        county: Some("KERN"),
        user: Some("user-emp-ke01"),
        priority: 0,
    },
    DemoCaller {
        role: Role::Admin,
        county: None,
        user: None,
        priority: 5,
    },
];

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let (records, source) = load_records(args.seed_csv.as_deref(), demo_clock())?;
    let pipeline = build_pipeline(&config, records)?;
    let jobs = &pipeline.jobs;
    let client_id = config.identity.client_id.as_str();

    println!("Timesheet report job demo ({})", source.label());
    if source == DataSource::Synthetic {
        println!("- data dated relative to {}", demo_clock().date_naive());
    }

    for caller in &DEMO_CALLERS {
        let claims = local_claims(client_id, caller.role, caller.county, caller.user);
        let request = ReportJobRequest {
            chunk_size: args.chunk_size,
            priority: caller.priority,
            ..ReportJobRequest::default()
        };
        let id = jobs.queue(&claims, request).await?;
        println!(
            "- queued {id} for {} ({})",
            caller.role,
            caller.county.unwrap_or("ALL")
        );
    }

    let claims = local_claims(client_id, Role::CaseWorker, Some("KERN"), None);
    let identity = jobs.orchestrator().identify(&claims)?;
    let cancelled = jobs.queue(&claims, ReportJobRequest::default()).await?;
    let outcome = jobs.cancel(&identity, &cancelled).await?;
    println!("- queued {cancelled} for CASE_WORKER (KERN), then {}", outcome.label());

    let processed = jobs.run_pending().await;
    println!("\nProcessed {processed} job(s)");

    let admin = jobs
        .orchestrator()
        .identify(&local_claims(client_id, Role::Admin, None, None))?;
    for view in jobs.list(&admin, None).into_iter().rev() {
        println!(
            "- {} {} | {} {} | {}% | {}/{} records",
            view.job_id,
            view.status,
            view.user_role,
            view.county_scope
                .as_ref()
                .map(|county| county.as_str())
                .unwrap_or("ALL"),
            view.progress,
            view.processed_records,
            view.total_records
        );
        if view.status != JobStatus::Completed {
            continue;
        }
        let report = jobs.result(&admin, &view.job_id)?;
        println!(
            "    {} columns | {:.1} hours across {} employees | {} masked records",
            report.columns.len(),
            report.statistics.total_hours,
            report.statistics.unique_employees,
            report.summary.masked_records
        );
        if let Some(first) = report.records.first() {
            match serde_json::to_string(first) {
                Ok(rendered) => println!("    newest: {rendered}"),
                Err(err) => println!("    newest record unavailable: {err}"),
            }
        }
    }

    Ok(())
}
