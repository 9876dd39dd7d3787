use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::fetch::{DataFetcher, FetchLimits, FetchResult, TimesheetRepository};
use super::query::{DateRange, QueryBuilder, QueryFilters, QueryParameters};
use crate::access::{CallerIdentity, ClaimsResolver, CountyId, Role, TokenClaims};
use crate::error::{scope_label, PipelineError};
use crate::masking::{
    AttributeStore, FieldMaskingEngine, FieldMaskingRuleset, MaskedRecord, RulesetStore,
};
use crate::reports::{ExtractionSummary, FieldVisibilityReport};
use crate::timesheet::TimesheetRecord;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionRequest {
    #[serde(default)]
    pub report_type: Option<String>,
    #[serde(default)]
    pub date_range: Option<DateRange>,
    #[serde(flatten)]
    pub filters: QueryFilters,
}

/// Scoped query for one caller, fixed before any data is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionPlan {
    pub identity: CallerIdentity,
    pub query: QueryParameters,
    pub report_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionResult {
    pub role: Role,
    pub county: Option<CountyId>,
    pub report_type: String,
    pub total_count: usize,
    pub records: Vec<MaskedRecord>,
    pub summary: ExtractionSummary,
    pub field_visibility: FieldVisibilityReport,
}

/// Runs claims, county check, query, fetch, mask, and summary in that order.
/// Masking never sees unscoped data.
pub struct CountyExtractionOrchestrator<R, S, A> {
    claims: ClaimsResolver,
    queries: QueryBuilder,
    fetcher: DataFetcher<R>,
    masking: Arc<FieldMaskingEngine<S, A>>,
    default_report_type: String,
}

impl<R, S, A> CountyExtractionOrchestrator<R, S, A>
where
    R: TimesheetRepository + 'static,
    S: RulesetStore + 'static,
    A: AttributeStore + 'static,
{
    pub fn new(
        claims: ClaimsResolver,
        fetcher: DataFetcher<R>,
        masking: Arc<FieldMaskingEngine<S, A>>,
        default_report_type: impl Into<String>,
    ) -> Self {
        Self {
            claims,
            queries: QueryBuilder,
            fetcher,
            masking,
            default_report_type: default_report_type.into(),
        }
    }

    pub fn claims(&self) -> &ClaimsResolver {
        &self.claims
    }

    pub fn masking(&self) -> &Arc<FieldMaskingEngine<S, A>> {
        &self.masking
    }

    pub fn default_report_type(&self) -> &str {
        &self.default_report_type
    }

    pub fn fetch_limits(&self) -> FetchLimits {
        self.fetcher.limits()
    }

    pub fn identify(&self, claims: &TokenClaims) -> Result<CallerIdentity, PipelineError> {
        self.claims.resolve(claims)
    }

    pub fn plan(
        &self,
        identity: &CallerIdentity,
        request: &ExtractionRequest,
    ) -> Result<ExtractionPlan, PipelineError> {
        if identity.role.is_county_restricted() && identity.county.is_none() {
            return Err(PipelineError::CountyRequired {
                role: identity.role,
            });
        }

        let report_type = request
            .report_type
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(self.default_report_type.as_str())
            .to_string();

        let query = self
            .queries
            .build_query(identity, request.date_range, &request.filters)?;

        Ok(ExtractionPlan {
            identity: identity.clone(),
            query,
            report_type,
        })
    }

    pub fn count(&self, plan: &ExtractionPlan) -> Result<usize, PipelineError> {
        self.fetcher.count(&plan.query)
    }

    /// Bounded fetch followed by a per-record scope check.
    pub fn fetch_scoped(
        &self,
        plan: &ExtractionPlan,
        query: &QueryParameters,
    ) -> Result<FetchResult, PipelineError> {
        let mut fetched = self.fetcher.fetch(query)?;
        let before = fetched.records.len();
        fetched
            .records
            .retain(|record| within_scope(&plan.identity, record));
        let dropped = before - fetched.records.len();
        if dropped > 0 {
            warn!(
                role = %plan.identity.role,
                county = scope_label(plan.identity.county.as_ref()),
                dropped,
                "repository returned records outside caller scope"
            );
        }
        Ok(fetched)
    }

    pub fn resolve_ruleset(
        &self,
        plan: &ExtractionPlan,
    ) -> Result<FieldMaskingRuleset, PipelineError> {
        self.masking
            .resolve_for_caller(&plan.identity, plan.identity.role, &plan.report_type)
    }

    pub fn mask(
        &self,
        ruleset: &FieldMaskingRuleset,
        records: &[TimesheetRecord],
    ) -> Vec<MaskedRecord> {
        self.masking.apply_all(ruleset, records)
    }

    /// Synchronous single-batch extraction.
    pub fn extract(
        &self,
        claims: &TokenClaims,
        request: &ExtractionRequest,
    ) -> Result<ExtractionResult, PipelineError> {
        let identity = self.identify(claims)?;
        let plan = self.plan(&identity, request)?;
        let fetched = self.fetch_scoped(&plan, &plan.query)?;
        let ruleset = self.resolve_ruleset(&plan)?;
        let records = self.mask(&ruleset, &fetched.records);
        let summary = ExtractionSummary::from_records(&ruleset, &records);
        let field_visibility = FieldVisibilityReport::build(&ruleset, &records);

        info!(
            role = %identity.role,
            county = scope_label(identity.county.as_ref()),
            report_type = %plan.report_type,
            returned = records.len(),
            total_count = fetched.total_count,
            masked = summary.masked_records,
            "extraction complete"
        );

        Ok(ExtractionResult {
            role: identity.role,
            county: identity.county,
            report_type: plan.report_type,
            total_count: fetched.total_count,
            records,
            summary,
            field_visibility,
        })
    }
}

fn within_scope(identity: &CallerIdentity, record: &TimesheetRecord) -> bool {
    if identity.role.is_global() {
        return true;
    }
    let county_ok = identity
        .county
        .as_ref()
        .is_some_and(|county| county.matches(&record.county_id));
    let user_ok = !identity.role.is_self_scoped()
        || identity.user_id.as_deref() == Some(record.user_id.as_str());
    county_ok && user_ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{ClaimValue, RoleClaims};
    use crate::masking::{InMemoryAttributeStore, InMemoryRulesetStore, MaskingType};
    use crate::pipeline::fetch::{InMemoryTimesheetRepository, RepositoryError};
    use crate::timesheet::fixtures::record;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Orchestrator<R> =
        CountyExtractionOrchestrator<R, InMemoryRulesetStore, InMemoryAttributeStore>;

    fn claims(role: &str, county: Option<&str>) -> TokenClaims {
        TokenClaims {
            sub: Some("user-1".to_string()),
            realm_access: Some(RoleClaims {
                roles: vec![role.to_string()],
            }),
            county_id: county.map(|county| ClaimValue::Single(county.to_string())),
            ..TokenClaims::default()
        }
    }

    fn orchestrator<R: TimesheetRepository + 'static>(
        repository: Arc<R>,
        store: InMemoryRulesetStore,
    ) -> Orchestrator<R> {
        let masking = Arc::new(FieldMaskingEngine::new(
            Arc::new(store),
            Arc::new(InMemoryAttributeStore::default()),
        ));
        CountyExtractionOrchestrator::new(
            ClaimsResolver::new("trial-app"),
            DataFetcher::new(repository, FetchLimits::default()),
            masking,
            "TIMESHEET_REPORT",
        )
    }

    fn seeded() -> Arc<InMemoryTimesheetRepository> {
        Arc::new(InMemoryTimesheetRepository::with_records(vec![
            record("1", "ALAMEDA", 3),
            record("2", "FRESNO", 4),
            record("3", "ALAMEDA", 5),
        ]))
    }

    #[derive(Default)]
    struct CountingRepository {
        calls: AtomicUsize,
    }

    impl TimesheetRepository for CountingRepository {
        fn query(
            &self,
            _: &QueryParameters,
            _: usize,
            _: usize,
        ) -> Result<Vec<TimesheetRecord>, RepositoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }

        fn count(&self, _: &QueryParameters) -> Result<usize, RepositoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(0)
        }
    }

    #[test]
    fn missing_county_fails_before_fetch() {
        let repository = Arc::new(CountingRepository::default());
        let orchestrator = orchestrator(repository.clone(), InMemoryRulesetStore::default());
        let err = orchestrator
            .extract(&claims("CASE_WORKER", None), &ExtractionRequest::default())
            .expect_err("county required");
        assert!(matches!(err, PipelineError::CountyRequired { .. }));
        assert_eq!(repository.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn restricted_caller_only_sees_own_county() {
        let orchestrator = orchestrator(seeded(), InMemoryRulesetStore::default());
        let request = ExtractionRequest {
            filters: QueryFilters {
                county_id: Some("FRESNO".to_string()),
                ..QueryFilters::default()
            },
            ..ExtractionRequest::default()
        };
        let result = orchestrator
            .extract(&claims("SUPERVISOR", Some("ALAMEDA")), &request)
            .expect("extracts");
        assert_eq!(result.total_count, 2);
        assert_eq!(result.summary.county_distribution.get("ALAMEDA"), Some(&2));
        assert!(result
            .records
            .iter()
            .all(|record| record.get("countyId") == Some(&json!("ALAMEDA"))));
    }

    #[test]
    fn global_caller_sees_every_county() {
        let orchestrator = orchestrator(seeded(), InMemoryRulesetStore::default());
        let result = orchestrator
            .extract(&claims("ADMIN", None), &ExtractionRequest::default())
            .expect("extracts");
        assert_eq!(result.records.len(), 3);
        assert_eq!(result.report_type, "TIMESHEET_REPORT");
        assert!(result.field_visibility.hidden.is_empty());
    }

    #[test]
    fn persisted_rules_mask_output() {
        let store = InMemoryRulesetStore::default();
        store
            .save(
                Role::CaseWorker,
                "TIMESHEET_REPORT",
                vec![
                    "ssn:PARTIAL_MASK:MASKED_ACCESS:true".to_string(),
                    "countyId:NONE:FULL_ACCESS:true".to_string(),
                ],
            )
            .expect("saves");
        let orchestrator = orchestrator(seeded(), store);
        let result = orchestrator
            .extract(&claims("CASE_WORKER", Some("ALAMEDA")), &ExtractionRequest::default())
            .expect("extracts");
        assert_eq!(result.summary.masked_records, 2);
        for record in &result.records {
            assert_eq!(record.get("ssn"), Some(&json!("***6789")));
            assert!(!record.contains("employeeName"));
        }
        let ssn = result
            .field_visibility
            .visible
            .iter()
            .find(|entry| entry.field == "ssn")
            .expect("ssn visible");
        assert_eq!(ssn.masking_type, MaskingType::PartialMask);
        assert_eq!(ssn.visible_values, 0);
    }

    struct LeakyRepository;

    impl TimesheetRepository for LeakyRepository {
        fn query(
            &self,
            _: &QueryParameters,
            _: usize,
            _: usize,
        ) -> Result<Vec<TimesheetRecord>, RepositoryError> {
            Ok(vec![record("1", "ALAMEDA", 3), record("2", "FRESNO", 3)])
        }

        fn count(&self, _: &QueryParameters) -> Result<usize, RepositoryError> {
            Ok(2)
        }
    }

    #[test]
    fn scope_check_drops_foreign_records() {
        let orchestrator = orchestrator(Arc::new(LeakyRepository), InMemoryRulesetStore::default());
        let result = orchestrator
            .extract(&claims("CASE_WORKER", Some("ALAMEDA")), &ExtractionRequest::default())
            .expect("extracts");
        assert_eq!(result.records.len(), 1);
    }

    #[test]
    fn blank_report_type_uses_default() {
        let orchestrator = orchestrator(seeded(), InMemoryRulesetStore::default());
        let identity = orchestrator
            .identify(&claims("ADMIN", None))
            .expect("identifies");
        let plan = orchestrator
            .plan(
                &identity,
                &ExtractionRequest {
                    report_type: Some("  ".to_string()),
                    ..ExtractionRequest::default()
                },
            )
            .expect("plans");
        assert_eq!(plan.report_type, "TIMESHEET_REPORT");
    }
}
