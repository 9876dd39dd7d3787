use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::access::{CallerIdentity, CountyId, Role};
use crate::error::PipelineError;
use crate::timesheet::{TimesheetRecord, TimesheetStatus};

/// Inclusive pay-period window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, PipelineError> {
        let range = Self { start, end };
        range.validate()?;
        Ok(range)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.start > self.end {
            return Err(PipelineError::Validation(format!(
                "date range start {} is after end {}",
                self.start, self.end
            )));
        }
        Ok(())
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Caller-supplied narrowing. The county field is only honoured for global roles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryFilters {
    #[serde(default)]
    pub county_id: Option<String>,
    #[serde(default)]
    pub statuses: Vec<TimesheetStatus>,
    #[serde(default)]
    pub employee_ids: Vec<String>,
    #[serde(default)]
    pub departments: Vec<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
}

/// Immutable, fully scoped query produced once per extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryParameters {
    pub role: Role,
    pub county_filter: Option<CountyId>,
    pub user_filter: Option<String>,
    pub date_range: Option<DateRange>,
    pub status_filter: Vec<TimesheetStatus>,
    pub employee_filter: Vec<String>,
    pub department_filter: Vec<String>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl QueryParameters {
    pub fn matches(&self, record: &TimesheetRecord) -> bool {
        if let Some(county) = &self.county_filter {
            if !county.matches(&record.county_id) {
                return false;
            }
        }
        if let Some(user) = &self.user_filter {
            if record.user_id != *user {
                return false;
            }
        }
        if let Some(range) = &self.date_range {
            if !range.contains(record.pay_period_start) {
                return false;
            }
        }
        if !self.status_filter.is_empty() && !self.status_filter.contains(&record.status) {
            return false;
        }
        if !self.employee_filter.is_empty()
            && !self
                .employee_filter
                .iter()
                .any(|employee| employee.eq_ignore_ascii_case(&record.employee_id))
        {
            return false;
        }
        if !self.department_filter.is_empty() {
            let Some(department) = record.department.as_deref() else {
                return false;
            };
            if !self
                .department_filter
                .iter()
                .any(|wanted| wanted.eq_ignore_ascii_case(department))
            {
                return false;
            }
        }
        true
    }

    /// Copy of these parameters narrowed to one page.
    pub fn page(&self, offset: usize, limit: usize) -> Self {
        Self {
            offset,
            limit: Some(limit),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QueryBuilder;

impl QueryBuilder {
    /// Pure construction. County-restricted roles are pinned to their own
    /// county regardless of the filter; self-scoped roles to their own user.
    pub fn build_query(
        &self,
        identity: &CallerIdentity,
        date_range: Option<DateRange>,
        filters: &QueryFilters,
    ) -> Result<QueryParameters, PipelineError> {
        if let Some(range) = &date_range {
            range.validate()?;
        }

        let requested_county = filters
            .county_id
            .as_deref()
            .map(str::trim)
            .filter(|county| !county.is_empty());

        let county_filter = if identity.role.is_county_restricted() {
            let own = identity.county.clone().ok_or(PipelineError::CountyRequired {
                role: identity.role,
            })?;
            if let Some(requested) = requested_county {
                if !own.matches(requested) {
                    warn!(
                        role = %identity.role,
                        county = %own,
                        "ignoring county override from county-restricted caller"
                    );
                }
            }
            Some(own)
        } else {
            requested_county.map(CountyId::new)
        };

        let user_filter = if identity.role.is_self_scoped() {
            Some(identity.user_id.clone().ok_or_else(|| {
                PipelineError::Authentication(format!(
                    "token for role {} carries no subject",
                    identity.role
                ))
            })?)
        } else {
            None
        };

        Ok(QueryParameters {
            role: identity.role,
            county_filter,
            user_filter,
            date_range,
            status_filter: filters.statuses.clone(),
            employee_filter: filters.employee_ids.clone(),
            department_filter: filters.departments.clone(),
            limit: filters.limit,
            offset: filters.offset,
        })
    }
}
