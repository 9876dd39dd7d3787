use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Workflow state of a submitted timesheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimesheetStatus {
    Draft,
    Submitted,
    Approved,
    Rejected,
    RevisionRequested,
    Processed,
}

impl TimesheetStatus {
    pub const fn ordered() -> [TimesheetStatus; 6] {
        [
            TimesheetStatus::Draft,
            TimesheetStatus::Submitted,
            TimesheetStatus::Approved,
            TimesheetStatus::Rejected,
            TimesheetStatus::RevisionRequested,
            TimesheetStatus::Processed,
        ]
    }

    pub const fn label(self) -> &'static str {
        match self {
            TimesheetStatus::Draft => "DRAFT",
            TimesheetStatus::Submitted => "SUBMITTED",
            TimesheetStatus::Approved => "APPROVED",
            TimesheetStatus::Rejected => "REJECTED",
            TimesheetStatus::RevisionRequested => "REVISION_REQUESTED",
            TimesheetStatus::Processed => "PROCESSED",
        }
    }
}

impl fmt::Display for TimesheetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown timesheet status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for TimesheetStatus {
    type Err = UnknownStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().replace([' ', '-'], "_");
        TimesheetStatus::ordered()
            .into_iter()
            .find(|status| status.label().eq_ignore_ascii_case(&normalized))
            .ok_or_else(|| UnknownStatus(value.to_string()))
    }
}

/// One pay-period timesheet as stored by the county system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimesheetRecord {
    pub id: String,
    pub employee_id: String,
    pub employee_name: String,
    pub user_id: String,
    pub ssn: Option<String>,
    pub department: Option<String>,
    pub county_id: String,
    pub pay_period_start: NaiveDate,
    pub pay_period_end: NaiveDate,
    pub regular_hours: f64,
    pub overtime_hours: f64,
    pub sick_hours: f64,
    pub vacation_hours: f64,
    pub holiday_hours: f64,
    pub total_hours: f64,
    pub status: TimesheetStatus,
    pub comments: Option<String>,
    pub supervisor_comments: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub submitted_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub provider_gender: Option<String>,
    pub provider_ethnicity: Option<String>,
    pub provider_age_group: Option<String>,
    pub provider_date_of_birth: Option<NaiveDate>,
    pub recipient_gender: Option<String>,
    pub recipient_ethnicity: Option<String>,
    pub recipient_age_group: Option<String>,
    pub recipient_date_of_birth: Option<NaiveDate>,
}

impl TimesheetRecord {
    /// Field values keyed by their schema name. Missing optionals are `null`.
    pub fn field_values(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    /// Timestamp used for most-recent-first ordering.
    pub fn recency(&self) -> DateTime<Utc> {
        self.submitted_at.unwrap_or(self.created_at)
    }

    pub fn summed_hours(&self) -> f64 {
        self.regular_hours
            + self.overtime_hours
            + self.sick_hours
            + self.vacation_hours
            + self.holiday_hours
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::TimeZone;

    pub(crate) fn record(id: &str, county: &str, submitted_day: u32) -> TimesheetRecord {
        let submitted = Utc
            .with_ymd_and_hms(2025, 3, submitted_day, 9, 30, 0)
            .single()
            .expect("valid timestamp");
        TimesheetRecord {
            id: id.to_string(),
            employee_id: format!("EMP-{id}"),
            employee_name: "Maria Lopez".to_string(),
            user_id: format!("user-{id}"),
            ssn: Some("123456789".to_string()),
            department: Some("IHSS".to_string()),
            county_id: county.to_string(),
            pay_period_start: NaiveDate::from_ymd_opt(2025, 3, 1).expect("valid date"),
            pay_period_end: NaiveDate::from_ymd_opt(2025, 3, 15).expect("valid date"),
            regular_hours: 36.0,
            overtime_hours: 2.0,
            sick_hours: 0.0,
            vacation_hours: 0.0,
            holiday_hours: 0.0,
            total_hours: 38.0,
            status: TimesheetStatus::Submitted,
            comments: None,
            supervisor_comments: None,
            submitted_at: Some(submitted),
            submitted_by: Some("Maria Lopez".to_string()),
            approved_at: None,
            approved_by: None,
            created_at: submitted,
            updated_at: submitted,
            provider_gender: Some("F".to_string()),
            provider_ethnicity: Some("Hispanic".to_string()),
            provider_age_group: Some("35-44".to_string()),
            provider_date_of_birth: NaiveDate::from_ymd_opt(1986, 7, 14),
            recipient_gender: Some("M".to_string()),
            recipient_ethnicity: None,
            recipient_age_group: Some("65+".to_string()),
            recipient_date_of_birth: NaiveDate::from_ymd_opt(1950, 1, 2),
        }
    }
}
