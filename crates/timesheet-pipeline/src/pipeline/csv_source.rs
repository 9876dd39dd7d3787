use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};

use crate::timesheet::{TimesheetRecord, TimesheetStatus};

#[derive(Debug, thiserror::Error)]
pub enum CsvImportError {
    #[error("unable to open timesheet export: {0}")]
    Io(#[from] std::io::Error),
    #[error("timesheet export is not valid csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("row {row}: column '{column}' {reason}")]
    InvalidColumn {
        row: usize,
        column: &'static str,
        reason: &'static str,
    },
}

pub fn load_timesheets(path: impl AsRef<Path>) -> Result<Vec<TimesheetRecord>, CsvImportError> {
    let file = File::open(path)?;
    parse_timesheets(file)
}

/// Reads a timesheet export with camelCase headers matching the field schema.
pub fn parse_timesheets<R: Read>(reader: R) -> Result<Vec<TimesheetRecord>, CsvImportError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut records = Vec::new();

    for (index, row) in csv_reader.deserialize::<TimesheetRow>().enumerate() {
        let row = row?;
        records.push(row.into_record(index + 1)?);
    }

    Ok(records)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimesheetRow {
    id: String,
    employee_id: String,
    employee_name: String,
    user_id: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    ssn: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    department: Option<String>,
    county_id: String,
    pay_period_start: String,
    pay_period_end: String,
    #[serde(default)]
    regular_hours: Option<f64>,
    #[serde(default)]
    overtime_hours: Option<f64>,
    #[serde(default)]
    sick_hours: Option<f64>,
    #[serde(default)]
    vacation_hours: Option<f64>,
    #[serde(default)]
    holiday_hours: Option<f64>,
    #[serde(default)]
    total_hours: Option<f64>,
    status: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    comments: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    supervisor_comments: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    submitted_at: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    submitted_by: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    approved_at: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    approved_by: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    created_at: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    updated_at: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    provider_gender: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    provider_ethnicity: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    provider_age_group: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    provider_date_of_birth: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    recipient_gender: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    recipient_ethnicity: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    recipient_age_group: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    recipient_date_of_birth: Option<String>,
}

impl TimesheetRow {
    fn into_record(self, row: usize) -> Result<TimesheetRecord, CsvImportError> {
        let invalid = |column: &'static str, reason: &'static str| CsvImportError::InvalidColumn {
            row,
            column,
            reason,
        };
        let date = |column: &'static str, value: &str| {
            parse_date(value).ok_or_else(|| invalid(column, "is not a YYYY-MM-DD date"))
        };
        let optional_date = |column: &'static str, value: Option<&str>| {
            value.map(|value| date(column, value)).transpose()
        };
        let timestamp = |column: &'static str, value: Option<&str>| {
            value
                .map(|value| {
                    parse_timestamp(value).ok_or_else(|| invalid(column, "is not a timestamp"))
                })
                .transpose()
        };

        let status: TimesheetStatus = self
            .status
            .parse()
            .map_err(|_| invalid("status", "is not a known timesheet status"))?;

        let submitted_at = timestamp("submittedAt", self.submitted_at.as_deref())?;
        let created_at = timestamp("createdAt", self.created_at.as_deref())?
            .or(submitted_at)
            .ok_or_else(|| invalid("createdAt", "is required when submittedAt is empty"))?;
        let updated_at = timestamp("updatedAt", self.updated_at.as_deref())?.unwrap_or(created_at);

        let regular_hours = self.regular_hours.unwrap_or(0.0);
        let overtime_hours = self.overtime_hours.unwrap_or(0.0);
        let sick_hours = self.sick_hours.unwrap_or(0.0);
        let vacation_hours = self.vacation_hours.unwrap_or(0.0);
        let holiday_hours = self.holiday_hours.unwrap_or(0.0);
        let total_hours = self.total_hours.unwrap_or(
            regular_hours + overtime_hours + sick_hours + vacation_hours + holiday_hours,
        );

        Ok(TimesheetRecord {
            id: self.id,
            employee_id: self.employee_id,
            employee_name: self.employee_name,
            user_id: self.user_id,
            ssn: self.ssn,
            department: self.department,
            county_id: self.county_id,
            pay_period_start: date("payPeriodStart", &self.pay_period_start)?,
            pay_period_end: date("payPeriodEnd", &self.pay_period_end)?,
            regular_hours,
            overtime_hours,
            sick_hours,
            vacation_hours,
            holiday_hours,
            total_hours,
            status,
            comments: self.comments,
            supervisor_comments: self.supervisor_comments,
            submitted_at,
            submitted_by: self.submitted_by,
            approved_at: timestamp("approvedAt", self.approved_at.as_deref())?,
            approved_by: self.approved_by,
            created_at,
            updated_at,
            provider_gender: self.provider_gender,
            provider_ethnicity: self.provider_ethnicity,
            provider_age_group: self.provider_age_group,
            provider_date_of_birth: optional_date(
                "providerDateOfBirth",
                self.provider_date_of_birth.as_deref(),
            )?,
            recipient_gender: self.recipient_gender,
            recipient_ethnicity: self.recipient_ethnicity,
            recipient_age_group: self.recipient_age_group,
            recipient_date_of_birth: optional_date(
                "recipientDateOfBirth",
                self.recipient_date_of_birth.as_deref(),
            )?,
        })
    }
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}

pub(crate) fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc());
    }

    parse_date(trimmed)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
