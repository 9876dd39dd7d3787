use std::cmp::Reverse;
use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use super::summary::{ExtractionSummary, FieldVisibilityReport};
use crate::access::Role;
use crate::masking::{FieldMaskingRuleset, MaskedRecord, MaskingType};
use crate::pipeline::csv_source::parse_timestamp;

const RECENCY_FIELD: &str = "submittedAt";

/// Structured report handed back to callers of a completed job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportPayload {
    pub report_type: String,
    pub role: Role,
    pub generated_at: DateTime<Utc>,
    pub columns: Vec<String>,
    pub records: Vec<MaskedRecord>,
    pub summary: ExtractionSummary,
    pub field_visibility: FieldVisibilityReport,
    pub statistics: ReportStatistics,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportStatistics {
    pub record_count: usize,
    /// Sum over records whose `totalHours` is visible as a number.
    pub total_hours: f64,
    pub unique_employees: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReportAssembler;

impl ReportAssembler {
    pub fn assemble(
        &self,
        ruleset: &FieldMaskingRuleset,
        records: Vec<MaskedRecord>,
        generated_at: DateTime<Utc>,
    ) -> ReportPayload {
        let columns = report_columns(ruleset);
        let summary = ExtractionSummary::from_records(ruleset, &records);
        let field_visibility = FieldVisibilityReport::build(ruleset, &records);
        let statistics = statistics(&records);

        let mut records = sort_most_recent_first(records);
        for record in &mut records {
            record
                .fields
                .retain(|field, _| columns.iter().any(|column| column == field));
        }

        ReportPayload {
            report_type: ruleset.report_type.clone(),
            role: ruleset.role,
            generated_at,
            columns,
            records,
            summary,
            field_visibility,
            statistics,
        }
    }
}

/// Visible fields, minus those whose masking would only ever print the
/// redaction marker.
pub fn report_columns(ruleset: &FieldMaskingRuleset) -> Vec<String> {
    ruleset
        .rules
        .iter()
        .filter(|rule| !rule.is_hidden() && rule.masking_type != MaskingType::Hidden)
        .map(|rule| rule.field_name.clone())
        .collect()
}

/// Stable: equal or missing timestamps keep their input order, and records
/// without a readable timestamp go last.
pub fn sort_most_recent_first(records: Vec<MaskedRecord>) -> Vec<MaskedRecord> {
    let mut keyed: Vec<(Option<DateTime<Utc>>, MaskedRecord)> = records
        .into_iter()
        .map(|record| (recency(&record), record))
        .collect();
    keyed.sort_by_key(|(timestamp, _)| (timestamp.is_none(), timestamp.map(Reverse)));
    keyed.into_iter().map(|(_, record)| record).collect()
}

fn recency(record: &MaskedRecord) -> Option<DateTime<Utc>> {
    record
        .get(RECENCY_FIELD)
        .and_then(Value::as_str)
        .and_then(parse_timestamp)
}

fn statistics(records: &[MaskedRecord]) -> ReportStatistics {
    let total_hours = records
        .iter()
        .filter_map(|record| record.get("totalHours").and_then(Value::as_f64))
        .sum();
    let unique_employees = records
        .iter()
        .filter_map(|record| record.get("employeeId").and_then(Value::as_str))
        .collect::<BTreeSet<_>>()
        .len();

    ReportStatistics {
        record_count: records.len(),
        total_hours,
        unique_employees,
    }
}
