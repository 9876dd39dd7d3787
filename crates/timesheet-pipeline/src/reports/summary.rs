use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::masking::{FieldMaskingRuleset, MaskedRecord, MaskingType, RuleAccessLevel};

const UNAVAILABLE: &str = "UNAVAILABLE";

/// Audit counts over a batch of masked records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractionSummary {
    pub total_records: usize,
    pub masked_records: usize,
    pub status_distribution: BTreeMap<String, usize>,
    pub county_distribution: BTreeMap<String, usize>,
}

impl ExtractionSummary {
    pub fn from_records(ruleset: &FieldMaskingRuleset, records: &[MaskedRecord]) -> Self {
        let mut summary = Self::default();
        summary.absorb(ruleset, records);
        summary
    }

    /// Adds another batch; used when records arrive chunk by chunk.
    pub fn absorb(&mut self, ruleset: &FieldMaskingRuleset, records: &[MaskedRecord]) {
        let transformed: Vec<&str> = ruleset
            .rules
            .iter()
            .filter(|rule| !rule.is_hidden() && rule.masking_type != MaskingType::None)
            .map(|rule| rule.field_name.as_str())
            .collect();

        let status_clear = passes_through(ruleset, "status");
        let county_clear = passes_through(ruleset, "countyId");

        for record in records {
            self.total_records += 1;
            if transformed
                .iter()
                .any(|field| record.get(field).is_some_and(|value| !value.is_null()))
            {
                self.masked_records += 1;
            }
            *self
                .status_distribution
                .entry(bucket(status_clear, record.get("status")))
                .or_insert(0) += 1;
            *self
                .county_distribution
                .entry(bucket(county_clear, record.get("countyId")))
                .or_insert(0) += 1;
        }
    }
}

fn passes_through(ruleset: &FieldMaskingRuleset, field: &str) -> bool {
    ruleset.rule(field).is_some_and(|rule| rule.passes_through())
}

fn bucket(clear: bool, value: Option<&Value>) -> String {
    match value {
        Some(Value::String(text)) if clear => text.clone(),
        _ => UNAVAILABLE.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldVisibilityEntry {
    pub field: String,
    pub access_level: RuleAccessLevel,
    pub masking_type: MaskingType,
    /// Records in which the field carries its stored value untransformed.
    pub visible_values: usize,
}

/// Per-field view of what a ruleset exposed for a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldVisibilityReport {
    pub visible: Vec<FieldVisibilityEntry>,
    pub hidden: Vec<String>,
}

impl FieldVisibilityReport {
    pub fn build(ruleset: &FieldMaskingRuleset, records: &[MaskedRecord]) -> Self {
        let mut report = Self::default();
        for rule in &ruleset.rules {
            if rule.is_hidden() {
                report.hidden.push(rule.field_name.clone());
                continue;
            }
            let visible_values = if rule.passes_through() {
                records
                    .iter()
                    .filter_map(|record| record.get(&rule.field_name))
                    .filter(|value| !value.is_null())
                    .count()
            } else {
                0
            };
            report.visible.push(FieldVisibilityEntry {
                field: rule.field_name.clone(),
                access_level: rule.access_level,
                masking_type: rule.masking_type,
                visible_values,
            });
        }
        report
    }
}
