use std::collections::BTreeSet;

use serde::Serialize;

use super::role::Role;
use crate::masking::{
    FieldGroup, FieldMaskingRule, FieldMaskingRuleset, FieldSchema, MaskingType, RuleAccessLevel,
    SemanticType,
};

/// Summary level of a role's access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessLevel {
    Full,
    Masked,
    Hidden,
}

/// Partition of the field schema into shown, masked, and withheld fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessPattern {
    pub role: Role,
    pub allowed_fields: BTreeSet<String>,
    pub masked_fields: BTreeSet<String>,
    pub hidden_fields: BTreeSet<String>,
    pub access_level: AccessLevel,
}

impl AccessPattern {
    /// Summarises a resolved ruleset the same way [`RulesEngine`] summarises a
    /// role, so the two can be compared.
    pub fn from_ruleset(ruleset: &FieldMaskingRuleset) -> Self {
        let mut pattern = PatternBuilder::default();
        for rule in &ruleset.rules {
            let treatment = if rule.is_hidden() {
                Treatment::Hide
            } else if rule.is_masked() {
                Treatment::Mask
            } else {
                Treatment::Show
            };
            pattern.push(&rule.field_name, treatment);
        }
        pattern.finish(ruleset.role)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Treatment {
    Show,
    Mask,
    Hide,
}

#[derive(Default)]
struct PatternBuilder {
    allowed: BTreeSet<String>,
    masked: BTreeSet<String>,
    hidden: BTreeSet<String>,
}

impl PatternBuilder {
    fn push(&mut self, field: &str, treatment: Treatment) {
        let bucket = match treatment {
            Treatment::Show => &mut self.allowed,
            Treatment::Mask => &mut self.masked,
            Treatment::Hide => &mut self.hidden,
        };
        bucket.insert(field.to_string());
    }

    fn finish(self, role: Role) -> AccessPattern {
        let access_level = if self.masked.is_empty() && self.hidden.is_empty() {
            AccessLevel::Full
        } else if self.allowed.is_empty() && self.masked.is_empty() {
            AccessLevel::Hidden
        } else {
            AccessLevel::Masked
        };

        AccessPattern {
            role,
            allowed_fields: self.allowed,
            masked_fields: self.masked,
            hidden_fields: self.hidden,
            access_level,
        }
    }
}

/// Pure mapping from role to capability summary and baseline ruleset.
#[derive(Debug, Clone, Copy, Default)]
pub struct RulesEngine {
    schema: FieldSchema,
}

impl RulesEngine {
    pub fn new(schema: FieldSchema) -> Self {
        Self { schema }
    }

    pub fn determine_access_pattern(&self, role: Role) -> AccessPattern {
        let mut pattern = PatternBuilder::default();
        for field in self.schema.fields() {
            pattern.push(field.name, treatment(role, field.group));
        }
        pattern.finish(role)
    }

    /// Concrete ruleset matching [`Self::determine_access_pattern`]; used to
    /// seed configuration for roles that should not start unrestricted.
    pub fn baseline_ruleset(&self, role: Role, report_type: &str) -> FieldMaskingRuleset {
        let rules = self
            .schema
            .fields()
            .iter()
            .map(|field| match treatment(role, field.group) {
                Treatment::Show => FieldMaskingRule::unrestricted(field.name, report_type),
                Treatment::Hide => FieldMaskingRule::hidden(field.name, report_type),
                Treatment::Mask => FieldMaskingRule {
                    field_name: field.name.to_string(),
                    masking_type: default_masking(field.semantic_type),
                    access_level: RuleAccessLevel::MaskedAccess,
                    enabled: true,
                    report_type: report_type.to_string(),
                },
            })
            .collect();

        FieldMaskingRuleset {
            role,
            report_type: report_type.to_string(),
            schema_version: self.schema.version(),
            rules,
        }
    }
}

fn treatment(role: Role, group: FieldGroup) -> Treatment {
    use FieldGroup::{Audit, Demographic, Identity, Operational};

    match (role, group) {
        (Role::Admin | Role::SystemScheduler, _) => Treatment::Show,
        (_, Operational) => Treatment::Show,
        (_, Identity) => Treatment::Mask,
        (Role::Supervisor, Demographic) => Treatment::Mask,
        (Role::Supervisor | Role::CaseWorker, Audit) => Treatment::Show,
        (_, Demographic) | (_, Audit) => Treatment::Hide,
    }
}

fn default_masking(semantic_type: SemanticType) -> MaskingType {
    match semantic_type {
        SemanticType::GovernmentId => MaskingType::PartialMask,
        SemanticType::PersonName => MaskingType::Anonymize,
        SemanticType::Identifier => MaskingType::HashMask,
        SemanticType::Demographic | SemanticType::DateOfBirth => MaskingType::Aggregate,
        _ => MaskingType::Hidden,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = "TIMESHEET_REPORT";

    #[test]
    fn global_roles_have_full_access() {
        let engine = RulesEngine::default();
        for role in [Role::Admin, Role::SystemScheduler] {
            let pattern = engine.determine_access_pattern(role);
            assert_eq!(pattern.access_level, AccessLevel::Full);
            assert_eq!(pattern.allowed_fields.len(), FieldSchema::timesheet().len());
        }
    }

    #[test]
    fn case_worker_masks_identity_and_hides_demographics() {
        let pattern = RulesEngine::default().determine_access_pattern(Role::CaseWorker);
        assert_eq!(pattern.access_level, AccessLevel::Masked);
        assert!(pattern.masked_fields.contains("ssn"));
        assert!(pattern.allowed_fields.contains("totalHours"));
        assert!(pattern.allowed_fields.contains("approvedBy"));
        assert!(pattern.hidden_fields.contains("providerEthnicity"));
    }

    #[test]
    fn read_only_roles_are_most_restrictive() {
        let engine = RulesEngine::default();
        let supervisor = engine.determine_access_pattern(Role::Supervisor);
        let provider = engine.determine_access_pattern(Role::Provider);
        assert!(provider.allowed_fields.len() < supervisor.allowed_fields.len());
        assert!(provider.hidden_fields.contains("supervisorComments"));
        assert!(supervisor.masked_fields.contains("recipientGender"));
    }

    #[test]
    fn patterns_partition_the_schema() {
        let engine = RulesEngine::default();
        let total = FieldSchema::timesheet().len();
        for role in Role::ordered() {
            let pattern = engine.determine_access_pattern(role);
            let covered = pattern.allowed_fields.len()
                + pattern.masked_fields.len()
                + pattern.hidden_fields.len();
            assert_eq!(covered, total, "{role}");
        }
    }

    #[test]
    fn baseline_ruleset_agrees_with_pattern() {
        let engine = RulesEngine::default();
        for role in Role::ordered() {
            let ruleset = engine.baseline_ruleset(role, REPORT);
            assert_eq!(
                AccessPattern::from_ruleset(&ruleset),
                engine.determine_access_pattern(role),
                "{role}"
            );
        }
    }

    #[test]
    fn resolved_rulesets_agree_with_pattern_once_baselines_are_seeded() {
        use crate::masking::{
            AttributeStore, FieldMaskingEngine, InMemoryAttributeStore, InMemoryRulesetStore,
            RulesetStore,
        };
        use std::sync::Arc;

        let engine = RulesEngine::default();
        let store = Arc::new(InMemoryRulesetStore::default());
        let attributes = Arc::new(InMemoryAttributeStore::default());
        for role in Role::ordered().into_iter().filter(|role| !role.is_global()) {
            let encoded = engine.baseline_ruleset(role, REPORT).encode();
            attributes.sync(role, REPORT, &encoded).expect("syncs");
            store.save(role, REPORT, encoded).expect("saves");
        }
        let masking = FieldMaskingEngine::new(store, attributes);

        for role in Role::ordered() {
            let resolved = masking.resolve(role, REPORT).expect("resolves");
            assert_eq!(
                AccessPattern::from_ruleset(&resolved),
                engine.determine_access_pattern(role),
                "{role}"
            );
        }
    }

    #[test]
    fn baseline_masks_ssn_partially() {
        let ruleset = RulesEngine::default().baseline_ruleset(Role::CaseWorker, REPORT);
        let rule = ruleset.rule("ssn").expect("ssn rule");
        assert_eq!(rule.masking_type, MaskingType::PartialMask);
        assert_eq!(rule.access_level, RuleAccessLevel::MaskedAccess);
        assert!(rule.enabled);
        assert_eq!(
            ruleset.rule("employeeName").map(|rule| rule.masking_type),
            Some(MaskingType::Anonymize)
        );
    }
}
