use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use super::rule::{
    FieldMaskingRule, FieldMaskingRuleset, MaskingType, RuleAccessLevel, RulesetError,
};
use super::schema::FieldSchema;
use super::store::{AttributeStore, RulesetStore};
use super::transform::mask_value;
use crate::access::{CallerIdentity, Role};
use crate::error::PipelineError;
use crate::timesheet::TimesheetRecord;

/// A record after masking: hidden fields are absent, visible ones transformed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MaskedRecord {
    pub fields: Map<String, Value>,
}

impl MaskedRecord {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }
}

/// One rule in an administrative update. Report type comes from the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleInput {
    pub field_name: String,
    pub masking_type: MaskingType,
    pub access_level: RuleAccessLevel,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RulesetUpdate {
    #[serde(default)]
    pub report_type: String,
    #[serde(default)]
    pub rules: Vec<RuleInput>,
    #[serde(default)]
    pub selected_fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MaskingStatistics {
    pub role: Role,
    pub report_type: String,
    pub total_fields: usize,
    pub enabled_rules: usize,
    pub by_masking_type: BTreeMap<MaskingType, usize>,
    pub by_access_level: BTreeMap<RuleAccessLevel, usize>,
}

/// Resolves complete per-role rulesets and applies them to records.
pub struct FieldMaskingEngine<S, A> {
    store: Arc<S>,
    attributes: Arc<A>,
    schema: FieldSchema,
}

impl<S, A> FieldMaskingEngine<S, A>
where
    S: RulesetStore + 'static,
    A: AttributeStore + 'static,
{
    pub fn new(store: Arc<S>, attributes: Arc<A>) -> Self {
        Self::with_schema(store, attributes, FieldSchema::timesheet())
    }

    pub fn with_schema(store: Arc<S>, attributes: Arc<A>, schema: FieldSchema) -> Self {
        Self {
            store,
            attributes,
            schema,
        }
    }

    pub fn schema(&self) -> FieldSchema {
        self.schema
    }

    /// Ruleset for `(role, report_type)` from the persisted store.
    pub fn resolve(
        &self,
        role: Role,
        report_type: &str,
    ) -> Result<FieldMaskingRuleset, PipelineError> {
        let persisted = self
            .store
            .load(role, report_type)
            .map_err(RulesetError::from)?;
        Ok(self.resolve_encoded(role, report_type, persisted.as_deref()))
    }

    /// Like [`Self::resolve`], but rules embedded in the caller's own token take
    /// precedence for their own role. Non-admin callers may only read their
    /// own role's rules.
    pub fn resolve_for_caller(
        &self,
        caller: &CallerIdentity,
        role: Role,
        report_type: &str,
    ) -> Result<FieldMaskingRuleset, PipelineError> {
        if caller.role != role && caller.role != Role::Admin {
            return Err(PipelineError::Authorization {
                role: caller.role,
                action: "read masking rules of another role",
            });
        }

        if caller.role == role && !caller.embedded_rules.is_empty() {
            let embedded = Some(caller.embedded_rules.as_slice());
            return Ok(self.resolve_encoded(role, report_type, embedded));
        }

        self.resolve(role, report_type)
    }

    /// Merges encoded rules with the live schema. Exactly one rule per known
    /// field comes out. Without any configuration every field is unrestricted;
    /// with configuration, unconfigured fields are hidden.
    pub fn resolve_encoded(
        &self,
        role: Role,
        report_type: &str,
        persisted: Option<&[String]>,
    ) -> FieldMaskingRuleset {
        let persisted = persisted.filter(|encoded| !encoded.is_empty());

        let rules = match persisted {
            None => {
                info!(role = %role, report_type, "no masking configuration, defaulting to unrestricted");
                self.schema
                    .names()
                    .map(|name| FieldMaskingRule::unrestricted(name, report_type))
                    .collect()
            }
            Some(encoded) => {
                let mut configured = self.decode_known(role, report_type, encoded);
                self.schema
                    .names()
                    .map(|name| {
                        configured
                            .remove(name)
                            .unwrap_or_else(|| FieldMaskingRule::hidden(name, report_type))
                    })
                    .collect()
            }
        };

        FieldMaskingRuleset {
            role,
            report_type: report_type.to_string(),
            schema_version: self.schema.version(),
            rules,
        }
    }

    fn decode_known(
        &self,
        role: Role,
        report_type: &str,
        encoded: &[String],
    ) -> HashMap<&'static str, FieldMaskingRule> {
        let mut configured = HashMap::new();
        for raw in encoded {
            let mut rule = match FieldMaskingRule::decode(raw, report_type) {
                Ok(rule) => rule,
                Err(err) => {
                    warn!(role = %role, report_type, error = %err, "skipping unreadable masking rule");
                    continue;
                }
            };
            let Some(field) = self.schema.get(&rule.field_name) else {
                warn!(role = %role, report_type, field = %rule.field_name, "ignoring rule for unknown field");
                continue;
            };
            rule.field_name = field.name.to_string();
            if configured.contains_key(field.name) {
                warn!(role = %role, report_type, field = field.name, "duplicate masking rule ignored");
                continue;
            }
            configured.insert(field.name, rule);
        }
        configured
    }

    /// Full-replace update. The stored ruleset always spans every known field:
    /// selected fields keep the supplied rule, unselected ones are forced
    /// hidden, and fields without a supplied rule get a fresh hidden rule.
    pub fn update(
        &self,
        caller: &CallerIdentity,
        role: Role,
        update: RulesetUpdate,
    ) -> Result<FieldMaskingRuleset, PipelineError> {
        if caller.role != Role::Admin {
            warn!(caller_role = %caller.role, target_role = %role, "masking rule update rejected");
            return Err(PipelineError::Authorization {
                role: caller.role,
                action: "update masking rules",
            });
        }

        let report_type = update.report_type.trim().to_string();
        if report_type.is_empty() {
            return Err(PipelineError::Validation("report_type is required".to_string()));
        }

        for name in update
            .selected_fields
            .iter()
            .chain(update.rules.iter().map(|rule| &rule.field_name))
        {
            if self.schema.get(name).is_none() {
                return Err(PipelineError::Validation(format!("unknown field '{name}'")));
            }
        }

        let rules = self
            .schema
            .names()
            .map(|name| {
                let selected = update
                    .selected_fields
                    .iter()
                    .any(|field| field.trim().eq_ignore_ascii_case(name));
                let supplied = update
                    .rules
                    .iter()
                    .find(|rule| rule.field_name.trim().eq_ignore_ascii_case(name));

                match supplied {
                    Some(input) => FieldMaskingRule {
                        field_name: name.to_string(),
                        masking_type: input.masking_type,
                        access_level: if selected {
                            input.access_level
                        } else {
                            RuleAccessLevel::HiddenAccess
                        },
                        enabled: selected && input.enabled,
                        report_type: report_type.clone(),
                    },
                    None => FieldMaskingRule::hidden(name, report_type.as_str()),
                }
            })
            .collect();

        let ruleset = FieldMaskingRuleset {
            role,
            report_type: report_type.clone(),
            schema_version: self.schema.version(),
            rules,
        };

        let encoded = ruleset.encode();
        self.attributes
            .sync(role, &report_type, &encoded)
            .map_err(RulesetError::from)?;
        self.store
            .save(role, &report_type, encoded)
            .map_err(RulesetError::from)?;

        info!(
            role = %role,
            report_type = %report_type,
            visible = ruleset.visible_fields().len(),
            hidden = ruleset.hidden_fields().len(),
            "masking rules updated"
        );
        Ok(ruleset)
    }

    pub fn apply(&self, ruleset: &FieldMaskingRuleset, record: &TimesheetRecord) -> MaskedRecord {
        let values = record.field_values();
        let fields = ruleset
            .rules
            .iter()
            .filter(|rule| !rule.is_hidden())
            .map(|rule| {
                let value = values.get(&rule.field_name).unwrap_or(&Value::Null);
                (rule.field_name.clone(), mask_value(rule.masking_type, value))
            })
            .collect();
        MaskedRecord { fields }
    }

    pub fn apply_all(
        &self,
        ruleset: &FieldMaskingRuleset,
        records: &[TimesheetRecord],
    ) -> Vec<MaskedRecord> {
        records
            .iter()
            .map(|record| self.apply(ruleset, record))
            .collect()
    }

    pub fn statistics(&self, ruleset: &FieldMaskingRuleset) -> MaskingStatistics {
        let mut by_masking_type = BTreeMap::new();
        let mut by_access_level = BTreeMap::new();
        for rule in &ruleset.rules {
            *by_masking_type.entry(rule.masking_type).or_insert(0) += 1;
            *by_access_level.entry(rule.access_level).or_insert(0) += 1;
        }

        MaskingStatistics {
            role: ruleset.role,
            report_type: ruleset.report_type.clone(),
            total_fields: ruleset.rules.len(),
            enabled_rules: ruleset.rules.iter().filter(|rule| rule.enabled).count(),
            by_masking_type,
            by_access_level,
        }
    }
}
