//! Field masking: the versioned field schema, rule encoding, persisted rule
//! stores, value transforms, and the engine that resolves and applies rulesets.

pub mod engine;
pub mod rule;
pub mod schema;
pub mod store;
pub mod transform;

pub use engine::{FieldMaskingEngine, MaskedRecord, MaskingStatistics, RuleInput, RulesetUpdate};
pub use rule::{FieldMaskingRule, FieldMaskingRuleset, MaskingType, RuleAccessLevel, RulesetError};
pub use schema::{
    FieldGroup, FieldMetadata, FieldSchema, SemanticType, ValueType, TIMESHEET_SCHEMA_VERSION,
};
pub use store::{
    AttributeStore, InMemoryAttributeStore, InMemoryRulesetStore, RulesetStore, StoreError,
};
pub use transform::{mask_value, partial_mask, string_hash, REDACTION_MARKER};
