use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::store::StoreError;
use crate::access::Role;

/// Display transform applied to a visible field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MaskingType {
    None,
    Hidden,
    PartialMask,
    HashMask,
    Anonymize,
    Aggregate,
}

impl MaskingType {
    pub const fn ordered() -> [MaskingType; 6] {
        [
            MaskingType::None,
            MaskingType::Hidden,
            MaskingType::PartialMask,
            MaskingType::HashMask,
            MaskingType::Anonymize,
            MaskingType::Aggregate,
        ]
    }

    pub const fn label(self) -> &'static str {
        match self {
            MaskingType::None => "NONE",
            MaskingType::Hidden => "HIDDEN",
            MaskingType::PartialMask => "PARTIAL_MASK",
            MaskingType::HashMask => "HASH_MASK",
            MaskingType::Anonymize => "ANONYMIZE",
            MaskingType::Aggregate => "AGGREGATE",
        }
    }
}

impl FromStr for MaskingType {
    type Err = RulesetError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        MaskingType::ordered()
            .into_iter()
            .find(|kind| kind.label().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| RulesetError::UnknownMaskingType(trimmed.to_string()))
    }
}

impl fmt::Display for MaskingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Whether a field is shown as-is, shown masked, or withheld.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleAccessLevel {
    FullAccess,
    MaskedAccess,
    HiddenAccess,
}

impl RuleAccessLevel {
    pub const fn ordered() -> [RuleAccessLevel; 3] {
        [
            RuleAccessLevel::FullAccess,
            RuleAccessLevel::MaskedAccess,
            RuleAccessLevel::HiddenAccess,
        ]
    }

    pub const fn label(self) -> &'static str {
        match self {
            RuleAccessLevel::FullAccess => "FULL_ACCESS",
            RuleAccessLevel::MaskedAccess => "MASKED_ACCESS",
            RuleAccessLevel::HiddenAccess => "HIDDEN_ACCESS",
        }
    }
}

impl FromStr for RuleAccessLevel {
    type Err = RulesetError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        RuleAccessLevel::ordered()
            .into_iter()
            .find(|level| level.label().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| RulesetError::UnknownAccessLevel(trimmed.to_string()))
    }
}

impl fmt::Display for RuleAccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMaskingRule {
    pub field_name: String,
    pub masking_type: MaskingType,
    pub access_level: RuleAccessLevel,
    pub enabled: bool,
    pub report_type: String,
}

impl FieldMaskingRule {
    /// Fail-closed rule for fields without explicit configuration.
    pub fn hidden(field_name: impl Into<String>, report_type: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            masking_type: MaskingType::None,
            access_level: RuleAccessLevel::HiddenAccess,
            enabled: false,
            report_type: report_type.into(),
        }
    }

    /// Permissive rule used only while a role has never been configured.
    pub fn unrestricted(field_name: impl Into<String>, report_type: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            masking_type: MaskingType::None,
            access_level: RuleAccessLevel::FullAccess,
            enabled: true,
            report_type: report_type.into(),
        }
    }

    pub fn is_hidden(&self) -> bool {
        self.access_level == RuleAccessLevel::HiddenAccess
    }

    /// Visible and emitted exactly as stored.
    pub fn passes_through(&self) -> bool {
        !self.is_hidden() && self.masking_type == MaskingType::None
    }

    /// Visible but transformed, either by level or by masking type.
    pub fn is_masked(&self) -> bool {
        !self.is_hidden()
            && (self.access_level == RuleAccessLevel::MaskedAccess
                || self.masking_type != MaskingType::None)
    }

    /// Persisted form: `fieldName:maskingType:accessLevel:enabled`.
    pub fn encode(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.field_name, self.masking_type, self.access_level, self.enabled
        )
    }

    pub fn decode(raw: &str, report_type: &str) -> Result<Self, RulesetError> {
        let parts: Vec<&str> = raw.trim().split(':').collect();
        let [field_name, masking_type, access_level, enabled] = parts.as_slice() else {
            return Err(RulesetError::Malformed {
                raw: raw.to_string(),
                reason: "expected four colon-separated parts",
            });
        };

        let field_name = field_name.trim();
        if field_name.is_empty() {
            return Err(RulesetError::Malformed {
                raw: raw.to_string(),
                reason: "field name is empty",
            });
        }

        let enabled = match enabled.trim().to_ascii_lowercase().as_str() {
            "true" => true,
            "false" => false,
            other => return Err(RulesetError::InvalidEnabled(other.to_string())),
        };

        Ok(Self {
            field_name: field_name.to_string(),
            masking_type: masking_type.parse()?,
            access_level: access_level.parse()?,
            enabled,
            report_type: report_type.to_string(),
        })
    }
}

/// A role's complete rule list for one report type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMaskingRuleset {
    pub role: Role,
    pub report_type: String,
    pub schema_version: u32,
    pub rules: Vec<FieldMaskingRule>,
}

impl FieldMaskingRuleset {
    pub fn rule(&self, field_name: &str) -> Option<&FieldMaskingRule> {
        let field_name = field_name.trim();
        self.rules
            .iter()
            .find(|rule| rule.field_name.eq_ignore_ascii_case(field_name))
    }

    pub fn encode(&self) -> Vec<String> {
        self.rules.iter().map(FieldMaskingRule::encode).collect()
    }

    /// Fields that reach the output, masked or not.
    pub fn visible_fields(&self) -> Vec<&str> {
        self.field_names(|rule| !rule.is_hidden())
    }

    pub fn masked_fields(&self) -> Vec<&str> {
        self.field_names(FieldMaskingRule::is_masked)
    }

    pub fn hidden_fields(&self) -> Vec<&str> {
        self.field_names(FieldMaskingRule::is_hidden)
    }

    pub fn full_access_fields(&self) -> Vec<&str> {
        self.field_names(|rule| !rule.is_hidden() && !rule.is_masked())
    }

    fn field_names(&self, keep: impl Fn(&FieldMaskingRule) -> bool) -> Vec<&str> {
        self.rules
            .iter()
            .filter(|rule| keep(rule))
            .map(|rule| rule.field_name.as_str())
            .collect()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RulesetError {
    #[error("malformed masking rule '{raw}': {reason}")]
    Malformed { raw: String, reason: &'static str },
    #[error("unknown masking type '{0}'")]
    UnknownMaskingType(String),
    #[error("unknown access level '{0}'")]
    UnknownAccessLevel(String),
    #[error("enabled flag must be true or false, got '{0}'")]
    InvalidEnabled(String),
    #[error("ruleset store failed: {0}")]
    Store(#[from] StoreError),
}
