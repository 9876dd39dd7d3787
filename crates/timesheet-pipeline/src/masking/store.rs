use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::access::Role;

/// Persisted rulesets, stored in their encoded string form and keyed by
/// `(role, reportType)`.
pub trait RulesetStore: Send + Sync {
    fn load(&self, role: Role, report_type: &str) -> Result<Option<Vec<String>>, StoreError>;
    fn save(&self, role: Role, report_type: &str, encoded: Vec<String>)
        -> Result<(), StoreError>;
}

/// Identity-provider attribute store that receives ruleset updates before the
/// persisted copy is written.
pub trait AttributeStore: Send + Sync {
    fn sync(&self, role: Role, report_type: &str, encoded: &[String]) -> Result<(), StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

type RulesetKey = (Role, String);

fn key(role: Role, report_type: &str) -> RulesetKey {
    (role, report_type.trim().to_ascii_uppercase())
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryRulesetStore {
    entries: Arc<RwLock<HashMap<RulesetKey, Vec<String>>>>,
}

impl InMemoryRulesetStore {
    pub fn with_entries(
        entries: impl IntoIterator<Item = (Role, String, Vec<String>)>,
    ) -> Self {
        let store = Self::default();
        {
            let mut guard = store.entries.write().unwrap_or_else(PoisonError::into_inner);
            for (role, report_type, encoded) in entries {
                guard.insert(key(role, &report_type), encoded);
            }
        }
        store
    }
}

impl RulesetStore for InMemoryRulesetStore {
    fn load(&self, role: Role, report_type: &str) -> Result<Option<Vec<String>>, StoreError> {
        let guard = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(guard.get(&key(role, report_type)).cloned())
    }

    fn save(
        &self,
        role: Role,
        report_type: &str,
        encoded: Vec<String>,
    ) -> Result<(), StoreError> {
        let mut guard = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        guard.insert(key(role, report_type), encoded);
        Ok(())
    }
}

/// Records attribute writes in memory; stands in for the identity provider's
/// admin API.
#[derive(Debug, Default, Clone)]
pub struct InMemoryAttributeStore {
    attributes: Arc<RwLock<HashMap<RulesetKey, Vec<String>>>>,
}

impl InMemoryAttributeStore {
    pub fn attributes(&self, role: Role, report_type: &str) -> Option<Vec<String>> {
        let guard = self.attributes.read().unwrap_or_else(PoisonError::into_inner);
        guard.get(&key(role, report_type)).cloned()
    }
}

impl AttributeStore for InMemoryAttributeStore {
    fn sync(&self, role: Role, report_type: &str, encoded: &[String]) -> Result<(), StoreError> {
        let mut guard = self.attributes.write().unwrap_or_else(PoisonError::into_inner);
        guard.insert(key(role, report_type), encoded.to_vec());
        Ok(())
    }
}
