use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Authorization identity class resolved from a caller's token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Supervisor,
    CaseWorker,
    Provider,
    Recipient,
    SystemScheduler,
}

impl Role {
    pub const fn ordered() -> [Role; 6] {
        [
            Role::Admin,
            Role::Supervisor,
            Role::CaseWorker,
            Role::Provider,
            Role::Recipient,
            Role::SystemScheduler,
        ]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Supervisor => "SUPERVISOR",
            Role::CaseWorker => "CASE_WORKER",
            Role::Provider => "PROVIDER",
            Role::Recipient => "RECIPIENT",
            Role::SystemScheduler => "SYSTEM_SCHEDULER",
        }
    }

    /// Global roles see every county and may run unfiltered extractions.
    pub const fn is_global(self) -> bool {
        matches!(self, Role::Admin | Role::SystemScheduler)
    }

    pub const fn is_county_restricted(self) -> bool {
        !self.is_global()
    }

    /// Self-scoped roles only ever see records attached to their own user id.
    pub const fn is_self_scoped(self) -> bool {
        matches!(self, Role::Provider | Role::Recipient)
    }

    /// Parses a raw role claim. Returns `None` for anything outside the
    /// catalogue so unknown strings are filtered rather than guessed.
    pub fn parse(raw: &str) -> Option<Role> {
        let normalized = raw.trim().to_ascii_uppercase();
        if normalized.starts_with("SERVICE-ACCOUNT-") || normalized.starts_with("SERVICE_ACCOUNT_")
        {
            return Some(Role::SystemScheduler);
        }

        let normalized = normalized.replace('-', "_");
        let normalized = normalized.strip_prefix("ROLE_").unwrap_or(&normalized);
        Role::ordered()
            .into_iter()
            .find(|role| role.label() == normalized)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role '{0}'")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Role::parse(value).ok_or_else(|| UnknownRole(value.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_and_separator_variants() {
        assert_eq!(Role::parse("case_worker"), Some(Role::CaseWorker));
        assert_eq!(Role::parse(" Case-Worker "), Some(Role::CaseWorker));
        assert_eq!(Role::parse("ROLE_ADMIN"), Some(Role::Admin));
        assert_eq!(Role::parse("system_scheduler"), Some(Role::SystemScheduler));
    }

    #[test]
    fn service_accounts_map_to_scheduler() {
        assert_eq!(
            Role::parse("service-account-trial-app"),
            Some(Role::SystemScheduler)
        );
    }

    #[test]
    fn unknown_strings_are_rejected() {
        assert_eq!(Role::parse("auditor"), None);
        assert_eq!(Role::parse(""), None);
        assert!("janitor".parse::<Role>().is_err());
    }

    #[test]
    fn scope_classification() {
        let global: Vec<Role> = Role::ordered()
            .into_iter()
            .filter(|role| role.is_global())
            .collect();
        assert_eq!(global, vec![Role::Admin, Role::SystemScheduler]);
        assert!(Role::Provider.is_county_restricted());
        assert!(Role::Recipient.is_self_scoped());
        assert!(!Role::Supervisor.is_self_scoped());
    }

    #[test]
    fn serializes_as_claim_label() {
        let json = serde_json::to_string(&Role::CaseWorker).expect("serializes");
        assert_eq!(json, "\"CASE_WORKER\"");
    }
}
