use std::collections::HashMap;
use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::role::Role;
use crate::error::PipelineError;

const RESERVED_ROLE_PREFIX: &str = "default-roles-";
const RESERVED_ROLES: [&str; 2] = ["offline_access", "uma_authorization"];

/// County identifier bound to a caller or a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CountyId(pub String);

impl CountyId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn matches(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other.trim())
    }
}

impl fmt::Display for CountyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Claims consumed from the identity provider's access token.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, alias = "userId", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub resource_access: HashMap<String, RoleClaims>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realm_access: Option<RoleClaims>,
    #[serde(default, rename = "countyId", skip_serializing_if = "Option::is_none")]
    pub county_id: Option<ClaimValue>,
    #[serde(default, rename = "county_id", skip_serializing_if = "Option::is_none")]
    pub county_id_snake: Option<ClaimValue>,
    #[serde(default)]
    pub attributes: HashMap<String, ClaimValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub field_masking_rules: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleClaims {
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Attribute claims arrive either as a plain string or as a list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClaimValue {
    Single(String),
    List(Vec<String>),
    Other(serde_json::Value),
}

impl ClaimValue {
    /// First non-blank string carried by the claim.
    pub fn first(&self) -> Option<&str> {
        match self {
            ClaimValue::Single(value) => Some(value.trim()).filter(|value| !value.is_empty()),
            ClaimValue::List(values) => values
                .iter()
                .map(|value| value.trim())
                .find(|value| !value.is_empty()),
            ClaimValue::Other(_) => None,
        }
    }
}

/// Who is calling, as established from the token. Produced once per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub role: Role,
    pub county: Option<CountyId>,
    pub user_id: Option<String>,
    pub embedded_rules: Vec<String>,
}

impl CallerIdentity {
    /// Whether data tagged with `county` may be shown to this caller.
    pub fn can_see_county(&self, county: Option<&CountyId>) -> bool {
        if self.role.is_global() {
            return true;
        }
        match (&self.county, county) {
            (Some(own), Some(other)) => own.matches(other.as_str()),
            _ => false,
        }
    }
}

pub fn is_reserved_role(raw: &str) -> bool {
    let trimmed = raw.trim();
    trimmed.is_empty()
        || trimmed.to_ascii_lowercase().starts_with(RESERVED_ROLE_PREFIX)
        || RESERVED_ROLES
            .iter()
            .any(|reserved| reserved.eq_ignore_ascii_case(trimmed))
}

/// Extracts role and county scope from identity tokens.
#[derive(Debug, Clone)]
pub struct ClaimsResolver {
    client_id: String,
}

impl ClaimsResolver {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Decodes the payload segment of a bearer JWT. The signature is checked
    /// upstream by the identity gateway.
    pub fn decode_bearer(token: &str) -> Result<TokenClaims, PipelineError> {
        let token = token.trim();
        let token = token
            .strip_prefix("Bearer ")
            .or_else(|| token.strip_prefix("bearer "))
            .unwrap_or(token)
            .trim();
        if token.is_empty() {
            return Err(PipelineError::Authentication(
                "bearer token is empty".to_string(),
            ));
        }

        let mut segments = token.split('.');
        let payload = match (segments.next(), segments.next(), segments.next()) {
            (Some(_), Some(payload), Some(_)) if segments.next().is_none() => payload,
            _ => {
                return Err(PipelineError::Authentication(
                    "bearer token is not a three-part JWT".to_string(),
                ))
            }
        };

        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|err| {
                PipelineError::Authentication(format!("token payload is not base64url: {err}"))
            })?;

        serde_json::from_slice(&bytes).map_err(|err| {
            PipelineError::Authentication(format!("token payload is not valid claims: {err}"))
        })
    }

    pub fn resolve_bearer(&self, token: &str) -> Result<CallerIdentity, PipelineError> {
        let claims = Self::decode_bearer(token)?;
        self.resolve(&claims)
    }

    pub fn resolve(&self, claims: &TokenClaims) -> Result<CallerIdentity, PipelineError> {
        let role = self.resolve_role(claims)?;
        let county = resolve_county(claims);

        if role.is_county_restricted() && county.is_none() {
            warn!(role = %role, "county claim missing for county-restricted role");
            return Err(PipelineError::CountyRequired { role });
        }

        let user_id = claims
            .user_id
            .as_deref()
            .or(claims.sub.as_deref())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);

        if role.is_self_scoped() && user_id.is_none() {
            return Err(PipelineError::Authentication(format!(
                "token for role {role} carries no subject"
            )));
        }

        debug!(
            role = %role,
            county = county.as_ref().map(CountyId::as_str).unwrap_or("ALL"),
            "resolved caller identity"
        );

        Ok(CallerIdentity {
            role,
            county,
            user_id,
            embedded_rules: claims.field_masking_rules.clone(),
        })
    }

    /// Client-scoped roles first, realm roles as the fallback. Never defaults.
    pub fn resolve_role(&self, claims: &TokenClaims) -> Result<Role, PipelineError> {
        let client_roles = claims
            .resource_access
            .get(&self.client_id)
            .map(|access| access.roles.as_slice())
            .unwrap_or_default();

        if let Some(role) = first_recognised(client_roles) {
            return Ok(role);
        }

        let realm_roles = claims
            .realm_access
            .as_ref()
            .map(|access| access.roles.as_slice())
            .unwrap_or_default();

        first_recognised(realm_roles).ok_or(PipelineError::RoleResolution)
    }
}

fn first_recognised(roles: &[String]) -> Option<Role> {
    roles
        .iter()
        .filter(|raw| !is_reserved_role(raw))
        .find_map(|raw| Role::parse(raw))
}

fn resolve_county(claims: &TokenClaims) -> Option<CountyId> {
    let direct = claims
        .county_id
        .as_ref()
        .or(claims.county_id_snake.as_ref())
        .and_then(ClaimValue::first);

    let nested = || {
        ["countyId", "county_id"]
            .iter()
            .filter_map(|key| claims.attributes.get(*key))
            .find_map(ClaimValue::first)
    };

    direct.or_else(nested).map(CountyId::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claims(value: serde_json::Value) -> TokenClaims {
        serde_json::from_value(value).expect("claims deserialize")
    }

    fn resolver() -> ClaimsResolver {
        ClaimsResolver::new("trial-app")
    }

    fn encode(value: &serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(value.to_string());
        format!("{header}.{payload}.signature")
    }

    #[test]
    fn client_roles_win_over_realm_roles() {
        let token = claims(json!({
            "sub": "u-1",
            "countyId": "ALAMEDA",
            "resource_access": { "trial-app": { "roles": ["default-roles-cmips", "SUPERVISOR"] } },
            "realm_access": { "roles": ["ADMIN"] }
        }));
        let identity = resolver().resolve(&token).expect("resolves");
        assert_eq!(identity.role, Role::Supervisor);
        assert_eq!(identity.county, Some(CountyId::new("ALAMEDA")));
    }

    #[test]
    fn falls_back_to_realm_roles_after_filtering() {
        let token = claims(json!({
            "resource_access": { "trial-app": { "roles": ["offline_access", "uma_authorization"] } },
            "realm_access": { "roles": ["default-roles-cmips", "auditor", "ADMIN"] }
        }));
        assert_eq!(resolver().resolve_role(&token).expect("role"), Role::Admin);
    }

    #[test]
    fn other_clients_are_ignored() {
        let token = claims(json!({
            "resource_access": { "billing": { "roles": ["ADMIN"] } },
            "realm_access": { "roles": ["CASE_WORKER"] },
            "countyId": "FRESNO"
        }));
        assert_eq!(
            resolver().resolve_role(&token).expect("role"),
            Role::CaseWorker
        );
    }

    #[test]
    fn only_reserved_roles_fail_resolution() {
        let token = claims(json!({
            "realm_access": { "roles": ["default-roles-cmips", "offline_access"] }
        }));
        let err = resolver().resolve(&token).expect_err("no role");
        assert!(matches!(err, PipelineError::RoleResolution));
    }

    #[test]
    fn county_from_nested_list_attribute() {
        let token = claims(json!({
            "sub": "u-2",
            "realm_access": { "roles": ["CASE_WORKER"] },
            "attributes": { "county_id": ["SONOMA"] }
        }));
        let identity = resolver().resolve(&token).expect("resolves");
        assert_eq!(identity.county, Some(CountyId::new("SONOMA")));
    }

    #[test]
    fn county_from_nested_scalar_attribute() {
        let token = claims(json!({
            "realm_access": { "roles": ["SUPERVISOR"] },
            "attributes": { "countyId": "KERN", "department": 7 }
        }));
        let identity = resolver().resolve(&token).expect("resolves");
        assert_eq!(identity.county, Some(CountyId::new("KERN")));
    }

    #[test]
    fn restricted_role_without_county_fails() {
        let token = claims(json!({
            "realm_access": { "roles": ["CASE_WORKER"] },
            "attributes": { "countyId": [] }
        }));
        let err = resolver().resolve(&token).expect_err("county required");
        assert!(matches!(
            err,
            PipelineError::CountyRequired {
                role: Role::CaseWorker
            }
        ));
    }

    #[test]
    fn global_role_needs_no_county() {
        let token = claims(json!({ "realm_access": { "roles": ["SYSTEM_SCHEDULER"] } }));
        let identity = resolver().resolve(&token).expect("resolves");
        assert_eq!(identity.role, Role::SystemScheduler);
        assert!(identity.county.is_none());
    }

    #[test]
    fn self_scoped_role_requires_subject() {
        let token = claims(json!({
            "realm_access": { "roles": ["PROVIDER"] },
            "countyId": "KERN"
        }));
        let err = resolver().resolve(&token).expect_err("subject required");
        assert!(matches!(err, PipelineError::Authentication(_)));
    }

    #[test]
    fn decodes_bearer_payload() {
        let token = encode(&json!({
            "sub": "worker-9",
            "countyId": "ALAMEDA",
            "realm_access": { "roles": ["CASE_WORKER"] },
            "field_masking_rules": ["ssn:PARTIAL_MASK:MASKED_ACCESS:true"]
        }));
        let identity = resolver()
            .resolve_bearer(&format!("Bearer {token}"))
            .expect("resolves");
        assert_eq!(identity.role, Role::CaseWorker);
        assert_eq!(identity.user_id.as_deref(), Some("worker-9"));
        assert_eq!(identity.embedded_rules.len(), 1);
    }

    #[test]
    fn malformed_bearer_is_authentication_error() {
        for token in ["", "Bearer ", "abc", "a.%%%.c"] {
            let err = ClaimsResolver::decode_bearer(token).expect_err("rejected");
            assert!(matches!(err, PipelineError::Authentication(_)), "{token}");
        }
    }

    #[test]
    fn county_visibility_respects_scope() {
        let caller = CallerIdentity {
            role: Role::Supervisor,
            county: Some(CountyId::new("ALAMEDA")),
            user_id: None,
            embedded_rules: Vec::new(),
        };
        assert!(caller.can_see_county(Some(&CountyId::new("alameda"))));
        assert!(!caller.can_see_county(Some(&CountyId::new("FRESNO"))));
        assert!(!caller.can_see_county(None));
    }
}
