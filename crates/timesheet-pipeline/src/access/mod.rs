//! Caller identity: role and county resolution from identity tokens, and the
//! role-level capability summary.

pub mod claims;
pub mod role;
pub mod rules;

pub use claims::{
    is_reserved_role, CallerIdentity, ClaimValue, ClaimsResolver, CountyId, RoleClaims,
    TokenClaims,
};
pub use role::{Role, UnknownRole};
pub use rules::{AccessLevel, AccessPattern, RulesEngine};
