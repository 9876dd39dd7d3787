//! Static, versioned registry of every maskable timesheet field.
//!
//! Resolution enumerates this table instead of inspecting record types at
//! runtime. `timesheet::tests` asserts that it matches the serialized shape of
//! [`TimesheetRecord`](crate::timesheet::TimesheetRecord) exactly, so a field
//! added to the record without a schema entry fails the test suite.

use serde::Serialize;

pub const TIMESHEET_SCHEMA_VERSION: u32 = 3;

/// What kind of information a field carries; drives default masking choices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticType {
    Identifier,
    PersonName,
    GovernmentId,
    Organization,
    Location,
    Date,
    Timestamp,
    Hours,
    Status,
    FreeText,
    Demographic,
    DateOfBirth,
}

/// Coarse grouping used by access patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldGroup {
    /// Who the timesheet belongs to.
    Identity,
    /// Hours, periods, and workflow state.
    Operational,
    /// Review trail: reviewer notes, approvers, timestamps.
    Audit,
    /// Provider and recipient demographics.
    Demographic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Text,
    Decimal,
    Date,
    DateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldMetadata {
    pub name: &'static str,
    pub semantic_type: SemanticType,
    pub group: FieldGroup,
    pub value_type: ValueType,
}

const fn field(
    name: &'static str,
    semantic_type: SemanticType,
    group: FieldGroup,
    value_type: ValueType,
) -> FieldMetadata {
    FieldMetadata {
        name,
        semantic_type,
        group,
        value_type,
    }
}

use self::FieldGroup::{Audit, Demographic as DemographicGroup, Identity, Operational};
use self::SemanticType as S;
use self::ValueType as V;

const TIMESHEET_FIELDS: [FieldMetadata; 32] = [
    field("id", S::Identifier, Operational, V::Text),
    field("employeeId", S::Identifier, Identity, V::Text),
    field("employeeName", S::PersonName, Identity, V::Text),
    field("userId", S::Identifier, Identity, V::Text),
    field("ssn", S::GovernmentId, Identity, V::Text),
    field("department", S::Organization, Operational, V::Text),
    field("countyId", S::Location, Operational, V::Text),
    field("payPeriodStart", S::Date, Operational, V::Date),
    field("payPeriodEnd", S::Date, Operational, V::Date),
    field("regularHours", S::Hours, Operational, V::Decimal),
    field("overtimeHours", S::Hours, Operational, V::Decimal),
    field("sickHours", S::Hours, Operational, V::Decimal),
    field("vacationHours", S::Hours, Operational, V::Decimal),
    field("holidayHours", S::Hours, Operational, V::Decimal),
    field("totalHours", S::Hours, Operational, V::Decimal),
    field("status", S::Status, Operational, V::Text),
    field("comments", S::FreeText, Operational, V::Text),
    field("supervisorComments", S::FreeText, Audit, V::Text),
    field("submittedAt", S::Timestamp, Audit, V::DateTime),
    field("submittedBy", S::PersonName, Audit, V::Text),
    field("approvedAt", S::Timestamp, Audit, V::DateTime),
    field("approvedBy", S::PersonName, Audit, V::Text),
    field("createdAt", S::Timestamp, Audit, V::DateTime),
    field("updatedAt", S::Timestamp, Audit, V::DateTime),
    field("providerGender", S::Demographic, DemographicGroup, V::Text),
    field("providerEthnicity", S::Demographic, DemographicGroup, V::Text),
    field("providerAgeGroup", S::Demographic, DemographicGroup, V::Text),
    field("providerDateOfBirth", S::DateOfBirth, DemographicGroup, V::Date),
    field("recipientGender", S::Demographic, DemographicGroup, V::Text),
    field("recipientEthnicity", S::Demographic, DemographicGroup, V::Text),
    field("recipientAgeGroup", S::Demographic, DemographicGroup, V::Text),
    field("recipientDateOfBirth", S::DateOfBirth, DemographicGroup, V::Date),
];

/// Read-only view over the registry; cheap to copy and share across threads.
#[derive(Debug, Clone, Copy)]
pub struct FieldSchema {
    version: u32,
    fields: &'static [FieldMetadata],
}

impl FieldSchema {
    pub const fn timesheet() -> Self {
        Self {
            version: TIMESHEET_SCHEMA_VERSION,
            fields: &TIMESHEET_FIELDS,
        }
    }

    pub const fn version(&self) -> u32 {
        self.version
    }

    pub fn fields(&self) -> &'static [FieldMetadata] {
        self.fields
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> {
        self.fields.iter().map(|field| field.name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Case-insensitive lookup returning the canonical entry.
    pub fn get(&self, name: &str) -> Option<&'static FieldMetadata> {
        let name = name.trim();
        self.fields
            .iter()
            .find(|field| field.name.eq_ignore_ascii_case(name))
    }
}

impl Default for FieldSchema {
    fn default() -> Self {
        Self::timesheet()
    }
}
