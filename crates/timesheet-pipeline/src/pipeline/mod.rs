//! County-scoped extraction: query construction, bounded fetches, the CSV
//! source, and the orchestrator that sequences them ahead of masking.

pub mod csv_source;
pub mod extraction;
pub mod fetch;
pub mod query;

pub use csv_source::{load_timesheets, parse_timesheets, CsvImportError};
pub use extraction::{
    CountyExtractionOrchestrator, ExtractionPlan, ExtractionRequest, ExtractionResult,
};
pub use fetch::{
    DataFetcher, FetchLimits, FetchResult, InMemoryTimesheetRepository, RepositoryError,
    TimesheetRepository,
};
pub use query::{DateRange, QueryBuilder, QueryFilters, QueryParameters};
