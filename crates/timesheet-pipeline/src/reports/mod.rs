pub mod assembler;
pub mod summary;

pub use assembler::{
    report_columns, sort_most_recent_first, ReportAssembler, ReportPayload, ReportStatistics,
};
pub use summary::{ExtractionSummary, FieldVisibilityEntry, FieldVisibilityReport};
