//! Shared domain types: status enums, checker identity, report model.

pub mod checker;
pub mod report;
pub mod status;

pub use checker::{
    CheckerIdentity, DIAGNOSTIC_CHECKER_PREFIX, FAKE_ANALYZER, FAKE_CHECKER, UNKNOWN_ANALYZER,
    UNKNOWN_CHECKER,
};
pub use report::{
    BugPathEvent, BugPathPosition, ExtendedDataKind, ExtendedReportData, ParsedReport, Range,
    StoredReportData,
};
pub use status::{DetectionStatus, ReviewStatus, Severity};
