//! Stable machine-readable error codes.
//!
//! Codes are part of the service contract: transports map them to their
//! own fault types, so existing codes must never be renamed.

/// Trait implemented by every subsystem error enum.
pub trait TriageErrorCode {
    /// Stable code identifying the error class.
    fn error_code(&self) -> &'static str;
}

pub const CONFIG_PARSE: &str = "CONFIG_PARSE";
pub const CONFIG_VALIDATION: &str = "CONFIG_VALIDATION";
pub const CONFIG_IO: &str = "CONFIG_IO";

pub const STORAGE_SQLITE: &str = "STORAGE_SQLITE";
pub const STORAGE_MIGRATION: &str = "STORAGE_MIGRATION";
pub const STORAGE_NOT_FOUND: &str = "STORAGE_NOT_FOUND";

pub const METADATA_PARSE: &str = "METADATA_PARSE";
pub const METADATA_VERSION: &str = "METADATA_VERSION";
pub const METADATA_IO: &str = "METADATA_IO";

pub const STORE_RUN_LOCKED: &str = "STORE_RUN_LOCKED";
pub const STORE_RUN_LIMIT: &str = "STORE_RUN_LIMIT";
pub const STORE_REPORT_LIMIT: &str = "STORE_REPORT_LIMIT";
pub const STORE_ARCHIVE: &str = "STORE_ARCHIVE";
pub const STORE_CHECKER_REGISTRY: &str = "STORE_CHECKER_REGISTRY";
pub const STORE_REVIEW_COMMENTS: &str = "STORE_REVIEW_COMMENTS";
pub const STORE_INVALID_INPUT: &str = "STORE_INVALID_INPUT";
pub const STORE_IO: &str = "STORE_IO";

pub const TASK_NOT_FOUND: &str = "TASK_NOT_FOUND";
pub const TASK_QUEUE_CLOSED: &str = "TASK_QUEUE_CLOSED";

pub const CANCELLED: &str = "CANCELLED";
