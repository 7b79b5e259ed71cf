//! Error handling for Triage.
//! One error enum per subsystem, `thiserror` only, zero `anyhow`.

pub mod config_error;
pub mod error_code;
pub mod metadata_error;
pub mod storage_error;
pub mod store_error;
pub mod task_error;

pub use config_error::ConfigError;
pub use error_code::TriageErrorCode;
pub use metadata_error::MetadataError;
pub use storage_error::StorageError;
pub use store_error::{StoreError, WrongComment};
pub use task_error::TaskError;
