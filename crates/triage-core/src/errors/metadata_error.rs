//! Metadata parser errors.

use super::error_code::{self, TriageErrorCode};

/// Errors raised while reading a report directory's metadata file.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("Failed to parse metadata {path}: {message}")]
    ParseError { path: String, message: String },

    #[error("Unsupported metadata schema version {version}")]
    UnsupportedVersion { version: u64 },

    #[error("Metadata I/O error for {path}: {message}")]
    Io { path: String, message: String },
}

impl TriageErrorCode for MetadataError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::ParseError { .. } => error_code::METADATA_PARSE,
            Self::UnsupportedVersion { .. } => error_code::METADATA_VERSION,
            Self::Io { .. } => error_code::METADATA_IO,
        }
    }
}
