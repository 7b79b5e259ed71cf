//! Report file parsing seam.
//!
//! The analyzer-specific front-ends (plist, sarif, ...) live outside this
//! crate; they hand the pipeline normalized `ParsedReport` sequences. The
//! built-in parser reads the normalized `.json` report files carried in
//! upload archives.

use std::path::Path;

use triage_core::errors::StoreError;
use triage_core::types::ParsedReport;

/// Parses one report file into normalized reports.
pub trait ReportParser {
    /// True if this parser recognizes the file (by extension/shape).
    fn recognizes(&self, path: &Path) -> bool;

    /// Parse every report in the file.
    fn parse(&self, path: &Path) -> Result<Vec<ParsedReport>, StoreError>;
}

/// Parser for normalized JSON report files (`<n>.json`).
#[derive(Debug, Default)]
pub struct JsonReportParser;

impl ReportParser for JsonReportParser {
    fn recognizes(&self, path: &Path) -> bool {
        path.extension().is_some_and(|ext| ext == "json")
            && path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n != "metadata.json")
    }

    fn parse(&self, path: &Path) -> Result<Vec<ParsedReport>, StoreError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| StoreError::io(&format!("read report file {}", path.display()), &e))?;
        serde_json::from_str(&contents).map_err(|e| StoreError::InvalidInput {
            message: format!("malformed report file {}: {e}", path.display()),
        })
    }
}

/// Collect the report files a parser recognizes in a directory, sorted
/// for deterministic processing order.
pub fn report_files_in(
    dir: &Path,
    parser: &dyn ReportParser,
) -> Result<Vec<std::path::PathBuf>, StoreError> {
    let mut files = Vec::new();
    let entries =
        std::fs::read_dir(dir).map_err(|e| StoreError::io("read report dir", &e))?;
    for entry in entries {
        let entry = entry.map_err(|e| StoreError::io("read report dir entry", &e))?;
        let path = entry.path();
        if path.is_file() && parser.recognizes(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_json_is_not_a_report() {
        let parser = JsonReportParser;
        assert!(parser.recognizes(Path::new("/x/reports/sub/1.json")));
        assert!(!parser.recognizes(Path::new("/x/reports/sub/metadata.json")));
        assert!(!parser.recognizes(Path::new("/x/reports/sub/1.plist")));
    }
}
