//! The report model.
//!
//! Reports exist in two shapes: `ParsedReport` (fresh out of an analyzer
//! output parser, paths are repository-relative strings) and
//! `StoredReportData` (a server round-trip, locations are database file
//! ids).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::checker::CheckerIdentity;
use super::status::{DetectionStatus, ReviewStatus};

/// A source range, 1-based, inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Range {
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
}

/// One step of a bug path without a message (control-flow arrows).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BugPathPosition {
    pub file_path: String,
    pub range: Range,
}

/// One step of a bug path with a diagnostic message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BugPathEvent {
    pub file_path: String,
    pub line: u32,
    pub column: u32,
    pub message: String,
}

/// Kinds of auxiliary report data beyond the bug path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtendedDataKind {
    Note,
    Macro,
    Fixit,
}

impl ExtendedDataKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Note => "note",
            Self::Macro => "macro",
            Self::Fixit => "fixit",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "note" => Some(Self::Note),
            "macro" => Some(Self::Macro),
            "fixit" => Some(Self::Fixit),
            _ => None,
        }
    }
}

/// A note, macro expansion, or fixit attached to a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendedReportData {
    pub kind: ExtendedDataKind,
    pub file_path: String,
    pub line: u32,
    pub column: u32,
    pub message: String,
}

/// A normalized analyzer finding, as produced by the (external) report
/// parsing front-end. Serialized form is the `.json` report file format
/// the store pipeline consumes from upload archives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedReport {
    /// Repository-relative path of the main location.
    pub file_path: String,
    pub line: u32,
    pub column: u32,
    pub message: String,
    pub checker_name: String,
    /// Set when the parser could attribute the finding to an analyzer;
    /// otherwise resolved from metadata or sentineled at store time.
    #[serde(default)]
    pub analyzer_name: Option<String>,
    /// Content/path fingerprint identifying "the same finding" across
    /// re-analyses. Not unique per row.
    pub bug_id: String,
    #[serde(default)]
    pub bug_path_positions: Vec<BugPathPosition>,
    #[serde(default)]
    pub bug_path_events: Vec<BugPathEvent>,
    #[serde(default)]
    pub extended_data: Vec<ExtendedReportData>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

impl ParsedReport {
    /// Every file path the report references: main location plus all
    /// path/event/extended-data locations. Deduplicated, order preserved.
    pub fn referenced_files(&self) -> Vec<&str> {
        // Tiny set; linear scan beats hashing here.
        let mut out: Vec<&str> = Vec::with_capacity(1 + self.bug_path_events.len());
        for p in std::iter::once(self.file_path.as_str())
            .chain(self.bug_path_positions.iter().map(|p| p.file_path.as_str()))
            .chain(self.bug_path_events.iter().map(|e| e.file_path.as_str()))
            .chain(self.extended_data.iter().map(|d| d.file_path.as_str()))
        {
            if !out.contains(&p) {
                out.push(p);
            }
        }
        out
    }

    /// Number of bug path events; stored as `path_length`.
    pub fn path_length(&self) -> usize {
        self.bug_path_events.len()
    }
}

/// A report as currently known to the server (database row shape).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredReportData {
    pub id: i64,
    pub run_id: i64,
    pub file_id: i64,
    pub file_path: String,
    pub bug_id: String,
    pub checker: CheckerIdentity,
    pub line: u32,
    pub column: u32,
    pub message: String,
    pub detection_status: DetectionStatus,
    pub review_status: ReviewStatus,
    pub detected_at: i64,
    pub fixed_at: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_report() -> ParsedReport {
        ParsedReport {
            file_path: "src/a.c".to_string(),
            line: 10,
            column: 4,
            message: "division by zero".to_string(),
            checker_name: "core.DivideZero".to_string(),
            analyzer_name: Some("clangsa".to_string()),
            bug_id: "deadbeef".to_string(),
            bug_path_positions: vec![],
            bug_path_events: vec![
                BugPathEvent {
                    file_path: "src/b.h".to_string(),
                    line: 3,
                    column: 1,
                    message: "assuming x is 0".to_string(),
                },
                BugPathEvent {
                    file_path: "src/a.c".to_string(),
                    line: 10,
                    column: 4,
                    message: "division by zero".to_string(),
                },
            ],
            extended_data: vec![],
            annotations: BTreeMap::new(),
        }
    }

    #[test]
    fn referenced_files_deduplicated() {
        let report = sample_report();
        assert_eq!(report.referenced_files(), vec!["src/a.c", "src/b.h"]);
    }

    #[test]
    fn path_length_counts_events() {
        assert_eq!(sample_report().path_length(), 2);
    }

    #[test]
    fn report_json_roundtrip() {
        let report = sample_report();
        let json = serde_json::to_string(&report).unwrap();
        let back: ParsedReport = serde_json::from_str(&json).unwrap();
        assert_eq!(report, back);
    }
}
