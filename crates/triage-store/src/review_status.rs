//! Review-status resolution: inline source comments and YAML rules.
//!
//! Inline comments sit on the report line or the line above it:
//!
//! ```c
//! // triage_false_positive [core.DivideZero] checked by hand
//! int x = 1 / divisor;
//! ```
//!
//! Markers: `triage_confirmed`, `triage_false_positive`,
//! `triage_intentional`, and `triage_suppress` (alias of false positive).
//! The bracket list names checkers, `*` or `all` matches any. Conflicting
//! or malformed comments do not fail the report; they are collected and
//! surfaced once, after the store commits.

use std::cell::RefCell;
use std::path::{Path, PathBuf};

use glob::Pattern;
use rustc_hash::FxHashMap;
use serde::Deserialize;

use triage_core::errors::{StoreError, WrongComment};
use triage_core::types::{ParsedReport, ReviewStatus};

/// The outcome of resolving a report's review status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewStatusDecision {
    pub status: ReviewStatus,
    pub message: String,
    /// True when the decision came from an in-source comment.
    pub in_source: bool,
}

#[derive(Debug, Deserialize)]
struct YamlRuleFile {
    #[serde(default)]
    rules: Vec<YamlRule>,
}

#[derive(Debug, Deserialize)]
struct YamlRule {
    filepath: Option<String>,
    checker: Option<String>,
    bug_hash: Option<String>,
    status: ReviewStatus,
    #[serde(default)]
    message: String,
}

struct CompiledRule {
    filepath: Option<Pattern>,
    checker: Option<String>,
    bug_hash: Option<String>,
    status: ReviewStatus,
    message: String,
}

/// Resolves review statuses for incoming reports.
pub struct ReviewStatusResolver {
    rules: Vec<CompiledRule>,
    /// Extracted `root/` tree holding uploaded source bytes.
    source_root: PathBuf,
    /// Report path -> path under `source_root`, when the two differ
    /// (client-side path prefix trimming).
    path_map: FxHashMap<String, String>,
    /// Cache of source lines per file; `None` marks unreadable files.
    lines: RefCell<FxHashMap<String, Option<Vec<String>>>>,
}

const MARKERS: &[(&str, ReviewStatus)] = &[
    ("triage_suppress", ReviewStatus::FalsePositive),
    ("triage_false_positive", ReviewStatus::FalsePositive),
    ("triage_intentional", ReviewStatus::Intentional),
    ("triage_confirmed", ReviewStatus::Confirmed),
];

impl ReviewStatusResolver {
    /// Build a resolver. `rules_path` is the optional
    /// `review_status.yaml`; a missing file means no rules.
    pub fn new(source_root: &Path, rules_path: Option<&Path>) -> Result<Self, StoreError> {
        let mut rules = Vec::new();
        if let Some(path) = rules_path {
            if path.is_file() {
                let contents = std::fs::read_to_string(path)
                    .map_err(|e| StoreError::io("read review status rules", &e))?;
                let raw: YamlRuleFile =
                    serde_yaml::from_str(&contents).map_err(|e| StoreError::InvalidInput {
                        message: format!("malformed review_status.yaml: {e}"),
                    })?;
                for rule in raw.rules {
                    let filepath = match &rule.filepath {
                        Some(raw_glob) => match Pattern::new(raw_glob) {
                            Ok(p) => Some(p),
                            Err(e) => {
                                tracing::warn!(glob = %raw_glob, error = %e,
                                    "bad filepath glob in review_status.yaml");
                                continue;
                            }
                        },
                        None => None,
                    };
                    rules.push(CompiledRule {
                        filepath,
                        checker: rule.checker,
                        bug_hash: rule.bug_hash,
                        status: rule.status,
                        message: rule.message,
                    });
                }
            }
        }
        Ok(Self {
            rules,
            source_root: source_root.to_path_buf(),
            path_map: FxHashMap::default(),
            lines: RefCell::new(FxHashMap::default()),
        })
    }

    /// Install the report-path -> source-tree-path mapping.
    pub fn with_path_map(mut self, path_map: FxHashMap<String, String>) -> Self {
        self.path_map = path_map;
        self
    }

    /// Resolve the review status for a report. In-source comments win
    /// over YAML rules. Unresolvable comments are appended to `wrong`
    /// and the report falls back to the default (unreviewed) status.
    pub fn resolve(
        &self,
        report: &ParsedReport,
        wrong: &mut Vec<WrongComment>,
    ) -> Option<ReviewStatusDecision> {
        if let Some(decision) = self.resolve_source_comment(report, wrong) {
            return Some(decision);
        }
        self.resolve_yaml_rule(report)
    }

    fn resolve_source_comment(
        &self,
        report: &ParsedReport,
        wrong: &mut Vec<WrongComment>,
    ) -> Option<ReviewStatusDecision> {
        let mut cache = self.lines.borrow_mut();
        let lines = cache
            .entry(report.file_path.clone())
            .or_insert_with(|| self.read_lines(&report.file_path))
            .as_ref()?;

        if report.line == 0 {
            return None;
        }
        let idx = (report.line - 1) as usize;

        let mut matches: Vec<ReviewStatusDecision> = Vec::new();
        // The report line itself, then the line immediately above.
        for candidate in [Some(idx), idx.checked_sub(1)].into_iter().flatten() {
            let Some(line) = lines.get(candidate) else { continue };
            for (marker, status) in MARKERS {
                match parse_marker(line, marker, &report.checker_name) {
                    MarkerMatch::None => {}
                    MarkerMatch::Applies { message } => {
                        matches.push(ReviewStatusDecision {
                            status: *status,
                            message,
                            in_source: true,
                        });
                    }
                    MarkerMatch::Malformed { reason } => {
                        wrong.push(WrongComment {
                            file_path: report.file_path.clone(),
                            line: candidate as u32 + 1,
                            checker_name: report.checker_name.clone(),
                            reason,
                        });
                    }
                }
            }
        }

        match matches.len() {
            0 => None,
            1 => matches.pop(),
            _ => {
                // Several applicable markers: only a conflict if they
                // disagree on the status.
                let first = matches[0].clone();
                if matches.iter().all(|m| m.status == first.status) {
                    Some(first)
                } else {
                    wrong.push(WrongComment {
                        file_path: report.file_path.clone(),
                        line: report.line,
                        checker_name: report.checker_name.clone(),
                        reason: "multiple conflicting review status comments".to_string(),
                    });
                    None
                }
            }
        }
    }

    fn resolve_yaml_rule(&self, report: &ParsedReport) -> Option<ReviewStatusDecision> {
        for rule in &self.rules {
            if let Some(pattern) = &rule.filepath {
                let absolute = format!("/{}", report.file_path);
                if !pattern.matches(&report.file_path) && !pattern.matches(&absolute) {
                    continue;
                }
            }
            if let Some(checker) = &rule.checker {
                if checker != &report.checker_name {
                    continue;
                }
            }
            if let Some(hash) = &rule.bug_hash {
                if hash != &report.bug_id {
                    continue;
                }
            }
            return Some(ReviewStatusDecision {
                status: rule.status,
                message: rule.message.clone(),
                in_source: false,
            });
        }
        None
    }

    fn read_lines(&self, file_path: &str) -> Option<Vec<String>> {
        let relative = self
            .path_map
            .get(file_path)
            .map(String::as_str)
            .unwrap_or(file_path);
        let path = self.source_root.join(relative);
        let contents = std::fs::read_to_string(path).ok()?;
        Some(contents.lines().map(str::to_string).collect())
    }
}

enum MarkerMatch {
    None,
    Applies { message: String },
    Malformed { reason: String },
}

/// Parse one source line for a review-status marker.
///
/// Grammar: `<comment-lead> <marker> [checker, ...] free text message`.
/// The bracket list is mandatory; `*` and `all` match every checker.
fn parse_marker(line: &str, marker: &str, checker_name: &str) -> MarkerMatch {
    let trimmed = line.trim();
    let Some(pos) = trimmed.find(marker) else {
        return MarkerMatch::None;
    };

    // Only honor markers inside comments.
    let before = &trimmed[..pos];
    let is_comment =
        before.contains("//") || before.contains('#') || before.contains("/*");
    if !is_comment {
        return MarkerMatch::None;
    }

    // `triage_suppress` is a prefix of nothing else, but guard against
    // marker names embedding each other (e.g. matching `triage_false_positive`
    // while scanning for a shorter marker).
    let after_marker = &trimmed[pos + marker.len()..];
    if after_marker
        .chars()
        .next()
        .is_some_and(|c| c.is_alphanumeric() || c == '_')
    {
        return MarkerMatch::None;
    }

    let after = after_marker.trim_start();
    let Some(rest) = after.strip_prefix('[') else {
        return MarkerMatch::Malformed {
            reason: format!("missing [checker] list after {marker}"),
        };
    };
    let Some(close) = rest.find(']') else {
        return MarkerMatch::Malformed {
            reason: format!("unterminated [checker] list after {marker}"),
        };
    };
    let list = &rest[..close];
    let message = rest[close + 1..].trim().to_string();

    let applies = list.split(',').map(str::trim).any(|entry| {
        entry == "*" || entry == "all" || entry == checker_name
    });
    if applies {
        MarkerMatch::Applies { message }
    } else {
        MarkerMatch::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn resolver_with_source(source: &str) -> (tempfile::TempDir, ReviewStatusResolver) {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.c");
        let mut f = std::fs::File::create(&file).unwrap();
        f.write_all(source.as_bytes()).unwrap();
        let resolver = ReviewStatusResolver::new(dir.path(), None).unwrap();
        (dir, resolver)
    }

    fn report_at(line: u32) -> ParsedReport {
        ParsedReport {
            file_path: "a.c".to_string(),
            line,
            column: 1,
            message: "m".to_string(),
            checker_name: "core.DivideZero".to_string(),
            analyzer_name: None,
            bug_id: "h1".to_string(),
            bug_path_positions: vec![],
            bug_path_events: vec![],
            extended_data: vec![],
            annotations: Default::default(),
        }
    }

    #[test]
    fn comment_above_report_line_applies() {
        let (_dir, resolver) = resolver_with_source(
            "// triage_false_positive [core.DivideZero] hand checked\nint x = 1 / d;\n",
        );
        let mut wrong = Vec::new();
        let decision = resolver.resolve(&report_at(2), &mut wrong).unwrap();
        assert_eq!(decision.status, ReviewStatus::FalsePositive);
        assert_eq!(decision.message, "hand checked");
        assert!(decision.in_source);
        assert!(wrong.is_empty());
    }

    #[test]
    fn star_matches_any_checker() {
        let (_dir, resolver) =
            resolver_with_source("int x = 1 / d; // triage_intentional [*] yes\n");
        let mut wrong = Vec::new();
        let decision = resolver.resolve(&report_at(1), &mut wrong).unwrap();
        assert_eq!(decision.status, ReviewStatus::Intentional);
    }

    #[test]
    fn other_checker_comment_does_not_apply() {
        let (_dir, resolver) =
            resolver_with_source("// triage_confirmed [other.Checker] nope\nint x;\n");
        let mut wrong = Vec::new();
        assert!(resolver.resolve(&report_at(2), &mut wrong).is_none());
        assert!(wrong.is_empty());
    }

    #[test]
    fn malformed_comment_is_collected() {
        let (_dir, resolver) =
            resolver_with_source("// triage_suppress no brackets here\nint x;\n");
        let mut wrong = Vec::new();
        assert!(resolver.resolve(&report_at(2), &mut wrong).is_none());
        assert_eq!(wrong.len(), 1);
        assert!(wrong[0].reason.contains("missing [checker]"));
    }

    #[test]
    fn conflicting_comments_are_collected() {
        let (_dir, resolver) = resolver_with_source(
            "// triage_false_positive [*] a\nint x = 1; // triage_confirmed [*] b\n",
        );
        let mut wrong = Vec::new();
        assert!(resolver.resolve(&report_at(2), &mut wrong).is_none());
        assert_eq!(wrong.len(), 1);
        assert!(wrong[0].reason.contains("conflicting"));
    }

    #[test]
    fn yaml_rule_applies_when_no_comment() {
        let dir = tempfile::tempdir().unwrap();
        let rules = dir.path().join("review_status.yaml");
        std::fs::write(
            &rules,
            "rules:\n  - checker: core.DivideZero\n    status: intentional\n    message: known\n",
        )
        .unwrap();
        let resolver = ReviewStatusResolver::new(dir.path(), Some(&rules)).unwrap();
        let mut wrong = Vec::new();
        let decision = resolver.resolve(&report_at(1), &mut wrong).unwrap();
        assert_eq!(decision.status, ReviewStatus::Intentional);
        assert!(!decision.in_source);
    }
}
