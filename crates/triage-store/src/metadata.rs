//! Report-directory metadata parsing.
//!
//! Each `reports/<subdir>/metadata.json` describes one analyzer tool
//! invocation: commands, durations, versions, per-analyzer statistics,
//! and enabled/disabled checker sets. Two schema generations exist: a
//! flat single-tool v1 and a multi-tool v2 (`tools: [...]`).

use std::path::Path;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::Deserialize;

use triage_core::errors::MetadataError;

/// Per-analyzer success/failure statistics.
#[derive(Debug, Clone, Default)]
pub struct AnalyzerStatistics {
    pub version: Option<String>,
    pub successful: i64,
    pub failed: i64,
    pub failed_files: Vec<String>,
    pub successful_files: Vec<String>,
}

/// Unified view of one (or a merged set of) report-directory metadata.
#[derive(Debug, Clone, Default)]
pub struct RunMetadata {
    pub check_commands: Vec<String>,
    /// Seconds per analyzer invocation.
    pub check_durations: Vec<f64>,
    pub analyzer_versions: Vec<String>,
    pub statistics: FxHashMap<String, AnalyzerStatistics>,
    pub enabled_checkers: FxHashSet<String>,
    pub disabled_checkers: FxHashSet<String>,
    /// Reverse map: checker name -> owning analyzer.
    pub checker_to_analyzer: FxHashMap<String, String>,
}

/// Checker configuration as written by analyzers: either an exhaustive
/// name -> enabled map or a plain list of enabled checkers.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawCheckers {
    Flags(std::collections::BTreeMap<String, bool>),
    Enabled(Vec<String>),
}

#[derive(Debug, Deserialize, Default)]
struct RawStatistics {
    version: Option<String>,
    #[serde(default)]
    successful: i64,
    #[serde(default)]
    failed: i64,
    #[serde(default)]
    failed_files: Vec<String>,
    #[serde(default)]
    successful_files: Vec<String>,
}

/// v2 per-tool entry.
#[derive(Debug, Deserialize)]
struct RawTool {
    #[allow(dead_code)]
    name: Option<String>,
    command: Option<String>,
    version: Option<String>,
    #[serde(default)]
    analyzers: std::collections::BTreeMap<String, RawAnalyzer>,
    timestamps: Option<RawTimestamps>,
}

#[derive(Debug, Deserialize)]
struct RawAnalyzer {
    checkers: Option<RawCheckers>,
    statistics: Option<RawStatistics>,
    version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawTimestamps {
    begin: f64,
    end: f64,
}

/// Top-level raw shape covering both schema generations.
#[derive(Debug, Deserialize)]
struct RawMetadata {
    version: Option<u64>,
    // v2
    #[serde(default)]
    tools: Vec<RawTool>,
    // v1 (flat, single tool)
    #[serde(default)]
    check_commands: Vec<String>,
    #[serde(default)]
    check_durations: Vec<f64>,
    #[serde(default)]
    analyzer_statistics: std::collections::BTreeMap<String, RawStatistics>,
    #[serde(default)]
    checkers: std::collections::BTreeMap<String, RawCheckers>,
    #[serde(default)]
    versions: std::collections::BTreeMap<String, String>,
}

impl RunMetadata {
    /// Parse one metadata.json file.
    pub fn parse_file(path: &Path) -> Result<Self, MetadataError> {
        let contents = std::fs::read_to_string(path).map_err(|e| MetadataError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let raw: RawMetadata =
            serde_json::from_str(&contents).map_err(|e| MetadataError::ParseError {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        match raw.version {
            None | Some(1) => Ok(Self::from_v1(raw)),
            Some(2) => Ok(Self::from_v2(raw)),
            Some(version) => Err(MetadataError::UnsupportedVersion { version }),
        }
    }

    fn from_v1(raw: RawMetadata) -> Self {
        let mut meta = Self {
            check_commands: raw.check_commands,
            check_durations: raw.check_durations,
            ..Self::default()
        };
        for (analyzer, stats) in raw.analyzer_statistics {
            meta.statistics.insert(analyzer, convert_stats(stats));
        }
        for (analyzer, checkers) in raw.checkers {
            meta.apply_checkers(&analyzer, &checkers);
        }
        for version in raw.versions.into_values() {
            meta.analyzer_versions.push(version);
        }
        meta
    }

    fn from_v2(raw: RawMetadata) -> Self {
        let mut meta = Self::default();
        for tool in raw.tools {
            if let Some(command) = tool.command {
                meta.check_commands.push(command);
            }
            if let Some(ts) = tool.timestamps {
                if ts.end >= ts.begin {
                    meta.check_durations.push(ts.end - ts.begin);
                }
            }
            if let Some(version) = tool.version {
                meta.analyzer_versions.push(version);
            }
            for (analyzer, entry) in tool.analyzers {
                if let Some(checkers) = &entry.checkers {
                    meta.apply_checkers(&analyzer, checkers);
                }
                let mut stats = entry.statistics.map(convert_stats).unwrap_or_default();
                if stats.version.is_none() {
                    stats.version = entry.version;
                }
                // Same analyzer run by several tools: accumulate counts.
                let merged = meta.statistics.entry(analyzer).or_default();
                merged.successful += stats.successful;
                merged.failed += stats.failed;
                merged.failed_files.extend(stats.failed_files);
                merged.successful_files.extend(stats.successful_files);
                if merged.version.is_none() {
                    merged.version = stats.version;
                }
            }
        }
        meta
    }

    fn apply_checkers(&mut self, analyzer: &str, checkers: &RawCheckers) {
        match checkers {
            RawCheckers::Flags(flags) => {
                for (checker, enabled) in flags {
                    if *enabled {
                        self.enabled_checkers.insert(checker.clone());
                    } else {
                        self.disabled_checkers.insert(checker.clone());
                    }
                    self.checker_to_analyzer
                        .insert(checker.clone(), analyzer.to_string());
                }
            }
            RawCheckers::Enabled(list) => {
                for checker in list {
                    self.enabled_checkers.insert(checker.clone());
                    self.checker_to_analyzer
                        .insert(checker.clone(), analyzer.to_string());
                }
            }
        }
    }

    /// Merge metadata from several report directories stored together.
    ///
    /// Commands, durations, versions, statistics, and the checker-owner
    /// map are unioned. The enable/disable sets are intentionally
    /// discarded for multi-directory batches: each directory may have
    /// used a different checker configuration, and merging the sets
    /// could incorrectly mark a checker off/unavailable that another
    /// invocation had enabled. Documented ambiguity, not auto-resolved.
    pub fn merge(parts: Vec<Self>) -> Self {
        if parts.len() <= 1 {
            let mut parts = parts;
            return parts.pop().unwrap_or_default();
        }
        let mut merged = Self::default();
        for part in parts {
            merged.check_commands.extend(part.check_commands);
            merged.check_durations.extend(part.check_durations);
            merged.analyzer_versions.extend(part.analyzer_versions);
            for (analyzer, stats) in part.statistics {
                let entry = merged.statistics.entry(analyzer).or_default();
                entry.successful += stats.successful;
                entry.failed += stats.failed;
                entry.failed_files.extend(stats.failed_files);
                entry.successful_files.extend(stats.successful_files);
                if entry.version.is_none() {
                    entry.version = stats.version;
                }
            }
            merged.checker_to_analyzer.extend(part.checker_to_analyzer);
        }
        merged
    }

    /// Total analysis duration in whole seconds.
    pub fn total_duration_secs(&self) -> i64 {
        self.check_durations.iter().sum::<f64>().round() as i64
    }

    /// A single version string for the run history row.
    pub fn version_string(&self) -> Option<String> {
        if self.analyzer_versions.is_empty() {
            None
        } else {
            Some(self.analyzer_versions.join("; "))
        }
    }
}

fn convert_stats(raw: RawStatistics) -> AnalyzerStatistics {
    AnalyzerStatistics {
        version: raw.version,
        successful: raw.successful,
        failed: raw.failed,
        failed_files: raw.failed_files,
        successful_files: raw.successful_files,
    }
}
