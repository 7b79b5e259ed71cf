//! Checker identity: the `(analyzer, checker-name)` pair naming which
//! tool/rule produced a finding.

use serde::{Deserialize, Serialize};

/// Checkers whose names carry this prefix are compiler-warning style and
/// cannot be enumerated reliably, so they are never marked unavailable.
pub const DIAGNOSTIC_CHECKER_PREFIX: &str = "clang-diagnostic-";

/// Sentinel analyzer/checker used transiently for reports whose real
/// checker identity is not yet known at insert time.
pub const FAKE_ANALYZER: &str = "__fake_analyzer__";
pub const FAKE_CHECKER: &str = "__fake_checker__";

/// Sentinel pair for reports whose checker could never be resolved.
pub const UNKNOWN_ANALYZER: &str = "unknown";
pub const UNKNOWN_CHECKER: &str = "unknown";

/// The `(analyzer_name, checker_name)` pair identifying a checker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckerIdentity {
    pub analyzer_name: String,
    pub checker_name: String,
}

impl CheckerIdentity {
    pub fn new(analyzer_name: impl Into<String>, checker_name: impl Into<String>) -> Self {
        Self {
            analyzer_name: analyzer_name.into(),
            checker_name: checker_name.into(),
        }
    }

    /// The fake sentinel, pointed at by reports awaiting checker backfill.
    pub fn fake() -> Self {
        Self::new(FAKE_ANALYZER, FAKE_CHECKER)
    }

    /// The unknown sentinel, for permanently unresolvable checkers.
    pub fn unknown() -> Self {
        Self::new(UNKNOWN_ANALYZER, UNKNOWN_CHECKER)
    }

    pub fn is_fake(&self) -> bool {
        self.analyzer_name == FAKE_ANALYZER && self.checker_name == FAKE_CHECKER
    }
}

impl std::fmt::Display for CheckerIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.analyzer_name, self.checker_name)
    }
}
