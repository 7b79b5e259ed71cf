//! Detection/review status and severity enums.
//!
//! Stored as lowercase text in the database; `as_str`/`parse` are the
//! single source of truth for that mapping.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a report within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionStatus {
    New,
    Unresolved,
    Resolved,
    Reopened,
    /// The producing checker was explicitly disabled in a later store.
    Off,
    /// The producing checker is no longer known to any analyzer.
    Unavailable,
}

impl DetectionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Unresolved => "unresolved",
            Self::Resolved => "resolved",
            Self::Reopened => "reopened",
            Self::Off => "off",
            Self::Unavailable => "unavailable",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new" => Some(Self::New),
            "unresolved" => Some(Self::Unresolved),
            "resolved" => Some(Self::Resolved),
            "reopened" => Some(Self::Reopened),
            "off" => Some(Self::Off),
            "unavailable" => Some(Self::Unavailable),
            _ => None,
        }
    }

    /// True for states that close a report (`fixed_at` must be set).
    pub fn is_closed(self) -> bool {
        matches!(self, Self::Resolved | Self::Off | Self::Unavailable)
    }
}

/// Human/judgment classification of a report's validity, independent of
/// detection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Unreviewed,
    Confirmed,
    FalsePositive,
    Intentional,
}

impl ReviewStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unreviewed => "unreviewed",
            Self::Confirmed => "confirmed",
            Self::FalsePositive => "false_positive",
            Self::Intentional => "intentional",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unreviewed" => Some(Self::Unreviewed),
            "confirmed" => Some(Self::Confirmed),
            "false_positive" => Some(Self::FalsePositive),
            "intentional" => Some(Self::Intentional),
            _ => None,
        }
    }

    /// True for review states that close a report regardless of detection.
    pub fn is_closing(self) -> bool {
        matches!(self, Self::FalsePositive | Self::Intentional)
    }
}

/// Default severity of a checker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Unspecified,
    Style,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unspecified => "unspecified",
            Self::Style => "style",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unspecified" => Some(Self::Unspecified),
            "style" => Some(Self::Style),
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detection_status_roundtrip() {
        for s in [
            DetectionStatus::New,
            DetectionStatus::Unresolved,
            DetectionStatus::Resolved,
            DetectionStatus::Reopened,
            DetectionStatus::Off,
            DetectionStatus::Unavailable,
        ] {
            assert_eq!(DetectionStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(DetectionStatus::parse("bogus"), None);
    }

    #[test]
    fn closed_states() {
        assert!(DetectionStatus::Resolved.is_closed());
        assert!(DetectionStatus::Off.is_closed());
        assert!(DetectionStatus::Unavailable.is_closed());
        assert!(!DetectionStatus::Reopened.is_closed());
        assert!(ReviewStatus::FalsePositive.is_closing());
        assert!(ReviewStatus::Intentional.is_closing());
        assert!(!ReviewStatus::Confirmed.is_closing());
    }
}
