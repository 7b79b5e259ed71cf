//! Skip-list handling (`skip_file`).
//!
//! Plain-text glob rules, one per line, first match wins:
//! `-<glob>` excludes matching paths, `+<glob>` re-includes them.
//! Blank lines and `#` comments are ignored. Malformed patterns are
//! logged and skipped rather than failing the store.

use std::path::Path;

use glob::Pattern;

use triage_core::errors::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RuleAction {
    Skip,
    Keep,
}

#[derive(Debug)]
struct Rule {
    action: RuleAction,
    pattern: Pattern,
}

/// A parsed skip list.
#[derive(Debug, Default)]
pub struct SkipFilter {
    rules: Vec<Rule>,
}

impl SkipFilter {
    /// Parse skip rules from file contents.
    pub fn parse(contents: &str) -> Self {
        let mut rules = Vec::new();
        for (lineno, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (action, raw) = match line.split_at(1) {
                ("-", rest) => (RuleAction::Skip, rest),
                ("+", rest) => (RuleAction::Keep, rest),
                _ => {
                    tracing::warn!(lineno = lineno + 1, line, "skip rule missing +/- prefix");
                    continue;
                }
            };
            match Pattern::new(raw.trim()) {
                Ok(pattern) => rules.push(Rule { action, pattern }),
                Err(e) => {
                    tracing::warn!(lineno = lineno + 1, line, error = %e, "bad skip glob");
                }
            }
        }
        Self { rules }
    }

    /// Load a skip file if present; absent file means an empty filter.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        if !path.is_file() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .map_err(|e| StoreError::io("read skip file", &e))?;
        Ok(Self::parse(&contents))
    }

    /// True if the path should be skipped. Rules are evaluated in order;
    /// the first match decides. Paths are matched both as-is and with a
    /// leading slash, since skip files are usually written against
    /// absolute build paths.
    pub fn should_skip(&self, file_path: &str) -> bool {
        let with_slash;
        let absolute = if file_path.starts_with('/') {
            file_path
        } else {
            with_slash = format!("/{file_path}");
            &with_slash
        };
        for rule in &self.rules {
            if rule.pattern.matches(file_path) || rule.pattern.matches(absolute) {
                return rule.action == RuleAction::Skip;
            }
        }
        false
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_match_wins() {
        let filter = SkipFilter::parse("+/src/keep/*\n-/src/*\n");
        assert!(!filter.should_skip("src/keep/a.c"));
        assert!(filter.should_skip("src/other/a.c"));
        assert!(!filter.should_skip("lib/a.c"));
    }

    #[test]
    fn comments_and_garbage_ignored() {
        let filter = SkipFilter::parse("# comment\n\nnot-a-rule\n-*/generated/*\n");
        assert!(filter.should_skip("build/generated/x.c"));
        assert!(!filter.should_skip("src/x.c"));
    }

    #[test]
    fn empty_filter_skips_nothing() {
        let filter = SkipFilter::default();
        assert!(filter.is_empty());
        assert!(!filter.should_skip("anything.c"));
    }
}
