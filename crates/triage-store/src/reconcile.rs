//! Run reconciliation: merging a batch of incoming reports with a run's
//! stored state.
//!
//! Every incoming report inserts a fresh row; the row it supersedes (same
//! bug hash, previous store) is deleted in the closing pass. Detection
//! status is derived from the prior state of the bug hash:
//!
//! * hash unknown                -> `new`
//! * hash known, was `resolved`  -> `reopened`
//! * hash known otherwise        -> `unresolved` (detected_at carried over)
//!
//! A report whose referenced files have no stored content is dropped
//! with a warning and excluded from hash bookkeeping; the batch goes on.
//!
//! Prior rows whose hash was not seen in this batch close as `off` (the
//! checker was explicitly disabled), `unavailable` (the checker silently
//! vanished from an enumerable analyzer), or `resolved` (the finding is
//! gone), stamping `fixed_at` once and only once. Checkers that visibly
//! produced output in this store override the metadata's enabled and
//! disabled sets for that decision.

use rusqlite::Connection;
use rustc_hash::{FxHashMap, FxHashSet};
use xxhash_rust::xxh3::Xxh3;

use triage_core::errors::{StoreError, StorageError, WrongComment};
use triage_core::traits::Cancellable;
use triage_core::types::{
    CheckerIdentity, DetectionStatus, ParsedReport, ReviewStatus, Severity, StoredReportData,
    DIAGNOSTIC_CHECKER_PREFIX,
};
use triage_storage::queries::reports::{self, NewReport};

use crate::checker_registry::{CheckerRegistry, PendingBackfill};
use crate::metadata::RunMetadata;
use crate::review_status::ReviewStatusResolver;
use crate::skipfile::SkipFilter;

/// Cancellation is polled between report inserts at this stride.
const CANCEL_CHECK_STRIDE: u64 = 100;

/// Counters and carry-outs from one reconciliation.
#[derive(Debug, Default)]
pub struct ReconcileOutcome {
    pub stored: u64,
    pub skipped: u64,
    pub duplicates: u64,
    pub closed: u64,
    pub pending_backfill: Vec<PendingBackfill>,
    pub wrong_comments: Vec<WrongComment>,
}

/// Reconciles one store batch against a run. Lives for the duration of
/// the main store transaction.
pub struct ReconcileEngine<'a> {
    run_id: i64,
    run_name: &'a str,
    username: &'a str,
    now: i64,
    report_limit: Option<u64>,
    /// Trimmed client path -> files row id, from source storage.
    file_ids: &'a FxHashMap<String, i64>,
    metadata: &'a RunMetadata,
    /// Prior rows of the run, indexed by bug hash.
    prior: FxHashMap<String, Vec<StoredReportData>>,
    /// Bug hashes seen in this batch.
    seen_hashes: FxHashSet<String>,
    /// Full-report fingerprints, for in-batch duplicate collapsing.
    seen_fingerprints: FxHashSet<u64>,
    /// Checker names that produced at least one stored report.
    observed_checkers: FxHashSet<String>,
    outcome: ReconcileOutcome,
}

impl<'a> ReconcileEngine<'a> {
    /// Load the run's current state and set up batch-wide tracking.
    pub fn new(
        conn: &Connection,
        run_id: i64,
        run_name: &'a str,
        username: &'a str,
        now: i64,
        report_limit: Option<u64>,
        file_ids: &'a FxHashMap<String, i64>,
        metadata: &'a RunMetadata,
    ) -> Result<Self, StorageError> {
        let mut prior: FxHashMap<String, Vec<StoredReportData>> = FxHashMap::default();
        for row in reports::query_by_run(conn, run_id)? {
            prior.entry(row.bug_id.clone()).or_default().push(row);
        }
        Ok(Self {
            run_id,
            run_name,
            username,
            now,
            report_limit,
            file_ids,
            metadata,
            prior,
            seen_hashes: FxHashSet::default(),
            seen_fingerprints: FxHashSet::default(),
            observed_checkers: FxHashSet::default(),
            outcome: ReconcileOutcome::default(),
        })
    }

    /// Store one batch of parsed reports.
    pub fn store_reports(
        &mut self,
        conn: &Connection,
        registry: &mut CheckerRegistry,
        resolver: &ReviewStatusResolver,
        skip: &SkipFilter,
        batch: &[ParsedReport],
        cancel: &dyn Cancellable,
    ) -> Result<(), StoreError> {
        for report in batch {
            if (self.outcome.stored + self.outcome.skipped) % CANCEL_CHECK_STRIDE == 0 {
                cancel.checkpoint()?;
            }
            self.store_one(conn, registry, resolver, skip, report)?;
        }
        Ok(())
    }

    fn store_one(
        &mut self,
        conn: &Connection,
        registry: &mut CheckerRegistry,
        resolver: &ReviewStatusResolver,
        skip: &SkipFilter,
        report: &ParsedReport,
    ) -> Result<(), StoreError> {
        if skip.should_skip(&report.file_path) {
            self.outcome.skipped += 1;
            return Ok(());
        }
        // A report whose content was never uploaded or stored cannot be
        // inserted; it is dropped and stays out of the hash bookkeeping,
        // so it neither closes nor keeps open any existing report.
        for path in report.referenced_files() {
            if !self.file_ids.contains_key(path) {
                tracing::warn!(
                    file = path,
                    bug_id = %report.bug_id,
                    checker = %report.checker_name,
                    "report references a file with no stored content, dropped"
                );
                self.outcome.skipped += 1;
                return Ok(());
            }
        }
        if !self.seen_fingerprints.insert(fingerprint(report)) {
            // Analyzers emit the same finding from several report files;
            // only the first occurrence is stored.
            self.outcome.duplicates += 1;
            return Ok(());
        }

        if let Some(limit) = self.report_limit {
            if self.outcome.stored >= limit {
                return Err(StoreError::ReportLimitExceeded {
                    run_name: self.run_name.to_string(),
                    limit,
                });
            }
        }

        let (detection_status, detected_at) = self.classify(&report.bug_id);
        self.seen_hashes.insert(report.bug_id.clone());

        let identity = self.checker_identity(report);
        let checker_id = registry.resolve(conn, &identity, Severity::Unspecified);
        let file_id = self.file_id(&report.file_path)?;

        let mut wrong = Vec::new();
        let decision = resolver.resolve(report, &mut wrong);
        self.outcome.wrong_comments.append(&mut wrong);

        let (review_status, review_message, review_author, review_date, in_source) =
            match &decision {
                Some(d) => (
                    d.status,
                    Some(d.message.as_str()),
                    Some(self.username),
                    Some(self.now),
                    d.in_source,
                ),
                None => (ReviewStatus::Unreviewed, None, None, None, false),
            };

        // A closing review status stamps fixed_at once: carried over when
        // the prior row was already closed the same way, set now otherwise.
        let fixed_at = if review_status.is_closing() {
            self.prior
                .get(&report.bug_id)
                .and_then(|rows| rows.first())
                .filter(|p| p.review_status == review_status)
                .and_then(|p| p.fixed_at)
                .or(Some(self.now))
        } else {
            None
        };

        let report_id = reports::insert_report(
            conn,
            &NewReport {
                run_id: self.run_id,
                file_id,
                bug_id: &report.bug_id,
                checker_id: checker_id.unwrap_or_else(|| registry.fake_id()),
                line: report.line,
                column: report.column,
                message: &report.message,
                path_length: report.path_length(),
                detection_status,
                review_status,
                review_status_author: review_author,
                review_status_message: review_message,
                review_status_date: review_date,
                review_status_is_in_source: in_source,
                detected_at,
                fixed_at,
            },
        )?;

        if checker_id.is_none() {
            self.outcome.pending_backfill.push(PendingBackfill {
                report_id,
                identity,
            });
        }

        self.store_children(conn, report_id, report)?;
        self.observed_checkers.insert(report.checker_name.clone());
        self.outcome.stored += 1;
        Ok(())
    }

    /// Detection status and detected_at for an incoming bug hash.
    fn classify(&self, bug_id: &str) -> (DetectionStatus, i64) {
        match self.prior.get(bug_id).and_then(|rows| rows.first()) {
            None => (DetectionStatus::New, self.now),
            Some(prior) => {
                let status = if prior.detection_status == DetectionStatus::Resolved {
                    DetectionStatus::Reopened
                } else {
                    DetectionStatus::Unresolved
                };
                (status, prior.detected_at)
            }
        }
    }

    fn checker_identity(&self, report: &ParsedReport) -> CheckerIdentity {
        let analyzer = report
            .analyzer_name
            .clone()
            .or_else(|| self.metadata.checker_to_analyzer.get(&report.checker_name).cloned())
            .unwrap_or_else(|| triage_core::types::UNKNOWN_ANALYZER.to_string());
        CheckerIdentity::new(analyzer, report.checker_name.clone())
    }

    fn file_id(&self, path: &str) -> Result<i64, StoreError> {
        self.file_ids.get(path).copied().ok_or_else(|| StoreError::InvalidInput {
            message: format!("report references {path}, absent from the content manifest"),
        })
    }

    fn store_children(
        &self,
        conn: &Connection,
        report_id: i64,
        report: &ParsedReport,
    ) -> Result<(), StoreError> {
        for (idx, pos) in report.bug_path_positions.iter().enumerate() {
            let file_id = self.file_id(&pos.file_path)?;
            reports::insert_bug_path_position(
                conn,
                report_id,
                idx,
                file_id,
                pos.range.start_line,
                pos.range.start_col,
                pos.range.end_line,
                pos.range.end_col,
            )?;
        }
        for (idx, event) in report.bug_path_events.iter().enumerate() {
            let file_id = self.file_id(&event.file_path)?;
            reports::insert_bug_path_event(
                conn,
                report_id,
                idx,
                file_id,
                event.line,
                event.column,
                &event.message,
            )?;
        }
        for data in &report.extended_data {
            let file_id = self.file_id(&data.file_path)?;
            reports::insert_extended_data(
                conn,
                report_id,
                data.kind,
                file_id,
                data.line,
                data.column,
                &data.message,
            )?;
        }
        for (key, value) in &report.annotations {
            reports::insert_annotation(conn, report_id, key, value)?;
        }
        Ok(())
    }

    /// Closing pass: reconcile prior rows against what this batch re-saw.
    ///
    /// Rows whose hash reappeared are superseded by the fresh inserts and
    /// deleted. Rows whose hash is gone transition to a closed status.
    pub fn finish(mut self, conn: &Connection) -> Result<ReconcileOutcome, StoreError> {
        let mut superseded: Vec<i64> = Vec::new();
        let prior = std::mem::take(&mut self.prior);

        // A checker that produced output in this store ran, whatever the
        // metadata claims: it joins the enabled set and leaves the
        // disabled set before the closing decisions below.
        let mut disabled = self.metadata.disabled_checkers.clone();
        let mut enabled = self.metadata.enabled_checkers.clone();
        let enumerable = !enabled.is_empty();
        for name in &self.observed_checkers {
            disabled.remove(name);
            if enumerable {
                enabled.insert(name.clone());
            }
        }

        for (bug_id, rows) in &prior {
            if self.seen_hashes.contains(bug_id) {
                superseded.extend(rows.iter().map(|r| r.id));
                continue;
            }
            for row in rows {
                if row.detection_status.is_closed() {
                    continue;
                }
                let status = closing_status(&row.checker.checker_name, &disabled, &enabled);
                reports::transition_detection_status(conn, row.id, status, Some(self.now))?;
                self.outcome.closed += 1;
            }
        }

        reports::delete_reports(conn, &superseded)?;

        tracing::debug!(
            stored = self.outcome.stored,
            skipped = self.outcome.skipped,
            duplicates = self.outcome.duplicates,
            closed = self.outcome.closed,
            superseded = superseded.len(),
            "reconciliation finished"
        );
        Ok(self.outcome)
    }
}

/// Why did a previously-stored finding not reappear?
fn closing_status(
    checker_name: &str,
    disabled: &FxHashSet<String>,
    enabled: &FxHashSet<String>,
) -> DetectionStatus {
    if disabled.contains(checker_name) {
        DetectionStatus::Off
    } else if checker_is_unavailable(checker_name, enabled) {
        DetectionStatus::Unavailable
    } else {
        DetectionStatus::Resolved
    }
}

/// A checker is unavailable when the analysis enumerated its enabled
/// checkers and this one is not among them. Compiler-warning checkers
/// cannot be enumerated, so they never count as unavailable.
pub fn checker_is_unavailable(checker_name: &str, enabled: &FxHashSet<String>) -> bool {
    !checker_name.starts_with(DIAGNOSTIC_CHECKER_PREFIX)
        && !enabled.is_empty()
        && !enabled.contains(checker_name)
}

/// Whole-report fingerprint for in-batch duplicate collapsing. The bug
/// hash alone is too coarse: distinct findings may legitimately share a
/// hash (same bug reached along different paths).
fn fingerprint(report: &ParsedReport) -> u64 {
    let mut hasher = Xxh3::new();
    let mut write = |s: &str| {
        hasher.update(s.as_bytes());
        hasher.update(&[0]);
    };
    write(&report.bug_id);
    write(&report.file_path);
    write(&report.checker_name);
    write(&report.message);
    hasher.update(&report.line.to_le_bytes());
    hasher.update(&report.column.to_le_bytes());
    for event in &report.bug_path_events {
        hasher.update(&event.line.to_le_bytes());
        hasher.update(&event.column.to_le_bytes());
        hasher.update(event.file_path.as_bytes());
        hasher.update(event.message.as_bytes());
    }
    hasher.digest()
}
