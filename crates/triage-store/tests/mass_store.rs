//! End-to-end mass store tests: build a real upload archive, run the
//! store pipeline against a file-backed database, inspect the rows.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use triage_core::config::ServerConfig;
use triage_core::errors::StoreError;
use triage_core::traits::CancellationToken;
use triage_core::types::{DetectionStatus, ParsedReport, ReviewStatus, StoredReportData};
use triage_storage::queries::{reports, run_history, runs};
use triage_storage::DatabaseManager;
use triage_store::orchestrator::{MassStoreRun, StoreParams, StoreSummary};
use triage_store::run_lock::RunLockManager;
use triage_store::source_store::content_hash;
use triage_store::{ReportService, ServerContext};

struct Harness {
    tmp: tempfile::TempDir,
    context: Arc<ServerContext>,
    archive_seq: std::cell::Cell<u32>,
}

fn harness(configure: impl FnOnce(&mut ServerConfig)) -> Harness {
    let tmp = tempfile::tempdir().unwrap();
    let db = Arc::new(DatabaseManager::open(&tmp.path().join("triage.db")).unwrap());
    let mut config = ServerConfig::default();
    configure(&mut config);
    let context = Arc::new(ServerContext::new(db, config, tmp.path().join("data")));
    Harness {
        tmp,
        context,
        archive_seq: std::cell::Cell::new(0),
    }
}

impl Harness {
    fn builder(&self) -> ArchiveBuilder {
        let seq = self.archive_seq.get();
        self.archive_seq.set(seq + 1);
        ArchiveBuilder::new(self.tmp.path().join(format!("archive-{seq}")))
    }

    fn store(
        &self,
        params: StoreParams,
        archive: &Path,
        token: &str,
    ) -> Result<StoreSummary, StoreError> {
        let run = MassStoreRun::new(Arc::clone(&self.context), params);
        let guard = run.prepare(token, archive)?;
        run.execute(token, guard, &CancellationToken::new())
    }

    fn run_reports(&self, run_name: &str) -> Vec<StoredReportData> {
        self.context
            .db
            .with_reader(|conn| {
                let run = runs::find_by_name(conn, run_name)?.expect("run exists");
                reports::query_by_run(conn, run.id)
            })
            .unwrap()
    }

    fn run_id(&self, run_name: &str) -> i64 {
        self.context
            .db
            .with_reader(|conn| runs::find_by_name(conn, run_name))
            .unwrap()
            .expect("run exists")
            .id
    }

    fn run_exists(&self, run_name: &str) -> bool {
        self.context
            .db
            .with_reader(|conn| runs::find_by_name(conn, run_name))
            .unwrap()
            .is_some()
    }
}

struct ArchiveBuilder {
    staging: PathBuf,
    hashes: BTreeMap<String, String>,
}

impl ArchiveBuilder {
    fn new(staging: PathBuf) -> Self {
        fs::create_dir_all(&staging).unwrap();
        Self {
            staging,
            hashes: BTreeMap::new(),
        }
    }

    fn source(mut self, client_path: &str, content: &str) -> Self {
        let rel = client_path.trim_start_matches('/');
        let dest = self.staging.join("root").join(rel);
        fs::create_dir_all(dest.parent().unwrap()).unwrap();
        fs::write(&dest, content).unwrap();
        self.hashes
            .insert(client_path.to_string(), content_hash(content.as_bytes()));
        self
    }

    /// A manifest entry without uploaded bytes (content assumed stored).
    fn manifest_only(mut self, client_path: &str, content: &str) -> Self {
        self.hashes
            .insert(client_path.to_string(), content_hash(content.as_bytes()));
        self
    }

    /// A git blame sidecar under `blame/<path>`.
    fn blame(self, client_path: &str, blame_json: &str) -> Self {
        let rel = client_path.trim_start_matches('/');
        let dest = self.staging.join("blame").join(rel);
        fs::create_dir_all(dest.parent().unwrap()).unwrap();
        fs::write(&dest, blame_json).unwrap();
        self
    }

    fn reports(self, subdir: &str, name: &str, batch: &[ParsedReport]) -> Self {
        self.report_dir_file(subdir, name, &serde_json::to_string(batch).unwrap())
    }

    fn report_dir_file(self, subdir: &str, name: &str, contents: &str) -> Self {
        let dir = self.staging.join("reports").join(subdir);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(name), contents).unwrap();
        self
    }

    fn build(self) -> PathBuf {
        fs::write(
            self.staging.join("content_hashes.json"),
            serde_json::to_vec(&self.hashes).unwrap(),
        )
        .unwrap();
        let out = self.staging.with_extension("tar.zst");
        let file = fs::File::create(&out).unwrap();
        let encoder = zstd::Encoder::new(file, 3).unwrap().auto_finish();
        let mut builder = tar::Builder::new(encoder);
        builder.append_dir_all(".", &self.staging).unwrap();
        builder.into_inner().unwrap();
        out
    }
}

fn params(run_name: &str) -> StoreParams {
    StoreParams {
        run_name: run_name.to_string(),
        username: "alice".to_string(),
        tag: None,
        description: None,
        trim_path_prefixes: Vec::new(),
        force: false,
    }
}

fn report(path: &str, checker: &str, bug: &str, line: u32) -> ParsedReport {
    ParsedReport {
        file_path: path.to_string(),
        line,
        column: 1,
        message: format!("finding {bug}"),
        checker_name: checker.to_string(),
        analyzer_name: Some("clangsa".to_string()),
        bug_id: bug.to_string(),
        bug_path_positions: Vec::new(),
        bug_path_events: Vec::new(),
        extended_data: Vec::new(),
        annotations: BTreeMap::new(),
    }
}

/// v1 metadata enabling the given checkers (true) / disabling (false).
fn metadata_v1(checkers: &[(&str, bool)]) -> String {
    let flags: BTreeMap<&str, bool> = checkers.iter().copied().collect();
    serde_json::json!({
        "version": 1,
        "check_commands": ["clangsa -analyze src"],
        "check_durations": [4.2],
        "checkers": { "clangsa": flags },
        "versions": { "clangsa": "clang 17.0.1" }
    })
    .to_string()
}

const SRC: &str = "int div(int a, int b) {\n    return a / b;\n}\n";

#[test]
fn storing_the_same_archive_twice_is_idempotent() {
    let h = harness(|_| {});

    for attempt in 0..2 {
        let archive = h
            .builder()
            .source("/proj/a.c", SRC)
            .reports(
                "clangsa",
                "1.json",
                &[
                    report("/proj/a.c", "core.DivideZero", "b1", 2),
                    report("/proj/a.c", "core.NullDeref", "b2", 1),
                ],
            )
            .report_dir_file(
                "clangsa",
                "metadata.json",
                &metadata_v1(&[("core.DivideZero", true), ("core.NullDeref", true)]),
            )
            .build();

        let summary = h
            .store(params("run-a"), &archive, &format!("t{attempt}"))
            .unwrap();
        assert_eq!(summary.stored, 2);
    }

    let rows = h.run_reports("run-a");
    assert_eq!(rows.len(), 2);
    for row in &rows {
        assert_eq!(row.detection_status, DetectionStatus::Unresolved);
        assert!(row.fixed_at.is_none());
    }
}

#[test]
fn resolved_finding_reopens_with_original_detection_time() {
    let h = harness(|_| {});
    let meta = metadata_v1(&[("core.DivideZero", true)]);

    let with_report = |h: &Harness| {
        h.builder()
            .source("/proj/a.c", SRC)
            .reports("clangsa", "1.json", &[report("/proj/a.c", "core.DivideZero", "b1", 2)])
            .report_dir_file("clangsa", "metadata.json", &meta)
            .build()
    };

    h.store(params("run-b"), &with_report(&h), "t1").unwrap();
    let first = &h.run_reports("run-b")[0];
    let original_detected_at = first.detected_at;

    // Second store without the finding: it resolves.
    let empty = h
        .builder()
        .reports("clangsa", "1.json", &[])
        .report_dir_file("clangsa", "metadata.json", &meta)
        .build();
    h.store(params("run-b"), &empty, "t2").unwrap();
    let resolved = &h.run_reports("run-b")[0];
    assert_eq!(resolved.detection_status, DetectionStatus::Resolved);
    assert!(resolved.fixed_at.is_some());

    // Third store re-detects it: reopened, detection time carried over.
    h.store(params("run-b"), &with_report(&h), "t3").unwrap();
    let rows = h.run_reports("run-b");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].detection_status, DetectionStatus::Reopened);
    assert_eq!(rows[0].detected_at, original_detected_at);
}

#[test]
fn missing_findings_close_as_off_or_unavailable() {
    let h = harness(|_| {});

    let archive = h
        .builder()
        .source("/proj/a.c", SRC)
        .reports(
            "clangsa",
            "1.json",
            &[
                report("/proj/a.c", "core.DivideZero", "b1", 2),
                report("/proj/a.c", "core.NullDeref", "b2", 1),
            ],
        )
        .report_dir_file(
            "clangsa",
            "metadata.json",
            &metadata_v1(&[("core.DivideZero", true), ("core.NullDeref", true)]),
        )
        .build();
    h.store(params("run-c"), &archive, "t1").unwrap();

    // Next store: DivideZero explicitly disabled, NullDeref silently gone
    // from the (non-empty) enabled set.
    let empty = h
        .builder()
        .reports("clangsa", "1.json", &[])
        .report_dir_file(
            "clangsa",
            "metadata.json",
            &metadata_v1(&[("core.DivideZero", false), ("alpha.Other", true)]),
        )
        .build();
    h.store(params("run-c"), &empty, "t2").unwrap();

    let rows = h.run_reports("run-c");
    let by_bug = |bug: &str| {
        rows.iter()
            .find(|r| r.bug_id == bug)
            .unwrap_or_else(|| panic!("{bug} missing"))
    };
    assert_eq!(by_bug("b1").detection_status, DetectionStatus::Off);
    assert_eq!(by_bug("b2").detection_status, DetectionStatus::Unavailable);
    assert!(by_bug("b1").fixed_at.is_some());
    assert!(by_bug("b2").fixed_at.is_some());
}

#[test]
fn stored_content_is_reused_across_uploads() {
    let h = harness(|_| {});
    let service = ReportService::new(Arc::clone(&h.context));
    let hash = content_hash(SRC.as_bytes());

    assert_eq!(
        service.get_missing_content_hashes(&[hash.clone()]).unwrap(),
        vec![hash.clone()]
    );

    let first = h
        .builder()
        .source("/proj/a.c", SRC)
        .reports("clangsa", "1.json", &[report("/proj/a.c", "core.DivideZero", "b1", 2)])
        .report_dir_file("clangsa", "metadata.json", &metadata_v1(&[("core.DivideZero", true)]))
        .build();
    h.store(params("run-d"), &first, "t1").unwrap();

    assert!(service.get_missing_content_hashes(&[hash]).unwrap().is_empty());

    // A second run can reference the same content without uploading it.
    let second = h
        .builder()
        .manifest_only("/proj/a.c", SRC)
        .reports("clangsa", "1.json", &[report("/proj/a.c", "core.DivideZero", "b1", 2)])
        .report_dir_file("clangsa", "metadata.json", &metadata_v1(&[("core.DivideZero", true)]))
        .build();
    let summary = h.store(params("run-e"), &second, "t2").unwrap();
    assert_eq!(summary.stored, 1);
}

#[test]
fn duplicate_findings_in_one_batch_collapse() {
    let h = harness(|_| {});
    let dup = report("/proj/a.c", "core.DivideZero", "b1", 2);
    let archive = h
        .builder()
        .source("/proj/a.c", SRC)
        .reports("clangsa", "1.json", &[dup.clone(), dup.clone()])
        .reports("clangsa", "2.json", &[dup])
        .report_dir_file("clangsa", "metadata.json", &metadata_v1(&[("core.DivideZero", true)]))
        .build();

    let summary = h.store(params("run-f"), &archive, "t1").unwrap();
    assert_eq!(summary.stored, 1);
    assert_eq!(summary.duplicates, 2);
    assert_eq!(h.run_reports("run-f").len(), 1);
}

#[test]
fn exceeding_the_report_limit_stores_nothing() {
    let h = harness(|config| {
        config.product.report_limit = Some(2);
    });
    let archive = h
        .builder()
        .source("/proj/a.c", SRC)
        .reports(
            "clangsa",
            "1.json",
            &[
                report("/proj/a.c", "core.DivideZero", "b1", 1),
                report("/proj/a.c", "core.DivideZero", "b2", 2),
                report("/proj/a.c", "core.DivideZero", "b3", 3),
            ],
        )
        .report_dir_file("clangsa", "metadata.json", &metadata_v1(&[("core.DivideZero", true)]))
        .build();

    let err = h.store(params("run-g"), &archive, "t1").unwrap_err();
    assert!(matches!(err, StoreError::ReportLimitExceeded { limit: 2, .. }));
    // The transaction rolled back: not even the run row survives.
    assert!(!h.run_exists("run-g"));
}

#[test]
fn concurrent_store_of_the_same_run_is_refused() {
    let h = harness(|_| {});
    let lock_manager = RunLockManager::new(Arc::clone(&h.context.db), &h.context.config);
    let guard = lock_manager.acquire("run-h", "bob").unwrap();

    let archive = h
        .builder()
        .source("/proj/a.c", SRC)
        .reports("clangsa", "1.json", &[report("/proj/a.c", "core.DivideZero", "b1", 2)])
        .report_dir_file("clangsa", "metadata.json", &metadata_v1(&[("core.DivideZero", true)]))
        .build();

    let err = h.store(params("run-h"), &archive, "t1").unwrap_err();
    match err {
        StoreError::RunLocked { locked_by, .. } => assert_eq!(locked_by, "bob"),
        other => panic!("expected RunLocked, got {other:?}"),
    }

    lock_manager.release(guard).unwrap();
    h.store(params("run-h"), &archive, "t2").unwrap();
}

#[test]
fn in_source_suppression_sets_review_status() {
    let h = harness(|_| {});
    let source = "// triage_false_positive [core.DivideZero] verified by hand\nint x = 1 / d;\n";
    let archive = h
        .builder()
        .source("/proj/a.c", source)
        .reports("clangsa", "1.json", &[report("/proj/a.c", "core.DivideZero", "b1", 2)])
        .report_dir_file("clangsa", "metadata.json", &metadata_v1(&[("core.DivideZero", true)]))
        .build();

    h.store(params("run-i"), &archive, "t1").unwrap();
    let rows = h.run_reports("run-i");
    assert_eq!(rows[0].review_status, ReviewStatus::FalsePositive);
    // Suppressed at first sight: the closing review status stamps fixed_at.
    assert!(rows[0].fixed_at.is_some());
}

#[test]
fn conflicting_comments_fail_the_task_but_keep_the_data() {
    let h = harness(|_| {});
    let source =
        "// triage_false_positive [*] a\nint x = 1; // triage_confirmed [*] b\nint y;\n";
    let archive = h
        .builder()
        .source("/proj/a.c", source)
        .reports("clangsa", "1.json", &[report("/proj/a.c", "core.DivideZero", "b1", 2)])
        .report_dir_file("clangsa", "metadata.json", &metadata_v1(&[("core.DivideZero", true)]))
        .build();

    let err = h.store(params("run-j"), &archive, "t1").unwrap_err();
    match err {
        StoreError::WrongReviewStatusComments { comments } => {
            assert_eq!(comments.len(), 1);
        }
        other => panic!("expected WrongReviewStatusComments, got {other:?}"),
    }
    // The store itself committed; only the comment was rejected.
    let rows = h.run_reports("run-j");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].review_status, ReviewStatus::Unreviewed);
}

#[test]
fn skip_rules_drop_matching_reports() {
    let h = harness(|_| {});
    let archive = h
        .builder()
        .source("/proj/src/a.c", SRC)
        .source("/proj/generated/g.c", SRC)
        .reports(
            "clangsa",
            "1.json",
            &[
                report("/proj/src/a.c", "core.DivideZero", "b1", 2),
                report("/proj/generated/g.c", "core.DivideZero", "b2", 2),
            ],
        )
        .report_dir_file("clangsa", "metadata.json", &metadata_v1(&[("core.DivideZero", true)]))
        .report_dir_file("clangsa", "skip_file", "-*/generated/*\n")
        .build();

    let summary = h.store(params("run-k"), &archive, "t1").unwrap();
    assert_eq!(summary.stored, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(h.run_reports("run-k")[0].bug_id, "b1");
}

#[test]
fn trim_prefixes_normalize_stored_paths() {
    let h = harness(|_| {});
    let archive = h
        .builder()
        .source("/home/alice/proj/src/a.c", SRC)
        .reports(
            "clangsa",
            "1.json",
            &[report("/home/alice/proj/src/a.c", "core.DivideZero", "b1", 2)],
        )
        .report_dir_file("clangsa", "metadata.json", &metadata_v1(&[("core.DivideZero", true)]))
        .build();

    let mut p = params("run-l");
    p.trim_path_prefixes = vec!["/home/alice/proj".to_string()];
    h.store(p, &archive, "t1").unwrap();

    assert_eq!(h.run_reports("run-l")[0].file_path, "src/a.c");
}

#[test]
fn force_store_replaces_the_run_baseline() {
    let h = harness(|_| {});
    let meta = metadata_v1(&[("core.DivideZero", true)]);

    let first = h
        .builder()
        .source("/proj/a.c", SRC)
        .reports("clangsa", "1.json", &[report("/proj/a.c", "core.DivideZero", "b1", 2)])
        .report_dir_file("clangsa", "metadata.json", &meta)
        .build();
    let mut p = params("run-m");
    p.tag = Some("v1".to_string());
    h.store(p, &first, "t1").unwrap();

    let second = h
        .builder()
        .source("/proj/a.c", SRC)
        .reports("clangsa", "1.json", &[report("/proj/a.c", "core.DivideZero", "b2", 1)])
        .report_dir_file("clangsa", "metadata.json", &meta)
        .build();
    let mut p = params("run-m");
    p.tag = Some("v2".to_string());
    p.force = true;
    h.store(p, &second, "t2").unwrap();

    let rows = h.run_reports("run-m");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].bug_id, "b2");
    assert_eq!(rows[0].detection_status, DetectionStatus::New);

    // The run row was recreated, so the first store's history is gone too.
    let history = h
        .context
        .db
        .with_reader(|conn| run_history::query_by_run(conn, h.run_id("run-m")))
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].version_tag.as_deref(), Some("v2"));
}

#[test]
fn service_runs_stores_in_the_background() {
    let h = harness(|config| {
        config.product.run_limit = Some(1);
    });
    let mut service = ReportService::new(Arc::clone(&h.context));

    let archive = h
        .builder()
        .source("/proj/a.c", SRC)
        .reports("clangsa", "1.json", &[report("/proj/a.c", "core.DivideZero", "b1", 2)])
        .report_dir_file("clangsa", "metadata.json", &metadata_v1(&[("core.DivideZero", true)]))
        .build();

    let token = service
        .mass_store_run_asynchronous(&archive, params("run-n"))
        .unwrap();

    let mut row = service.get_task_info(&token).unwrap();
    for _ in 0..200 {
        if row.status.is_terminal() {
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(25));
        row = service.get_task_info(&token).unwrap();
    }
    assert_eq!(row.status, triage_storage::queries::tasks::TaskStatus::Completed);
    assert!(row.comments.unwrap().contains("stored 1 report"));

    let runs = service.get_run_data("").unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].name, "run-n");

    let counts = service.get_detection_status_counts(runs[0].id).unwrap();
    assert_eq!(counts, vec![(DetectionStatus::New, 1)]);

    // The run limit blocks a second run synchronously.
    let err = service
        .mass_store_run_asynchronous(&archive, params("run-o"))
        .unwrap_err();
    assert!(matches!(err, StoreError::RunLimitExceeded { limit: 1 }));

    service.shutdown();
}

#[test]
fn review_status_change_follows_fixed_at_rules() {
    let h = harness(|_| {});
    let archive = h
        .builder()
        .source("/proj/a.c", SRC)
        .reports("clangsa", "1.json", &[report("/proj/a.c", "core.DivideZero", "b1", 2)])
        .report_dir_file("clangsa", "metadata.json", &metadata_v1(&[("core.DivideZero", true)]))
        .build();
    h.store(params("run-p"), &archive, "t1").unwrap();
    let report_id = h.run_reports("run-p")[0].id;

    let service = ReportService::new(Arc::clone(&h.context));
    service
        .change_review_status(report_id, ReviewStatus::FalsePositive, "not real", "carol")
        .unwrap();
    let row = &h.run_reports("run-p")[0];
    assert_eq!(row.review_status, ReviewStatus::FalsePositive);
    assert!(row.fixed_at.is_some());

    service
        .change_review_status(report_id, ReviewStatus::Confirmed, "actually real", "carol")
        .unwrap();
    let row = &h.run_reports("run-p")[0];
    assert_eq!(row.review_status, ReviewStatus::Confirmed);
    assert!(row.fixed_at.is_none());
}

#[test]
fn unresolvable_file_drops_the_report_not_the_store() {
    let h = harness(|_| {});

    // The client claims /proj/ghost.c is already stored, but it never was
    // and no bytes were uploaded. Only the report pointing at it is lost.
    let archive = h
        .builder()
        .source("/proj/a.c", SRC)
        .manifest_only("/proj/ghost.c", "int ghost;\n")
        .reports(
            "clangsa",
            "1.json",
            &[
                report("/proj/a.c", "core.DivideZero", "b1", 2),
                report("/proj/ghost.c", "core.DivideZero", "b2", 1),
            ],
        )
        .report_dir_file("clangsa", "metadata.json", &metadata_v1(&[("core.DivideZero", true)]))
        .build();

    let summary = h.store(params("run-r"), &archive, "t1").unwrap();
    assert_eq!(summary.stored, 1);
    assert_eq!(summary.skipped, 1);

    let rows = h.run_reports("run-r");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].bug_id, "b1");
}

#[test]
fn observed_checker_closes_as_resolved_despite_stale_metadata() {
    let h = harness(|_| {});

    let first = h
        .builder()
        .source("/proj/a.c", SRC)
        .reports("clangsa", "1.json", &[report("/proj/a.c", "core.DivideZero", "b1", 2)])
        .report_dir_file("clangsa", "metadata.json", &metadata_v1(&[("core.DivideZero", true)]))
        .build();
    h.store(params("run-s"), &first, "t1").unwrap();

    // The metadata claims DivideZero is disabled, but a fresh DivideZero
    // finding proves it ran. The missing b1 was really fixed, not
    // switched off.
    let second = h
        .builder()
        .manifest_only("/proj/a.c", SRC)
        .reports("clangsa", "1.json", &[report("/proj/a.c", "core.DivideZero", "b2", 1)])
        .report_dir_file(
            "clangsa",
            "metadata.json",
            &metadata_v1(&[("core.DivideZero", false)]),
        )
        .build();
    h.store(params("run-s"), &second, "t2").unwrap();

    let rows = h.run_reports("run-s");
    let by_bug = |bug: &str| {
        rows.iter()
            .find(|r| r.bug_id == bug)
            .unwrap_or_else(|| panic!("{bug} missing"))
    };
    assert_eq!(by_bug("b1").detection_status, DetectionStatus::Resolved);
    assert!(by_bug("b1").fixed_at.is_some());
    assert_eq!(by_bug("b2").detection_status, DetectionStatus::New);
}

#[test]
fn blame_upload_backfills_files_from_earlier_stores() {
    let h = harness(|_| {});
    let meta = metadata_v1(&[("core.DivideZero", true)]);

    let first = h
        .builder()
        .source("/proj/a.c", SRC)
        .reports("clangsa", "1.json", &[report("/proj/a.c", "core.DivideZero", "b1", 2)])
        .report_dir_file("clangsa", "metadata.json", &meta)
        .build();
    h.store(params("run-t"), &first, "t1").unwrap();
    let file_id = h.run_reports("run-t")[0].file_id;

    let service = ReportService::new(Arc::clone(&h.context));
    assert!(service.get_blame_info(file_id).unwrap().is_none());

    // A later upload carries blame data for a file it does not re-send;
    // the file row from the first store picks it up.
    let blame_json = serde_json::json!({
        "version": 1,
        "remote_url": "https://git.example.com/proj.git",
        "tracking_branch": "main",
        "commits": {},
        "blame": []
    })
    .to_string();
    let second = h
        .builder()
        .blame("/proj/a.c", &blame_json)
        .reports("clangsa", "1.json", &[])
        .report_dir_file("clangsa", "metadata.json", &meta)
        .build();
    h.store(params("run-t"), &second, "t2").unwrap();

    let blame = service.get_blame_info(file_id).unwrap().expect("blame stored");
    let text = String::from_utf8(blame).unwrap();
    assert!(text.contains("https://git.example.com/proj.git"));
}

#[test]
fn remove_run_collects_orphaned_content() {
    let h = harness(|_| {});
    let archive = h
        .builder()
        .source("/proj/a.c", SRC)
        .reports("clangsa", "1.json", &[report("/proj/a.c", "core.DivideZero", "b1", 2)])
        .report_dir_file("clangsa", "metadata.json", &metadata_v1(&[("core.DivideZero", true)]))
        .build();
    h.store(params("run-q"), &archive, "t1").unwrap();

    let service = ReportService::new(Arc::clone(&h.context));
    assert!(service.remove_run("run-q").unwrap());
    assert!(!h.run_exists("run-q"));

    // The file content became orphaned and was collected with the run.
    let hash = content_hash(SRC.as_bytes());
    assert_eq!(
        service.get_missing_content_hashes(&[hash.clone()]).unwrap(),
        vec![hash]
    );

    assert!(!service.remove_run("run-q").unwrap());
}
