//! Content-addressed source file storage.
//!
//! File bytes are keyed by sha256 of the uncompressed content; identical
//! files across runs and products share one `file_contents` row. Clients
//! ask which hashes the server is missing and only pack those into the
//! upload, so a path in the manifest without bytes under `root/` is fine
//! as long as the content is already stored.

use std::path::Path;

use rusqlite::Connection;
use rustc_hash::FxHashMap;
use sha2::{Digest, Sha256};

use triage_core::errors::StoreError;
use triage_core::traits::Cancellable;
use triage_storage::queries::files;

use crate::archive::{self, BLAME_DIR, ROOT_DIR};

/// Result of storing an archive's source files.
#[derive(Debug, Default)]
pub struct SourceStoreResult {
    /// Trimmed client path -> `files` row id.
    pub file_ids: FxHashMap<String, i64>,
    pub new_contents: usize,
    pub reused_contents: usize,
    /// Manifest entries with neither uploaded nor stored content.
    pub missing_contents: usize,
}

/// Compute the content hash of raw file bytes.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Store every file named in the content-hash manifest and create the
/// per-path `files` rows. Runs inside the caller's transaction.
///
/// `archive_paths` maps normalized paths to their location under the
/// archive's `root/` tree (they differ when prefix trimming is on).
pub fn store_source_files(
    conn: &Connection,
    extracted: &Path,
    content_hashes: &FxHashMap<String, String>,
    archive_paths: &FxHashMap<String, String>,
    cancel: &dyn Cancellable,
) -> Result<SourceStoreResult, StoreError> {
    let mut result = SourceStoreResult::default();
    let root = extracted.join(ROOT_DIR);

    // Deterministic order keeps logs and failures reproducible.
    let mut paths: Vec<&String> = content_hashes.keys().collect();
    paths.sort();

    for path in paths {
        cancel.checkpoint()?;
        let claimed_hash = &content_hashes[path];

        let relative = archive_paths.get(path).map(String::as_str).unwrap_or(path);
        let uploaded = root.join(relative);
        if uploaded.is_file() {
            let bytes = archive::read_file(&uploaded)?;
            let actual = content_hash(&bytes);
            if &actual != claimed_hash {
                return Err(StoreError::InvalidInput {
                    message: format!(
                        "content hash mismatch for {path}: manifest says {claimed_hash}, \
                         uploaded bytes hash to {actual}"
                    ),
                });
            }
            files::insert_content(conn, claimed_hash, &bytes)?;
            result.new_contents += 1;
        } else {
            // Not in the upload: the client believed we already hold it.
            let missing = files::missing_content_hashes(conn, &[claimed_hash.clone()])?;
            if !missing.is_empty() {
                // No file row is created, so reports referencing this
                // path get dropped instead of failing the store.
                tracing::warn!(
                    path,
                    hash = %claimed_hash,
                    "file was not uploaded and its content is unknown, skipped"
                );
                result.missing_contents += 1;
                continue;
            }
            result.reused_contents += 1;
        }

        let file_id = files::get_or_insert_file(conn, path, claimed_hash)?;
        result.file_ids.insert(path.clone(), file_id);
    }

    tracing::debug!(
        new = result.new_contents,
        reused = result.reused_contents,
        missing = result.missing_contents,
        "stored source files"
    );
    Ok(result)
}

/// Git blame sidecar uploaded under `blame/<path>`. Only the tracking
/// fields are interpreted; the rest of the document is stored opaquely.
#[derive(Debug, serde::Deserialize)]
struct BlameDocument {
    remote_url: Option<String>,
    tracking_branch: Option<String>,
}

/// Backfill blame info by walking the `blame/` subtree. The walk is
/// independent of this store's content manifest, so file rows from
/// earlier stores whose blame fields are still null gain blame info
/// retroactively, without their content being re-uploaded. Blame is
/// best-effort metadata; individual parse failures are logged, not fatal.
///
/// `archive_paths` maps normalized paths back to the archive's layout,
/// where client-side prefix trimming made the two differ.
pub fn store_blame_info(
    conn: &Connection,
    extracted: &Path,
    archive_paths: &FxHashMap<String, String>,
) -> Result<(), StoreError> {
    let blame_root = extracted.join(BLAME_DIR);
    if !blame_root.is_dir() {
        return Ok(());
    }

    // Reverse lookup: path under blame/ -> path as the files table
    // knows it. Paths outside the manifest pass through untrimmed.
    let normalized: FxHashMap<&str, &str> = archive_paths
        .iter()
        .map(|(norm, arch)| (arch.as_str(), norm.as_str()))
        .collect();

    let mut blame_files = Vec::new();
    collect_blame_files(&blame_root, &mut blame_files)?;

    for blame_path in blame_files {
        let Ok(relative) = blame_path.strip_prefix(&blame_root) else {
            continue;
        };
        let Some(relative) = relative.to_str() else {
            continue;
        };
        let path = normalized.get(relative).copied().unwrap_or(relative);

        let bytes = archive::read_file(&blame_path)?;
        let doc: BlameDocument = match serde_json::from_slice(&bytes) {
            Ok(doc) => doc,
            Err(e) => {
                tracing::warn!(path, error = %e, "malformed blame info, skipped");
                continue;
            }
        };

        for row in files::files_missing_blame(conn, path)? {
            files::set_file_tracking(
                conn,
                row.id,
                doc.remote_url.as_deref(),
                doc.tracking_branch.as_deref(),
            )?;
            files::set_blame_info(conn, &row.content_hash, &bytes)?;
        }
    }
    Ok(())
}

fn collect_blame_files(dir: &Path, out: &mut Vec<std::path::PathBuf>) -> Result<(), StoreError> {
    let entries =
        std::fs::read_dir(dir).map_err(|e| StoreError::io("read blame directory", &e))?;
    for entry in entries {
        let entry = entry.map_err(|e| StoreError::io("read blame directory", &e))?;
        let path = entry.path();
        if path.is_dir() {
            collect_blame_files(&path, out)?;
        } else if path.is_file() {
            out.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_are_lowercase_hex_sha256() {
        assert_eq!(
            content_hash(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }
}
