//! Upload archive handling.
//!
//! Clients upload a zstd-compressed tar with this layout:
//!
//! ```text
//! root/<abs-path-with-leading-slash-stripped>   raw source bytes
//! blame/<abs-path-with-leading-slash-stripped>  JSON blame info per file
//! reports/<subdir>/metadata.json                one per analyzer invocation
//! reports/<subdir>/<n>.json                     analyzer report files
//! reports/<subdir>/skip_file                    optional glob skip list
//! reports/<subdir>/review_status.yaml           optional review-status rules
//! content_hashes.json                           path -> sha256-hex manifest
//! ```

use std::io::Read;
use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;
use tar::Archive;

use triage_core::errors::StoreError;

pub const ROOT_DIR: &str = "root";
pub const BLAME_DIR: &str = "blame";
pub const REPORTS_DIR: &str = "reports";
pub const CONTENT_HASHES_FILE: &str = "content_hashes.json";
pub const METADATA_FILE: &str = "metadata.json";
pub const SKIP_FILE: &str = "skip_file";
pub const REVIEW_STATUS_FILE: &str = "review_status.yaml";

/// Sidecar written by the input handler next to the persisted archive.
pub const STORE_CONFIG_FILE: &str = "store_configuration.json";
pub const ARCHIVE_FILE: &str = "upload.tar.zst";

/// Extract an uploaded `.tar.zst` archive into `dest`.
///
/// `unpack_in` refuses absolute paths and `..` traversal, so a hostile
/// archive cannot write outside the task directory.
pub fn extract_archive(archive_path: &Path, dest: &Path) -> Result<(), StoreError> {
    let file = std::fs::File::open(archive_path)
        .map_err(|e| StoreError::io("open upload archive", &e))?;
    let decoder = zstd::Decoder::new(file).map_err(|e| StoreError::Archive {
        message: format!("not a zstd stream: {e}"),
    })?;
    let mut archive = Archive::new(decoder);

    std::fs::create_dir_all(dest).map_err(|e| StoreError::io("create extract dir", &e))?;

    let entries = archive.entries().map_err(|e| StoreError::Archive {
        message: format!("read archive entries: {e}"),
    })?;
    for entry in entries {
        let mut entry = entry.map_err(|e| StoreError::Archive {
            message: format!("corrupt archive entry: {e}"),
        })?;
        let unpacked = entry.unpack_in(dest).map_err(|e| StoreError::Archive {
            message: format!("unpack entry: {e}"),
        })?;
        if !unpacked {
            let path = entry.path().map(|p| p.display().to_string()).unwrap_or_default();
            tracing::warn!(entry = %path, "archive entry escaped extraction root, skipped");
        }
    }
    Ok(())
}

/// Read and validate the content-hash manifest from an extracted tree.
///
/// Manifest keys are absolute client paths; they are normalized to the
/// leading-slash-stripped form used inside `root/`.
pub fn read_content_hashes(
    extracted: &Path,
) -> Result<FxHashMap<String, String>, StoreError> {
    let manifest_path = extracted.join(CONTENT_HASHES_FILE);
    let contents = std::fs::read_to_string(&manifest_path).map_err(|e| StoreError::Archive {
        message: format!("missing {CONTENT_HASHES_FILE}: {e}"),
    })?;
    let raw: FxHashMap<String, String> =
        serde_json::from_str(&contents).map_err(|e| StoreError::Archive {
            message: format!("malformed {CONTENT_HASHES_FILE}: {e}"),
        })?;
    Ok(raw
        .into_iter()
        .map(|(path, hash)| (trim_path(&path).to_string(), hash))
        .collect())
}

/// Strip the leading slash from an absolute client path.
pub fn trim_path(path: &str) -> &str {
    path.strip_prefix('/').unwrap_or(path)
}

/// Apply client-requested path-trim prefixes, longest match first.
pub fn trim_path_prefixes<'a>(path: &'a str, prefixes: &[String]) -> &'a str {
    let mut best: Option<&str> = None;
    for prefix in prefixes {
        if let Some(rest) = path.strip_prefix(prefix.as_str()) {
            let rest = rest.strip_prefix('/').unwrap_or(rest);
            if best.map_or(true, |b| rest.len() < b.len()) {
                best = Some(rest);
            }
        }
    }
    best.unwrap_or(path)
}

/// List the report subdirectories of an extracted tree, sorted.
pub fn report_dirs(extracted: &Path) -> Result<Vec<PathBuf>, StoreError> {
    let reports_root = extracted.join(REPORTS_DIR);
    if !reports_root.is_dir() {
        return Ok(Vec::new());
    }
    let mut dirs = Vec::new();
    let entries = std::fs::read_dir(&reports_root)
        .map_err(|e| StoreError::io("read reports dir", &e))?;
    for entry in entries {
        let entry = entry.map_err(|e| StoreError::io("read reports entry", &e))?;
        let path = entry.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Compress `bytes` as a zstd stream (helper for clients/tests building
/// archives; the server itself only decompresses).
pub fn compress_bytes(bytes: &[u8]) -> Result<Vec<u8>, StoreError> {
    zstd::encode_all(bytes, 3).map_err(|e| StoreError::Archive {
        message: format!("zstd encode: {e}"),
    })
}

/// Read a whole file, with store-flavored error context.
pub fn read_file(path: &Path) -> Result<Vec<u8>, StoreError> {
    let mut buf = Vec::new();
    std::fs::File::open(path)
        .and_then(|mut f| f.read_to_end(&mut buf))
        .map_err(|e| StoreError::io(&format!("read {}", path.display()), &e))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_leading_slash_only() {
        assert_eq!(trim_path("/home/u/a.c"), "home/u/a.c");
        assert_eq!(trim_path("relative/a.c"), "relative/a.c");
    }

    #[test]
    fn longest_prefix_wins() {
        let prefixes = vec!["/home".to_string(), "/home/user".to_string()];
        assert_eq!(trim_path_prefixes("/home/user/src/a.c", &prefixes), "src/a.c");
        assert_eq!(trim_path_prefixes("/opt/x.c", &prefixes), "/opt/x.c");
    }
}
