//! Queries for files and content-addressed file contents.
//!
//! Contents are zstd-compressed at this boundary so every caller shares
//! the same representation. Insert races between concurrent stores are
//! resolved with ON CONFLICT DO NOTHING, never application retry.

use rusqlite::{params, Connection, OptionalExtension};
use triage_core::errors::StorageError;

use super::db_err;

/// Compression level for stored file content. Level 3 is the zstd
/// default; source files are small enough that higher levels only
/// burn CPU.
const CONTENT_COMPRESSION_LEVEL: i32 = 3;

/// A file row.
#[derive(Debug, Clone)]
pub struct FileRow {
    pub id: i64,
    pub filepath: String,
    pub content_hash: String,
    pub remote_url: Option<String>,
    pub tracking_branch: Option<String>,
}

/// Insert file content under its hash, compressing the bytes. A
/// concurrent insert of the same hash wins silently.
pub fn insert_content(
    conn: &Connection,
    content_hash: &str,
    content: &[u8],
) -> Result<(), StorageError> {
    let compressed = zstd::encode_all(content, CONTENT_COMPRESSION_LEVEL)
        .map_err(|e| StorageError::sqlite(format!("compress content: {e}")))?;
    conn.execute(
        "INSERT INTO file_contents (content_hash, content) VALUES (?1, ?2)
         ON CONFLICT(content_hash) DO NOTHING",
        params![content_hash, compressed],
    )
    .map_err(db_err)?;
    Ok(())
}

/// Fetch and decompress stored content.
pub fn get_content(conn: &Connection, content_hash: &str) -> Result<Option<Vec<u8>>, StorageError> {
    let blob: Option<Vec<u8>> = conn
        .prepare_cached("SELECT content FROM file_contents WHERE content_hash = ?1")
        .map_err(db_err)?
        .query_row(params![content_hash], |row| row.get(0))
        .optional()
        .map_err(db_err)?;
    match blob {
        Some(compressed) => zstd::decode_all(compressed.as_slice())
            .map(Some)
            .map_err(|e| StorageError::sqlite(format!("decompress content: {e}"))),
        None => Ok(None),
    }
}

/// Which of the given hashes are absent from storage.
pub fn missing_content_hashes(
    conn: &Connection,
    hashes: &[String],
) -> Result<Vec<String>, StorageError> {
    let mut stmt = conn
        .prepare_cached("SELECT 1 FROM file_contents WHERE content_hash = ?1")
        .map_err(db_err)?;
    let mut missing = Vec::new();
    for hash in hashes {
        let present = stmt
            .query_row(params![hash], |_| Ok(()))
            .optional()
            .map_err(db_err)?
            .is_some();
        if !present {
            missing.push(hash.clone());
        }
    }
    Ok(missing)
}

/// Insert-or-reuse a file row for (filepath, content_hash); returns its id.
pub fn get_or_insert_file(
    conn: &Connection,
    filepath: &str,
    content_hash: &str,
) -> Result<i64, StorageError> {
    conn.execute(
        "INSERT INTO files (filepath, content_hash) VALUES (?1, ?2)
         ON CONFLICT(filepath, content_hash) DO NOTHING",
        params![filepath, content_hash],
    )
    .map_err(db_err)?;
    find_file(conn, filepath, content_hash)?.map(|f| f.id).ok_or_else(|| {
        StorageError::sqlite(format!("file row vanished for {filepath}@{content_hash}"))
    })
}

/// Find a file row by exact (filepath, content_hash).
pub fn find_file(
    conn: &Connection,
    filepath: &str,
    content_hash: &str,
) -> Result<Option<FileRow>, StorageError> {
    conn.prepare_cached(
        "SELECT id, filepath, content_hash, remote_url, tracking_branch
         FROM files WHERE filepath = ?1 AND content_hash = ?2",
    )
    .map_err(db_err)?
    .query_row(params![filepath, content_hash], map_file_row)
    .optional()
    .map_err(db_err)
}

/// Find a file row by id.
pub fn find_file_by_id(conn: &Connection, id: i64) -> Result<Option<FileRow>, StorageError> {
    conn.prepare_cached(
        "SELECT id, filepath, content_hash, remote_url, tracking_branch
         FROM files WHERE id = ?1",
    )
    .map_err(db_err)?
    .query_row(params![id], map_file_row)
    .optional()
    .map_err(db_err)
}

/// File rows for a path whose blame tracking fields are still unset.
pub fn files_missing_blame(
    conn: &Connection,
    filepath: &str,
) -> Result<Vec<FileRow>, StorageError> {
    let mut stmt = conn
        .prepare_cached(
            "SELECT id, filepath, content_hash, remote_url, tracking_branch
             FROM files WHERE filepath = ?1 AND remote_url IS NULL",
        )
        .map_err(db_err)?;
    let rows = stmt.query_map(params![filepath], map_file_row).map_err(db_err)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(db_err)
}

/// Backfill blame tracking metadata onto a file row.
pub fn set_file_tracking(
    conn: &Connection,
    file_id: i64,
    remote_url: Option<&str>,
    tracking_branch: Option<&str>,
) -> Result<(), StorageError> {
    conn.execute(
        "UPDATE files SET remote_url = ?1, tracking_branch = ?2 WHERE id = ?3",
        params![remote_url, tracking_branch, file_id],
    )
    .map_err(db_err)?;
    Ok(())
}

/// Backfill compressed blame info onto a content row if still unset.
pub fn set_blame_info(
    conn: &Connection,
    content_hash: &str,
    blame_json: &[u8],
) -> Result<(), StorageError> {
    let compressed = zstd::encode_all(blame_json, CONTENT_COMPRESSION_LEVEL)
        .map_err(|e| StorageError::sqlite(format!("compress blame: {e}")))?;
    conn.execute(
        "UPDATE file_contents SET blame_info = ?1
         WHERE content_hash = ?2 AND blame_info IS NULL",
        params![compressed, content_hash],
    )
    .map_err(db_err)?;
    Ok(())
}

/// Fetch and decompress blame info for a content hash.
pub fn get_blame_info(
    conn: &Connection,
    content_hash: &str,
) -> Result<Option<Vec<u8>>, StorageError> {
    let blob: Option<Option<Vec<u8>>> = conn
        .prepare_cached("SELECT blame_info FROM file_contents WHERE content_hash = ?1")
        .map_err(db_err)?
        .query_row(params![content_hash], |row| row.get(0))
        .optional()
        .map_err(db_err)?;
    match blob.flatten() {
        Some(compressed) => zstd::decode_all(compressed.as_slice())
            .map(Some)
            .map_err(|e| StorageError::sqlite(format!("decompress blame: {e}"))),
        None => Ok(None),
    }
}

fn map_file_row(row: &rusqlite::Row) -> rusqlite::Result<FileRow> {
    Ok(FileRow {
        id: row.get(0)?,
        filepath: row.get(1)?,
        content_hash: row.get(2)?,
        remote_url: row.get(3)?,
        tracking_branch: row.get(4)?,
    })
}
