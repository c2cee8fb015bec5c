//! Hash-gated atomic writer.
//!
//! ## `atomic_write` protocol
//!
//! 1. SHA-256 hash the new content (already substituted by the caller).
//! 2. Hash whatever is currently on disk at the destination.
//! 3. Equal → skip; the file and its mtime are left alone.
//! 4. Write to `<path>.filesync.tmp`.
//! 5. Rename to the final path (atomic on POSIX).

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{io_err, SyncError};

/// Outcome of an individual file write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOutcome {
    /// File was written (content changed or did not previously exist).
    Written,
    /// File was skipped - identical content already on disk.
    Unchanged,
    /// `--dry-run` mode: the file *would* have been written.
    WouldWrite,
}

/// Hex SHA-256 digest of `content`.
pub fn digest(content: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(content);
    hex::encode(h.finalize())
}

fn existing_digest(path: &Path) -> Result<Option<String>, SyncError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(digest(&bytes))),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(io_err(path, err)),
    }
}

/// Atomically write `content` to `path` unless identical bytes are already
/// there.
pub fn atomic_write(path: &Path, content: &[u8], dry_run: bool) -> Result<WriteOutcome, SyncError> {
    let tmp = PathBuf::from(format!("{}.filesync.tmp", path.display()));
    atomic_write_with_tmp(path, content, dry_run, &tmp)
}

fn atomic_write_with_tmp(
    path: &Path,
    content: &[u8],
    dry_run: bool,
    tmp: &Path,
) -> Result<WriteOutcome, SyncError> {
    if existing_digest(path)?.as_deref() == Some(digest(content).as_str()) {
        tracing::debug!("unchanged: {}", path.display());
        return Ok(WriteOutcome::Unchanged);
    }

    if dry_run {
        tracing::info!("[dry-run] would write: {}", path.display());
        return Ok(WriteOutcome::WouldWrite);
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    if let Some(tmp_parent) = tmp.parent() {
        std::fs::create_dir_all(tmp_parent).map_err(|e| io_err(tmp_parent, e))?;
    }
    std::fs::write(tmp, content).map_err(|e| io_err(tmp, e))?;

    if let Err(e) = std::fs::rename(tmp, path) {
        let _ = std::fs::remove_file(tmp);
        return Err(io_err(path, e));
    }

    tracing::info!("wrote: {}", path.display());
    Ok(WriteOutcome::Written)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
