//! Filesystem utilities for placing artifacts.
//!
//! Every write that produces a final artifact goes through a temp name in the
//! destination directory followed by a rename, so a failed copy never leaves a
//! half-written target behind.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use walkdir::WalkDir;

use crate::error::PackagingError;

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Sibling temp path for `dst`, unique within this process.
pub fn tmp_sibling(dst: &Path) -> PathBuf {
    let n = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let seq = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let name = dst
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string());
    dst.with_file_name(format!(".{name}.tmp-{}-{n}-{seq}", std::process::id()))
}

/// Copy `src` to `dst`, replacing any existing file, via temp + rename.
pub fn atomic_copy(src: &Path, dst: &Path) -> Result<()> {
    ensure_parent(dst)?;
    let tmp = tmp_sibling(dst);
    if let Err(err) = fs::copy(src, &tmp) {
        let _ = fs::remove_file(&tmp);
        return Err(PackagingError::io("copy", src, err))
            .with_context(|| format!("copying into '{}'", dst.display()));
    }
    rename_into_place(&tmp, dst)
}

/// Write `bytes` to `path` via temp + rename.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    ensure_parent(path)?;
    let tmp = tmp_sibling(path);
    if let Err(err) = fs::write(&tmp, bytes) {
        let _ = fs::remove_file(&tmp);
        return Err(PackagingError::io("write", path, err).into());
    }
    rename_into_place(&tmp, path)
}

/// Atomically move a file by renaming, with fallback to copy+delete.
///
/// The fallback copies into a sibling temp name first, so the destination is
/// never observed half-written even across filesystems.
pub fn atomic_move(src: &Path, dst: &Path) -> Result<()> {
    ensure_parent(dst)?;
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(_) => {
            // Different filesystem
            atomic_copy(src, dst)?;
            fs::remove_file(src)
                .map_err(|err| PackagingError::io("remove", src, err))?;
            Ok(())
        }
    }
}

fn rename_into_place(tmp: &Path, dst: &Path) -> Result<()> {
    if let Err(err) = fs::rename(tmp, dst) {
        let _ = fs::remove_file(tmp);
        return Err(PackagingError::io("rename", dst, err).into());
    }
    Ok(())
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| PackagingError::io("create directory", parent, err))?;
    }
    Ok(())
}

/// Remove a file or directory tree if present.
pub fn remove_path(path: &Path) -> Result<()> {
    if path.is_dir() && !path.is_symlink() {
        fs::remove_dir_all(path)
            .with_context(|| format!("removing directory '{}'", path.display()))?;
    } else if path.exists() || path.is_symlink() {
        fs::remove_file(path).with_context(|| format!("removing '{}'", path.display()))?;
    }
    Ok(())
}

pub fn sha256_file(path: &Path) -> Result<String> {
    let f = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut r = BufReader::new(f);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = r.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Digest of a file, or of a directory tree (relative paths and contents in
/// sorted order). Two trees with the same files and bytes hash the same.
pub fn sha256_path(path: &Path) -> Result<String> {
    if !path.is_dir() {
        return sha256_file(path);
    }
    let mut hasher = Sha256::new();
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry.with_context(|| format!("walking '{}'", path.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(path).unwrap_or(entry.path());
        hasher.update(rel.to_string_lossy().as_bytes());
        hasher.update([0u8]);
        hasher.update(sha256_file(entry.path())?.as_bytes());
    }
    Ok(format!("{:x}", hasher.finalize()))
}
