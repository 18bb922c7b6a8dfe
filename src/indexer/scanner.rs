// File enumeration and change detection

use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use walkdir::WalkDir;

use crate::store::FileMeta;

/// Directory names never descended into, wherever they appear in the tree
static SKIP_DIRS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        ".git",
        ".impactgraph",
        ".venv",
        "venv",
        "__pycache__",
        ".mypy_cache",
        ".pytest_cache",
        ".ruff_cache",
        "node_modules",
        "dist",
        "build",
        "target",
    ]
    .into_iter()
    .collect()
});

/// Enumerate indexable Python files under `root`, sorted by path so
/// downstream processing order is stable across runs.
pub fn enumerate_files(root: &Path, extra_excludes: &[String]) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| {
            // Depth 0 is the project root itself; only directories below
            // it are subject to the skip set.
            if entry.depth() == 0 || !entry.file_type().is_dir() {
                return true;
            }
            let name = entry.file_name().to_string_lossy();
            !SKIP_DIRS.contains(name.as_ref()) && !extra_excludes.iter().any(|e| e == name.as_ref())
        })
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry.file_type().is_file()
                && entry.path().extension().map_or(false, |ext| ext == "py")
        })
        .map(|entry| entry.into_path())
        .collect();

    files.sort();
    files
}

/// Project-relative POSIX-normalized path, the unique key for all fact rows
pub fn relative_posix(path: &Path, root: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

/// Hex content hash over raw file bytes
pub fn hash_bytes(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Filesystem modification time in seconds since the epoch
pub fn mtime_seconds(path: &Path) -> std::io::Result<f64> {
    let modified = std::fs::metadata(path)?.modified()?;
    Ok(modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0))
}

/// Decide whether a file needs re-parsing.
///
/// True when the file is new, its hash or mtime differs (exact match on
/// both; a touched file with identical bytes still re-parses), or the last
/// attempt recorded a parse error. Failed files are always retried so a
/// fixed syntax error is never cached as "unchanged".
pub fn should_reparse(previous: Option<&FileMeta>, content_hash: &str, mtime: f64) -> bool {
    match previous {
        None => true,
        Some(meta) => {
            meta.content_hash != content_hash
                || meta.mtime != mtime
                || meta.parse_error.as_deref().is_some_and(|e| !e.is_empty())
        }
    }
}
