//! Directory scans over remittance, acknowledgment and reconciliation files.

use crate::error::{BatchError, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// Returns the files directly under `dir` whose name ends with `.{suffix}`,
/// sorted by name.
///
/// A marked file (`x.remise.DONE`) no longer ends with the suffix, so the
/// same filter excludes it.
pub fn scan_suffix(dir: &Path, suffix: &str) -> Result<Vec<PathBuf>> {
    let wanted = format!(".{}", suffix);
    let entries = fs::read_dir(dir).map_err(|e| BatchError::fs(dir, e))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| BatchError::fs(dir, e))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|n| n.to_str())
            && name.ends_with(&wanted)
        {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Path a file takes once marked as processed.
pub fn marked_path(path: &Path, marker: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(marker);
    path.with_file_name(name)
}

/// Renames `path` to its marked name, replacing any file already there.
pub fn mark_done(path: &Path, marker: &str) -> Result<PathBuf> {
    let target = marked_path(path, marker);
    fs::rename(path, &target).map_err(|e| BatchError::fs(path, e))?;
    Ok(target)
}

/// A remittance file still waiting for ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingRemittance {
    pub file_name: String,
    pub path: PathBuf,
    pub size: u64,
    pub modified_unix_secs: u64,
    /// Second to last period-separated segment of the name, when present.
    pub timestamp: Option<String>,
}

/// Lists the remittance files awaiting ingestion, newest name first.
pub fn list_pending_remittances(dir: &Path, suffix: &str) -> Result<Vec<PendingRemittance>> {
    let mut pending = Vec::new();
    for path in scan_suffix(dir, suffix)? {
        let metadata = fs::metadata(&path).map_err(|e| BatchError::fs(&path, e))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let parts: Vec<&str> = file_name.split('.').collect();
        let timestamp = (parts.len() >= 2).then(|| parts[parts.len() - 2].to_string());
        let modified_unix_secs = metadata
            .modified()
            .ok()
            .and_then(|m| m.duration_since(UNIX_EPOCH).ok())
            .map_or(0, |d| d.as_secs());

        pending.push(PendingRemittance {
            timestamp,
            size: metadata.len(),
            modified_unix_secs,
            path,
            file_name,
        });
    }
    pending.sort_by(|a, b| b.file_name.cmp(&a.file_name));
    Ok(pending)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_scan_excludes_marked_and_other_suffixes() {
        let dir = tempdir().unwrap();
        for name in ["b.remise", "a.remise", "c.remise.DONE", "notes.txt"] {
            fs::write(dir.path().join(name), "x").unwrap();
        }
        fs::create_dir(dir.path().join("nested.remise")).unwrap();

        let found = scan_suffix(dir.path(), "remise").unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a.remise", "b.remise"]);
    }

    #[test]
    fn test_scan_missing_directory_is_filesystem_error() {
        let dir = tempdir().unwrap();
        let result = scan_suffix(&dir.path().join("absent"), "remise");
        assert!(matches!(result, Err(BatchError::Filesystem { .. })));
    }

    #[test]
    fn test_mark_done_appends_marker() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.remise");
        fs::write(&file, "x").unwrap();

        let marked = mark_done(&file, "DONE").unwrap();
        assert_eq!(marked, dir.path().join("a.remise.DONE"));
        assert!(!file.exists());
        assert!(marked.exists());
    }

    #[test]
    fn test_list_pending_extracts_timestamp() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("bank12.20250101.remise"), "abc").unwrap();
        fs::write(dir.path().join("plain.remise"), "a").unwrap();
        fs::write(dir.path().join("old.remise.DONE"), "a").unwrap();

        let pending = list_pending_remittances(dir.path(), "remise").unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].file_name, "plain.remise");
        assert_eq!(pending[0].timestamp.as_deref(), Some("plain"));
        assert_eq!(pending[1].timestamp.as_deref(), Some("20250101"));
        assert_eq!(pending[1].size, 3);
    }
}
