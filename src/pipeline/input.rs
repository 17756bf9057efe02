//! Input discovery: list the candidate documents of a run.
//!
//! The scan is deliberately flat. Sub-folders are ignored so a user can park
//! already-screened or excluded papers in `papers/done/` without them being
//! picked up again.

use crate::error::ScreenerError;
use std::path::{Path, PathBuf};
use tracing::debug;

/// List every regular file in `dir` whose extension matches `extension`
/// (case-insensitive, without the dot), sorted by path.
///
/// Returns an empty list when nothing matches; that is not an error.
pub fn discover_documents(dir: &Path, extension: &str) -> Result<Vec<PathBuf>, ScreenerError> {
    let entries = std::fs::read_dir(dir).map_err(|e| ScreenerError::InputDirRead {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let mut docs: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && has_extension(path, extension))
        .collect();
    docs.sort();

    debug!("Discovered {} document(s) in {}", docs.len(), dir.display());
    Ok(docs)
}

/// Check whether `path` ends in `.extension`, ignoring ASCII case.
pub fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(extension.trim_start_matches('.')))
}

/// File name used as the report key. Falls back to the full path for names
/// that are not valid UTF-8.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
