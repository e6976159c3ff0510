//! Filesystem helpers shared by the state, cache and status modules.
//!
//! Every persisted document in the agent goes through [`atomic_write_json`]
//! so readers only ever observe a complete file or no file at all.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::fs;

use crate::errors::StateError;

/// Serialize `value` and replace `path` atomically via a `.tmp` sibling.
pub async fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StateError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }
    let tmp = tmp_sibling(path);
    let body = serde_json::to_vec_pretty(value)?;
    fs::write(&tmp, &body).await?;
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

/// `<path>.tmp`, keeping the original extension in front of the suffix.
pub fn tmp_sibling(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".tmp");
    PathBuf::from(os)
}

/// Lower-cased extension of a path, without the dot.
pub fn extension_lower(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Best-effort absolute normalization for path comparison.
///
/// Uses `canonicalize` when the file exists so symlinked cache dirs compare
/// equal, and falls back to the lexical path otherwise.
pub fn normalize_for_compare(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn atomic_write_creates_parent_and_final_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("state/doc.json");

        atomic_write_json(&target, &json!({"version": 1}))
            .await
            .unwrap();

        assert!(target.exists());
        assert!(!tmp_sibling(&target).exists());
        let body = std::fs::read_to_string(&target).unwrap();
        assert!(body.contains("\"version\""));
    }

    #[test]
    fn tmp_sibling_appends_suffix() {
        assert_eq!(
            tmp_sibling(Path::new("/a/b/cache_index.json")),
            PathBuf::from("/a/b/cache_index.json.tmp")
        );
    }
}
