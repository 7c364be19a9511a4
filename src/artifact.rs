//! Reading and writing persisted JSON artifacts.
//!
//! Writes are atomic (temp file + rename) so an interrupted run never leaves a
//! truncated results file behind for the validator to choke on.

use crate::error::TriageError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use tracing::debug;

/// Pretty-print `value` to `path`, creating parent directories.
pub async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), TriageError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| TriageError::Internal(format!("JSON serialisation failed: {e}")))?;

    let write_err = |source: std::io::Error| TriageError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(write_err)?;
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(write_err(e));
    }

    debug!("Wrote {} ({} bytes)", path.display(), json.len());
    Ok(())
}

/// Parse the JSON file at `path`.
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, TriageError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| TriageError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
    serde_json::from_slice(&bytes).map_err(|e| TriageError::InvalidArtifact {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[tokio::test]
    async fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.json");
        write_json(&path, &json!({"total": 12})).await.unwrap();
        let back: Value = read_json(&path).await.unwrap();
        assert_eq!(back["total"], 12);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn failed_rename_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        // A non-empty directory at the target path makes the rename fail.
        let path = dir.path().join("report.json");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("keep"), "x").unwrap();

        let err = write_json(&path, &json!({"total": 1})).await.unwrap_err();
        assert!(matches!(err, TriageError::OutputWriteFailed { .. }));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn missing_file_is_read_failed() {
        let err = read_json::<Value>(Path::new("/no/such/results.json")).await.unwrap_err();
        assert!(matches!(err, TriageError::ReadFailed { .. }));
    }

    #[tokio::test]
    async fn non_json_is_invalid_artifact() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "not json").unwrap();
        let err = read_json::<Value>(file.path()).await.unwrap_err();
        assert!(matches!(err, TriageError::InvalidArtifact { .. }));
    }
}
