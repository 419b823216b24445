//! Evaluation artefacts on disk.
//!
//! Prediction files and `results.json` are written next to a temporary sibling and
//! renamed into place, so an interrupted run never leaves a truncated JSON file.

use crate::error::PoseError;
use serde::Serialize;
use std::path::{Path, PathBuf};
use uuid::Uuid;

fn staging_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{name}.{}.part", Uuid::new_v4().simple()))
}

/// Write `value` as pretty JSON to `target`, replacing any previous artefact.
pub async fn write_artifact<T>(target: &Path, value: &T) -> Result<(), PoseError>
where
    T: Serialize + ?Sized,
{
    let body = serde_json::to_vec_pretty(value)?;
    if let Some(dir) = target.parent().filter(|d| !d.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir).await?;
    }
    let staging = staging_path(target);
    if let Err(e) = tokio::fs::write(&staging, &body).await {
        let _ = tokio::fs::remove_file(&staging).await;
        return Err(e.into());
    }
    tokio::fs::rename(&staging, target).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn leftovers(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.ends_with(".part"))
            .collect()
    }

    #[tokio::test]
    async fn test_write_artifact_creates_prediction_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("predictions").join("prediction_car.json");
        write_artifact(&path, &[1.5, 2.5]).await.unwrap();

        let read: Vec<f64> = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(read, vec![1.5, 2.5]);
        assert!(leftovers(&dir.path().join("predictions")).is_empty());
    }

    #[tokio::test]
    async fn test_write_artifact_replaces_previous_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        std::fs::write(&path, "{\"stale\": true").unwrap();

        write_artifact(&path, &serde_json::json!({ "mean_accuracy": 0.5 }))
            .await
            .unwrap();
        let read: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(read["mean_accuracy"], 0.5);
        assert!(leftovers(dir.path()).is_empty());
    }

    #[test]
    fn test_staging_path_is_hidden_sibling() {
        let staging = staging_path(Path::new("runs/exp/results.json"));
        assert_eq!(staging.parent(), Some(Path::new("runs/exp")));
        let name = staging.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(".results.json."));
        assert!(name.ends_with(".part"));
    }
}
