//! Checkpoint discovery and fingerprinting.

use crate::error::PoseError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Checkpoint formats recognised by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointFormat {
    Onnx,
    SafeTensors,
    PyTorch,
    Unknown,
}

/// Detect the checkpoint format from the file extension.
pub fn detect_format(path: &Path) -> CheckpointFormat {
    match path.extension().and_then(|e| e.to_str()) {
        Some("onnx") => CheckpointFormat::Onnx,
        Some("safetensors") => CheckpointFormat::SafeTensors,
        Some("pt" | "pth" | "bin" | "tar") => CheckpointFormat::PyTorch,
        _ => CheckpointFormat::Unknown,
    }
}

/// A model checkpoint on disk. The weights themselves stay opaque.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub path: PathBuf,
    pub format: CheckpointFormat,
    pub size_bytes: u64,
    pub sha256: String,
}

impl Checkpoint {
    /// Locate a checkpoint file. Fails if `path` is not an existing regular file.
    pub async fn open(path: &Path) -> Result<Self, PoseError> {
        if !tokio::fs::metadata(path)
            .await
            .is_ok_and(|meta| meta.is_file())
        {
            return Err(PoseError::CheckpointNotFound(path.to_path_buf()));
        }

        let owned = path.to_path_buf();
        let (size_bytes, sha256) = tokio::task::spawn_blocking(move || hash_file(&owned))
            .await
            .map_err(|e| PoseError::model(format!("checkpoint hashing task failed: {e}")))??;

        Ok(Self {
            path: path.to_path_buf(),
            format: detect_format(path),
            size_bytes,
            sha256,
        })
    }

    /// Directory that receives the evaluation outputs (the checkpoint's directory).
    pub fn result_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// First 12 hex characters of the digest.
    pub fn short_digest(&self) -> &str {
        &self.sha256[..self.sha256.len().min(12)]
    }
}

fn hash_file(path: &Path) -> Result<(u64, String), PoseError> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let size = std::io::copy(&mut file, &mut hasher)?;
    Ok((size, format!("{:x}", hasher.finalize())))
}
