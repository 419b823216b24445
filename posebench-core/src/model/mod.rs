//! Pose estimator backends and their raw outputs.
//!
//! The network itself is external. A backend takes a checkpoint, receives batches of
//! [`PoseSample`]s and returns per-bin classification logits and regression deltas
//! for azimuth, elevation and in-plane rotation.

pub mod checkpoint;
#[cfg(feature = "onnx")]
pub mod onnx;
#[cfg(feature = "onnx")]
pub mod preprocess;
pub mod script;

use crate::config::{BackendConfig, BackendKind, PredictorConfig};
use crate::data::PoseSample;
use crate::error::PoseError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use checkpoint::{Checkpoint, CheckpointFormat};
pub use script::ScriptModel;

/// How the object's 3D shape is presented to the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShapeRepr {
    MultiView,
    PointCloud,
}

impl FromStr for ShapeRepr {
    type Err = PoseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "multiview" | "multi_view" => Ok(ShapeRepr::MultiView),
            "pointcloud" | "point_cloud" => Ok(ShapeRepr::PointCloud),
            other => Err(PoseError::invalid_input(format!(
                "unknown shape representation '{other}' (expected MultiView or PointCloud)"
            ))),
        }
    }
}

impl fmt::Display for ShapeRepr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShapeRepr::MultiView => f.write_str("MultiView"),
            ShapeRepr::PointCloud => f.write_str("PointCloud"),
        }
    }
}

/// Estimator hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Shape representation; `None` selects the image-only baseline.
    pub shape: Option<ShapeRepr>,
    pub img_feature_dim: usize,
    pub shape_feature_dim: usize,
    pub azi_classes: usize,
    pub ele_classes: usize,
    pub inp_classes: usize,
    /// Rendered views per sample for multi-view models.
    pub num_render: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            shape: None,
            img_feature_dim: 1024,
            shape_feature_dim: 256,
            azi_classes: 24,
            ele_classes: 12,
            inp_classes: 24,
            num_render: 12,
        }
    }
}

impl ModelConfig {
    /// Angular width of one bin in degrees. All three angles share it.
    pub fn bin_size(&self) -> f64 {
        360.0 / self.azi_classes as f64
    }

    pub fn is_baseline(&self) -> bool {
        self.shape.is_none()
    }

    pub fn validate(&self) -> Result<(), PoseError> {
        if self.azi_classes == 0 || self.ele_classes == 0 || self.inp_classes == 0 {
            return Err(PoseError::invalid_input(
                "angle class counts must be positive",
            ));
        }
        if self.shape == Some(ShapeRepr::MultiView) && self.num_render == 0 {
            return Err(PoseError::invalid_input(
                "multi-view models need at least one rendered view",
            ));
        }
        Ok(())
    }
}

/// Classification logits and per-bin regression deltas for one angle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinHead {
    pub logits: Vec<f32>,
    pub deltas: Vec<f32>,
}

/// Raw network output for one sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPoseOutput {
    pub azimuth: BinHead,
    pub elevation: BinHead,
    pub inplane: BinHead,
}

/// A pose estimator backend.
#[async_trait]
pub trait PoseModel: Send {
    fn name(&self) -> &str;

    /// Load weights. Called once before the first prediction.
    async fn load(&mut self, checkpoint: &Checkpoint) -> Result<(), PoseError>;

    /// Run the network on a batch. Returns one output per sample, in order.
    async fn predict(&mut self, samples: &[PoseSample]) -> Result<Vec<RawPoseOutput>, PoseError>;

    /// Release backend resources.
    async fn shutdown(&mut self) -> Result<(), PoseError> {
        Ok(())
    }
}

/// Check that a backend returned well-formed outputs for a batch.
pub fn validate_outputs(
    config: &ModelConfig,
    batch_len: usize,
    outputs: &[RawPoseOutput],
) -> Result<(), PoseError> {
    if outputs.len() != batch_len {
        return Err(PoseError::model(format!(
            "expected {batch_len} outputs, got {}",
            outputs.len()
        )));
    }
    let heads = [
        ("azimuth", config.azi_classes),
        ("elevation", config.ele_classes),
        ("inplane", config.inp_classes),
    ];
    for (idx, output) in outputs.iter().enumerate() {
        for ((name, classes), head) in heads
            .iter()
            .zip([&output.azimuth, &output.elevation, &output.inplane])
        {
            if head.logits.len() != *classes || head.deltas.len() != *classes {
                return Err(PoseError::model(format!(
                    "sample {idx}: {name} head has {} logits and {} deltas, expected {classes}",
                    head.logits.len(),
                    head.deltas.len()
                )));
            }
        }
    }
    Ok(())
}

/// Decide which backend runs a checkpoint.
pub fn resolve_backend(
    kind: BackendKind,
    format: CheckpointFormat,
) -> Result<BackendKind, PoseError> {
    match kind {
        BackendKind::Auto if format == CheckpointFormat::Onnx && cfg!(feature = "onnx") => {
            Ok(BackendKind::Onnx)
        }
        BackendKind::Auto => Ok(BackendKind::Script),
        BackendKind::Onnx if !cfg!(feature = "onnx") => Err(PoseError::Config(
            "ONNX backend not available. Compile with the `onnx` feature to enable.".to_string(),
        )),
        other => Ok(other),
    }
}

/// Construct the backend for a checkpoint. The model is not loaded yet.
pub fn build_model(
    config: &ModelConfig,
    backend: &BackendConfig,
    predictor: &PredictorConfig,
    checkpoint: &Checkpoint,
    workers: usize,
) -> Result<Box<dyn PoseModel>, PoseError> {
    config.validate()?;
    match resolve_backend(backend.kind, checkpoint.format)? {
        #[cfg(feature = "onnx")]
        BackendKind::Onnx => Ok(Box::new(onnx::OnnxPoseModel::new(
            config.clone(),
            backend.intra_threads,
            workers,
        )?)),
        _ => Ok(Box::new(ScriptModel::new(
            config.clone(),
            predictor.clone(),
            workers,
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn head(classes: usize) -> BinHead {
        BinHead {
            logits: vec![0.0; classes],
            deltas: vec![0.0; classes],
        }
    }

    fn output(config: &ModelConfig) -> RawPoseOutput {
        RawPoseOutput {
            azimuth: head(config.azi_classes),
            elevation: head(config.ele_classes),
            inplane: head(config.inp_classes),
        }
    }

    #[test]
    fn test_shape_repr_parse() {
        assert_eq!(
            "MultiView".parse::<ShapeRepr>().unwrap(),
            ShapeRepr::MultiView
        );
        assert_eq!(
            "pointcloud".parse::<ShapeRepr>().unwrap(),
            ShapeRepr::PointCloud
        );
        assert!("voxels".parse::<ShapeRepr>().is_err());
    }

    #[test]
    fn test_default_bin_size() {
        let config = ModelConfig::default();
        assert_eq!(config.bin_size(), 15.0);
        assert!(config.is_baseline());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_classes() {
        let config = ModelConfig {
            ele_classes: 0,
            ..ModelConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_outputs_count() {
        let config = ModelConfig::default();
        let outputs = vec![output(&config)];
        assert!(validate_outputs(&config, 1, &outputs).is_ok());
        assert!(validate_outputs(&config, 2, &outputs).is_err());
    }

    #[test]
    fn test_validate_outputs_head_width() {
        let config = ModelConfig::default();
        let mut bad = output(&config);
        bad.elevation.deltas.pop();
        let err = validate_outputs(&config, 1, &[bad]).unwrap_err();
        assert!(err.to_string().contains("elevation"));
    }

    #[test]
    fn test_resolve_backend() {
        assert_eq!(
            resolve_backend(BackendKind::Script, CheckpointFormat::Onnx).unwrap(),
            BackendKind::Script
        );
        assert_eq!(
            resolve_backend(BackendKind::Auto, CheckpointFormat::PyTorch).unwrap(),
            BackendKind::Script
        );
        let auto_onnx = resolve_backend(BackendKind::Auto, CheckpointFormat::Onnx).unwrap();
        if cfg!(feature = "onnx") {
            assert_eq!(auto_onnx, BackendKind::Onnx);
            assert!(resolve_backend(BackendKind::Onnx, CheckpointFormat::Onnx).is_ok());
        } else {
            assert_eq!(auto_onnx, BackendKind::Script);
            assert!(resolve_backend(BackendKind::Onnx, CheckpointFormat::Onnx).is_err());
        }
    }
}
