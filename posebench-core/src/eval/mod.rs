//! Per-category testing and the dataset-wide run.

pub mod category;
pub mod runner;

use crate::catalog::DatasetKind;
use crate::logbook::TestingLog;
use crate::model::ModelConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub use category::test_category;
pub use runner::{EvalOptions, EvalSummary, RunOutcome, run_evaluation};

/// Shared state for evaluating the categories of one dataset.
#[derive(Debug, Clone)]
pub struct EvalContext {
    pub dataset: DatasetKind,
    pub batch_size: usize,
    pub model: ModelConfig,
    pub predictions_dir: PathBuf,
    pub log: TestingLog,
}

/// Metrics of one evaluated category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryResult {
    pub category: String,
    pub samples: usize,
    /// Fraction of samples with rotation error <= 30 degrees.
    pub accuracy: f64,
    /// Median rotation error in degrees.
    pub median_error: f64,
}

/// One line of `predictions/prediction_<cat>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub image: PathBuf,
    pub model_id: String,
    /// `[azimuth, elevation, inplane]` in label space (degrees).
    pub label: [f64; 3],
    pub prediction: [f64; 3],
    pub error_deg: f64,
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-process model double and dataset fixtures.

    use crate::data::PoseSample;
    use crate::error::PoseError;
    use crate::model::{BinHead, Checkpoint, ModelConfig, PoseModel, RawPoseOutput};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Default)]
    pub struct Calls {
        pub loaded: bool,
        pub batches: Vec<usize>,
        pub shut_down: bool,
    }

    /// Predicts the ground truth, rotated in azimuth by a per-category offset.
    pub struct OracleModel {
        pub config: ModelConfig,
        pub azimuth_offset: HashMap<String, f64>,
        pub calls: Arc<Mutex<Calls>>,
    }

    impl OracleModel {
        pub fn new(config: ModelConfig) -> (Self, Arc<Mutex<Calls>>) {
            let calls = Arc::new(Mutex::new(Calls::default()));
            let model = Self {
                config,
                azimuth_offset: HashMap::new(),
                calls: Arc::clone(&calls),
            };
            (model, calls)
        }

        pub fn with_offset(mut self, category: &str, degrees: f64) -> Self {
            self.azimuth_offset.insert(category.to_string(), degrees);
            self
        }
    }

    /// Encode `angle` so that bin decoding recovers it.
    pub fn encode(angle: f64, classes: usize, bin_size: f64) -> BinHead {
        let scaled = angle.rem_euclid(classes as f64 * bin_size) / bin_size;
        let bin = (scaled.floor() as usize).min(classes - 1);
        let frac = (scaled - bin as f64).clamp(1e-9, 1.0 - 1e-9);
        let mut logits = vec![0.0f32; classes];
        let mut deltas = vec![0.0f32; classes];
        logits[bin] = 10.0;
        deltas[bin] = (2.0 * (frac - 0.5)).atanh() as f32;
        BinHead { logits, deltas }
    }

    #[async_trait]
    impl PoseModel for OracleModel {
        fn name(&self) -> &str {
            "oracle"
        }

        async fn load(&mut self, _checkpoint: &Checkpoint) -> Result<(), PoseError> {
            self.calls.lock().unwrap().loaded = true;
            Ok(())
        }

        async fn predict(
            &mut self,
            samples: &[PoseSample],
        ) -> Result<Vec<RawPoseOutput>, PoseError> {
            self.calls.lock().unwrap().batches.push(samples.len());
            let bin = self.config.bin_size();
            Ok(samples
                .iter()
                .map(|s| {
                    let offset = self.azimuth_offset.get(&s.category).copied().unwrap_or(0.0);
                    RawPoseOutput {
                        azimuth: encode(s.label.azimuth + offset, self.config.azi_classes, bin),
                        elevation: encode(s.label.elevation, self.config.ele_classes, bin),
                        inplane: encode(s.label.inplane, self.config.inp_classes, bin),
                    }
                })
                .collect())
        }

        async fn shutdown(&mut self) -> Result<(), PoseError> {
            self.calls.lock().unwrap().shut_down = true;
            Ok(())
        }
    }

    pub const PASCAL_HEADER: &str = "im_path,cat,cad_index,truncated,occluded,difficult,azimuth,elevation,inplane_rotation,left,upper,right,lower,has_keypoints,set";

    /// Write an annotation file with `(category, azimuth)` rows.
    pub fn write_annotations(path: &Path, rows: &[(&str, f64)]) {
        let mut content = format!("{PASCAL_HEADER}\n");
        for (idx, (cat, azimuth)) in rows.iter().enumerate() {
            content.push_str(&format!(
                "{cat}/{idx:04}.jpg,{cat},01,0,0,0,{azimuth},10,-5,0,0,64,64,1,val\n"
            ));
        }
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }
}
