//! ONNX Runtime backend (optional, `onnx` feature).
//!
//! Runs an exported estimator graph in-process. Inputs are `image` `[B,3,224,224]`
//! and, for multi-view models, `renders` `[B,V,3,224,224]`. The graph returns
//! `{azimuth,elevation,inplane}_cls` logits and `{azimuth,elevation,inplane}_reg`
//! deltas, each `[B, classes]`.

use super::preprocess::{self, INPUT_SIZE};
use super::{
    BinHead, Checkpoint, ModelConfig, PoseModel, RawPoseOutput, ShapeRepr, validate_outputs,
};
use crate::data::{PoseSample, ShapeRef};
use crate::error::PoseError;
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt, stream};
use ort::session::Session;
use ort::value::Tensor;
use tracing::{debug, info};

const HEADS: [&str; 3] = ["azimuth", "elevation", "inplane"];

/// Preprocessed inputs of one sample.
struct SampleTensors {
    image: Vec<f32>,
    views: Vec<f32>,
}

/// Pose model executed with ONNX Runtime.
pub struct OnnxPoseModel {
    config: ModelConfig,
    intra_threads: usize,
    workers: usize,
    session: Option<Session>,
}

impl OnnxPoseModel {
    pub fn new(config: ModelConfig, intra_threads: usize, workers: usize) -> Result<Self, PoseError> {
        if config.shape == Some(ShapeRepr::PointCloud) {
            return Err(PoseError::model(
                "the ONNX backend does not support point-cloud models",
            ));
        }
        Ok(Self {
            config,
            intra_threads,
            workers: workers.max(1),
            session: None,
        })
    }

    fn load_sample(sample: PoseSample, num_views: usize) -> Result<SampleTensors, PoseError> {
        let image = preprocess::load_object(&sample.image, &sample.bbox)?;
        let mut views = Vec::new();
        if num_views > 0 {
            let ShapeRef::Views(paths) = &sample.shape else {
                return Err(PoseError::model(format!(
                    "{}: multi-view model needs rendered views",
                    sample.image.display()
                )));
            };
            if paths.len() != num_views {
                return Err(PoseError::model(format!(
                    "{}: expected {num_views} views, found {}",
                    sample.image.display(),
                    paths.len()
                )));
            }
            views.reserve(num_views * preprocess::tensor_len());
            for path in paths {
                views.extend(preprocess::load_view(path)?);
            }
        }
        Ok(SampleTensors { image, views })
    }

    /// Decode and normalise a batch on `workers` blocking tasks, keeping order.
    async fn load_batch(&self, samples: &[PoseSample]) -> Result<Vec<SampleTensors>, PoseError> {
        let num_views = match self.config.shape {
            Some(ShapeRepr::MultiView) => self.config.num_render,
            _ => 0,
        };
        stream::iter(samples.iter().cloned())
            .map(|sample| async move {
                tokio::task::spawn_blocking(move || Self::load_sample(sample, num_views))
                    .await
                    .map_err(|e| PoseError::model(format!("preprocessing task failed: {e}")))?
            })
            .buffered(self.workers)
            .try_collect()
            .await
    }
}

fn onnx_err(context: &str) -> impl Fn(ort::Error) -> PoseError + '_ {
    move |e| PoseError::model(format!("{context}: {e}"))
}

#[async_trait]
impl PoseModel for OnnxPoseModel {
    fn name(&self) -> &str {
        "onnx"
    }

    async fn load(&mut self, checkpoint: &Checkpoint) -> Result<(), PoseError> {
        let mut builder = Session::builder()
            .map_err(|e| PoseError::model(format!("session builder: {e}")))?;
        if self.intra_threads > 0 {
            builder = builder
                .with_intra_threads(self.intra_threads)
                .map_err(|e| PoseError::model(format!("intra threads: {e}")))?;
        }
        let session = builder
            .commit_from_file(&checkpoint.path)
            .map_err(|e| PoseError::model(format!("loading {}: {e}", checkpoint.path.display())))?;
        debug!(
            inputs = ?session.inputs.iter().map(|i| &i.name).collect::<Vec<_>>(),
            "Loaded ONNX graph"
        );
        info!(checkpoint = %checkpoint.path.display(), "ONNX session ready");
        self.session = Some(session);
        Ok(())
    }

    async fn predict(&mut self, samples: &[PoseSample]) -> Result<Vec<RawPoseOutput>, PoseError> {
        if samples.is_empty() {
            return Ok(Vec::new());
        }
        let tensors = self.load_batch(samples).await?;
        let batch = samples.len();
        let side = INPUT_SIZE as usize;

        let image_data: Vec<f32> = tensors.iter().flat_map(|t| t.image.iter().copied()).collect();
        let image = Tensor::from_array((vec![batch, 3, side, side], image_data))
            .map_err(onnx_err("image tensor"))?;

        let session = self
            .session
            .as_mut()
            .ok_or_else(|| PoseError::model("ONNX session not loaded"))?;

        let outputs = if self.config.shape == Some(ShapeRepr::MultiView) {
            let views_data: Vec<f32> =
                tensors.iter().flat_map(|t| t.views.iter().copied()).collect();
            let renders = Tensor::from_array((
                vec![batch, self.config.num_render, 3, side, side],
                views_data,
            ))
            .map_err(onnx_err("renders tensor"))?;
            session
                .run(ort::inputs!["image" => image, "renders" => renders])
                .map_err(onnx_err("inference"))?
        } else {
            session
                .run(ort::inputs!["image" => image])
                .map_err(onnx_err("inference"))?
        };

        let classes = [
            self.config.azi_classes,
            self.config.ele_classes,
            self.config.inp_classes,
        ];
        let mut heads: Vec<(Vec<f32>, Vec<f32>)> = Vec::with_capacity(3);
        for (name, width) in HEADS.iter().zip(classes) {
            let (_, cls) = outputs[format!("{name}_cls").as_str()]
                .try_extract_tensor::<f32>()
                .map_err(onnx_err("classification output"))?;
            let (_, reg) = outputs[format!("{name}_reg").as_str()]
                .try_extract_tensor::<f32>()
                .map_err(onnx_err("regression output"))?;
            if cls.len() != batch * width || reg.len() != batch * width {
                return Err(PoseError::model(format!(
                    "{name} outputs have {} / {} values, expected {}",
                    cls.len(),
                    reg.len(),
                    batch * width
                )));
            }
            heads.push((cls.to_vec(), reg.to_vec()));
        }
        drop(outputs);

        let head_at = |h: usize, row: usize| {
            let width = classes[h];
            let (cls, reg) = &heads[h];
            BinHead {
                logits: cls[row * width..(row + 1) * width].to_vec(),
                deltas: reg[row * width..(row + 1) * width].to_vec(),
            }
        };
        let results: Vec<RawPoseOutput> = (0..batch)
            .map(|row| RawPoseOutput {
                azimuth: head_at(0, row),
                elevation: head_at(1, row),
                inplane: head_at(2, row),
            })
            .collect();
        validate_outputs(&self.config, batch, &results)?;
        Ok(results)
    }

    async fn shutdown(&mut self) -> Result<(), PoseError> {
        self.session = None;
        Ok(())
    }
}
