//! Per-category test dataset construction.

use super::annotation::{AnnotationRecord, load_annotations};
use super::renders;
use super::sample::{PoseSample, ShapeRef};
use crate::error::PoseError;
use crate::model::ShapeRepr;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

const IMAGE_DIR: &str = "Images";
const POINT_CLOUD_DIR: &str = "pointcloud";

/// Everything needed to build the test set of one category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetOptions {
    /// Dataset root, e.g. `data/Pascal3D`.
    pub root: PathBuf,
    /// Annotation file name relative to `root`.
    pub annotation_file: String,
    pub category: String,
    /// Category ids are object numbers, so `01`, `1` and `1.0` name the same object.
    #[serde(default)]
    pub numeric_category: bool,
    /// Keep only samples annotated with keypoint anchors.
    pub keypoint: bool,
    /// Shape representation of the model; `None` for image-only models.
    pub shape: Option<ShapeRepr>,
    pub num_render: usize,
    pub tour: usize,
    /// Pair each image with a random model of its category instead of its own.
    pub random_model: bool,
    pub render_dir: String,
    pub seed: u64,
}

impl DatasetOptions {
    fn annotation_path(&self) -> PathBuf {
        self.root.join(&self.annotation_file)
    }

    fn render_category_dir(&self) -> PathBuf {
        self.root.join(&self.render_dir).join(&self.category)
    }

    fn point_cloud_category_dir(&self) -> PathBuf {
        self.root.join(POINT_CLOUD_DIR).join(&self.category)
    }

    fn matches_category(&self, category: &str) -> bool {
        if self.numeric_category {
            if let (Ok(found), Ok(wanted)) = (
                category.trim().parse::<f64>(),
                self.category.trim().parse::<f64>(),
            ) {
                return found == wanted;
            }
        }
        category == self.category
    }

    /// Whether an annotation row is part of this category's test set.
    pub fn accepts(&self, record: &AnnotationRecord) -> bool {
        self.matches_category(&record.category)
            && record.is_test_split()
            && record.is_clean()
            && (!self.keypoint || record.has_keypoints)
    }
}

/// Test samples of one category.
#[derive(Debug, Clone)]
pub struct PoseDataset {
    pub category: String,
    pub samples: Vec<PoseSample>,
}

impl PoseDataset {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Load the annotation file and build the category's samples.
    pub async fn build(options: &DatasetOptions) -> Result<Self, PoseError> {
        let records = load_annotations(&options.annotation_path()).await?;
        Self::from_records(options, &records)
    }

    /// Build samples from already parsed annotation rows.
    pub fn from_records(
        options: &DatasetOptions,
        records: &[AnnotationRecord],
    ) -> Result<Self, PoseError> {
        let mut rng = StdRng::seed_from_u64(options.seed);
        let candidates = match (options.random_model, options.shape) {
            (true, Some(ShapeRepr::MultiView)) => {
                renders::list_render_models(&options.render_category_dir())
            }
            (true, Some(ShapeRepr::PointCloud)) => {
                renders::list_point_cloud_models(&options.point_cloud_category_dir())
            }
            _ => Vec::new(),
        };
        if options.random_model && options.shape.is_some() && candidates.is_empty() {
            return Err(PoseError::dataset(format!(
                "no reference models found for category '{}'",
                options.category
            )));
        }

        let image_dir = options.root.join(IMAGE_DIR);
        let mut samples = Vec::new();
        for record in records.iter().filter(|r| options.accepts(r)) {
            let mut sample = PoseSample::from_record(record, image_dir.join(&record.image));
            let model_id = match candidates.choose(&mut rng) {
                Some(random) => random.clone(),
                None => record.model_id.clone(),
            };
            sample.shape = match options.shape {
                None => ShapeRef::None,
                Some(ShapeRepr::MultiView) => {
                    let views =
                        renders::list_views(&options.render_category_dir().join(&model_id))?;
                    ShapeRef::Views(renders::select_views(
                        &views,
                        options.num_render,
                        options.tour,
                    )?)
                }
                Some(ShapeRepr::PointCloud) => ShapeRef::PointCloud(renders::point_cloud_path(
                    &options.point_cloud_category_dir(),
                    &model_id,
                )),
            };
            samples.push(sample);
        }

        debug!(
            category = %options.category,
            rows = records.len(),
            samples = samples.len(),
            "Built test dataset"
        );
        Ok(Self {
            category: options.category.clone(),
            samples,
        })
    }
}
