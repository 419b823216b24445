//! Test samples and pose labels.

use super::annotation::{AnnotationRecord, BoundingBox};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Elevation is shifted into `[0, 180)` so it can be binned like the other angles.
pub const ELEVATION_OFFSET: f64 = 90.0;
/// In-plane rotation is shifted into `[0, 360)`.
pub const INPLANE_OFFSET: f64 = 180.0;

/// Ground-truth or predicted viewpoint in label space (degrees).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseLabel {
    pub azimuth: f64,
    pub elevation: f64,
    pub inplane: f64,
}

impl PoseLabel {
    pub fn new(azimuth: f64, elevation: f64, inplane: f64) -> Self {
        Self {
            azimuth,
            elevation,
            inplane,
        }
    }

    /// Map annotated angles into label space.
    pub fn from_annotation(azimuth: f64, elevation: f64, inplane: f64) -> Self {
        Self {
            azimuth: azimuth.rem_euclid(360.0),
            elevation: elevation + ELEVATION_OFFSET,
            inplane: (inplane + INPLANE_OFFSET).rem_euclid(360.0),
        }
    }

    /// Angles with the label offsets removed, in radians.
    pub fn to_radians(&self) -> [f64; 3] {
        [
            self.azimuth.to_radians(),
            (self.elevation - ELEVATION_OFFSET).to_radians(),
            (self.inplane - INPLANE_OFFSET).to_radians(),
        ]
    }

    pub fn as_array(&self) -> [f64; 3] {
        [self.azimuth, self.elevation, self.inplane]
    }
}

/// Shape information handed to shape-conditioned models.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "paths", rename_all = "snake_case")]
pub enum ShapeRef {
    None,
    Views(Vec<PathBuf>),
    PointCloud(PathBuf),
}

/// A single test sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseSample {
    pub image: PathBuf,
    pub bbox: BoundingBox,
    pub category: String,
    pub model_id: String,
    pub label: PoseLabel,
    pub shape: ShapeRef,
}

impl PoseSample {
    /// Build a sample from an annotation row. The shape reference is filled in later.
    pub fn from_record(record: &AnnotationRecord, image: PathBuf) -> Self {
        Self {
            image,
            bbox: record.bbox,
            category: record.category.clone(),
            model_id: record.model_id.clone(),
            label: PoseLabel::from_annotation(record.azimuth, record.elevation, record.inplane),
            shape: ShapeRef::None,
        }
    }
}
