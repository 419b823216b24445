//! Annotation tables, reference shapes and per-category test sets.

pub mod annotation;
pub mod dataset;
pub mod renders;
pub mod sample;

pub use annotation::{AnnotationRecord, BoundingBox};
pub use dataset::{DatasetOptions, PoseDataset};
pub use sample::{PoseLabel, PoseSample, ShapeRef};
