//! # posebench-core
//!
//! Evaluation of shape-conditioned object pose estimators on Pascal3D+,
//! ObjectNet3D, LineMod and Pix3D.
//!
//! A run loads a trained checkpoint through a [`model::PoseModel`] backend, builds the
//! test set of every category of a dataset, decodes the binned azimuth, elevation and
//! in-plane predictions and reports the median rotation error and the accuracy at
//! pi/6 per category and on average.

pub mod catalog;
pub mod config;
pub mod data;
pub mod error;
pub mod eval;
pub mod logbook;
pub mod metrics;
pub mod model;
pub mod persistence;

// Re-exports
pub use catalog::DatasetKind;
pub use config::{PosebenchConfig, load_config};
pub use error::PoseError;
pub use eval::{CategoryResult, EvalOptions, EvalSummary, RunOutcome, run_evaluation};
pub use model::{Checkpoint, ModelConfig, PoseModel, ShapeRepr, build_model};
