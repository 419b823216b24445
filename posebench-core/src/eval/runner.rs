//! Dataset-wide evaluation run.

use super::{CategoryResult, EvalContext, test_category};
use crate::catalog::DatasetKind;
use crate::config::DataConfig;
use crate::data::{DatasetOptions, PoseDataset};
use crate::error::PoseError;
use crate::logbook::TestingLog;
use crate::metrics;
use crate::model::{Checkpoint, ModelConfig, PoseModel};
use crate::persistence::write_artifact;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const PREDICTIONS_DIR: &str = "predictions";
pub const RESULTS_FILE: &str = "results.json";

/// Options of one evaluation run, as given on the command line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalOptions {
    pub batch_size: usize,
    /// Data loading workers.
    pub workers: usize,
    pub model: ModelConfig,
    pub checkpoint: PathBuf,
    pub dataset: String,
    /// Evaluating categories unseen during training. Recorded in the results.
    pub novel: bool,
    pub keypoint: bool,
    /// Elevation rings used when picking reference views.
    pub tour: usize,
    pub random_model: bool,
}

impl EvalOptions {
    /// Dataset construction options for one category.
    pub fn dataset_options(
        &self,
        kind: DatasetKind,
        category: &str,
        data: &DataConfig,
    ) -> DatasetOptions {
        DatasetOptions {
            root: kind.root_dir(&data.data_root),
            annotation_file: kind.annotation_file(category),
            category: category.to_string(),
            numeric_category: kind.numeric_categories(),
            keypoint: self.keypoint || kind.requires_keypoints(),
            shape: self.model.shape,
            num_render: self.model.num_render,
            tour: self.tour,
            random_model: self.random_model,
            render_dir: data.render_dir.clone(),
            seed: data.seed,
        }
    }
}

/// Machine-readable record of a completed run, written to `results.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalSummary {
    pub run_id: Uuid,
    pub finished_at: DateTime<Utc>,
    pub dataset: DatasetKind,
    pub backend: String,
    pub checkpoint: PathBuf,
    pub checkpoint_sha256: String,
    pub options: EvalOptions,
    /// Evaluated categories in dispatch order.
    pub categories: Vec<CategoryResult>,
    /// Categories without test samples.
    pub skipped: Vec<String>,
    pub mean_accuracy: Option<f64>,
    pub mean_median_error: Option<f64>,
}

impl EvalSummary {
    pub fn accuracies(&self) -> BTreeMap<String, f64> {
        self.categories
            .iter()
            .map(|c| (c.category.clone(), c.accuracy))
            .collect()
    }

    pub fn median_errors(&self) -> BTreeMap<String, f64> {
        self.categories
            .iter()
            .map(|c| (c.category.clone(), c.median_error))
            .collect()
    }
}

/// How a run ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// The dataset name is not one of the supported benchmarks; nothing was evaluated.
    UnknownDataset(String),
    Completed(Box<EvalSummary>),
}

/// Evaluate a checkpoint on every category of the requested dataset.
///
/// The checkpoint must exist before anything else happens. `build_model`
/// constructs the backend; its weights are loaded only once the dataset is known.
pub async fn run_evaluation<F>(
    options: &EvalOptions,
    data: &DataConfig,
    build_model: F,
) -> Result<RunOutcome, PoseError>
where
    F: FnOnce(&Checkpoint) -> Result<Box<dyn PoseModel>, PoseError>,
{
    options.model.validate()?;
    let checkpoint = Checkpoint::open(&options.checkpoint).await?;
    info!(
        checkpoint = %checkpoint.path.display(),
        format = ?checkpoint.format,
        sha256 = checkpoint.short_digest(),
        size_bytes = checkpoint.size_bytes,
        "Checkpoint found"
    );
    let mut model = build_model(&checkpoint)?;

    let result_dir = checkpoint.result_dir();
    let predictions_dir = result_dir.join(PREDICTIONS_DIR);
    tokio::fs::create_dir_all(&predictions_dir).await?;
    let log = TestingLog::create(&result_dir).await?;

    let Some(kind) = DatasetKind::parse(&options.dataset) else {
        debug!(dataset = %options.dataset, "Unrecognized dataset, nothing to evaluate");
        return Ok(RunOutcome::UnknownDataset(options.dataset.clone()));
    };

    model.load(&checkpoint).await?;
    let ctx = EvalContext {
        dataset: kind,
        batch_size: options.batch_size,
        model: options.model.clone(),
        predictions_dir,
        log,
    };

    let evaluated = evaluate_categories(&ctx, options, data, model.as_mut()).await;
    let shutdown = model.shutdown().await;
    let (categories, skipped) = evaluated?;
    shutdown?;

    let mean_accuracy = metrics::mean(categories.iter().map(|c| c.accuracy));
    let mean_median_error = metrics::mean(categories.iter().map(|c| c.median_error));
    match (mean_median_error, mean_accuracy) {
        (Some(med), Some(acc)) => {
            ctx.log.average(med, acc).await?;
            info!(
                dataset = %kind,
                categories = categories.len(),
                median_error = med,
                accuracy = acc,
                "Average for all categories"
            );
        }
        _ => warn!(dataset = %kind, "No category had test samples, no average written"),
    }

    let summary = EvalSummary {
        run_id: Uuid::new_v4(),
        finished_at: Utc::now(),
        dataset: kind,
        backend: model.name().to_string(),
        checkpoint: checkpoint.path.clone(),
        checkpoint_sha256: checkpoint.sha256.clone(),
        options: options.clone(),
        categories,
        skipped,
        mean_accuracy,
        mean_median_error,
    };
    write_artifact(&result_dir.join(RESULTS_FILE), &summary).await?;
    Ok(RunOutcome::Completed(Box::new(summary)))
}

async fn evaluate_categories(
    ctx: &EvalContext,
    options: &EvalOptions,
    data: &DataConfig,
    model: &mut dyn PoseModel,
) -> Result<(Vec<CategoryResult>, Vec<String>), PoseError> {
    let mut results = Vec::new();
    let mut skipped = Vec::new();
    for category in ctx.dataset.categories() {
        let dataset_options = options.dataset_options(ctx.dataset, category, data);
        let dataset = PoseDataset::build(&dataset_options).await?;
        match test_category(ctx, &dataset, model).await? {
            Some(result) => results.push(result),
            None => skipped.push(category.to_string()),
        }
    }
    Ok((results, skipped))
}
