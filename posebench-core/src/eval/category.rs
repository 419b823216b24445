//! Evaluation of a single category.

use super::{CategoryResult, EvalContext, PredictionRecord};
use crate::data::PoseDataset;
use crate::error::PoseError;
use crate::metrics::{self, ACCURACY_THRESHOLD_DEG};
use crate::model::{PoseModel, validate_outputs};
use crate::persistence::write_artifact;
use tracing::{debug, info, warn};

/// File that receives the per-sample predictions of a category.
pub fn prediction_file_name(category: &str) -> String {
    format!("prediction_{category}.json")
}

/// Run the model over one category and record its metrics.
///
/// Writes `predictions/prediction_<cat>.json`, appends the category block to the
/// testing log and returns the result. Returns `Ok(None)` when the category has
/// no test samples.
pub async fn test_category(
    ctx: &EvalContext,
    dataset: &PoseDataset,
    model: &mut dyn PoseModel,
) -> Result<Option<CategoryResult>, PoseError> {
    if dataset.is_empty() {
        warn!(category = %dataset.category, dataset = %ctx.dataset, "No test samples, skipping category");
        return Ok(None);
    }

    let bin_size = ctx.model.bin_size();
    let mut records = Vec::with_capacity(dataset.len());
    for (batch_idx, batch) in dataset.samples.chunks(ctx.batch_size.max(1)).enumerate() {
        let outputs = model.predict(batch).await?;
        validate_outputs(&ctx.model, batch.len(), &outputs)?;
        for (sample, output) in batch.iter().zip(&outputs) {
            let prediction = metrics::decode_pose(output, bin_size);
            records.push(PredictionRecord {
                image: sample.image.clone(),
                model_id: sample.model_id.clone(),
                label: sample.label.as_array(),
                prediction: prediction.as_array(),
                error_deg: metrics::rotation_error(&prediction, &sample.label),
            });
        }
        debug!(category = %dataset.category, batch = batch_idx, done = records.len(), "Evaluated batch");
    }

    let errors: Vec<f64> = records.iter().map(|r| r.error_deg).collect();
    let accuracy = metrics::accuracy(&errors, ACCURACY_THRESHOLD_DEG)
        .ok_or_else(|| PoseError::evaluation("no errors to aggregate"))?;
    let median_error = metrics::median(&errors)
        .ok_or_else(|| PoseError::evaluation("no errors to aggregate"))?;

    write_artifact(
        &ctx.predictions_dir.join(prediction_file_name(&dataset.category)),
        &records,
    )
    .await?;
    ctx.log
        .category(
            dataset.len(),
            &dataset.category,
            ctx.dataset.name(),
            median_error,
            accuracy,
        )
        .await?;

    info!(
        category = %dataset.category,
        samples = dataset.len(),
        median_error,
        accuracy,
        "Category evaluated"
    );
    Ok(Some(CategoryResult {
        category: dataset.category.clone(),
        samples: dataset.len(),
        accuracy,
        median_error,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::DatasetKind;
    use crate::data::{PoseLabel, PoseSample};
    use crate::eval::testing::OracleModel;
    use crate::logbook::TestingLog;
    use crate::model::ModelConfig;
    use pretty_assertions::assert_eq;

    fn samples(category: &str, azimuths: &[f64]) -> PoseDataset {
        let samples = azimuths
            .iter()
            .enumerate()
            .map(|(idx, azimuth)| PoseSample {
                image: format!("{category}/{idx}.jpg").into(),
                bbox: crate::data::BoundingBox {
                    left: 0.0,
                    upper: 0.0,
                    right: 32.0,
                    lower: 32.0,
                },
                category: category.to_string(),
                model_id: "01".to_string(),
                label: PoseLabel::new(*azimuth, 100.0, 175.0),
                shape: crate::data::ShapeRef::None,
            })
            .collect();
        PoseDataset {
            category: category.to_string(),
            samples,
        }
    }

    async fn context(dir: &std::path::Path, batch_size: usize) -> EvalContext {
        EvalContext {
            dataset: DatasetKind::Pascal3D,
            batch_size,
            model: ModelConfig::default(),
            predictions_dir: dir.join("predictions"),
            log: TestingLog::create(dir).await.unwrap(),
        }
    }

    #[tokio::test]
    async fn test_empty_category_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), 4).await;
        let (mut model, calls) = OracleModel::new(ctx.model.clone());

        let result = test_category(&ctx, &samples("boat", &[]), &mut model)
            .await
            .unwrap();
        assert!(result.is_none());
        assert!(calls.lock().unwrap().batches.is_empty());
        assert!(!ctx.predictions_dir.join(prediction_file_name("boat")).exists());
        assert_eq!(std::fs::read_to_string(ctx.log.path()).unwrap(), "\n");
    }

    #[tokio::test]
    async fn test_mixed_errors() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), 3).await;
        let (model, calls) = OracleModel::new(ctx.model.clone());
        let mut model = model.with_offset("chair", 20.0);

        let dataset = samples("chair", &[0.0, 45.0, 90.0, 135.0, 180.0]);
        let result = test_category(&ctx, &dataset, &mut model)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result.category, "chair");
        assert_eq!(result.samples, 5);
        assert_eq!(result.accuracy, 1.0);
        assert!((result.median_error - 20.0).abs() < 1e-3);
        assert_eq!(calls.lock().unwrap().batches, vec![3, 2]);

        let log = std::fs::read_to_string(ctx.log.path()).unwrap();
        assert_eq!(
            log,
            "\ntest accuracy for 5 images of category chair in dataset Pascal3D \n\
             Med_Err is 20.00, and Acc_pi/6 is 1.00 \n \n"
        );

        let written = std::fs::read_to_string(ctx.predictions_dir.join("prediction_chair.json"))
            .unwrap();
        let records: Vec<PredictionRecord> = serde_json::from_str(&written).unwrap();
        assert_eq!(records.len(), 5);
        assert_eq!(records[4].image, std::path::PathBuf::from("chair/4.jpg"));
        assert!((records[4].prediction[0] - 200.0).abs() < 1e-3);
    }

    #[tokio::test]
    async fn test_malformed_outputs_fail() {
        struct Truncating;

        #[async_trait::async_trait]
        impl PoseModel for Truncating {
            fn name(&self) -> &str {
                "truncating"
            }

            async fn load(
                &mut self,
                _checkpoint: &crate::model::Checkpoint,
            ) -> Result<(), PoseError> {
                Ok(())
            }

            async fn predict(
                &mut self,
                _samples: &[crate::data::PoseSample],
            ) -> Result<Vec<crate::model::RawPoseOutput>, PoseError> {
                Ok(Vec::new())
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), 8).await;
        let err = test_category(&ctx, &samples("sofa", &[10.0]), &mut Truncating)
            .await
            .unwrap_err();
        assert!(matches!(err, PoseError::Model(_)));
    }
}
