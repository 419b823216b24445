//! The plain-text testing log written next to the checkpoint.

use crate::error::PoseError;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

pub const LOG_FILE_NAME: &str = "testing_log.txt";

/// Append-only handle on `testing_log.txt`.
#[derive(Debug, Clone)]
pub struct TestingLog {
    path: PathBuf,
}

impl TestingLog {
    /// Start a fresh log in `dir`, truncating any previous run.
    pub async fn create(dir: &Path) -> Result<Self, PoseError> {
        let path = dir.join(LOG_FILE_NAME);
        tokio::fs::write(&path, b"\n").await?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append(&self, text: &str) -> Result<(), PoseError> {
        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(text.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    pub async fn category(
        &self,
        samples: usize,
        category: &str,
        dataset: &str,
        median_error: f64,
        accuracy: f64,
    ) -> Result<(), PoseError> {
        self.append(&format_category(
            samples,
            category,
            dataset,
            median_error,
            accuracy,
        ))
        .await
    }

    pub async fn average(&self, median_error: f64, accuracy: f64) -> Result<(), PoseError> {
        self.append(&format_average(median_error, accuracy)).await
    }
}

pub fn format_category(
    samples: usize,
    category: &str,
    dataset: &str,
    median_error: f64,
    accuracy: f64,
) -> String {
    format!(
        "test accuracy for {samples} images of category {category} in dataset {dataset} \n\
         Med_Err is {median_error:.2}, and Acc_pi/6 is {accuracy:.2} \n \n"
    )
}

pub fn format_average(median_error: f64, accuracy: f64) -> String {
    format!(
        "Average for all categories  >>>>  Med_Err is {median_error:.2}, and Acc_pi/6 is {accuracy:.2} \n"
    )
}
