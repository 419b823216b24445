//! posebench CLI: evaluate a trained pose estimator on a benchmark dataset.

use anyhow::Context;
use clap::Parser;
use posebench_core::config::PosebenchConfig;
use posebench_core::{EvalOptions, ModelConfig, RunOutcome, ShapeRepr, build_model};
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Evaluate a pose estimation checkpoint on Pascal3D, ObjectNet3D, LineMod or Pix3D
#[derive(Parser, Debug)]
#[command(name = "posebench", version, about, long_about = None)]
struct Cli {
    /// Input batch size
    #[arg(long, default_value_t = 16)]
    batch_size: usize,

    /// Number of data loading workers
    #[arg(long, default_value_t = 2)]
    workers: usize,

    /// Shape representation: MultiView or PointCloud (image-only baseline if omitted)
    #[arg(long)]
    shape: Option<ShapeRepr>,

    /// Checkpoint to evaluate; results are written next to it
    #[arg(long)]
    model: PathBuf,

    /// Feature dimension for images
    #[arg(long, default_value_t = 1024)]
    img_feature_dim: usize,

    /// Feature dimension for shapes
    #[arg(long, default_value_t = 256)]
    shape_feature_dim: usize,

    /// Number of azimuth classes
    #[arg(long, default_value_t = 24)]
    azi_classes: usize,

    /// Number of elevation classes
    #[arg(long, default_value_t = 12)]
    ele_classes: usize,

    /// Number of in-plane rotation classes
    #[arg(long, default_value_t = 24)]
    inp_classes: usize,

    /// Testing dataset
    #[arg(long, default_value = "")]
    dataset: String,

    /// Test on categories unseen during training
    #[arg(long)]
    novel: bool,

    /// Only use samples annotated with keypoint anchors
    #[arg(long)]
    keypoint: bool,

    /// Number of rendered views used for each sample
    #[arg(long, default_value_t = 12)]
    num_render: usize,

    /// Elevation tours for the reference views
    #[arg(long, default_value_t = 2)]
    tour: usize,

    /// Pair each image with a random model of its category
    #[arg(long)]
    random_model: bool,

    /// Directory of rendered views under each dataset root
    #[arg(long)]
    render_dir: Option<String>,

    /// Directory holding the datasets
    #[arg(long)]
    data_root: Option<PathBuf>,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the run summary as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    fn model_config(&self) -> ModelConfig {
        ModelConfig {
            shape: self.shape,
            img_feature_dim: self.img_feature_dim,
            shape_feature_dim: self.shape_feature_dim,
            azi_classes: self.azi_classes,
            ele_classes: self.ele_classes,
            inp_classes: self.inp_classes,
            num_render: self.num_render,
        }
    }

    fn eval_options(&self) -> EvalOptions {
        EvalOptions {
            batch_size: self.batch_size,
            workers: self.workers,
            model: self.model_config(),
            checkpoint: self.model.clone(),
            dataset: self.dataset.clone(),
            novel: self.novel,
            keypoint: self.keypoint,
            tour: self.tour,
            random_model: self.random_model,
        }
    }

    fn apply_overrides(&self, config: &mut PosebenchConfig) {
        if let Some(root) = &self.data_root {
            config.data.data_root = root.clone();
        }
        if let Some(render_dir) = &self.render_dir {
            config.data.render_dir = render_dir.clone();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let log_dir = directories::ProjectDirs::from("dev", "posebench", "posebench")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "posebench.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let mut config = posebench_core::load_config(cli.config.as_deref())
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    cli.apply_overrides(&mut config);

    let options = cli.eval_options();
    let outcome = posebench_core::run_evaluation(&options, &config.data, |checkpoint| {
        build_model(
            &options.model,
            &config.backend,
            &config.predictor,
            checkpoint,
            options.workers,
        )
    })
    .await
    .with_context(|| format!("evaluation of {} failed", options.checkpoint.display()))?;

    match outcome {
        RunOutcome::UnknownDataset(_) => Ok(()),
        RunOutcome::Completed(summary) => {
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else if !cli.quiet {
                for result in &summary.categories {
                    println!(
                        "{:<16} {:>6} images  Med_Err {:>7.2}  Acc_pi/6 {:.2}",
                        result.category, result.samples, result.median_error, result.accuracy
                    );
                }
                if let (Some(med), Some(acc)) = (summary.mean_median_error, summary.mean_accuracy)
                {
                    println!(
                        "{:<16} {:>6}         Med_Err {:>7.2}  Acc_pi/6 {:.2}",
                        "average", "", med, acc
                    );
                }
            }
            Ok(())
        }
    }
}
