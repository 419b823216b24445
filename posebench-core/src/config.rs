//! Configuration system for posebench.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! explicit config file -> environment. CLI flags are applied on top by the binary.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level posebench configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PosebenchConfig {
    /// Dataset location settings.
    #[serde(default)]
    pub data: DataConfig,
    /// Model backend selection.
    #[serde(default)]
    pub backend: BackendConfig,
    /// External predictor process used by the script backend.
    #[serde(default)]
    pub predictor: PredictorConfig,
}

/// Dataset location settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Directory holding one sub-directory per dataset (`data/Pascal3D`, ...).
    #[serde(default = "default_data_root")]
    pub data_root: PathBuf,
    /// Directory name of the rendered reference views inside a dataset root.
    #[serde(default = "default_render_dir")]
    pub render_dir: String,
    /// Seed for drawing random reference models.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_root: default_data_root(),
            render_dir: default_render_dir(),
            seed: default_seed(),
        }
    }
}

fn default_data_root() -> PathBuf {
    PathBuf::from("data")
}

fn default_render_dir() -> String {
    "Renders_semi_sphere".to_string()
}

fn default_seed() -> u64 {
    42
}

/// Which model backend runs the checkpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// ONNX for `.onnx` checkpoints when available, the script backend otherwise.
    #[default]
    Auto,
    Script,
    Onnx,
}

/// Model backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub kind: BackendKind,
    /// Intra-op threads for the ONNX backend (0 = runtime default).
    #[serde(default)]
    pub intra_threads: usize,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::Auto,
            intra_threads: 0,
        }
    }
}

/// External predictor process configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictorConfig {
    /// Program to spawn.
    #[serde(default = "default_program")]
    pub program: String,
    /// Arguments passed to the program.
    #[serde(default = "default_args")]
    pub args: Vec<String>,
    /// Working directory of the predictor (inherits ours if not set).
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// Timeout for a single request/response exchange (seconds).
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
            working_dir: None,
            timeout_secs: default_timeout(),
        }
    }
}

fn default_program() -> String {
    "python3".to_string()
}

fn default_args() -> Vec<String> {
    vec!["-m".to_string(), "pose_predictor".to_string()]
}

fn default_timeout() -> u64 {
    300
}

/// Path of the user-level config file (`~/.config/posebench/config.toml`).
pub fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "posebench", "posebench")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with `POSEBENCH_`, `__` for nesting)
/// 2. Explicit config file
/// 3. User config
/// 4. Built-in defaults
pub fn load_config(explicit: Option<&Path>) -> Result<PosebenchConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(PosebenchConfig::default()));

    if let Some(user_config) = user_config_path() {
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(path) = explicit {
        figment = figment.merge(Toml::file(path));
    }

    // POSEBENCH_DATA__DATA_ROOT, POSEBENCH_PREDICTOR__PROGRAM, ...
    figment = figment.merge(Env::prefixed("POSEBENCH_").split("__"));

    figment.extract().map_err(Box::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PosebenchConfig::default();
        assert_eq!(config.data.data_root, PathBuf::from("data"));
        assert_eq!(config.data.render_dir, "Renders_semi_sphere");
        assert_eq!(config.backend.kind, BackendKind::Auto);
        assert_eq!(config.predictor.program, "python3");
        assert_eq!(config.predictor.timeout_secs, 300);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let parsed: PosebenchConfig = toml::from_str(
            r#"
            [data]
            data_root = "/datasets"

            [backend]
            kind = "script"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.data.data_root, PathBuf::from("/datasets"));
        assert_eq!(parsed.data.render_dir, "Renders_semi_sphere");
        assert_eq!(parsed.backend.kind, BackendKind::Script);
        assert_eq!(parsed.predictor.args, vec!["-m", "pose_predictor"]);
    }

    #[test]
    fn test_load_config_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("posebench.toml");
        std::fs::write(
            &path,
            "[predictor]\nprogram = \"/opt/venv/bin/python\"\ntimeout_secs = 30\n",
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.predictor.program, "/opt/venv/bin/python");
        assert_eq!(config.predictor.timeout_secs, 30);
        assert_eq!(config.data.seed, 42);
    }
}
