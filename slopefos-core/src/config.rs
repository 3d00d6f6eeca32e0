//! Configuration system for slopefos.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> CLI args.
//! Configuration is loaded from `~/.config/slopefos/config.toml` and/or `.slopefos/config.toml`
//! in the workspace directory.

use crate::error::{ConfigError, CoreError};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Top-level configuration for the training pipeline and prediction service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Input spreadsheet configuration.
    #[serde(default)]
    pub data: DataConfig,
    /// Train/test partition configuration.
    #[serde(default)]
    pub split: SplitConfig,
    /// Model roster and promotion policy.
    #[serde(default)]
    pub training: TrainingConfig,
    /// Where trained artifacts are written and read.
    #[serde(default)]
    pub artifacts: ArtifactConfig,
    /// HTTP prediction service configuration.
    #[serde(default)]
    pub server: ServerConfig,
}

impl AppConfig {
    /// Check the configuration for values the pipeline cannot run with.
    ///
    /// Returns a list of human-readable problems; empty means valid.
    /// Roster hyperparameters are not checked here: a bad roster entry is a
    /// per-model fit failure, not a configuration error.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let fraction = self.split.test_fraction;
        if !(fraction > 0.0 && fraction < 1.0) {
            problems.push(format!(
                "split.test_fraction must be in (0, 1), got {fraction}"
            ));
        }
        match &self.training.selection {
            SelectionPolicy::Fixed { models } if models.is_empty() => {
                problems.push("training.selection.models must name at least one model".into());
            }
            SelectionPolicy::Ranked { count: 0 } => {
                problems.push("training.selection.count must be at least 1".into());
            }
            _ => {}
        }
        if self.server.port == 0 {
            problems.push("server.port must be non-zero".into());
        }
        if self.server.host.trim().is_empty() {
            problems.push("server.host must not be empty".into());
        }
        problems
    }
}

/// Input spreadsheet configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Path to the CSV export of the source spreadsheet.
    #[serde(default = "default_data_path")]
    pub path: PathBuf,
    /// Include the pore-pressure ratio (Ru) as a model feature.
    #[serde(default = "default_true")]
    pub include_ru: bool,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            path: default_data_path(),
            include_ru: true,
        }
    }
}

fn default_data_path() -> PathBuf {
    PathBuf::from("data/Overall Data.csv")
}

fn default_true() -> bool {
    true
}

/// Train/test partition configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitConfig {
    /// Fraction of rows held out for testing.
    #[serde(default = "default_test_fraction")]
    pub test_fraction: f64,
    /// Seed for the row permutation.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_fraction: default_test_fraction(),
            seed: default_seed(),
        }
    }
}

fn default_test_fraction() -> f64 {
    0.2
}

fn default_seed() -> u64 {
    42
}

/// Artifact storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactConfig {
    /// Directory holding the latest trained artifact set.
    #[serde(default = "default_artifact_dir")]
    pub dir: PathBuf,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            dir: default_artifact_dir(),
        }
    }
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from("models")
}

/// HTTP prediction service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Allow cross-origin requests from any origin.
    #[serde(default = "default_true")]
    pub cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors: true,
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

// ---------------------------------------------------------------------------
// Model roster
// ---------------------------------------------------------------------------

/// Identifier of a roster model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ModelId {
    #[serde(rename = "svm")]
    Svm,
    #[serde(rename = "random_forest")]
    RandomForest,
    #[serde(rename = "xgboost")]
    XgBoost,
    #[serde(rename = "lightgbm")]
    LightGbm,
    #[serde(rename = "gradient_boosting")]
    GradientBoosting,
    #[serde(rename = "ann")]
    Ann,
}

impl ModelId {
    /// Every roster model, in training order.
    pub const ALL: [ModelId; 6] = [
        ModelId::Svm,
        ModelId::RandomForest,
        ModelId::XgBoost,
        ModelId::LightGbm,
        ModelId::GradientBoosting,
        ModelId::Ann,
    ];

    /// Human-readable model name, as shown in leaderboards.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Svm => "SVM",
            Self::RandomForest => "Random Forest",
            Self::XgBoost => "XGBoost",
            Self::LightGbm => "LightGBM",
            Self::GradientBoosting => "Gradient Boosting",
            Self::Ann => "ANN",
        }
    }

    /// Normalized identifier used in file names and API payloads.
    pub fn slug(&self) -> &'static str {
        match self {
            Self::Svm => "svm",
            Self::RandomForest => "random_forest",
            Self::XgBoost => "xgboost",
            Self::LightGbm => "lightgbm",
            Self::GradientBoosting => "gradient_boosting",
            Self::Ann => "ann",
        }
    }

    /// Parse a slug or display name.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|id| id.slug() == value || id.display_name().eq_ignore_ascii_case(value))
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Which trained models are promoted to held-out testing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Always promote the named models, whatever their training rank.
    Fixed { models: Vec<ModelId> },
    /// Promote the top `count` models of the training leaderboard.
    Ranked { count: usize },
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self::Fixed {
            models: vec![ModelId::GradientBoosting, ModelId::XgBoost],
        }
    }
}

impl fmt::Display for SelectionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed { models } => {
                let names: Vec<&str> = models.iter().map(|m| m.display_name()).collect();
                write!(f, "fixed [{}]", names.join(", "))
            }
            Self::Ranked { count } => write!(f, "ranked top-{count}"),
        }
    }
}

/// Training configuration: promotion policy plus per-model hyperparameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingConfig {
    #[serde(default)]
    pub selection: SelectionPolicy,
    #[serde(default)]
    pub roster: RosterConfig,
}

/// Hyperparameter records for the six roster models.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RosterConfig {
    #[serde(default)]
    pub svm: SvmParams,
    #[serde(default)]
    pub random_forest: ForestParams,
    #[serde(default)]
    pub xgboost: XgbParams,
    #[serde(default)]
    pub lightgbm: LgbmParams,
    #[serde(default)]
    pub gradient_boosting: GbParams,
    #[serde(default)]
    pub ann: MlpParams,
}

/// Epsilon-SVR with an RBF kernel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SvmParams {
    pub c: f64,
    pub epsilon: f64,
    /// RBF width; `None` means "scale": `1 / (n_features * Var(X))`.
    pub gamma: Option<f64>,
    /// SMO stopping tolerance.
    pub tol: f64,
    pub shrinking: bool,
}

impl Default for SvmParams {
    fn default() -> Self {
        Self {
            c: 100.0,
            epsilon: 0.1,
            gamma: None,
            tol: 1e-3,
            shrinking: true,
        }
    }
}

/// Bagged regression trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub bootstrap: bool,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 200,
            max_depth: Some(15),
            min_samples_split: 2,
            min_samples_leaf: 1,
            bootstrap: true,
            seed: 42,
        }
    }
}

/// Second-order boosted trees grown depth-wise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct XgbParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    pub subsample: f64,
    pub colsample_bytree: f64,
    pub min_child_weight: f64,
    pub gamma: f64,
    pub reg_alpha: f64,
    pub reg_lambda: f64,
    pub seed: u64,
}

impl Default for XgbParams {
    fn default() -> Self {
        Self {
            n_estimators: 300,
            max_depth: 6,
            learning_rate: 0.05,
            subsample: 0.8,
            colsample_bytree: 0.8,
            min_child_weight: 3.0,
            gamma: 0.1,
            reg_alpha: 0.1,
            reg_lambda: 1.0,
            seed: 42,
        }
    }
}

/// Second-order boosted trees grown leaf-wise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LgbmParams {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub num_leaves: usize,
    pub learning_rate: f64,
    pub min_child_samples: usize,
    pub min_child_weight: f64,
    pub reg_lambda: f64,
    pub subsample: f64,
    pub colsample_bytree: f64,
    pub seed: u64,
}

impl Default for LgbmParams {
    fn default() -> Self {
        Self {
            n_estimators: 200,
            max_depth: Some(10),
            num_leaves: 31,
            learning_rate: 0.1,
            min_child_samples: 20,
            min_child_weight: 1e-3,
            reg_lambda: 0.0,
            subsample: 1.0,
            colsample_bytree: 1.0,
            seed: 42,
        }
    }
}

/// How many features a split may consider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    All,
    Sqrt,
    Count(usize),
}

impl MaxFeatures {
    /// Resolve against the number of available features (at least 1).
    pub fn resolve(&self, n_features: usize) -> usize {
        let k = match self {
            Self::All => n_features,
            Self::Sqrt => (n_features as f64).sqrt().floor() as usize,
            Self::Count(k) => *k,
        };
        k.clamp(1, n_features.max(1))
    }
}

/// Least-squares gradient boosting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GbParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    pub subsample: f64,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    pub seed: u64,
}

impl Default for GbParams {
    fn default() -> Self {
        Self {
            n_estimators: 300,
            max_depth: 5,
            learning_rate: 0.05,
            subsample: 0.8,
            min_samples_split: 5,
            min_samples_leaf: 3,
            max_features: MaxFeatures::Sqrt,
            seed: 42,
        }
    }
}

/// Feed-forward network trained with Adam.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MlpParams {
    pub hidden_layers: Vec<usize>,
    pub learning_rate: f64,
    pub alpha: f64,
    pub batch_size: usize,
    pub max_iter: usize,
    pub early_stopping: bool,
    pub validation_fraction: f64,
    pub n_iter_no_change: usize,
    pub tol: f64,
    pub seed: u64,
}

impl Default for MlpParams {
    fn default() -> Self {
        Self {
            hidden_layers: vec![100, 50, 25],
            learning_rate: 1e-3,
            alpha: 1e-4,
            batch_size: 200,
            max_iter: 1000,
            early_stopping: true,
            validation_fraction: 0.1,
            n_iter_no_change: 10,
            tol: 1e-4,
            seed: 42,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit config file (passed as argument)
/// 2. Environment variables (prefixed with `SLOPEFOS_`)
/// 3. Workspace-local config (`.slopefos/config.toml`)
/// 4. User config (`~/.config/slopefos/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    config_file: Option<&Path>,
) -> Result<AppConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

    // User-level config
    if let Some(config_dir) = directories::ProjectDirs::from("dev", "slopefos", "slopefos") {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    // Workspace-level config
    if let Some(ws) = workspace {
        let ws_config = workspace_config_path(ws);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // Environment variables (SLOPEFOS_SPLIT__SEED, SLOPEFOS_SERVER__PORT, etc.)
    figment = figment.merge(Env::prefixed("SLOPEFOS_").split("__"));

    if let Some(path) = config_file {
        figment = figment.merge(Toml::file(path));
    }

    figment.extract().map_err(Box::new)
}

/// Load configuration and reject it when [`AppConfig::validate`] reports problems.
pub fn load_validated_config(
    workspace: Option<&Path>,
    config_file: Option<&Path>,
) -> Result<AppConfig, CoreError> {
    if let Some(path) = config_file {
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }
            .into());
        }
    }
    let config = load_config(workspace, config_file).map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
    })?;
    let problems = config.validate();
    if !problems.is_empty() {
        return Err(ConfigError::Invalid {
            message: problems.join("; "),
        }
        .into());
    }
    Ok(config)
}

/// Location of the workspace-level configuration file.
pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(".slopefos").join("config.toml")
}
