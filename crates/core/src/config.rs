use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::recommender::params::ParameterGrid;

pub const CONFIG_FILE_NAME: &str = "storepulse.toml";
pub const NESTED_CONFIG_FILE: &str = "config/storepulse.toml";

/// Named segments available to the clustering step.
pub const MAX_SEGMENT_CLUSTERS: usize = 4;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub data: DataConfig,
    pub model: ModelConfig,
    pub grid: ParameterGrid,
    pub recommend: RecommendConfig,
    pub segmentation: SegmentationConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DataConfig {
    pub corpus_path: PathBuf,
}

#[derive(Clone, Debug)]
pub struct ModelConfig {
    pub artifact_dir: PathBuf,
    pub cv_folds: usize,
    pub test_fraction: f64,
    pub seed: u64,
    pub parallel: bool,
    pub invalidate_on_corpus_change: bool,
}

#[derive(Clone, Debug)]
pub struct RecommendConfig {
    pub default_count: usize,
}

#[derive(Clone, Debug)]
pub struct SegmentationConfig {
    pub clusters: usize,
    pub max_iterations: usize,
    pub restarts: usize,
    pub seed: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub corpus_path: Option<PathBuf>,
    pub artifact_dir: Option<PathBuf>,
    pub log_level: Option<String>,
    pub parallel: Option<bool>,
    pub seed: Option<u64>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data: DataConfig { corpus_path: PathBuf::from("customerPurchaseData.csv") },
            model: ModelConfig {
                artifact_dir: PathBuf::from(".storepulse"),
                cv_folds: 3,
                test_fraction: 0.2,
                seed: 42,
                parallel: true,
                invalidate_on_corpus_change: true,
            },
            grid: ParameterGrid::default(),
            recommend: RecommendConfig { default_count: 5 },
            segmentation: SegmentationConfig {
                clusters: MAX_SEGMENT_CLUSTERS,
                max_iterations: 300,
                restarts: 10,
                seed: 42,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(data) = patch.data {
            if let Some(corpus_path) = data.corpus_path {
                self.data.corpus_path = corpus_path;
            }
        }

        if let Some(model) = patch.model {
            if let Some(artifact_dir) = model.artifact_dir {
                self.model.artifact_dir = artifact_dir;
            }
            if let Some(cv_folds) = model.cv_folds {
                self.model.cv_folds = cv_folds;
            }
            if let Some(test_fraction) = model.test_fraction {
                self.model.test_fraction = test_fraction;
            }
            if let Some(seed) = model.seed {
                self.model.seed = seed;
            }
            if let Some(parallel) = model.parallel {
                self.model.parallel = parallel;
            }
            if let Some(invalidate) = model.invalidate_on_corpus_change {
                self.model.invalidate_on_corpus_change = invalidate;
            }
        }

        if let Some(grid) = patch.grid {
            if let Some(n_factors) = grid.n_factors {
                self.grid.n_factors = n_factors;
            }
            if let Some(n_epochs) = grid.n_epochs {
                self.grid.n_epochs = n_epochs;
            }
            if let Some(lr_all) = grid.lr_all {
                self.grid.lr_all = lr_all;
            }
            if let Some(reg_all) = grid.reg_all {
                self.grid.reg_all = reg_all;
            }
        }

        if let Some(recommend) = patch.recommend {
            if let Some(default_count) = recommend.default_count {
                self.recommend.default_count = default_count;
            }
        }

        if let Some(segmentation) = patch.segmentation {
            if let Some(clusters) = segmentation.clusters {
                self.segmentation.clusters = clusters;
            }
            if let Some(max_iterations) = segmentation.max_iterations {
                self.segmentation.max_iterations = max_iterations;
            }
            if let Some(restarts) = segmentation.restarts {
                self.segmentation.restarts = restarts;
            }
            if let Some(seed) = segmentation.seed {
                self.segmentation.seed = seed;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("STOREPULSE_DATA_CORPUS_PATH") {
            self.data.corpus_path = PathBuf::from(value);
        }

        if let Some(value) = read_env("STOREPULSE_MODEL_ARTIFACT_DIR") {
            self.model.artifact_dir = PathBuf::from(value);
        }
        if let Some(value) = read_env("STOREPULSE_MODEL_CV_FOLDS") {
            self.model.cv_folds = parse_usize("STOREPULSE_MODEL_CV_FOLDS", &value)?;
        }
        if let Some(value) = read_env("STOREPULSE_MODEL_TEST_FRACTION") {
            self.model.test_fraction = parse_f64("STOREPULSE_MODEL_TEST_FRACTION", &value)?;
        }
        if let Some(value) = read_env("STOREPULSE_MODEL_SEED") {
            self.model.seed = parse_u64("STOREPULSE_MODEL_SEED", &value)?;
        }
        if let Some(value) = read_env("STOREPULSE_MODEL_PARALLEL") {
            self.model.parallel = parse_bool("STOREPULSE_MODEL_PARALLEL", &value)?;
        }
        if let Some(value) = read_env("STOREPULSE_MODEL_INVALIDATE_ON_CORPUS_CHANGE") {
            self.model.invalidate_on_corpus_change =
                parse_bool("STOREPULSE_MODEL_INVALIDATE_ON_CORPUS_CHANGE", &value)?;
        }

        if let Some(value) = read_env("STOREPULSE_RECOMMEND_DEFAULT_COUNT") {
            self.recommend.default_count =
                parse_usize("STOREPULSE_RECOMMEND_DEFAULT_COUNT", &value)?;
        }

        if let Some(value) = read_env("STOREPULSE_SEGMENTATION_CLUSTERS") {
            self.segmentation.clusters = parse_usize("STOREPULSE_SEGMENTATION_CLUSTERS", &value)?;
        }
        if let Some(value) = read_env("STOREPULSE_SEGMENTATION_SEED") {
            self.segmentation.seed = parse_u64("STOREPULSE_SEGMENTATION_SEED", &value)?;
        }

        let log_level =
            read_env("STOREPULSE_LOGGING_LEVEL").or_else(|| read_env("STOREPULSE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("STOREPULSE_LOGGING_FORMAT").or_else(|| read_env("STOREPULSE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(corpus_path) = overrides.corpus_path {
            self.data.corpus_path = corpus_path;
        }
        if let Some(artifact_dir) = overrides.artifact_dir {
            self.model.artifact_dir = artifact_dir;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(parallel) = overrides.parallel {
            self.model.parallel = parallel;
        }
        if let Some(seed) = overrides.seed {
            self.model.seed = seed;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_data(&self.data)?;
        validate_model(&self.model)?;
        validate_grid(&self.grid)?;
        validate_recommend(&self.recommend)?;
        validate_segmentation(&self.segmentation)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(CONFIG_FILE_NAME), PathBuf::from(NESTED_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_data(data: &DataConfig) -> Result<(), ConfigError> {
    if data.corpus_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "data.corpus_path must point at the purchase CSV".to_string(),
        ));
    }
    Ok(())
}

fn validate_model(model: &ModelConfig) -> Result<(), ConfigError> {
    if model.artifact_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "model.artifact_dir must not be empty".to_string(),
        ));
    }

    if model.cv_folds < 2 {
        return Err(ConfigError::Validation(
            "model.cv_folds must be at least 2".to_string(),
        ));
    }

    if !(model.test_fraction > 0.0 && model.test_fraction < 1.0) {
        return Err(ConfigError::Validation(
            "model.test_fraction must be in the open range (0, 1)".to_string(),
        ));
    }

    Ok(())
}

// Empty grid lists are left to the trainer, which reports them as a domain error.
fn validate_grid(grid: &ParameterGrid) -> Result<(), ConfigError> {
    if grid.n_factors.iter().any(|value| *value == 0) {
        return Err(ConfigError::Validation(
            "grid.n_factors values must be greater than zero".to_string(),
        ));
    }
    if grid.n_epochs.iter().any(|value| *value == 0) {
        return Err(ConfigError::Validation(
            "grid.n_epochs values must be greater than zero".to_string(),
        ));
    }
    if grid.lr_all.iter().any(|value| !(value.is_finite() && *value > 0.0)) {
        return Err(ConfigError::Validation(
            "grid.lr_all values must be positive finite numbers".to_string(),
        ));
    }
    if grid.reg_all.iter().any(|value| !(value.is_finite() && *value >= 0.0)) {
        return Err(ConfigError::Validation(
            "grid.reg_all values must be non-negative finite numbers".to_string(),
        ));
    }
    Ok(())
}

fn validate_recommend(recommend: &RecommendConfig) -> Result<(), ConfigError> {
    if recommend.default_count == 0 {
        return Err(ConfigError::Validation(
            "recommend.default_count must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_segmentation(segmentation: &SegmentationConfig) -> Result<(), ConfigError> {
    if segmentation.clusters == 0 || segmentation.clusters > MAX_SEGMENT_CLUSTERS {
        return Err(ConfigError::Validation(format!(
            "segmentation.clusters must be in range 1..={MAX_SEGMENT_CLUSTERS}"
        )));
    }
    if segmentation.max_iterations == 0 {
        return Err(ConfigError::Validation(
            "segmentation.max_iterations must be greater than zero".to_string(),
        ));
    }
    if segmentation.restarts == 0 {
        return Err(ConfigError::Validation(
            "segmentation.restarts must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.trim().parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_f64(key: &str, value: &str) -> Result<f64, ConfigError> {
    value.trim().parse::<f64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.trim().parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    data: Option<DataPatch>,
    model: Option<ModelPatch>,
    grid: Option<GridPatch>,
    recommend: Option<RecommendPatch>,
    segmentation: Option<SegmentationPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DataPatch {
    corpus_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct ModelPatch {
    artifact_dir: Option<PathBuf>,
    cv_folds: Option<usize>,
    test_fraction: Option<f64>,
    seed: Option<u64>,
    parallel: Option<bool>,
    invalidate_on_corpus_change: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct GridPatch {
    n_factors: Option<Vec<usize>>,
    n_epochs: Option<Vec<usize>>,
    lr_all: Option<Vec<f64>>,
    reg_all: Option<Vec<f64>>,
}

#[derive(Debug, Default, Deserialize)]
struct RecommendPatch {
    default_count: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct SegmentationPatch {
    clusters: Option<usize>,
    max_iterations: Option<usize>,
    restarts: Option<usize>,
    seed: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
