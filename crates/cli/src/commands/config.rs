use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use storepulse_core::config::{resolve_config_path, AppConfig, ConfigOverrides, LoadOptions};
use toml::Value;

use super::{CommandResult, EXIT_CONFIG};

#[derive(Debug, Serialize)]
struct ConfigEntry {
    key: &'static str,
    value: String,
    source: String,
}

struct SourceContext {
    file_doc: Option<Value>,
    file_path: Option<PathBuf>,
}

pub fn run(options: LoadOptions) -> CommandResult {
    let explicit_path = options.config_path.clone();
    let overrides = options.overrides.clone();
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                EXIT_CONFIG,
            )
        }
    };

    let file_path = resolve_config_path(explicit_path.as_deref());
    let sources =
        SourceContext { file_doc: load_config_file_doc(file_path.as_deref()), file_path };
    let entries = entries(&config, &overrides, &sources);

    CommandResult::success_with(
        "config",
        "effective config (source precedence: override > env > file > default)",
        &entries,
    )
}

fn entries(
    config: &AppConfig,
    overrides: &ConfigOverrides,
    sources: &SourceContext,
) -> Vec<ConfigEntry> {
    let entry = |key: &'static str, value: String, env_keys: &[&str], flag: Option<&str>| {
        ConfigEntry { key, value, source: sources.field_source(key, env_keys, flag) }
    };

    vec![
        entry(
            "data.corpus_path",
            config.data.corpus_path.display().to_string(),
            &["STOREPULSE_DATA_CORPUS_PATH"],
            overrides.corpus_path.as_ref().map(|_| "--data"),
        ),
        entry(
            "model.artifact_dir",
            config.model.artifact_dir.display().to_string(),
            &["STOREPULSE_MODEL_ARTIFACT_DIR"],
            overrides.artifact_dir.as_ref().map(|_| "--artifact-dir"),
        ),
        entry(
            "model.cv_folds",
            config.model.cv_folds.to_string(),
            &["STOREPULSE_MODEL_CV_FOLDS"],
            None,
        ),
        entry(
            "model.test_fraction",
            config.model.test_fraction.to_string(),
            &["STOREPULSE_MODEL_TEST_FRACTION"],
            None,
        ),
        entry(
            "model.seed",
            config.model.seed.to_string(),
            &["STOREPULSE_MODEL_SEED"],
            overrides.seed.map(|_| "--seed"),
        ),
        entry(
            "model.parallel",
            config.model.parallel.to_string(),
            &["STOREPULSE_MODEL_PARALLEL"],
            overrides.parallel.map(|_| "--sequential"),
        ),
        entry(
            "model.invalidate_on_corpus_change",
            config.model.invalidate_on_corpus_change.to_string(),
            &["STOREPULSE_MODEL_INVALIDATE_ON_CORPUS_CHANGE"],
            None,
        ),
        entry("grid.n_factors", format!("{:?}", config.grid.n_factors), &[], None),
        entry("grid.n_epochs", format!("{:?}", config.grid.n_epochs), &[], None),
        entry("grid.lr_all", format!("{:?}", config.grid.lr_all), &[], None),
        entry("grid.reg_all", format!("{:?}", config.grid.reg_all), &[], None),
        entry(
            "recommend.default_count",
            config.recommend.default_count.to_string(),
            &["STOREPULSE_RECOMMEND_DEFAULT_COUNT"],
            None,
        ),
        entry(
            "segmentation.clusters",
            config.segmentation.clusters.to_string(),
            &["STOREPULSE_SEGMENTATION_CLUSTERS"],
            None,
        ),
        entry(
            "segmentation.max_iterations",
            config.segmentation.max_iterations.to_string(),
            &[],
            None,
        ),
        entry("segmentation.restarts", config.segmentation.restarts.to_string(), &[], None),
        entry(
            "segmentation.seed",
            config.segmentation.seed.to_string(),
            &["STOREPULSE_SEGMENTATION_SEED"],
            None,
        ),
        entry(
            "logging.level",
            config.logging.level.clone(),
            &["STOREPULSE_LOGGING_LEVEL", "STOREPULSE_LOG_LEVEL"],
            overrides.log_level.as_ref().map(|_| "--log-level"),
        ),
        entry(
            "logging.format",
            format!("{:?}", config.logging.format).to_lowercase(),
            &["STOREPULSE_LOGGING_FORMAT", "STOREPULSE_LOG_FORMAT"],
            None,
        ),
    ]
}

impl SourceContext {
    fn field_source(&self, key_path: &str, env_keys: &[&str], flag: Option<&str>) -> String {
        if let Some(flag) = flag {
            return format!("override ({flag})");
        }

        if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
            return format!("env ({env_key})");
        }

        if let Some(doc) = &self.file_doc {
            if contains_path(doc, key_path) {
                let file_path = self
                    .file_path
                    .as_ref()
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| "config file".to_string());
                return format!("file ({file_path})");
            }
        }

        "default".to_string()
    }
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}
