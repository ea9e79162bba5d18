use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use crate::errors::ApplicationError;
use crate::recommender::evaluation::Accuracy;
use crate::recommender::params::{Hyperparameters, ParameterGrid};
use crate::recommender::svdpp::SvdppModel;

pub const MODEL_FILE: &str = "model.json";
pub const PARAMS_FILE: &str = "best_params.json";

/// Selected hyperparameters plus the provenance of the fit that used them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParamsArtifact {
    pub params: Hyperparameters,
    /// Absent in artifacts written before cache keys existed.
    #[serde(default)]
    pub cache_key: Option<String>,
    pub cv_rmse: Option<f64>,
    pub cv_mae: Option<f64>,
    pub holdout: Option<Accuracy>,
    pub trained_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactState {
    Missing,
    Partial,
    Present,
}

/// Identifies the inputs a trained model depends on.
pub fn cache_key(
    corpus_fingerprint: &str,
    grid: &ParameterGrid,
    cv_folds: usize,
    test_fraction: f64,
    seed: u64,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(corpus_fingerprint.as_bytes());
    hasher.update(format!("|factors={:?}", grid.n_factors).as_bytes());
    hasher.update(format!("|epochs={:?}", grid.n_epochs).as_bytes());
    hasher.update(format!("|lr={:?}", grid.lr_all).as_bytes());
    hasher.update(format!("|reg={:?}", grid.reg_all).as_bytes());
    hasher.update(format!("|folds={cv_folds}|test={test_fraction:?}|seed={seed}").as_bytes());
    format!("sha256:{:x}", hasher.finalize())
}

/// Model and parameter files in one directory, replaced atomically.
#[derive(Clone, Debug)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn model_path(&self) -> PathBuf {
        self.dir.join(MODEL_FILE)
    }

    pub fn params_path(&self) -> PathBuf {
        self.dir.join(PARAMS_FILE)
    }

    pub fn state(&self) -> ArtifactState {
        match (self.model_path().is_file(), self.params_path().is_file()) {
            (true, true) => ArtifactState::Present,
            (false, false) => ArtifactState::Missing,
            _ => ArtifactState::Partial,
        }
    }

    /// Loads both artifacts when both exist. Returns `Ok(None)` when either
    /// is missing; an unreadable or malformed file is an error.
    pub fn load(&self) -> Result<Option<(SvdppModel, ParamsArtifact)>, ApplicationError> {
        if self.state() != ArtifactState::Present {
            return Ok(None);
        }

        let model_path = self.model_path();
        let model: SvdppModel = read_json(&model_path)?;
        model.check_shape().map_err(|error| ApplicationError::ArtifactLoad {
            path: model_path.clone(),
            message: error.to_string(),
        })?;
        let params: ParamsArtifact = read_json(&self.params_path())?;

        if params.params != model.params() {
            return Err(ApplicationError::ArtifactLoad {
                path: self.params_path(),
                message: "recorded hyperparameters do not match the stored model".to_owned(),
            });
        }

        Ok(Some((model, params)))
    }

    /// Writes the model first and the parameters last, so a crash between
    /// the two leaves a partial set that is retrained rather than reused.
    pub fn save(
        &self,
        model: &SvdppModel,
        params: &ParamsArtifact,
    ) -> Result<(), ApplicationError> {
        fs::create_dir_all(&self.dir).map_err(|error| {
            persistence_error("create artifact directory", &self.dir, &error)
        })?;
        write_json_atomic(&self.model_path(), model)?;
        write_json_atomic(&self.params_path(), params)
    }

    pub fn clear(&self) -> Result<(), ApplicationError> {
        for path in [self.params_path(), self.model_path()] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(error) if error.kind() == io::ErrorKind::NotFound => {}
                Err(error) => return Err(persistence_error("remove artifact", &path, &error)),
            }
        }
        Ok(())
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ApplicationError> {
    let raw = fs::read(path).map_err(|error| ApplicationError::ArtifactLoad {
        path: path.to_path_buf(),
        message: error.to_string(),
    })?;
    serde_json::from_slice(&raw).map_err(|error| ApplicationError::ArtifactLoad {
        path: path.to_path_buf(),
        message: error.to_string(),
    })
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), ApplicationError> {
    let encoded = serde_json::to_vec_pretty(value).map_err(|error| {
        ApplicationError::Persistence(format!("encode `{}`: {error}", path.display()))
    })?;

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)
        .map_err(|error| persistence_error("create temporary artifact", dir, &error))?;
    temp.write_all(&encoded)
        .and_then(|()| temp.as_file().sync_all())
        .map_err(|error| persistence_error("write artifact", temp.path(), &error))?;
    temp.persist(path)
        .map_err(|error| persistence_error("replace artifact", path, &error.error))?;
    Ok(())
}

fn persistence_error(action: &str, path: &Path, error: &io::Error) -> ApplicationError {
    ApplicationError::Persistence(format!("{action} `{}`: {error}", path.display()))
}
