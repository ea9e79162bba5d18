use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::corpus::PurchaseCorpus;
use crate::domain::customer::CustomerId;
use crate::domain::product::ProductId;
use crate::errors::{ApplicationError, DomainError};
use crate::recommender::artifacts::{cache_key, ArtifactStore, ParamsArtifact};
use crate::recommender::evaluation::{
    accuracy, train_test_split, Accuracy, GridSearch, GridSearchReport,
};
use crate::recommender::params::{Hyperparameters, ParameterGrid};
use crate::recommender::ratings::RatedCorpus;
use crate::recommender::svdpp::{Prediction, RatingEstimator, SvdppModel};

/// Ratings below this count cannot be split for training and evaluation.
pub const MIN_RATINGS: usize = 2;

#[derive(Clone, Debug, PartialEq)]
pub struct TrainerSettings {
    pub grid: ParameterGrid,
    pub cv_folds: usize,
    pub test_fraction: f64,
    pub seed: u64,
    pub parallel: bool,
    pub invalidate_on_corpus_change: bool,
}

impl Default for TrainerSettings {
    fn default() -> Self {
        Self {
            grid: ParameterGrid::default(),
            cv_folds: 3,
            test_fraction: 0.2,
            seed: 42,
            parallel: true,
            invalidate_on_corpus_change: true,
        }
    }
}

impl From<&AppConfig> for TrainerSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            grid: config.grid.clone(),
            cv_folds: config.model.cv_folds,
            test_fraction: config.model.test_fraction,
            seed: config.model.seed,
            parallel: config.model.parallel,
            invalidate_on_corpus_change: config.model.invalidate_on_corpus_change,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelOrigin {
    Loaded,
    Trained,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrainingReport {
    pub cache_key: String,
    pub rating_count: usize,
    pub grid_search: Option<GridSearchReport>,
    pub holdout: Option<Accuracy>,
    pub train_size: Option<usize>,
    pub test_size: Option<usize>,
}

/// A model ready to serve predictions, with where it came from.
#[derive(Clone, Debug)]
pub struct TrainedRecommender {
    pub model: SvdppModel,
    pub params: Hyperparameters,
    pub origin: ModelOrigin,
    pub report: TrainingReport,
}

impl RatingEstimator for TrainedRecommender {
    fn estimate(&self, customer_id: CustomerId, product_id: ProductId) -> Prediction {
        self.model.predict(customer_id, product_id)
    }
}

#[derive(Clone, Debug)]
pub struct ModelTrainer {
    settings: TrainerSettings,
    store: ArtifactStore,
}

impl ModelTrainer {
    pub fn new(settings: TrainerSettings, store: ArtifactStore) -> Self {
        Self { settings, store }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(TrainerSettings::from(config), ArtifactStore::new(&config.model.artifact_dir))
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn settings(&self) -> &TrainerSettings {
        &self.settings
    }

    /// Reuses stored artifacts when they are present and current, otherwise
    /// runs the grid search, fits the winner on the training split, and
    /// persists both artifacts.
    pub fn train(
        &self,
        corpus: PurchaseCorpus,
    ) -> Result<(TrainedRecommender, RatedCorpus), ApplicationError> {
        let key = cache_key(
            &corpus.fingerprint(),
            &self.settings.grid,
            self.settings.cv_folds,
            self.settings.test_fraction,
            self.settings.seed,
        );
        let rated = RatedCorpus::new(corpus)?;
        info!(
            event_name = "recommender.train.start",
            ratings = rated.ratings().len(),
            cache_key = %key,
            "preparing recommender model"
        );

        if let Some(loaded) = self.load_current(&key, rated.ratings().len())? {
            return Ok((loaded, rated));
        }

        let search = GridSearch::new(
            &self.settings.grid,
            self.settings.cv_folds,
            self.settings.seed,
            self.settings.parallel,
        )?;
        let required = MIN_RATINGS.max(self.settings.cv_folds);
        if rated.ratings().len() < required {
            let actual = rated.ratings().len();
            return Err(DomainError::insufficient("ratings", required, actual).into());
        }

        info!(
            event_name = "recommender.train.grid_search",
            candidates = search.candidate_count(),
            folds = self.settings.cv_folds,
            parallel = self.settings.parallel,
            "running hyperparameter grid search"
        );
        let report = search.run(rated.ratings())?;
        let best = report.best().cloned().ok_or_else(|| {
            DomainError::InvariantViolation("grid search produced no scores".to_owned())
        })?;
        info!(
            event_name = "recommender.train.best_params",
            n_factors = best.params.n_factors,
            n_epochs = best.params.n_epochs,
            lr_all = best.params.lr_all,
            reg_all = best.params.reg_all,
            mean_rmse = best.mean_rmse,
            "selected hyperparameters by lowest mean rmse"
        );

        let split = train_test_split(
            rated.ratings().len(),
            self.settings.test_fraction,
            self.settings.seed,
        )?;
        let train = rated.ratings().select(&split.train);
        let test = rated.ratings().select(&split.test);
        let model = SvdppModel::fit(&train, rated.scale(), best.params, self.settings.seed)?;
        let holdout = accuracy(&model, &test)?;
        info!(
            event_name = "recommender.train.holdout",
            rmse = holdout.rmse,
            mae = holdout.mae,
            train_size = train.len(),
            test_size = test.len(),
            "evaluated final model on holdout split"
        );

        let artifact = ParamsArtifact {
            params: best.params,
            cache_key: Some(key.clone()),
            cv_rmse: Some(best.mean_rmse),
            cv_mae: Some(best.mean_mae),
            holdout: Some(holdout),
            trained_at: Utc::now(),
        };
        self.store.save(&model, &artifact)?;
        info!(
            event_name = "recommender.artifacts.saved",
            dir = %self.store.dir().display(),
            "persisted model artifacts"
        );

        let trained = TrainedRecommender {
            model,
            params: best.params,
            origin: ModelOrigin::Trained,
            report: TrainingReport {
                cache_key: key,
                rating_count: rated.ratings().len(),
                grid_search: Some(report),
                holdout: Some(holdout),
                train_size: Some(train.len()),
                test_size: Some(test.len()),
            },
        };
        Ok((trained, rated))
    }

    fn load_current(
        &self,
        key: &str,
        rating_count: usize,
    ) -> Result<Option<TrainedRecommender>, ApplicationError> {
        let Some((model, artifact)) = self.store.load()? else {
            info!(
                event_name = "recommender.artifacts.missing",
                dir = %self.store.dir().display(),
                "no complete artifact set; training from scratch"
            );
            return Ok(None);
        };

        if self.settings.invalidate_on_corpus_change && artifact.cache_key.as_deref() != Some(key) {
            warn!(
                event_name = "recommender.artifacts.stale",
                stored_key = artifact.cache_key.as_deref().unwrap_or("none"),
                current_key = key,
                "stored artifacts were trained on different inputs; retraining"
            );
            return Ok(None);
        }

        info!(
            event_name = "recommender.train.cache_hit",
            dir = %self.store.dir().display(),
            "loaded model artifacts"
        );
        Ok(Some(TrainedRecommender {
            params: artifact.params,
            origin: ModelOrigin::Loaded,
            report: TrainingReport {
                cache_key: key.to_owned(),
                rating_count,
                grid_search: None,
                holdout: artifact.holdout,
                train_size: None,
                test_size: None,
            },
            model,
        }))
    }
}
