use serde::Serialize;
use storepulse_core::config::AppConfig;
use storepulse_core::recommender::{Accuracy, Hyperparameters};
use storepulse_core::{ModelOrigin, ModelTrainer};

use super::{application_failure, load_corpus, CommandResult};

#[derive(Debug, Serialize)]
struct TrainSummary {
    origin: ModelOrigin,
    params: Hyperparameters,
    cache_key: String,
    ratings: usize,
    customers: usize,
    products: usize,
    candidates_evaluated: Option<usize>,
    cv_rmse: Option<f64>,
    cv_mae: Option<f64>,
    holdout: Option<Accuracy>,
    artifact_dir: String,
}

pub fn run(config: &AppConfig, retrain: bool) -> CommandResult {
    let corpus = match load_corpus("train", config) {
        Ok(corpus) => corpus,
        Err(failure) => return failure,
    };

    let trainer = ModelTrainer::from_config(config);
    if retrain {
        if let Err(error) = trainer.store().clear() {
            return application_failure("train", error);
        }
    }

    let (model, _rated) = match trainer.train(corpus) {
        Ok(trained) => trained,
        Err(error) => return application_failure("train", error),
    };

    let best = model.report.grid_search.as_ref().and_then(|report| report.best());
    let summary = TrainSummary {
        origin: model.origin,
        params: model.params,
        cache_key: model.report.cache_key.clone(),
        ratings: model.report.rating_count,
        customers: model.model.customer_count(),
        products: model.model.product_count(),
        candidates_evaluated: model.report.grid_search.as_ref().map(|report| report.scores.len()),
        cv_rmse: best.map(|score| score.mean_rmse),
        cv_mae: best.map(|score| score.mean_mae),
        holdout: model.report.holdout,
        artifact_dir: trainer.store().dir().display().to_string(),
    };

    let message = match model.origin {
        ModelOrigin::Loaded => "loaded stored model artifacts",
        ModelOrigin::Trained => "trained and stored a new model",
    };
    CommandResult::success_with("train", message, &summary)
}
