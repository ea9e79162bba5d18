use std::collections::HashSet;
use std::fs;

use storepulse_core::recommender::{ArtifactStore, ParameterGrid, TrainerSettings};
use storepulse_core::{
    recommend, ApplicationError, CustomerId, ModelOrigin, ModelTrainer, PredictionKind,
    PurchaseCorpus,
};

type ContractResult<T = ()> = Result<T, String>;

macro_rules! require {
    ($cond:expr) => {
        if !$cond {
            return Err(format!("assertion failed: `{}`", stringify!($cond)));
        }
    };
    ($cond:expr, $($arg:tt)*) => {
        if !$cond {
            return Err(format!($($arg)*));
        }
    };
}

macro_rules! require_eq {
    ($left:expr, $right:expr) => {
        if $left != $right {
            return Err(format!(
                "assertion failed: `left == right` (`{:?}` != `{:?}`)",
                $left,
                $right
            ));
        }
    };
}

const CORPUS: &str = "\
Customer_ID,Product_ID,Category,Subcategory,Purchase_Amount,Purchase_Quantity,Purchase_Date,Unit_Price
1,101,Electronics,Laptops,1200.00,1,2024-01-03,1200.00
1,102,Electronics,Headphones,150.00,1,2024-01-05,150.00
1,104,Books,Fiction,24.50,2,2024-02-11,12.25
2,101,Electronics,Laptops,999.99,1,2024-01-09,999.99
2,103,Home,Kitchen,80.00,2,2024-01-21,40.00
2,105,Beauty,Skincare,35.00,1,2024-03-02,35.00
2,102,Electronics,Headphones,130.00,1,2024-03-04,130.00
3,103,Home,Kitchen,95.00,1,2024-02-01,95.00
3,104,Books,Fiction,18.00,1,2024-02-02,18.00
3,105,Beauty,Skincare,42.00,2,2024-02-14,21.00
3,104,Books,Fiction,22.00,1,2024-03-20,22.00
1,105,Beauty,Skincare,28.00,1,2024-04-01,28.00
";

fn corpus() -> ContractResult<PurchaseCorpus> {
    PurchaseCorpus::from_reader(CORPUS.as_bytes()).map_err(|error| error.to_string())
}

fn trainer(dir: &std::path::Path) -> ModelTrainer {
    let settings = TrainerSettings {
        grid: ParameterGrid {
            n_factors: vec![2, 4],
            n_epochs: vec![10],
            lr_all: vec![0.005, 0.01],
            reg_all: vec![0.02],
        },
        ..TrainerSettings::default()
    };
    ModelTrainer::new(settings, ArtifactStore::new(dir))
}

#[test]
fn recommendations_skip_purchased_products_and_rank_by_estimate() -> ContractResult {
    let dir = tempfile::tempdir().map_err(|error| error.to_string())?;
    let (model, rated) = trainer(dir.path()).train(corpus()?).map_err(|error| error.to_string())?;
    require_eq!(model.origin, ModelOrigin::Trained);

    let recommendations =
        recommend(CustomerId(3), 5, &rated, &model).map_err(|error| error.to_string())?;
    let ids: Vec<i64> = recommendations.iter().map(|r| r.product_id.0).collect();
    require_eq!(ids.len(), 2);
    let distinct: HashSet<i64> = ids.iter().copied().collect();
    require_eq!(distinct, HashSet::from([101, 102]));

    for pair in recommendations.windows(2) {
        require!(
            pair[0].estimated_rating >= pair[1].estimated_rating,
            "recommendations out of order: {:?}",
            ids
        );
    }
    for recommendation in &recommendations {
        let expected_kind = if model.model.knows_product(recommendation.product_id) {
            PredictionKind::FactorBased
        } else {
            PredictionKind::BiasOnlyFallback
        };
        require_eq!(recommendation.prediction_kind, expected_kind);
        require!(recommendation.reason.starts_with("Recommended because "));
        require!(recommendation.reason.ends_with("indicating high satisfaction potential."));
        require!(!recommendation.reason.contains("strong interest in Electronics"));
        let scale = rated.scale();
        require!(scale.contains(recommendation.estimated_rating));
    }

    let top_one = recommend(CustomerId(3), 1, &rated, &model).map_err(|error| error.to_string())?;
    require_eq!(top_one.len(), 1);
    require_eq!(top_one[0].product_id, recommendations[0].product_id);
    Ok(())
}

#[test]
fn unseen_customer_gets_bias_only_estimates() -> ContractResult {
    let dir = tempfile::tempdir().map_err(|error| error.to_string())?;
    let (model, rated) = trainer(dir.path()).train(corpus()?).map_err(|error| error.to_string())?;

    let recommendations =
        recommend(CustomerId(999), 10, &rated, &model).map_err(|error| error.to_string())?;
    require_eq!(recommendations.len(), 5);
    for recommendation in &recommendations {
        require_eq!(recommendation.prediction_kind, PredictionKind::BiasOnlyFallback);
        require!(
            recommendation
                .reason
                .starts_with("Recommended because this product is highly popular"),
            "unexpected reason: {}",
            recommendation.reason
        );
    }
    Ok(())
}

#[test]
fn reloaded_model_returns_the_same_recommendations() -> ContractResult {
    let dir = tempfile::tempdir().map_err(|error| error.to_string())?;
    let trainer = trainer(dir.path());

    let (first_model, first_rated) = trainer.train(corpus()?).map_err(|error| error.to_string())?;
    let first = recommend(CustomerId(1), 3, &first_rated, &first_model)
        .map_err(|error| error.to_string())?;

    let (second_model, second_rated) = trainer.train(corpus()?).map_err(|error| error.to_string())?;
    require_eq!(second_model.origin, ModelOrigin::Loaded);
    require_eq!(second_model.params, first_model.params);
    let second = recommend(CustomerId(1), 3, &second_rated, &second_model)
        .map_err(|error| error.to_string())?;

    let first_ids: Vec<_> = first.iter().map(|r| r.product_id).collect();
    let second_ids: Vec<_> = second.iter().map(|r| r.product_id).collect();
    require_eq!(first_ids, second_ids);
    for (left, right) in first.iter().zip(&second) {
        require!((left.estimated_rating - right.estimated_rating).abs() < 1e-9);
    }
    Ok(())
}

#[test]
fn corrupt_model_artifact_fails_fast() -> ContractResult {
    let dir = tempfile::tempdir().map_err(|error| error.to_string())?;
    let trainer = trainer(dir.path());
    trainer.train(corpus()?).map_err(|error| error.to_string())?;

    fs::write(trainer.store().model_path(), b"not json").map_err(|error| error.to_string())?;
    match trainer.train(corpus()?) {
        Err(ApplicationError::ArtifactLoad { path, .. }) => {
            require!(path.ends_with("model.json"), "unexpected path {}", path.display());
        }
        other => return Err(format!("expected artifact load failure, got {:?}", other.map(|_| ()))),
    }
    Ok(())
}

#[test]
fn missing_params_artifact_triggers_retraining() -> ContractResult {
    let dir = tempfile::tempdir().map_err(|error| error.to_string())?;
    let trainer = trainer(dir.path());
    trainer.train(corpus()?).map_err(|error| error.to_string())?;

    fs::remove_file(trainer.store().params_path()).map_err(|error| error.to_string())?;
    let (model, _) = trainer.train(corpus()?).map_err(|error| error.to_string())?;
    require_eq!(model.origin, ModelOrigin::Trained);
    require!(trainer.store().params_path().is_file());
    Ok(())
}
