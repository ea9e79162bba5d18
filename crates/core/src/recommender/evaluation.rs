use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::recommender::params::{Hyperparameters, ParameterGrid};
use crate::recommender::ratings::{RatingScale, RatingSet, RatingTriple};
use crate::recommender::svdpp::{RatingEstimator, SvdppModel};

/// Error measures over a set of held-out ratings.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Accuracy {
    pub rmse: f64,
    pub mae: f64,
}

pub fn accuracy<E: RatingEstimator + ?Sized>(
    model: &E,
    test: &[RatingTriple],
) -> Result<Accuracy, DomainError> {
    if test.is_empty() {
        return Err(DomainError::insufficient("test ratings", 1, 0));
    }

    let mut squared = 0.0;
    let mut absolute = 0.0;
    for triple in test {
        let error = triple.rating - model.estimate(triple.customer_id, triple.product_id).estimate;
        squared += error * error;
        absolute += error.abs();
    }
    let n = test.len() as f64;
    Ok(Accuracy { rmse: (squared / n).sqrt(), mae: absolute / n })
}

/// Positions of one train/test partition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Shuffled k-fold partition. The first `len % folds` folds take one extra
/// rating so every position is tested exactly once.
pub fn k_fold(len: usize, folds: usize, seed: u64) -> Result<Vec<Split>, DomainError> {
    if folds < 2 {
        return Err(DomainError::InvariantViolation(format!(
            "cross-validation needs at least 2 folds, got {folds}"
        )));
    }
    if len < folds {
        return Err(DomainError::insufficient("ratings", folds, len));
    }

    let mut positions: Vec<usize> = (0..len).collect();
    positions.shuffle(&mut StdRng::seed_from_u64(seed));

    let base = len / folds;
    let remainder = len % folds;
    let mut splits = Vec::with_capacity(folds);
    let mut start = 0;
    for fold in 0..folds {
        let stop = start + base + usize::from(fold < remainder);
        let test = positions[start..stop].to_vec();
        let train = positions[..start].iter().chain(&positions[stop..]).copied().collect();
        splits.push(Split { train, test });
        start = stop;
    }
    Ok(splits)
}

/// Shuffled holdout split; the test side takes `ceil(len * test_fraction)`.
pub fn train_test_split(len: usize, test_fraction: f64, seed: u64) -> Result<Split, DomainError> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(DomainError::InvariantViolation(format!(
            "test fraction must be in (0, 1), got {test_fraction}"
        )));
    }

    let test_len = holdout_len(len, test_fraction);
    if test_len == 0 || test_len >= len {
        let required = (2..)
            .find(|&candidate| holdout_len(candidate, test_fraction) < candidate)
            .unwrap_or(usize::MAX);
        return Err(DomainError::insufficient("ratings", required, len));
    }

    let mut positions: Vec<usize> = (0..len).collect();
    positions.shuffle(&mut StdRng::seed_from_u64(seed));
    let train = positions.split_off(test_len);
    Ok(Split { train, test: positions })
}

fn holdout_len(len: usize, test_fraction: f64) -> usize {
    (len as f64 * test_fraction).ceil() as usize
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub params: Hyperparameters,
    pub mean_rmse: f64,
    pub mean_mae: f64,
    pub fold_rmse: Vec<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridSearchReport {
    pub folds: usize,
    pub scores: Vec<CandidateScore>,
    pub best_index: usize,
}

impl GridSearchReport {
    pub fn best(&self) -> Option<&CandidateScore> {
        self.scores.get(self.best_index)
    }
}

/// Cross-validated search over a hyperparameter grid, ranked by mean RMSE.
#[derive(Clone, Debug)]
pub struct GridSearch {
    candidates: Vec<Hyperparameters>,
    folds: usize,
    seed: u64,
    parallel: bool,
}

impl GridSearch {
    pub fn new(
        grid: &ParameterGrid,
        folds: usize,
        seed: u64,
        parallel: bool,
    ) -> Result<Self, DomainError> {
        Ok(Self { candidates: grid.candidates()?, folds, seed, parallel })
    }

    pub fn candidate_count(&self) -> usize {
        self.candidates.len()
    }

    pub fn run(&self, ratings: &RatingSet) -> Result<GridSearchReport, DomainError> {
        let splits = k_fold(ratings.len(), self.folds, self.seed)?;
        let folds: Vec<(Vec<RatingTriple>, Vec<RatingTriple>)> = splits
            .iter()
            .map(|split| (ratings.select(&split.train), ratings.select(&split.test)))
            .collect();
        let scale = ratings.scale();

        let scores: Vec<CandidateScore> = if self.parallel {
            self.candidates
                .par_iter()
                .map(|params| score_candidate(*params, &folds, scale, self.seed))
                .collect::<Result<_, _>>()?
        } else {
            self.candidates
                .iter()
                .map(|params| score_candidate(*params, &folds, scale, self.seed))
                .collect::<Result<_, _>>()?
        };

        let mut best_index = 0;
        for (index, score) in scores.iter().enumerate() {
            // Strict comparison keeps the earliest candidate on ties.
            if score.mean_rmse < scores[best_index].mean_rmse {
                best_index = index;
            }
        }

        Ok(GridSearchReport { folds: self.folds, scores, best_index })
    }
}

fn score_candidate(
    params: Hyperparameters,
    folds: &[(Vec<RatingTriple>, Vec<RatingTriple>)],
    scale: RatingScale,
    seed: u64,
) -> Result<CandidateScore, DomainError> {
    let mut fold_rmse = Vec::with_capacity(folds.len());
    let mut mae_total = 0.0;
    for (train, test) in folds {
        let model = SvdppModel::fit(train, scale, params, seed)?;
        let measured = accuracy(&model, test)?;
        fold_rmse.push(measured.rmse);
        mae_total += measured.mae;
    }

    let n = folds.len() as f64;
    Ok(CandidateScore {
        params,
        mean_rmse: fold_rmse.iter().sum::<f64>() / n,
        mean_mae: mae_total / n,
        fold_rmse,
    })
}
