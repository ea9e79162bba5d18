use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// Settings for a single SVD++ fit.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameters {
    pub n_factors: usize,
    pub n_epochs: usize,
    pub lr_all: f64,
    pub reg_all: f64,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self { n_factors: 20, n_epochs: 20, lr_all: 0.007, reg_all: 0.02 }
    }
}

/// Candidate values searched by cross-validation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterGrid {
    pub n_factors: Vec<usize>,
    pub n_epochs: Vec<usize>,
    pub lr_all: Vec<f64>,
    pub reg_all: Vec<f64>,
}

impl Default for ParameterGrid {
    fn default() -> Self {
        Self {
            n_factors: vec![20, 50, 100],
            n_epochs: vec![10, 20, 30],
            lr_all: vec![0.002, 0.005, 0.01],
            reg_all: vec![0.02, 0.05, 0.1],
        }
    }
}

impl ParameterGrid {
    pub fn single(params: Hyperparameters) -> Self {
        Self {
            n_factors: vec![params.n_factors],
            n_epochs: vec![params.n_epochs],
            lr_all: vec![params.lr_all],
            reg_all: vec![params.reg_all],
        }
    }

    pub fn candidate_count(&self) -> usize {
        self.n_factors.len() * self.n_epochs.len() * self.lr_all.len() * self.reg_all.len()
    }

    /// Cartesian product in declaration order; `reg_all` varies fastest.
    pub fn candidates(&self) -> Result<Vec<Hyperparameters>, DomainError> {
        if self.candidate_count() == 0 {
            return Err(DomainError::EmptyParameterGrid);
        }

        let mut candidates = Vec::with_capacity(self.candidate_count());
        for &n_factors in &self.n_factors {
            for &n_epochs in &self.n_epochs {
                for &lr_all in &self.lr_all {
                    for &reg_all in &self.reg_all {
                        candidates.push(Hyperparameters { n_factors, n_epochs, lr_all, reg_all });
                    }
                }
            }
        }
        Ok(candidates)
    }
}
