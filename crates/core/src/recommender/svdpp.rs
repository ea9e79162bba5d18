//! SVD++ latent-factor model trained by stochastic gradient descent.
//!
//! Each customer carries an explicit factor vector plus an implicit term
//! built from every product they rated (repeats included), normalised by
//! `|I(u)|^-1/2`. Predictions fall back to the global mean and whichever
//! biases are known when the customer or product was absent from training.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::domain::customer::CustomerId;
use crate::domain::product::ProductId;
use crate::errors::DomainError;
use crate::recommender::params::Hyperparameters;
use crate::recommender::ratings::{RatingScale, RatingTriple};

const INIT_MEAN: f64 = 0.0;
const INIT_STD_DEV: f64 = 0.1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionKind {
    FactorBased,
    BiasOnlyFallback,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Prediction {
    pub estimate: f64,
    pub kind: PredictionKind,
}

/// Anything that can score a (customer, product) pair on the rating scale.
pub trait RatingEstimator {
    fn estimate(&self, customer_id: CustomerId, product_id: ProductId) -> Prediction;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "ModelState", into = "ModelState")]
pub struct SvdppModel {
    params: Hyperparameters,
    scale: RatingScale,
    global_mean: f64,
    customers: Vec<CustomerId>,
    products: Vec<ProductId>,
    customer_index: HashMap<CustomerId, usize>,
    product_index: HashMap<ProductId, usize>,
    customer_bias: Vec<f64>,
    product_bias: Vec<f64>,
    customer_factors: Vec<f64>,
    product_factors: Vec<f64>,
    implicit_factors: Vec<f64>,
    /// `|I(u)|^-1/2 * sum(y_j)` per customer, frozen after training.
    implicit_feedback: Vec<f64>,
}

impl SvdppModel {
    pub fn fit(
        triples: &[RatingTriple],
        scale: RatingScale,
        params: Hyperparameters,
        seed: u64,
    ) -> Result<Self, DomainError> {
        if triples.is_empty() {
            return Err(DomainError::insufficient("training ratings", 1, 0));
        }
        if params.n_factors == 0 {
            return Err(DomainError::InvariantViolation(
                "n_factors must be at least 1".to_owned(),
            ));
        }

        let mut customers = Vec::new();
        let mut products = Vec::new();
        let mut customer_index = HashMap::new();
        let mut product_index = HashMap::new();
        let mut rated: Vec<Vec<(usize, f64)>> = Vec::new();
        let mut total = 0.0;

        for triple in triples {
            let u = *customer_index.entry(triple.customer_id).or_insert_with(|| {
                customers.push(triple.customer_id);
                rated.push(Vec::new());
                customers.len() - 1
            });
            let i = *product_index.entry(triple.product_id).or_insert_with(|| {
                products.push(triple.product_id);
                products.len() - 1
            });
            rated[u].push((i, triple.rating));
            total += triple.rating;
        }

        let k = params.n_factors;
        let global_mean = total / triples.len() as f64;
        let mut rng = StdRng::seed_from_u64(seed);

        let mut customer_bias = vec![0.0; customers.len()];
        let mut product_bias = vec![0.0; products.len()];
        let mut customer_factors = gaussian_matrix(&mut rng, customers.len() * k);
        let mut product_factors = gaussian_matrix(&mut rng, products.len() * k);
        let mut implicit_factors = gaussian_matrix(&mut rng, products.len() * k);

        let lr = params.lr_all;
        let reg = params.reg_all;
        let mut implicit = vec![0.0; k];

        for _ in 0..params.n_epochs {
            for (u, ratings) in rated.iter().enumerate() {
                let norm = (ratings.len() as f64).sqrt();
                for &(i, rating) in ratings {
                    implicit.iter_mut().for_each(|value| *value = 0.0);
                    for &(j, _) in ratings {
                        for f in 0..k {
                            implicit[f] += implicit_factors[j * k + f] / norm;
                        }
                    }

                    let mut dot = 0.0;
                    for f in 0..k {
                        dot += product_factors[i * k + f]
                            * (customer_factors[u * k + f] + implicit[f]);
                    }
                    let err = rating - (global_mean + customer_bias[u] + product_bias[i] + dot);

                    customer_bias[u] += lr * (err - reg * customer_bias[u]);
                    product_bias[i] += lr * (err - reg * product_bias[i]);

                    for f in 0..k {
                        let puf = customer_factors[u * k + f];
                        let qif = product_factors[i * k + f];
                        customer_factors[u * k + f] += lr * (err * qif - reg * puf);
                        product_factors[i * k + f] += lr * (err * (puf + implicit[f]) - reg * qif);
                        for &(j, _) in ratings {
                            let yjf = implicit_factors[j * k + f];
                            implicit_factors[j * k + f] += lr * (err * qif / norm - reg * yjf);
                        }
                    }
                }
            }
        }

        let implicit_feedback = freeze_implicit_feedback(&rated, &implicit_factors, k);

        Ok(Self {
            params,
            scale,
            global_mean,
            customers,
            products,
            customer_index,
            product_index,
            customer_bias,
            product_bias,
            customer_factors,
            product_factors,
            implicit_factors,
            implicit_feedback,
        })
    }

    pub fn predict(&self, customer_id: CustomerId, product_id: ProductId) -> Prediction {
        let u = self.customer_index.get(&customer_id).copied();
        let i = self.product_index.get(&product_id).copied();

        let mut estimate = self.global_mean;
        if let Some(u) = u {
            estimate += self.customer_bias[u];
        }
        if let Some(i) = i {
            estimate += self.product_bias[i];
        }

        let kind = match (u, i) {
            (Some(u), Some(i)) => {
                let k = self.params.n_factors;
                let mut dot = 0.0;
                for f in 0..k {
                    dot += self.product_factors[i * k + f]
                        * (self.customer_factors[u * k + f] + self.implicit_feedback[u * k + f]);
                }
                estimate += dot;
                PredictionKind::FactorBased
            }
            _ => PredictionKind::BiasOnlyFallback,
        };

        Prediction { estimate: self.scale.clip(estimate), kind }
    }

    pub fn params(&self) -> Hyperparameters {
        self.params
    }

    pub fn scale(&self) -> RatingScale {
        self.scale
    }

    pub fn global_mean(&self) -> f64 {
        self.global_mean
    }

    pub fn knows_customer(&self, customer_id: CustomerId) -> bool {
        self.customer_index.contains_key(&customer_id)
    }

    pub fn knows_product(&self, product_id: ProductId) -> bool {
        self.product_index.contains_key(&product_id)
    }

    pub fn customer_count(&self) -> usize {
        self.customers.len()
    }

    pub fn product_count(&self) -> usize {
        self.products.len()
    }
}

impl RatingEstimator for SvdppModel {
    fn estimate(&self, customer_id: CustomerId, product_id: ProductId) -> Prediction {
        self.predict(customer_id, product_id)
    }
}

fn gaussian_matrix(rng: &mut StdRng, len: usize) -> Vec<f64> {
    (0..len).map(|_| INIT_MEAN + INIT_STD_DEV * standard_normal(rng)).collect()
}

// Box-Muller transform; `1 - gen()` keeps the log argument in (0, 1].
fn standard_normal(rng: &mut StdRng) -> f64 {
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

fn freeze_implicit_feedback(
    rated: &[Vec<(usize, f64)>],
    implicit_factors: &[f64],
    k: usize,
) -> Vec<f64> {
    let mut feedback = vec![0.0; rated.len() * k];
    for (u, ratings) in rated.iter().enumerate() {
        if ratings.is_empty() {
            continue;
        }
        let norm = (ratings.len() as f64).sqrt();
        for &(j, _) in ratings {
            for f in 0..k {
                feedback[u * k + f] += implicit_factors[j * k + f] / norm;
            }
        }
    }
    feedback
}

/// On-disk shape of a fitted model. Index maps are rebuilt on load.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct ModelState {
    params: Hyperparameters,
    scale: RatingScale,
    global_mean: f64,
    customers: Vec<CustomerId>,
    products: Vec<ProductId>,
    customer_bias: Vec<f64>,
    product_bias: Vec<f64>,
    customer_factors: Vec<f64>,
    product_factors: Vec<f64>,
    implicit_factors: Vec<f64>,
    implicit_feedback: Vec<f64>,
}

impl From<SvdppModel> for ModelState {
    fn from(model: SvdppModel) -> Self {
        Self {
            params: model.params,
            scale: model.scale,
            global_mean: model.global_mean,
            customers: model.customers,
            products: model.products,
            customer_bias: model.customer_bias,
            product_bias: model.product_bias,
            customer_factors: model.customer_factors,
            product_factors: model.product_factors,
            implicit_factors: model.implicit_factors,
            implicit_feedback: model.implicit_feedback,
        }
    }
}

impl From<ModelState> for SvdppModel {
    fn from(state: ModelState) -> Self {
        let customer_index =
            state.customers.iter().enumerate().map(|(index, id)| (*id, index)).collect();
        let product_index =
            state.products.iter().enumerate().map(|(index, id)| (*id, index)).collect();
        Self {
            params: state.params,
            scale: state.scale,
            global_mean: state.global_mean,
            customers: state.customers,
            products: state.products,
            customer_index,
            product_index,
            customer_bias: state.customer_bias,
            product_bias: state.product_bias,
            customer_factors: state.customer_factors,
            product_factors: state.product_factors,
            implicit_factors: state.implicit_factors,
            implicit_feedback: state.implicit_feedback,
        }
    }
}

impl SvdppModel {
    /// Confirms every vector matches the recorded dimensions. A model read
    /// from disk must pass this before it serves predictions.
    pub fn check_shape(&self) -> Result<(), DomainError> {
        let k = self.params.n_factors;
        let users = self.customers.len();
        let items = self.products.len();
        let expectations = [
            ("customer_bias", self.customer_bias.len(), users),
            ("product_bias", self.product_bias.len(), items),
            ("customer_factors", self.customer_factors.len(), users * k),
            ("product_factors", self.product_factors.len(), items * k),
            ("implicit_factors", self.implicit_factors.len(), items * k),
            ("implicit_feedback", self.implicit_feedback.len(), users * k),
            ("customer_index", self.customer_index.len(), users),
            ("product_index", self.product_index.len(), items),
        ];

        for (name, actual, expected) in expectations {
            if actual != expected {
                return Err(DomainError::InvariantViolation(format!(
                    "model field `{name}` has {actual} entries, expected {expected}"
                )));
            }
        }
        if !self.global_mean.is_finite() {
            return Err(DomainError::InvariantViolation(
                "model global mean is not finite".to_owned(),
            ));
        }
        Ok(())
    }
}
