//! Collaborative-filtering recommender over log-scaled purchase amounts.
//!
//! `ModelTrainer::train` turns a purchase corpus into a [`TrainedRecommender`]
//! (loading stored artifacts when they are still current) and the annotated
//! [`RatedCorpus`]; [`recommend`] ranks unpurchased products for a customer.

pub mod artifacts;
pub mod evaluation;
pub mod generator;
pub mod params;
pub mod ratings;
pub mod svdpp;
pub mod trainer;

pub use artifacts::{ArtifactState, ArtifactStore, ParamsArtifact};
pub use evaluation::{Accuracy, GridSearch, GridSearchReport};
pub use generator::{recommend, Recommendation};
pub use params::{Hyperparameters, ParameterGrid};
pub use ratings::{RatedCorpus, RatingScale, RatingSet, RatingTriple};
pub use svdpp::{Prediction, PredictionKind, RatingEstimator, SvdppModel};
pub use trainer::{ModelOrigin, ModelTrainer, TrainedRecommender, TrainerSettings, TrainingReport};
