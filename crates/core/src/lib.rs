pub mod analytics;
pub mod catalog;
pub mod config;
pub mod corpus;
pub mod domain;
pub mod errors;
pub mod recommender;
pub mod segmentation;

pub use analytics::{
    CustomerSummary, ProductPopularity, ProfitabilityReport, SalesBreakdown, SummaryMetrics,
};
pub use catalog::ProductCatalog;
pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions};
pub use corpus::{PurchaseCorpus, PurchaseFilter};
pub use domain::customer::CustomerId;
pub use domain::product::{ProductId, ProductMetadata};
pub use domain::purchase::PurchaseRecord;
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use recommender::{
    recommend, ModelOrigin, ModelTrainer, PredictionKind, RatedCorpus, Recommendation,
    TrainedRecommender,
};
pub use segmentation::{segment_customers, Segment, Segmentation};
