use serde::{Deserialize, Serialize};

use crate::catalog::ProductCatalog;
use crate::corpus::PurchaseCorpus;
use crate::domain::customer::CustomerId;
use crate::domain::money;
use crate::domain::product::ProductId;
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RatingTriple {
    pub customer_id: CustomerId,
    pub product_id: ProductId,
    pub rating: f64,
}

/// Inclusive bounds every prediction is clipped to.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RatingScale {
    pub min: f64,
    pub max: f64,
}

impl RatingScale {
    pub fn clip(&self, value: f64) -> f64 {
        value.max(self.min).min(self.max)
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Purchase amounts compress to `ln(1 + amount)` before they act as ratings.
pub fn scale_amount(amount: f64) -> f64 {
    amount.ln_1p()
}

pub fn unscale_rating(rating: f64) -> f64 {
    rating.exp_m1()
}

#[derive(Clone, Debug, PartialEq)]
pub struct RatingSet {
    triples: Vec<RatingTriple>,
    scale: RatingScale,
}

impl RatingSet {
    /// One triple per purchase record, in corpus order. Repeated
    /// (customer, product) pairs stay separate observations.
    pub fn from_corpus(corpus: &PurchaseCorpus) -> Result<Self, DomainError> {
        let triples = corpus
            .records()
            .iter()
            .map(|record| RatingTriple {
                customer_id: record.customer_id,
                product_id: record.product_id,
                rating: scale_amount(money::to_f64(record.amount)),
            })
            .collect();
        Self::from_triples(triples)
    }

    pub fn from_triples(triples: Vec<RatingTriple>) -> Result<Self, DomainError> {
        let Some(first) = triples.first() else {
            return Err(DomainError::insufficient("ratings", 1, 0));
        };

        let mut scale = RatingScale { min: first.rating, max: first.rating };
        for triple in &triples {
            if !triple.rating.is_finite() {
                return Err(DomainError::InvariantViolation(format!(
                    "rating for customer {} and product {} is not finite",
                    triple.customer_id, triple.product_id
                )));
            }
            scale.min = scale.min.min(triple.rating);
            scale.max = scale.max.max(triple.rating);
        }

        Ok(Self { triples, scale })
    }

    pub fn triples(&self) -> &[RatingTriple] {
        &self.triples
    }

    pub fn scale(&self) -> RatingScale {
        self.scale
    }

    pub fn len(&self) -> usize {
        self.triples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    /// Triples at the given positions, in the order the positions are listed.
    pub fn select(&self, positions: &[usize]) -> Vec<RatingTriple> {
        positions.iter().filter_map(|&position| self.triples.get(position).copied()).collect()
    }
}

/// The corpus annotated with its scaled ratings and product catalog.
#[derive(Clone, Debug)]
pub struct RatedCorpus {
    corpus: PurchaseCorpus,
    ratings: RatingSet,
    catalog: ProductCatalog,
}

impl RatedCorpus {
    pub fn new(corpus: PurchaseCorpus) -> Result<Self, DomainError> {
        let ratings = RatingSet::from_corpus(&corpus)?;
        let catalog = ProductCatalog::from_corpus(&corpus);
        Ok(Self { corpus, ratings, catalog })
    }

    pub fn corpus(&self) -> &PurchaseCorpus {
        &self.corpus
    }

    pub fn ratings(&self) -> &RatingSet {
        &self.ratings
    }

    pub fn catalog(&self) -> &ProductCatalog {
        &self.catalog
    }

    pub fn scale(&self) -> RatingScale {
        self.ratings.scale()
    }
}
