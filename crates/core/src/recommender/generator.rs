use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::domain::customer::CustomerId;
use crate::domain::money::format_grouped;
use crate::domain::product::ProductId;
use crate::errors::DomainError;
use crate::recommender::ratings::RatedCorpus;
use crate::recommender::svdpp::{PredictionKind, RatingEstimator};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    #[serde(rename = "Product_ID")]
    pub product_id: ProductId,
    #[serde(rename = "Estimated_Rating")]
    pub estimated_rating: f64,
    #[serde(rename = "Prediction_Kind")]
    pub prediction_kind: PredictionKind,
    #[serde(rename = "Category")]
    pub category: String,
    #[serde(rename = "Subcategory")]
    pub subcategory: String,
    #[serde(rename = "Reason")]
    pub reason: String,
}

/// What the customer bought before, for reason text.
struct PurchaseHistory<'a> {
    products: HashSet<ProductId>,
    categories: HashSet<&'a str>,
    subcategories: HashSet<(&'a str, &'a str)>,
}

impl<'a> PurchaseHistory<'a> {
    fn of(customer_id: CustomerId, corpus: &'a RatedCorpus) -> Self {
        let mut history = Self {
            products: HashSet::new(),
            categories: HashSet::new(),
            subcategories: HashSet::new(),
        };
        for record in corpus.corpus().customer_records(customer_id) {
            history.products.insert(record.product_id);
            history.categories.insert(record.category.as_str());
            history.subcategories.insert((record.category.as_str(), record.subcategory.as_str()));
        }
        history
    }
}

/// Top `count` products the customer has not bought, best estimate first.
///
/// Candidates keep first-appearance order from the corpus and the sort is
/// stable, so equal estimates keep that order.
pub fn recommend<E: RatingEstimator + ?Sized>(
    customer_id: CustomerId,
    count: usize,
    corpus: &RatedCorpus,
    model: &E,
) -> Result<Vec<Recommendation>, DomainError> {
    if count == 0 {
        return Err(DomainError::InvalidRequest(
            "recommendation count must be at least 1".to_owned(),
        ));
    }

    let history = PurchaseHistory::of(customer_id, corpus);
    let mut scored: Vec<_> = corpus
        .corpus()
        .distinct_products()
        .into_iter()
        .filter(|product_id| !history.products.contains(product_id))
        .map(|product_id| (product_id, model.estimate(customer_id, product_id)))
        .collect();
    scored.sort_by(|left, right| right.1.estimate.total_cmp(&left.1.estimate));
    scored.truncate(count);

    scored
        .into_iter()
        .map(|(product_id, prediction)| {
            let metadata = corpus.catalog().metadata(product_id).ok_or_else(|| {
                DomainError::InvariantViolation(format!(
                    "product {product_id} has no catalog entry"
                ))
            })?;
            let reason = explain(
                &history,
                corpus,
                &metadata.category,
                &metadata.subcategory,
                prediction.estimate,
            );
            Ok(Recommendation {
                product_id,
                estimated_rating: prediction.estimate,
                prediction_kind: prediction.kind,
                category: metadata.category.clone(),
                subcategory: metadata.subcategory.clone(),
                reason,
            })
        })
        .collect()
}

fn explain(
    history: &PurchaseHistory<'_>,
    corpus: &RatedCorpus,
    category: &str,
    subcategory: &str,
    estimate: f64,
) -> String {
    let mut parts = Vec::with_capacity(4);
    if history.categories.contains(category) {
        parts.push(format!(
            "the customer has shown a strong interest in {category} items previously"
        ));
    }
    if history.subcategories.contains(&(category, subcategory)) {
        parts.push(format!("specifically within the {subcategory} subcategory"));
    }

    let revenue = corpus.catalog().subcategory_revenue(category, subcategory);
    parts.push(format!(
        "this product is highly popular among other customers with total revenue of ${}",
        format_grouped(revenue)
    ));
    parts.push(format!(
        "the predicted rating for this product is {estimate:.2}, indicating high satisfaction potential"
    ));

    format!("Recommended because {}.", parts.join("; "))
}
