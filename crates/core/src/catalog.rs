use std::collections::HashMap;

use rust_decimal::Decimal;

use crate::corpus::PurchaseCorpus;
use crate::domain::product::{ProductId, ProductMetadata};

/// Product placement and subcategory revenue, built once per corpus load.
#[derive(Clone, Debug, Default)]
pub struct ProductCatalog {
    products: HashMap<ProductId, ProductMetadata>,
    revenue_by_subcategory: HashMap<(String, String), Decimal>,
}

impl ProductCatalog {
    pub fn from_corpus(corpus: &PurchaseCorpus) -> Self {
        let mut products = HashMap::new();
        let mut revenue_by_subcategory: HashMap<(String, String), Decimal> = HashMap::new();

        for record in corpus.records() {
            // First row seen for a product decides its placement.
            products.entry(record.product_id).or_insert_with(|| ProductMetadata {
                category: record.category.clone(),
                subcategory: record.subcategory.clone(),
            });

            *revenue_by_subcategory
                .entry((record.category.clone(), record.subcategory.clone()))
                .or_default() += record.amount;
        }

        Self { products, revenue_by_subcategory }
    }

    pub fn metadata(&self, product_id: ProductId) -> Option<&ProductMetadata> {
        self.products.get(&product_id)
    }

    /// Revenue across all customers for a (category, subcategory) pair.
    pub fn subcategory_revenue(&self, category: &str, subcategory: &str) -> Decimal {
        self.revenue_by_subcategory
            .get(&(category.to_owned(), subcategory.to_owned()))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}
