use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::customer::CustomerId;
use crate::domain::product::ProductId;

/// One purchase event from the corpus.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRecord {
    pub customer_id: CustomerId,
    pub product_id: ProductId,
    pub category: String,
    pub subcategory: String,
    pub amount: Decimal,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub date: NaiveDate,
}

impl PurchaseRecord {
    pub fn in_category(&self, category: &str) -> bool {
        self.category == category
    }

    pub fn in_subcategory(&self, category: &str, subcategory: &str) -> bool {
        self.category == category && self.subcategory == subcategory
    }
}
