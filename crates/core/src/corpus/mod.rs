//! Purchase corpus ingestion.
//!
//! The corpus is the sole input to analytics, segmentation and the
//! recommender. It is loaded once from a header-driven CSV file and is
//! immutable afterwards.

mod filter;

pub use filter::PurchaseFilter;

use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord};
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};

use crate::domain::customer::CustomerId;
use crate::domain::product::ProductId;
use crate::domain::purchase::PurchaseRecord;
use crate::errors::{ApplicationError, DomainError};

pub const CUSTOMER_ID: &str = "Customer_ID";
pub const PRODUCT_ID: &str = "Product_ID";
pub const CATEGORY: &str = "Category";
pub const SUBCATEGORY: &str = "Subcategory";
pub const PURCHASE_AMOUNT: &str = "Purchase_Amount";
pub const PURCHASE_QUANTITY: &str = "Purchase_Quantity";
pub const PURCHASE_DATE: &str = "Purchase_Date";
pub const UNIT_PRICE: &str = "Unit_Price";

pub const REQUIRED_COLUMNS: [&str; 7] = [
    CUSTOMER_ID,
    PRODUCT_ID,
    CATEGORY,
    SUBCATEGORY,
    PURCHASE_AMOUNT,
    PURCHASE_QUANTITY,
    PURCHASE_DATE,
];

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PurchaseCorpus {
    records: Vec<PurchaseRecord>,
}

struct ColumnIndex {
    customer_id: usize,
    product_id: usize,
    category: usize,
    subcategory: usize,
    amount: usize,
    quantity: usize,
    date: usize,
    unit_price: Option<usize>,
}

impl PurchaseCorpus {
    pub fn new(records: Vec<PurchaseRecord>) -> Self {
        Self { records }
    }

    pub fn from_csv_path(path: &Path) -> Result<Self, ApplicationError> {
        let reader = ReaderBuilder::new().trim(csv::Trim::All).from_path(path).map_err(|error| {
            ApplicationError::Persistence(format!(
                "could not open purchase corpus `{}`: {error}",
                path.display()
            ))
        })?;
        Self::from_csv_reader(reader)
    }

    pub fn from_reader<R: Read>(input: R) -> Result<Self, ApplicationError> {
        Self::from_csv_reader(ReaderBuilder::new().trim(csv::Trim::All).from_reader(input))
    }

    fn from_csv_reader<R: Read>(mut reader: csv::Reader<R>) -> Result<Self, ApplicationError> {
        let headers = reader.headers().map_err(read_failure)?.clone();
        let columns = ColumnIndex::resolve(&headers)?;

        let mut records = Vec::new();
        for row in reader.records() {
            let row = row.map_err(read_failure)?;
            let line = row.position().map(|position| position.line()).unwrap_or_default();
            records.push(columns.parse(&row, line)?);
        }

        Ok(Self { records })
    }

    pub fn records(&self) -> &[PurchaseRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn customer_records(
        &self,
        customer_id: CustomerId,
    ) -> impl Iterator<Item = &PurchaseRecord> + '_ {
        self.records.iter().filter(move |record| record.customer_id == customer_id)
    }

    pub fn contains_customer(&self, customer_id: CustomerId) -> bool {
        self.records.iter().any(|record| record.customer_id == customer_id)
    }

    /// Distinct products in order of first appearance.
    pub fn distinct_products(&self) -> Vec<ProductId> {
        let mut seen = HashSet::new();
        self.records
            .iter()
            .filter(|record| seen.insert(record.product_id))
            .map(|record| record.product_id)
            .collect()
    }

    /// Distinct customers in order of first appearance.
    pub fn distinct_customers(&self) -> Vec<CustomerId> {
        let mut seen = HashSet::new();
        self.records
            .iter()
            .filter(|record| seen.insert(record.customer_id))
            .map(|record| record.customer_id)
            .collect()
    }

    /// Content hash over every record in corpus order, formatted `sha256:<hex>`.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for record in &self.records {
            hasher.update(
                format!(
                    "{}|{}|{}|{}|{}|{}|{}|{}\n",
                    record.customer_id,
                    record.product_id,
                    record.category,
                    record.subcategory,
                    record.amount.normalize(),
                    record.quantity,
                    record.unit_price.normalize(),
                    record.date
                )
                .as_bytes(),
            );
        }
        format!("sha256:{:x}", hasher.finalize())
    }
}

impl ColumnIndex {
    fn resolve(headers: &StringRecord) -> Result<Self, DomainError> {
        let position = |name: &str| headers.iter().position(|header| header == name);

        let missing: Vec<String> = REQUIRED_COLUMNS
            .iter()
            .filter(|name| position(**name).is_none())
            .map(|name| (*name).to_owned())
            .collect();
        if !missing.is_empty() {
            return Err(DomainError::MissingColumns(missing));
        }

        let required = |name: &str| {
            position(name).ok_or_else(|| DomainError::MissingColumns(vec![name.to_owned()]))
        };

        Ok(Self {
            customer_id: required(CUSTOMER_ID)?,
            product_id: required(PRODUCT_ID)?,
            category: required(CATEGORY)?,
            subcategory: required(SUBCATEGORY)?,
            amount: required(PURCHASE_AMOUNT)?,
            quantity: required(PURCHASE_QUANTITY)?,
            date: required(PURCHASE_DATE)?,
            unit_price: position(UNIT_PRICE),
        })
    }

    fn parse(&self, row: &StringRecord, line: u64) -> Result<PurchaseRecord, DomainError> {
        let field = |index: usize, name: &str| required_field(row, index, name, line);
        let invalid = |name: &str, value: &str| DomainError::InvalidRecord {
            line,
            message: format!("`{name}` has unparseable value `{value}`"),
        };

        let raw = field(self.customer_id, CUSTOMER_ID)?;
        let customer_id = raw.parse::<i64>().map_err(|_| invalid(CUSTOMER_ID, raw))?;

        let raw = field(self.product_id, PRODUCT_ID)?;
        let product_id = raw.parse::<i64>().map_err(|_| invalid(PRODUCT_ID, raw))?;

        let category = field(self.category, CATEGORY)?.to_owned();
        let subcategory = field(self.subcategory, SUBCATEGORY)?.to_owned();

        let raw = field(self.amount, PURCHASE_AMOUNT)?;
        let amount = raw.parse::<Decimal>().map_err(|_| invalid(PURCHASE_AMOUNT, raw))?;
        if amount <= Decimal::ZERO {
            return Err(DomainError::InvalidRecord {
                line,
                message: format!("`{PURCHASE_AMOUNT}` must be positive, got {amount}"),
            });
        }

        let raw = field(self.quantity, PURCHASE_QUANTITY)?;
        let quantity = raw.parse::<u32>().map_err(|_| invalid(PURCHASE_QUANTITY, raw))?;
        if quantity == 0 {
            return Err(DomainError::InvalidRecord {
                line,
                message: format!("`{PURCHASE_QUANTITY}` must be at least 1"),
            });
        }

        let raw = field(self.date, PURCHASE_DATE)?;
        let date = parse_date(raw).ok_or_else(|| invalid(PURCHASE_DATE, raw))?;

        let unit_price = match self.unit_price.and_then(|index| row.get(index)) {
            Some(raw) if !raw.is_empty() => {
                raw.parse::<Decimal>().map_err(|_| invalid(UNIT_PRICE, raw))?
            }
            _ => (amount / Decimal::from(quantity)).round_dp(2),
        };

        Ok(PurchaseRecord {
            customer_id: CustomerId(customer_id),
            product_id: ProductId(product_id),
            category,
            subcategory,
            amount,
            quantity,
            unit_price,
            date,
        })
    }
}

fn required_field<'r>(
    row: &'r StringRecord,
    index: usize,
    name: &str,
    line: u64,
) -> Result<&'r str, DomainError> {
    row.get(index).filter(|value| !value.is_empty()).ok_or_else(|| DomainError::InvalidRecord {
        line,
        message: format!("missing value for `{name}`"),
    })
}

// Accepts a bare date or a timestamp whose first ten characters are the date.
fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok().or_else(|| {
        raw.get(..10).and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
    })
}

fn read_failure(error: csv::Error) -> ApplicationError {
    ApplicationError::Persistence(format!("could not read purchase corpus: {error}"))
}
