use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;

use crate::corpus::PurchaseCorpus;
use crate::domain::purchase::PurchaseRecord;
use crate::errors::DomainError;

/// Date-range and category restriction applied before analytics.
///
/// Both date bounds are inclusive. An empty filter keeps every record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PurchaseFilter {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub category: Option<String>,
}

impl PurchaseFilter {
    pub fn is_empty(&self) -> bool {
        self.start.is_none() && self.end.is_none() && self.category.is_none()
    }

    pub fn matches(&self, record: &PurchaseRecord) -> bool {
        self.start.map_or(true, |start| record.date >= start)
            && self.end.map_or(true, |end| record.date <= end)
            && self.category.as_deref().map_or(true, |category| record.in_category(category))
    }

    /// Returns the records that pass the filter, in corpus order.
    pub fn apply(&self, corpus: &PurchaseCorpus) -> Result<PurchaseCorpus, DomainError> {
        if let (Some(start), Some(end)) = (self.start, self.end) {
            if start > end {
                return Err(DomainError::InvalidRequest(format!(
                    "start date {start} is after end date {end}"
                )));
            }
        }
        if self.is_empty() {
            return Ok(corpus.clone());
        }

        let records: Vec<PurchaseRecord> =
            corpus.records().iter().filter(|record| self.matches(record)).cloned().collect();
        if records.is_empty() && !corpus.is_empty() {
            return Err(DomainError::InvalidRequest(format!("no purchases match {self}")));
        }
        Ok(PurchaseCorpus::new(records))
    }
}

impl fmt::Display for PurchaseFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(start) = self.start {
            parts.push(format!("from {start}"));
        }
        if let Some(end) = self.end {
            parts.push(format!("to {end}"));
        }
        if let Some(category) = &self.category {
            parts.push(format!("category `{category}`"));
        }
        if parts.is_empty() {
            f.write_str("all purchases")
        } else {
            write!(f, "the filter {}", parts.join(", "))
        }
    }
}
