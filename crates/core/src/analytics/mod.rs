//! Revenue and popularity aggregates over the purchase corpus.
//!
//! Groupings iterate in key order, so every "top" pick resolves ties to the
//! smallest key.

use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::corpus::PurchaseCorpus;
use crate::domain::customer::CustomerId;
use crate::domain::money::{format_currency, format_plain};
use crate::domain::product::ProductId;
use crate::domain::purchase::PurchaseRecord;
use crate::errors::DomainError;

/// A product shown together with its subcategory, e.g. `42 (Laptops)`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ProductLabel {
    pub product_id: ProductId,
    pub subcategory: String,
}

impl fmt::Display for ProductLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.product_id, self.subcategory)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SummaryMetrics {
    pub total_revenue: Decimal,
    pub avg_revenue_per_unit: Decimal,
    pub top_category: String,
    pub best_selling_product: ProductLabel,
    pub most_profitable_product: ProductLabel,
}

impl SummaryMetrics {
    /// Headline figures formatted for display.
    pub fn display_rows(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Total Revenue", format_currency(self.total_revenue)),
            ("Avg Revenue Per Unit", format!("${}", format_plain(self.avg_revenue_per_unit))),
            ("Top Category", self.top_category.clone()),
            ("Best Selling Product", self.best_selling_product.to_string()),
            ("Most Profitable Product", self.most_profitable_product.to_string()),
        ]
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct GroupSales {
    pub name: String,
    pub revenue: Decimal,
    pub units: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SalesBreakdown {
    pub groups: Vec<GroupSales>,
    pub narrative: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProductPopularity {
    pub product_id: ProductId,
    pub total_units: u64,
    pub total_revenue: Decimal,
    pub average_price: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProductProfit {
    pub label: ProductLabel,
    pub units: u64,
    pub revenue: Decimal,
    pub avg_revenue_per_unit: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProfitabilityReport {
    pub category: Option<String>,
    pub products: Vec<ProductProfit>,
    pub narrative: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CustomerSummary {
    pub customer_id: CustomerId,
    pub purchases: usize,
    pub total_spending: Decimal,
    pub average_spending: Decimal,
    pub total_quantity: u64,
    pub narrative: String,
}

#[derive(Default)]
struct Totals {
    revenue: Decimal,
    units: u64,
}

impl Totals {
    fn add(&mut self, revenue: Decimal, units: u32) {
        self.revenue += revenue;
        self.units += u64::from(units);
    }

    fn revenue_per_unit(&self) -> Decimal {
        if self.units == 0 {
            Decimal::ZERO
        } else {
            self.revenue / Decimal::from(self.units)
        }
    }
}

fn by_product_and_subcategory<'a>(
    records: impl Iterator<Item = &'a PurchaseRecord>,
) -> BTreeMap<ProductLabel, Totals> {
    let mut groups: BTreeMap<ProductLabel, Totals> = BTreeMap::new();
    for record in records {
        groups
            .entry(ProductLabel {
                product_id: record.product_id,
                subcategory: record.subcategory.clone(),
            })
            .or_default()
            .add(record.amount, record.quantity);
    }
    groups
}

/// Key with the strictly largest value; the first (smallest) key wins ties.
fn first_max_by<K, V, F, O>(groups: &BTreeMap<K, V>, score: F) -> Option<(&K, &V)>
where
    F: Fn(&V) -> O,
    O: PartialOrd,
{
    let mut best: Option<(&K, &V)> = None;
    for (key, value) in groups {
        match best {
            Some((_, current)) if score(value) <= score(current) => {}
            _ => best = Some((key, value)),
        }
    }
    best
}

fn require_records(corpus: &PurchaseCorpus) -> Result<(), DomainError> {
    if corpus.is_empty() {
        return Err(DomainError::insufficient("purchase records", 1, 0));
    }
    Ok(())
}

pub fn summary_metrics(corpus: &PurchaseCorpus) -> Result<SummaryMetrics, DomainError> {
    require_records(corpus)?;

    let mut overall = Totals::default();
    let mut categories: BTreeMap<&str, Totals> = BTreeMap::new();
    for record in corpus.records() {
        overall.add(record.amount, record.quantity);
        categories.entry(record.category.as_str()).or_default().add(record.amount, record.quantity);
    }
    let products = by_product_and_subcategory(corpus.records().iter());

    let missing = || DomainError::InvariantViolation("no groups in non-empty corpus".to_owned());
    let (top_category, _) = first_max_by(&categories, |totals| totals.revenue).ok_or_else(missing)?;
    let (best_selling, _) = first_max_by(&products, |totals| totals.units).ok_or_else(missing)?;
    let (most_profitable, _) =
        first_max_by(&products, Totals::revenue_per_unit).ok_or_else(missing)?;

    Ok(SummaryMetrics {
        total_revenue: overall.revenue,
        avg_revenue_per_unit: overall.revenue_per_unit(),
        top_category: (*top_category).to_owned(),
        best_selling_product: best_selling.clone(),
        most_profitable_product: most_profitable.clone(),
    })
}

pub fn category_sales(corpus: &PurchaseCorpus) -> Result<SalesBreakdown, DomainError> {
    require_records(corpus)?;
    let groups = grouped_sales(corpus, |record| record.category.as_str());
    let top = top_group(&groups)?;
    let narrative = format!(
        "The category '{}' accounts for the highest sales, contributing {} to total revenue. \
         This highlights a key area for further investment and promotion.",
        top.name,
        format_currency(top.revenue)
    );
    Ok(SalesBreakdown { groups, narrative })
}

pub fn subcategory_sales(corpus: &PurchaseCorpus) -> Result<SalesBreakdown, DomainError> {
    require_records(corpus)?;
    let groups = grouped_sales(corpus, |record| record.subcategory.as_str());
    let top = top_group(&groups)?;
    let narrative = format!(
        "The subcategory '{}' leads in revenue with {}, selling a total of {} units.",
        top.name,
        format_currency(top.revenue),
        top.units
    );
    Ok(SalesBreakdown { groups, narrative })
}

fn grouped_sales<'a>(
    corpus: &'a PurchaseCorpus,
    key: impl Fn(&'a PurchaseRecord) -> &'a str,
) -> Vec<GroupSales> {
    let mut totals: BTreeMap<&str, Totals> = BTreeMap::new();
    for record in corpus.records() {
        totals.entry(key(record)).or_default().add(record.amount, record.quantity);
    }
    totals
        .into_iter()
        .map(|(name, totals)| GroupSales {
            name: name.to_owned(),
            revenue: totals.revenue,
            units: totals.units,
        })
        .collect()
}

fn top_group(groups: &[GroupSales]) -> Result<&GroupSales, DomainError> {
    let mut best: Option<&GroupSales> = None;
    for group in groups {
        match best {
            Some(current) if group.revenue <= current.revenue => {}
            _ => best = Some(group),
        }
    }
    best.ok_or_else(|| DomainError::insufficient("sales groups", 1, 0))
}

/// Units, revenue and mean unit price per product, highest revenue first.
pub fn product_popularity(corpus: &PurchaseCorpus) -> Vec<ProductPopularity> {
    let mut groups: BTreeMap<ProductId, (Totals, Decimal, usize)> = BTreeMap::new();
    for record in corpus.records() {
        let (totals, price_sum, rows) = groups.entry(record.product_id).or_default();
        totals.add(record.amount, record.quantity);
        *price_sum += record.unit_price;
        *rows += 1;
    }

    let mut popularity: Vec<ProductPopularity> = groups
        .into_iter()
        .map(|(product_id, (totals, price_sum, rows))| ProductPopularity {
            product_id,
            total_units: totals.units,
            total_revenue: totals.revenue,
            average_price: price_sum / Decimal::from(rows),
        })
        .collect();
    popularity.sort_by(|left, right| right.total_revenue.cmp(&left.total_revenue));
    popularity
}

pub fn product_profitability(
    corpus: &PurchaseCorpus,
    category: Option<&str>,
) -> Result<ProfitabilityReport, DomainError> {
    let groups = by_product_and_subcategory(
        corpus
            .records()
            .iter()
            .filter(|record| category.map_or(true, |category| record.in_category(category))),
    );

    let Some((top_label, top_totals)) = first_max_by(&groups, |totals| totals.revenue) else {
        return Err(match category {
            Some(category) => {
                DomainError::InvalidRequest(format!("no purchases in category `{category}`"))
            }
            None => DomainError::insufficient("purchase records", 1, 0),
        });
    };
    let narrative = format!(
        "The product '{top_label}' generated the highest revenue of {}. The average revenue per \
         unit for this product is ${}. This indicates strong performance in terms of sales and \
         profitability.",
        format_currency(top_totals.revenue),
        format_plain(top_totals.revenue_per_unit())
    );

    let products = groups
        .iter()
        .map(|(label, totals)| ProductProfit {
            label: label.clone(),
            units: totals.units,
            revenue: totals.revenue,
            avg_revenue_per_unit: totals.revenue_per_unit(),
        })
        .collect();

    Ok(ProfitabilityReport { category: category.map(str::to_owned), products, narrative })
}

pub fn customer_summary(
    corpus: &PurchaseCorpus,
    customer_id: CustomerId,
) -> Result<CustomerSummary, DomainError> {
    let mut totals = Totals::default();
    let mut purchases = 0usize;
    for record in corpus.customer_records(customer_id) {
        totals.add(record.amount, record.quantity);
        purchases += 1;
    }
    if purchases == 0 {
        return Err(DomainError::InvalidRequest(format!(
            "customer {customer_id} has no purchases in the corpus"
        )));
    }

    let average_spending = totals.revenue / Decimal::from(purchases);
    let narrative = format!(
        "Customer {customer_id} has spent a total of {} across {} items purchased. \
         Their average spending per purchase is {}.",
        format_currency(totals.revenue),
        totals.units,
        format_currency(average_spending)
    );

    Ok(CustomerSummary {
        customer_id,
        purchases,
        total_spending: totals.revenue,
        average_spending,
        total_quantity: totals.units,
        narrative,
    })
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use super::{
        category_sales, customer_summary, product_popularity, product_profitability,
        subcategory_sales, summary_metrics,
    };
    use crate::corpus::PurchaseCorpus;
    use crate::domain::customer::CustomerId;
    use crate::domain::product::ProductId;
    use crate::domain::purchase::PurchaseRecord;
    use crate::errors::DomainError;

    fn record(
        customer: i64,
        product: i64,
        category: &str,
        subcategory: &str,
        amount: i64,
        quantity: u32,
    ) -> PurchaseRecord {
        let amount = Decimal::from(amount);
        PurchaseRecord {
            customer_id: CustomerId(customer),
            product_id: ProductId(product),
            category: category.to_owned(),
            subcategory: subcategory.to_owned(),
            amount,
            quantity,
            unit_price: amount / Decimal::from(quantity),
            date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap_or_default(),
        }
    }

    fn corpus() -> PurchaseCorpus {
        PurchaseCorpus::new(vec![
            record(1, 10, "Electronics", "Laptops", 1800, 2),
            record(2, 11, "Electronics", "Headphones", 300, 3),
            record(1, 12, "Books", "Fiction", 60, 4),
            record(3, 11, "Electronics", "Headphones", 200, 2),
            record(3, 13, "Beauty", "Skincare", 45, 1),
        ])
    }

    #[test]
    fn summary_picks_leaders() {
        let metrics = summary_metrics(&corpus()).expect("metrics");

        assert_eq!(metrics.total_revenue, Decimal::from(2405));
        assert_eq!(metrics.top_category, "Electronics");
        assert_eq!(metrics.best_selling_product.to_string(), "11 (Headphones)");
        assert_eq!(metrics.most_profitable_product.to_string(), "10 (Laptops)");

        let rows = metrics.display_rows();
        assert_eq!(rows[0], ("Total Revenue", "$2,405.00".to_owned()));
        assert_eq!(rows[1], ("Avg Revenue Per Unit", "$200.42".to_owned()));
    }

    #[test]
    fn ties_resolve_to_smallest_key() {
        let corpus = PurchaseCorpus::new(vec![
            record(1, 5, "Toys", "Puzzles", 50, 5),
            record(1, 3, "Garden", "Tools", 50, 5),
        ]);
        let metrics = summary_metrics(&corpus).expect("metrics");

        assert_eq!(metrics.top_category, "Garden");
        assert_eq!(metrics.best_selling_product.product_id, ProductId(3));
        assert_eq!(metrics.most_profitable_product.product_id, ProductId(3));
    }

    #[test]
    fn empty_corpus_has_no_summary() {
        let error = summary_metrics(&PurchaseCorpus::new(Vec::new())).expect_err("empty");
        assert!(matches!(error, DomainError::InsufficientData { .. }));
    }

    #[test]
    fn category_and_subcategory_narratives() {
        let categories = category_sales(&corpus()).expect("categories");
        assert_eq!(categories.groups.len(), 3);
        assert_eq!(
            categories.narrative,
            "The category 'Electronics' accounts for the highest sales, contributing $2,300.00 to \
             total revenue. This highlights a key area for further investment and promotion."
        );

        let subcategories = subcategory_sales(&corpus()).expect("subcategories");
        assert_eq!(
            subcategories.narrative,
            "The subcategory 'Laptops' leads in revenue with $1,800.00, selling a total of 2 units."
        );
    }

    #[test]
    fn popularity_sorted_by_revenue() {
        let popularity = product_popularity(&corpus());

        let ids: Vec<_> = popularity.iter().map(|row| row.product_id.0).collect();
        assert_eq!(ids, vec![10, 11, 12, 13]);
        let headphones = &popularity[1];
        assert_eq!(headphones.total_units, 5);
        assert_eq!(headphones.total_revenue, Decimal::from(500));
        assert_eq!(headphones.average_price, Decimal::from(100));
    }

    #[test]
    fn profitability_filters_by_category() {
        let report = product_profitability(&corpus(), Some("Electronics")).expect("report");
        assert_eq!(report.products.len(), 2);
        assert_eq!(
            report.narrative,
            "The product '10 (Laptops)' generated the highest revenue of $1,800.00. The average \
             revenue per unit for this product is $900.00. This indicates strong performance in \
             terms of sales and profitability."
        );

        let error = product_profitability(&corpus(), Some("Garden")).expect_err("no rows");
        assert!(matches!(error, DomainError::InvalidRequest(_)));
    }

    #[test]
    fn customer_summary_narrative() {
        let summary = customer_summary(&corpus(), CustomerId(1)).expect("summary");
        assert_eq!(summary.purchases, 2);
        assert_eq!(
            summary.narrative,
            "Customer 1 has spent a total of $1,860.00 across 6 items purchased. Their average \
             spending per purchase is $930.00."
        );

        assert!(customer_summary(&corpus(), CustomerId(404)).is_err());
    }
}
