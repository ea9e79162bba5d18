//! Behavioural customer segments from spending and visit frequency.

mod kmeans;

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::config::SegmentationConfig;
use crate::corpus::PurchaseCorpus;
use crate::domain::customer::CustomerId;
use crate::domain::money::{format_currency, to_f64};
use crate::errors::DomainError;

pub use kmeans::{Clustering, KMeans};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Segment {
    #[serde(rename = "Value Seekers")]
    ValueSeekers,
    #[serde(rename = "Frequent Shoppers")]
    FrequentShoppers,
    #[serde(rename = "Occasional Buyers")]
    OccasionalBuyers,
    #[serde(rename = "High Spenders")]
    HighSpenders,
}

impl Segment {
    pub const ALL: [Segment; 4] =
        [Self::ValueSeekers, Self::FrequentShoppers, Self::OccasionalBuyers, Self::HighSpenders];

    pub fn from_cluster(cluster: usize) -> Option<Self> {
        Self::ALL.get(cluster).copied()
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::ValueSeekers => "Value Seekers",
            Self::FrequentShoppers => "Frequent Shoppers",
            Self::OccasionalBuyers => "Occasional Buyers",
            Self::HighSpenders => "High Spenders",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CustomerFeatures {
    pub customer_id: CustomerId,
    pub total_spending: Decimal,
    pub avg_spending: Decimal,
    pub total_quantity: u64,
    pub shopping_frequency: usize,
    pub avg_spend_per_item: Decimal,
}

impl CustomerFeatures {
    fn clustering_vector(&self) -> [f64; 3] {
        [
            to_f64(self.total_spending),
            self.shopping_frequency as f64,
            to_f64(self.avg_spend_per_item),
        ]
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SegmentAssignment {
    pub segment: Segment,
    pub features: CustomerFeatures,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SegmentSummary {
    pub segment: Segment,
    pub customers: usize,
    pub avg_spending: Decimal,
    pub avg_frequency: f64,
    pub avg_spend_per_item: Decimal,
    pub spends_above_average: bool,
    pub narrative: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Segmentation {
    pub assignments: Vec<SegmentAssignment>,
    pub summaries: Vec<SegmentSummary>,
    pub inertia: f64,
}

impl From<&SegmentationConfig> for KMeans {
    fn from(config: &SegmentationConfig) -> Self {
        Self {
            clusters: config.clusters,
            max_iterations: config.max_iterations,
            restarts: config.restarts,
            seed: config.seed,
        }
    }
}

#[derive(Default)]
struct Accumulator {
    spending: Decimal,
    purchases: usize,
    quantity: u64,
    dates: BTreeSet<NaiveDate>,
}

/// One feature row per customer, ordered by customer id.
pub fn customer_features(corpus: &PurchaseCorpus) -> Vec<CustomerFeatures> {
    let mut customers: BTreeMap<CustomerId, Accumulator> = BTreeMap::new();
    for record in corpus.records() {
        let entry = customers.entry(record.customer_id).or_default();
        entry.spending += record.amount;
        entry.purchases += 1;
        entry.quantity += u64::from(record.quantity);
        entry.dates.insert(record.date);
    }

    customers
        .into_iter()
        .map(|(customer_id, totals)| CustomerFeatures {
            customer_id,
            total_spending: totals.spending,
            avg_spending: totals.spending / Decimal::from(totals.purchases),
            total_quantity: totals.quantity,
            shopping_frequency: totals.dates.len(),
            avg_spend_per_item: if totals.quantity == 0 {
                Decimal::ZERO
            } else {
                totals.spending / Decimal::from(totals.quantity)
            },
        })
        .collect()
}

/// Column-wise z-scores using the population standard deviation. A constant
/// column scales by 1 so it collapses to zeros.
pub fn standardize(rows: &[[f64; 3]]) -> Vec<Vec<f64>> {
    if rows.is_empty() {
        return Vec::new();
    }
    let n = rows.len() as f64;
    let mut means = [0.0; 3];
    let mut scales = [1.0; 3];
    for column in 0..3 {
        means[column] = rows.iter().map(|row| row[column]).sum::<f64>() / n;
        let variance =
            rows.iter().map(|row| (row[column] - means[column]).powi(2)).sum::<f64>() / n;
        let std_dev = variance.sqrt();
        if std_dev > 0.0 {
            scales[column] = std_dev;
        }
    }

    rows.iter()
        .map(|row| (0..3).map(|column| (row[column] - means[column]) / scales[column]).collect())
        .collect()
}

pub fn segment_customers(
    corpus: &PurchaseCorpus,
    kmeans: &KMeans,
) -> Result<Segmentation, DomainError> {
    if kmeans.clusters > Segment::ALL.len() {
        return Err(DomainError::InvariantViolation(format!(
            "only {} named segments exist, {} clusters requested",
            Segment::ALL.len(),
            kmeans.clusters
        )));
    }

    let features = customer_features(corpus);
    let rows: Vec<[f64; 3]> = features.iter().map(CustomerFeatures::clustering_vector).collect();
    let clustering = kmeans.fit(&standardize(&rows))?;

    let assignments = features
        .into_iter()
        .zip(&clustering.assignments)
        .map(|(features, &cluster)| {
            let segment = Segment::from_cluster(cluster).ok_or_else(|| {
                DomainError::InvariantViolation(format!("cluster {cluster} has no segment name"))
            })?;
            Ok(SegmentAssignment { segment, features })
        })
        .collect::<Result<Vec<_>, DomainError>>()?;

    let summaries = Segment::ALL[..kmeans.clusters]
        .iter()
        .map(|segment| summarize(*segment, &assignments))
        .collect();

    Ok(Segmentation { assignments, summaries, inertia: clustering.inertia })
}

fn summarize(segment: Segment, assignments: &[SegmentAssignment]) -> SegmentSummary {
    let overall_mean = mean_decimal(assignments.iter().map(|a| a.features.total_spending));
    let members: Vec<&CustomerFeatures> = assignments
        .iter()
        .filter(|assignment| assignment.segment == segment)
        .map(|assignment| &assignment.features)
        .collect();

    let label = segment.label();
    if members.is_empty() {
        return SegmentSummary {
            segment,
            customers: 0,
            avg_spending: Decimal::ZERO,
            avg_frequency: 0.0,
            avg_spend_per_item: Decimal::ZERO,
            spends_above_average: false,
            narrative: format!("The '{label}' segment has 0 customers."),
        };
    }

    let avg_spending = mean_decimal(members.iter().map(|features| features.total_spending));
    let avg_spend_per_item =
        mean_decimal(members.iter().map(|features| features.avg_spend_per_item));
    let avg_frequency =
        members.iter().map(|features| features.shopping_frequency as f64).sum::<f64>()
            / members.len() as f64;
    let spends_above_average = avg_spending > overall_mean;

    let narrative = format!(
        "The '{label}' segment has {} customers. On average, customers in this segment spend {} \
         across {avg_frequency:.1} shopping trips, with an average spend per item of {}. This \
         indicates that {} tend to exhibit {} spending patterns compared to other segments.",
        members.len(),
        format_currency(avg_spending),
        format_currency(avg_spend_per_item),
        label.to_lowercase(),
        if spends_above_average { "higher" } else { "lower" },
    );

    SegmentSummary {
        segment,
        customers: members.len(),
        avg_spending,
        avg_frequency,
        avg_spend_per_item,
        spends_above_average,
        narrative,
    }
}

fn mean_decimal(values: impl Iterator<Item = Decimal>) -> Decimal {
    let (sum, count) =
        values.fold((Decimal::ZERO, 0u64), |(sum, count), value| (sum + value, count + 1));
    if count == 0 {
        Decimal::ZERO
    } else {
        sum / Decimal::from(count)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use super::{customer_features, segment_customers, standardize, KMeans, Segment};
    use crate::corpus::PurchaseCorpus;
    use crate::domain::customer::CustomerId;
    use crate::domain::product::ProductId;
    use crate::domain::purchase::PurchaseRecord;
    use crate::errors::DomainError;

    fn record(customer: i64, amount: i64, quantity: u32, day: u32) -> PurchaseRecord {
        let amount = Decimal::from(amount);
        PurchaseRecord {
            customer_id: CustomerId(customer),
            product_id: ProductId(1),
            category: "Sports".to_owned(),
            subcategory: "Running".to_owned(),
            amount,
            quantity,
            unit_price: amount / Decimal::from(quantity),
            date: NaiveDate::from_ymd_opt(2024, 7, day).unwrap_or_default(),
        }
    }

    fn corpus() -> PurchaseCorpus {
        let mut records = Vec::new();
        for customer in 1..=8 {
            let visits = if customer % 2 == 0 { 4 } else { 1 };
            for day in 1..=visits {
                records.push(record(customer, 40 * customer, 1 + (customer as u32 % 3), day));
            }
        }
        PurchaseCorpus::new(records)
    }

    fn kmeans(clusters: usize) -> KMeans {
        KMeans { clusters, max_iterations: 300, restarts: 10, seed: 42 }
    }

    #[test]
    fn features_count_distinct_visit_dates() {
        let corpus = PurchaseCorpus::new(vec![
            record(5, 100, 2, 3),
            record(5, 50, 3, 3),
            record(5, 30, 1, 9),
        ]);
        let features = customer_features(&corpus);

        assert_eq!(features.len(), 1);
        let row = &features[0];
        assert_eq!(row.total_spending, Decimal::from(180));
        assert_eq!(row.avg_spending, Decimal::from(60));
        assert_eq!(row.total_quantity, 6);
        assert_eq!(row.shopping_frequency, 2);
        assert_eq!(row.avg_spend_per_item, Decimal::from(30));
    }

    #[test]
    fn standardize_handles_constant_columns() {
        let scaled = standardize(&[[1.0, 5.0, 2.0], [3.0, 5.0, 2.0]]);
        assert_eq!(scaled, vec![vec![-1.0, 0.0, 0.0], vec![1.0, 0.0, 0.0]]);
    }

    #[test]
    fn every_customer_lands_in_a_named_segment() {
        let segmentation = segment_customers(&corpus(), &kmeans(4)).expect("segments");

        assert_eq!(segmentation.assignments.len(), 8);
        assert_eq!(segmentation.summaries.len(), 4);
        let counted: usize = segmentation.summaries.iter().map(|summary| summary.customers).sum();
        assert_eq!(counted, 8);
        for summary in &segmentation.summaries {
            if summary.customers > 0 {
                assert!(summary.narrative.starts_with(&format!(
                    "The '{}' segment has {} customers.",
                    summary.segment.label(),
                    summary.customers
                )));
            }
        }
    }

    #[test]
    fn seeded_segmentation_is_reproducible() {
        let first = segment_customers(&corpus(), &kmeans(3)).expect("segments");
        let second = segment_customers(&corpus(), &kmeans(3)).expect("segments");
        assert_eq!(first, second);
    }

    #[test]
    fn too_few_customers_is_insufficient() {
        let corpus = PurchaseCorpus::new(vec![record(1, 10, 1, 1), record(2, 20, 1, 1)]);
        let error = segment_customers(&corpus, &kmeans(4)).expect_err("two customers");
        assert_eq!(error, DomainError::insufficient("customers", 4, 2));
    }

    #[test]
    fn cluster_indices_map_to_labels() {
        assert_eq!(Segment::from_cluster(0), Some(Segment::ValueSeekers));
        assert_eq!(Segment::from_cluster(3), Some(Segment::HighSpenders));
        assert_eq!(Segment::from_cluster(4), None);
        assert_eq!(
            serde_json::to_value(Segment::FrequentShoppers).expect("json"),
            "Frequent Shoppers"
        );
    }
}
