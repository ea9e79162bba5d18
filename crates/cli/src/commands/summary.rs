use std::collections::BTreeMap;

use serde::Serialize;
use storepulse_core::analytics::{self, SalesBreakdown};
use storepulse_core::config::AppConfig;
use storepulse_core::errors::DomainError;
use storepulse_core::{PurchaseCorpus, PurchaseFilter};

use super::{application_failure, load_filtered_corpus, CommandResult};

#[derive(Debug, Serialize)]
struct Dashboard<'a> {
    filter: &'a PurchaseFilter,
    metrics: BTreeMap<&'static str, String>,
    categories: SalesBreakdown,
    subcategories: SalesBreakdown,
}

pub fn run(config: &AppConfig, filter: &PurchaseFilter) -> CommandResult {
    let corpus = match load_filtered_corpus("summary", config, filter) {
        Ok(corpus) => corpus,
        Err(failure) => return failure,
    };

    match build_dashboard(&corpus, filter) {
        Ok(dashboard) => CommandResult::success_with(
            "summary",
            format!("summarised {} purchase records", corpus.len()),
            &dashboard,
        ),
        Err(error) => application_failure("summary", error.into()),
    }
}

fn build_dashboard<'a>(
    corpus: &PurchaseCorpus,
    filter: &'a PurchaseFilter,
) -> Result<Dashboard<'a>, DomainError> {
    let metrics = analytics::summary_metrics(corpus)?;
    Ok(Dashboard {
        filter,
        metrics: metrics.display_rows().into_iter().collect(),
        categories: analytics::category_sales(corpus)?,
        subcategories: analytics::subcategory_sales(corpus)?,
    })
}
