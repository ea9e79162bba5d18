use storepulse_core::analytics;
use storepulse_core::config::AppConfig;
use storepulse_core::PurchaseFilter;

use super::{application_failure, load_filtered_corpus, CommandResult};

pub fn run(config: &AppConfig, filter: &PurchaseFilter) -> CommandResult {
    let corpus = match load_filtered_corpus("profitability", config, filter) {
        Ok(corpus) => corpus,
        Err(failure) => return failure,
    };

    match analytics::product_profitability(&corpus, filter.category.as_deref()) {
        Ok(report) => {
            let message = report.narrative.clone();
            CommandResult::success_with("profitability", message, &report)
        }
        Err(error) => application_failure("profitability", error.into()),
    }
}
