use storepulse_core::analytics;
use storepulse_core::config::AppConfig;
use storepulse_core::{CustomerId, PurchaseFilter};

use super::{application_failure, load_filtered_corpus, CommandResult};

pub fn run(config: &AppConfig, customer: i64, filter: &PurchaseFilter) -> CommandResult {
    let corpus = match load_filtered_corpus("customer", config, filter) {
        Ok(corpus) => corpus,
        Err(failure) => return failure,
    };

    match analytics::customer_summary(&corpus, CustomerId(customer)) {
        Ok(summary) => {
            let message = summary.narrative.clone();
            CommandResult::success_with("customer", message, &summary)
        }
        Err(error) => application_failure("customer", error.into()),
    }
}
