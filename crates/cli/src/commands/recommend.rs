use storepulse_core::config::AppConfig;
use storepulse_core::{recommend, CustomerId};

use super::{application_failure, prepare_model, CommandResult};

pub fn run(config: &AppConfig, customer: i64, count: Option<usize>) -> CommandResult {
    let count = count.unwrap_or(config.recommend.default_count);
    let (model, rated) = match prepare_model("recommend", config) {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let customer_id = CustomerId(customer);
    match recommend(customer_id, count, &rated, &model) {
        Ok(recommendations) => {
            let message = if rated.corpus().contains_customer(customer_id) {
                format!("{} recommendations for customer {customer_id}", recommendations.len())
            } else {
                format!(
                    "customer {customer_id} has no purchase history; {} recommendations use bias-only estimates",
                    recommendations.len()
                )
            };
            CommandResult::success_with("recommend", message, &recommendations)
        }
        Err(error) => application_failure("recommend", error.into()),
    }
}
