use storepulse_core::analytics;
use storepulse_core::config::AppConfig;

use super::{load_corpus, CommandResult};

pub fn run(config: &AppConfig, limit: Option<usize>) -> CommandResult {
    let corpus = match load_corpus("popularity", config) {
        Ok(corpus) => corpus,
        Err(failure) => return failure,
    };

    let mut popularity = analytics::product_popularity(&corpus);
    let total = popularity.len();
    if let Some(limit) = limit {
        popularity.truncate(limit);
    }

    CommandResult::success_with(
        "popularity",
        format!("{} of {total} products by total revenue", popularity.len()),
        &popularity,
    )
}
