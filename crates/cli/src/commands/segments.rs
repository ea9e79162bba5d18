use storepulse_core::config::AppConfig;
use storepulse_core::segmentation::{segment_customers, KMeans};

use super::{application_failure, load_corpus, CommandResult};

pub fn run(config: &AppConfig) -> CommandResult {
    let corpus = match load_corpus("segments", config) {
        Ok(corpus) => corpus,
        Err(failure) => return failure,
    };

    match segment_customers(&corpus, &KMeans::from(&config.segmentation)) {
        Ok(segmentation) => CommandResult::success_with(
            "segments",
            format!(
                "{} customers in {} segments",
                segmentation.assignments.len(),
                segmentation.summaries.len()
            ),
            &segmentation,
        ),
        Err(error) => application_failure("segments", error.into()),
    }
}
