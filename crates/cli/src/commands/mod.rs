pub mod config;
pub mod customer;
pub mod doctor;
pub mod popularity;
pub mod profitability;
pub mod recommend;
pub mod segments;
pub mod summary;
pub mod train;

use serde::Serialize;
use serde_json::Value;
use storepulse_core::config::AppConfig;
use storepulse_core::errors::{ApplicationError, DomainError};
use storepulse_core::{
    ModelTrainer, PurchaseCorpus, PurchaseFilter, RatedCorpus, TrainedRecommender,
};

pub const EXIT_OK: u8 = 0;
pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_DATA: u8 = 3;
pub const EXIT_MODEL: u8 = 4;
pub const EXIT_REQUEST: u8 = 5;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            hint: None,
            data: None,
        };
        Self { exit_code: EXIT_OK, output: serialize_payload(payload) }
    }

    pub fn success_with<T: Serialize>(command: &str, message: impl Into<String>, data: &T) -> Self {
        let data = match serde_json::to_value(data) {
            Ok(data) => data,
            Err(error) => {
                return Self::failure(command, "serialization", error.to_string(), EXIT_MODEL)
            }
        };
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            hint: None,
            data: Some(data),
        };
        Self { exit_code: EXIT_OK, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            hint: None,
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    fn failure_with_hint(
        command: &str,
        error_class: &str,
        message: String,
        hint: &str,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message,
            hint: Some(hint.to_string()),
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

/// Maps an application failure to its error class and exit code.
pub fn application_failure(command: &str, error: ApplicationError) -> CommandResult {
    let (error_class, exit_code) = match &error {
        ApplicationError::Domain(DomainError::InvalidRequest(_)) => {
            ("invalid_request", EXIT_REQUEST)
        }
        ApplicationError::Domain(domain) if domain.is_configuration() => {
            ("config_validation", EXIT_CONFIG)
        }
        ApplicationError::Configuration(_) => ("config_validation", EXIT_CONFIG),
        ApplicationError::Domain(DomainError::InvariantViolation(_)) => {
            ("model_invariant", EXIT_MODEL)
        }
        ApplicationError::Domain(_) => ("data_validation", EXIT_DATA),
        ApplicationError::ArtifactLoad { .. } => ("artifact_load", EXIT_MODEL),
        ApplicationError::Persistence(_) => ("persistence", EXIT_MODEL),
    };

    let message = error.to_string();
    let interface = error.into_interface(format!("cli.{command}"));
    CommandResult::failure_with_hint(
        command,
        error_class,
        message,
        interface.user_message(),
        exit_code,
    )
}

pub fn load_corpus(command: &str, config: &AppConfig) -> Result<PurchaseCorpus, CommandResult> {
    PurchaseCorpus::from_csv_path(&config.data.corpus_path).map_err(|error| match error {
        ApplicationError::Persistence(message) => {
            CommandResult::failure(command, "data_unavailable", message, EXIT_DATA)
        }
        other => application_failure(command, other),
    })
}

/// Loads the corpus and keeps only the records that pass `filter`.
pub fn load_filtered_corpus(
    command: &str,
    config: &AppConfig,
    filter: &PurchaseFilter,
) -> Result<PurchaseCorpus, CommandResult> {
    let corpus = load_corpus(command, config)?;
    filter.apply(&corpus).map_err(|error| application_failure(command, error.into()))
}

/// Loads the corpus and a ready model, training one when needed.
pub fn prepare_model(
    command: &str,
    config: &AppConfig,
) -> Result<(TrainedRecommender, RatedCorpus), CommandResult> {
    let corpus = load_corpus(command, config)?;
    ModelTrainer::from_config(config)
        .train(corpus)
        .map_err(|error| application_failure(command, error))
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use serde_json::Value;
    use storepulse_core::errors::{ApplicationError, DomainError};

    use super::{
        application_failure, CommandResult, EXIT_CONFIG, EXIT_DATA, EXIT_MODEL, EXIT_REQUEST,
    };

    fn payload(result: &CommandResult) -> Value {
        serde_json::from_str(&result.output).unwrap_or(Value::Null)
    }

    #[test]
    fn invalid_request_uses_request_exit_code() {
        let result = application_failure(
            "recommend",
            DomainError::InvalidRequest("count must be positive".to_owned()).into(),
        );
        assert_eq!(result.exit_code, EXIT_REQUEST);
        let payload = payload(&result);
        assert_eq!(payload["error_class"], "invalid_request");
        assert_eq!(
            payload["hint"],
            "The request could not be processed. Check inputs and try again."
        );
    }

    #[test]
    fn data_and_artifact_failures_are_distinguished() {
        let data = application_failure(
            "train",
            DomainError::InvalidRecord {
                line: 4,
                message: "quantity must be at least 1".to_owned(),
            }
            .into(),
        );
        assert_eq!(data.exit_code, EXIT_DATA);
        assert_eq!(payload(&data)["error_class"], "data_validation");

        let columns = application_failure(
            "train",
            DomainError::MissingColumns(vec!["Product_ID".to_owned()]).into(),
        );
        assert_eq!(columns.exit_code, EXIT_CONFIG);
        assert_eq!(payload(&columns)["error_class"], "config_validation");

        let artifact = application_failure(
            "train",
            ApplicationError::ArtifactLoad {
                path: PathBuf::from(".storepulse/model.json"),
                message: "expected value".to_owned(),
            },
        );
        assert_eq!(artifact.exit_code, EXIT_MODEL);
        assert_eq!(payload(&artifact)["error_class"], "artifact_load");
    }

    #[test]
    fn success_payload_omits_empty_fields() {
        let result = CommandResult::success("train", "done");
        let payload = payload(&result);
        assert_eq!(payload["status"], "ok");
        assert!(payload.get("data").is_none());
        assert!(payload.get("hint").is_none());
    }
}
