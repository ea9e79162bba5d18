use std::path::PathBuf;

use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("purchase corpus is missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
    #[error("invalid purchase record on line {line}: {message}")]
    InvalidRecord { line: u64, message: String },
    #[error("insufficient data: need at least {required} {subject}, found {actual}")]
    InsufficientData { subject: &'static str, required: usize, actual: usize },
    #[error("hyperparameter grid has no candidate combinations")]
    EmptyParameterGrid,
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

impl DomainError {
    pub fn insufficient(subject: &'static str, required: usize, actual: usize) -> Self {
        Self::InsufficientData { subject, required, actual }
    }

    /// Errors caused by the shape of the input rather than its contents.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::MissingColumns(_) | Self::EmptyParameterGrid)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("could not load model artifact `{}`: {message}", .path.display())]
    ArtifactLoad { path: PathBuf, message: String },
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The recommendation model is unavailable. Inspect the model artifacts and retry."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        match value {
            ApplicationError::Domain(domain) if domain.is_configuration() => Self::Internal {
                message: domain.to_string(),
                correlation_id: "unassigned".to_owned(),
            },
            ApplicationError::Domain(domain) => Self::BadRequest {
                message: domain.to_string(),
                correlation_id: "unassigned".to_owned(),
            },
            error @ ApplicationError::ArtifactLoad { .. } => Self::ServiceUnavailable {
                message: error.to_string(),
                correlation_id: "unassigned".to_owned(),
            },
            ApplicationError::Persistence(message) => {
                Self::ServiceUnavailable { message, correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: "unassigned".to_owned() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use crate::errors::{ApplicationError, DomainError, InterfaceError};

    #[test]
    fn insufficient_data_maps_to_bad_request_interface_error() {
        let interface = ApplicationError::from(DomainError::insufficient("ratings", 2, 1))
            .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                ref correlation_id,
                ..
            } if correlation_id == "req-1"
        ));
        assert_eq!(
            interface.user_message(),
            "The request could not be processed. Check inputs and try again."
        );
    }

    #[test]
    fn missing_columns_is_a_configuration_failure() {
        let error = DomainError::MissingColumns(vec![
            "Customer_ID".to_owned(),
            "Purchase_Amount".to_owned(),
        ]);
        assert!(error.is_configuration());
        assert_eq!(
            error.to_string(),
            "purchase corpus is missing required columns: Customer_ID, Purchase_Amount"
        );

        let interface = ApplicationError::from(error).into_interface("req-2");
        assert!(matches!(interface, InterfaceError::Internal { .. }));
    }

    #[test]
    fn artifact_load_maps_to_service_unavailable() {
        let interface = ApplicationError::ArtifactLoad {
            path: PathBuf::from("/tmp/model.json"),
            message: "EOF while parsing".to_owned(),
        }
        .into_interface("req-3");

        assert!(matches!(
            interface,
            InterfaceError::ServiceUnavailable { ref message, .. } if message.contains("model.json")
        ));
    }

    #[test]
    fn configuration_error_maps_to_internal() {
        let interface = ApplicationError::Configuration("artifact dir is a file".to_owned())
            .into_interface("req-4");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.user_message(), "An unexpected internal error occurred.");
    }
}
