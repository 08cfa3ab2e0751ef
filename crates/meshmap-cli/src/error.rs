//! Error types for the CLI and the HTTP explorer

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use meshmap_common::telemetry::TelemetryError;

/// CLI Result type
pub type Result<T> = std::result::Result<T, Error>;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Loading or validation failure from the shared crate
    #[error(transparent)]
    Common(#[from] meshmap_common::Error),

    /// The graph build broke an internal invariant
    #[error("graph error: {0}")]
    Graph(#[from] meshmap_graph::GraphError),

    /// Logging could not be initialized
    #[error("logging error: {0}")]
    Telemetry(#[from] TelemetryError),

    /// Socket or file I/O failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid YAML
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Output could not be serialized
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Config file could not be read or resolved
    #[error("invalid configuration: {message}")]
    Config {
        /// What went wrong
        message: String,
    },

    /// Effective configuration or request input is invalid
    #[error("validation error: {message}")]
    Validation {
        /// What went wrong
        message: String,
    },
}

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
        }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation {
            message: message.into(),
        }
    }

    /// Namespace the failure concerns, when known
    pub fn namespace(&self) -> Option<&str> {
        match self {
            Error::Common(e) => e.namespace(),
            _ => None,
        }
    }

    /// HTTP status reported for this error
    pub fn status(&self) -> StatusCode {
        match self {
            Error::Common(meshmap_common::Error::Load { .. })
            | Error::Common(meshmap_common::Error::Kube { .. }) => StatusCode::BAD_GATEWAY,
            Error::Common(meshmap_common::Error::Validation { .. }) | Error::Validation { .. } => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = json!({
            "error": self.to_string(),
            "namespace": self.namespace(),
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_errors_are_bad_gateway_and_name_namespace() {
        let err = Error::from(meshmap_common::Error::load("payments", "connection refused"));
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.namespace(), Some("payments"));
        assert!(err.to_string().contains("payments"));
    }

    #[test]
    fn test_validation_errors_are_bad_request() {
        assert_eq!(Error::validation("bad").status(), StatusCode::BAD_REQUEST);
        let common = Error::from(meshmap_common::Error::validation_for_field("namespace", "blank"));
        assert_eq!(common.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_other_errors_are_internal() {
        let err = Error::from(meshmap_graph::GraphError::internal("assemble", "dangling edge"));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.namespace(), None);
    }
}
