//! Error types for meshmap
//!
//! Errors are structured with fields to aid debugging. Loader failures always
//! carry the namespace being inspected so callers can tell which part of a
//! multi-namespace snapshot could not be fetched.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for meshmap operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Failure while loading the resources of a namespace
    #[error("failed to load resources for namespace {namespace}: {message}")]
    Load {
        /// Namespace whose resources could not be loaded
        namespace: String,
        /// Description of what failed
        message: String,
        /// Whether retrying the load may succeed
        retryable: bool,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized (if known)
        kind: Option<String>,
    },

    /// Invalid input supplied by the caller
    #[error("validation error: {message}")]
    Validation {
        /// Description of what's invalid
        message: String,
        /// The invalid field path (e.g., "spec.hosts")
        field: Option<String>,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "loader", "create_client")
        context: String,
    },
}

impl Error {
    /// Create a retryable load error for a namespace
    pub fn load(namespace: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Load {
            namespace: namespace.into(),
            message: msg.into(),
            retryable: true,
        }
    }

    /// Create a load error that will not go away on retry (auth, bad kubeconfig)
    pub fn load_permanent(namespace: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Load {
            namespace: namespace.into(),
            message: msg.into(),
            retryable: false,
        }
    }

    /// Wrap a kube error raised while loading a namespace
    ///
    /// 401/403 responses are marked permanent; everything else is retryable.
    pub fn load_from_kube(namespace: impl Into<String>, source: &kube::Error) -> Self {
        let permanent = matches!(
            source,
            kube::Error::Api(ae) if ae.code == 401 || ae.code == 403
        );
        Self::Load {
            namespace: namespace.into(),
            message: source.to_string(),
            retryable: !permanent,
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error with resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error with a field path
    pub fn validation_for_field(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Check if this error is retryable
    ///
    /// Validation and serialization errors need an input fix. Kubernetes
    /// errors are retryable unless the API server answered with a 4xx.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => !matches!(
                source,
                kube::Error::Api(ae) if (400..500).contains(&ae.code)
            ),
            Error::Load { retryable, .. } => *retryable,
            Error::Serialization { .. } => false,
            Error::Validation { .. } => false,
            Error::Internal { .. } => true,
        }
    }

    /// Get the namespace if this error is associated with one
    pub fn namespace(&self) -> Option<&str> {
        match self {
            Error::Load { namespace, .. } => Some(namespace),
            _ => None,
        }
    }

    /// Get the context if this error has one
    pub fn context(&self) -> Option<&str> {
        match self {
            Error::Internal { context, .. } => Some(context),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==========================================================================
    // Story Tests: Error Propagation While Inspecting a Namespace
    // ==========================================================================

    /// Story: a cluster that cannot be reached names the namespace in the error
    #[test]
    fn story_load_failure_names_namespace() {
        let err = Error::load("payments", "connection refused");
        assert!(err.to_string().contains("payments"));
        assert!(err.to_string().contains("connection refused"));
        assert_eq!(err.namespace(), Some("payments"));
        assert!(err.is_retryable());
    }

    /// Story: auth failures are not worth retrying
    #[test]
    fn story_permanent_load_failure() {
        let err = Error::load_permanent("payments", "forbidden");
        assert!(!err.is_retryable());
        match &err {
            Error::Load { retryable, .. } => assert!(!retryable),
            _ => panic!("Expected Load variant"),
        }
    }

    #[test]
    fn test_load_from_kube_forbidden_is_permanent() {
        let source = kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: "virtualservices is forbidden".to_string(),
            reason: "Forbidden".to_string(),
            code: 403,
        });
        let err = Error::load_from_kube("demo", &source);
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("demo"));
    }

    #[test]
    fn test_serialization_error_with_kind() {
        let err = Error::serialization_for_kind("VirtualService", "missing field 'metadata'");
        match &err {
            Error::Serialization { kind, .. } => {
                assert_eq!(kind.as_deref(), Some("VirtualService"));
            }
            _ => panic!("Expected Serialization variant"),
        }
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_validation_error_with_field() {
        let err = Error::validation_for_field("namespace", "must not be blank");
        match &err {
            Error::Validation { field, .. } => assert_eq!(field.as_deref(), Some("namespace")),
            _ => panic!("Expected Validation variant"),
        }
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_internal_error_context() {
        let err = Error::internal_with_context("loader", "unexpected state");
        assert_eq!(err.context(), Some("loader"));
        assert!(err.to_string().contains("[loader]"));

        let err = Error::internal("unexpected state");
        assert_eq!(err.context(), Some(UNKNOWN_CONTEXT));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Serialization { .. }));
    }
}
