//! Graph engine errors
//!
//! Malformed resources never surface here; they become warnings on the graph.
//! An `Err` from a build means the engine itself broke an invariant.

use thiserror::Error;

/// Error raised when a build violates an internal-consistency invariant
#[derive(Debug, Error)]
pub enum GraphError {
    /// The accumulated graph is inconsistent (e.g. an edge names a missing node)
    #[error("internal graph error [{context}]: {message}")]
    Internal {
        /// Description of the fault
        message: String,
        /// Build phase where the fault was detected
        context: String,
    },
}

impl GraphError {
    /// Create an internal-consistency error for a build phase
    pub fn internal(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Build phase where the fault was detected
    pub fn context(&self) -> &str {
        match self {
            GraphError::Internal { context, .. } => context,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_error_display() {
        let err = GraphError::internal("assemble", "edge e1 targets missing node n2");
        assert_eq!(err.context(), "assemble");
        assert!(err.to_string().contains("[assemble]"));
        assert!(err.to_string().contains("missing node n2"));
    }
}
