//! Error types of the step engine.

use crate::jsonpath::QueryError;
use crate::model::ResultStep;
use crate::url_template::UrlError;
use serde::Serialize;
use std::error::Error as StdError;
use thiserror::Error;

/// Step-level error: the step stopped before it could complete.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("{0} is an invalid step_type")]
    InvalidStepKind(String),

    #[error("cannot build the request: {0}")]
    RequestBuild(#[from] BuildError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// A failed step together with everything produced before the failure.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct StepFailure {
    pub partial: Box<ResultStep>,
    #[source]
    pub error: StepError,
}

impl StepFailure {
    pub fn new(partial: ResultStep, error: impl Into<StepError>) -> Self {
        Self {
            partial: Box::new(partial),
            error: error.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BuildError {
    #[error("malformed url '{template}': {source}")]
    MalformedUrl {
        template: String,
        #[source]
        source: UrlError,
    },
}

/// Network or IO failure reported by a transport.
#[derive(Debug, Error)]
#[error("transport failure: {message}")]
pub struct TransportError {
    message: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let message = err.to_string();
        Self::with_source(message, err)
    }
}

/// Failure to extract one declared variable. Recorded in the step
/// result, never returned to the caller.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum ExtractionError {
    #[error("variable {name}: cannot read '{property}': {reason}")]
    Query {
        name: String,
        property: String,
        reason: String,
    },

    #[error("variable {name}: type {kind} not valid type to export as a variable")]
    UnsupportedType { name: String, kind: &'static str },
}

impl ExtractionError {
    pub(crate) fn query(name: &str, property: &str, err: QueryError) -> Self {
        Self::Query {
            name: name.to_string(),
            property: property.to_string(),
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StepType;

    #[test]
    fn test_invalid_step_kind_message() {
        let err = StepError::InvalidStepKind("teleport".to_string());
        assert_eq!(err.to_string(), "teleport is an invalid step_type");
    }

    #[test]
    fn test_step_failure_exposes_source() {
        let failure = StepFailure::new(
            ResultStep::new(StepType::Request),
            TransportError::new("connection refused"),
        );
        assert_eq!(failure.to_string(), "transport failure: connection refused");
        assert!(matches!(failure.error, StepError::Transport(_)));
        assert!(StdError::source(&failure).is_some());
    }
}
