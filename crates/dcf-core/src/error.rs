//! Error types for the deconfounder study

use thiserror::Error;

/// Deconfounder study error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    /// Configuration rejected before any data was generated
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A regression model could not be fitted
    #[error("model fitting failed for `{formula}`: {reason}")]
    ModelFit {
        /// Formula of the offending model, e.g. `outcome ~ observed + latent`.
        formula: String,
        /// Underlying solver failure.
        reason: String,
    },

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Computation error
    #[error("Computation error: {0}")]
    Computation(String),
}

impl Error {
    /// Wrap a low-level solver error into [`Error::ModelFit`] for `formula`.
    ///
    /// Configuration and I/O errors pass through untouched.
    pub fn into_model_fit(self, formula: &str) -> Self {
        match self {
            Error::Validation(reason) | Error::Computation(reason) => {
                Error::ModelFit { formula: formula.to_string(), reason }
            }
            Error::ModelFit { reason, .. } => {
                Error::ModelFit { formula: formula.to_string(), reason }
            }
            other => other,
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn computation_error_becomes_model_fit() {
        let err = Error::Computation("X'X is singular".into()).into_model_fit("outcome ~ observed");
        match err {
            Error::ModelFit { formula, reason } => {
                assert_eq!(formula, "outcome ~ observed");
                assert_eq!(reason, "X'X is singular");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn invalid_config_is_not_rewrapped() {
        let err = Error::InvalidConfig("n_entities must be > 0".into()).into_model_fit("y ~ x");
        assert!(matches!(err, Error::InvalidConfig(_)));
        assert_eq!(err.to_string(), "invalid configuration: n_entities must be > 0");
    }
}
