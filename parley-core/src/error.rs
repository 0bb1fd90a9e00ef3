//! Error types for the detection engine
//!
//! Backend-level failures (`BackendUnavailable`, `BackendTimeout`,
//! `Backend`) are soft: the ensemble logs them and excludes the backend.
//! Only `Detection` reaches callers as a fatal outcome of a detection call.

use thiserror::Error;

/// Engine errors
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid registration or configuration
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Requested backend is not installed or could not be loaded
    #[error("backend '{name}' unavailable: {reason}")]
    BackendUnavailable {
        /// Backend name
        name: String,
        /// Why the backend could not be used
        reason: String,
    },

    /// Backend did not answer within the per-call timeout
    #[error("backend '{name}' timed out after {timeout_ms}ms")]
    BackendTimeout {
        /// Backend name
        name: String,
        /// Timeout that was exceeded
        timeout_ms: u64,
    },

    /// Backend raised while detecting
    #[error("backend '{name}' failed: {reason}")]
    Backend {
        /// Backend name
        name: String,
        /// Failure description
        reason: String,
    },

    /// No backend produced a usable result
    #[error("detection failed: {0}")]
    Detection(String),

    /// Context or table (de)serialization failed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the ensemble downgrades this error to a soft exclusion
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            Error::BackendUnavailable { .. } | Error::BackendTimeout { .. } | Error::Backend { .. }
        )
    }

    /// Shorthand for a backend failure
    pub fn backend(name: impl Into<String>, reason: impl ToString) -> Self {
        Error::Backend {
            name: name.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Configuration(err.to_string())
    }
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_soft_classification() {
        assert!(Error::backend("x", "boom").is_soft());
        assert!(Error::BackendTimeout {
            name: "x".into(),
            timeout_ms: 10
        }
        .is_soft());
        assert!(!Error::Detection("none".into()).is_soft());
        assert!(!Error::Configuration("dup".into()).is_soft());
    }

    #[test]
    fn test_display_messages() {
        let err = Error::BackendUnavailable {
            name: "lingua".into(),
            reason: "feature disabled".into(),
        };
        assert_eq!(
            err.to_string(),
            "backend 'lingua' unavailable: feature disabled"
        );

        let err = Error::BackendTimeout {
            name: "slow".into(),
            timeout_ms: 250,
        };
        assert_eq!(err.to_string(), "backend 'slow' timed out after 250ms");
    }

    #[test]
    fn test_json_error_maps_to_serialization() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: Error = parse.unwrap_err().into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
