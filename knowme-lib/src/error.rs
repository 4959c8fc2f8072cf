//! Error handling for batch lookup operations.
//!
//! Only run-level failures are represented here. A single identifier that
//! fails to resolve is never an error: it becomes an `Error` row in the
//! result table (see [`crate::types::OutcomeKind`]).

use std::fmt;

/// Main error type for the library.
#[derive(Debug, Clone)]
pub enum KnowMeError {
    /// The shared HTTP session could not be established; aborts the whole run
    SessionError {
        message: String,
        source: Option<String>,
    },

    /// Configuration errors (invalid settings, missing endpoint, etc.)
    ConfigError {
        message: String,
    },

    /// File I/O errors when reading identifier lists or writing exports
    FileError {
        path: String,
        message: String,
    },

    /// Input that cannot be turned into a list of identifiers
    InvalidInput {
        message: String,
    },

    /// A service name that is not registered
    UnknownService {
        name: String,
    },

    /// Generic internal errors that don't fit other categories
    Internal {
        message: String,
    },
}

impl KnowMeError {
    /// Create a new session error.
    pub fn session<M: Into<String>>(message: M) -> Self {
        Self::SessionError {
            message: message.into(),
            source: None,
        }
    }

    /// Create a new session error with source information.
    pub fn session_with_source<M: Into<String>, S: Into<String>>(message: M, source: S) -> Self {
        Self::SessionError {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a new configuration error.
    pub fn config<M: Into<String>>(message: M) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Create a new file error.
    pub fn file_error<P: Into<String>, M: Into<String>>(path: P, message: M) -> Self {
        Self::FileError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new invalid input error.
    pub fn invalid_input<M: Into<String>>(message: M) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a new unknown service error.
    pub fn unknown_service<N: Into<String>>(name: N) -> Self {
        Self::UnknownService { name: name.into() }
    }

    /// Create a new internal error.
    pub fn internal<M: Into<String>>(message: M) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl fmt::Display for KnowMeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionError { message, source } => {
                if let Some(source) = source {
                    write!(f, "Session error: {} (source: {})", message, source)
                } else {
                    write!(f, "Session error: {}", message)
                }
            }
            Self::ConfigError { message } => {
                write!(f, "Configuration error: {}", message)
            }
            Self::FileError { path, message } => {
                write!(f, "File error at '{}': {}", path, message)
            }
            Self::InvalidInput { message } => {
                write!(f, "Invalid input: {}", message)
            }
            Self::UnknownService { name } => {
                write!(f, "Unknown service '{}'", name)
            }
            Self::Internal { message } => {
                write!(f, "Internal error: {}", message)
            }
        }
    }
}

impl std::error::Error for KnowMeError {}

impl From<reqwest::Error> for KnowMeError {
    fn from(err: reqwest::Error) -> Self {
        Self::session_with_source("Failed to build HTTP client", err.to_string())
    }
}

impl From<serde_json::Error> for KnowMeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal {
            message: format!("JSON serialization failed: {}", err),
        }
    }
}

impl From<toml::de::Error> for KnowMeError {
    fn from(err: toml::de::Error) -> Self {
        Self::ConfigError {
            message: format!("Failed to parse TOML configuration: {}", err),
        }
    }
}

impl From<std::io::Error> for KnowMeError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal {
            message: format!("I/O error: {}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_session_error_with_source() {
        let err = KnowMeError::session_with_source("cannot open pool", "tls backend missing");
        assert_eq!(
            err.to_string(),
            "Session error: cannot open pool (source: tls backend missing)"
        );
    }

    #[test]
    fn test_display_config_error() {
        let err = KnowMeError::config("missing url");
        assert_eq!(err.to_string(), "Configuration error: missing url");
    }

    #[test]
    fn test_toml_error_conversion() {
        let parse_err = toml::from_str::<toml::Value>("not = [valid").unwrap_err();
        let err: KnowMeError = parse_err.into();
        assert!(matches!(err, KnowMeError::ConfigError { .. }));
    }
}
