//! # Rakla Common
//!
//! Shared error type, config-file loading, and logging setup for the Rakla
//! offline agent and its host harness.
//!
//! ## Features
//!
//! - Unified error type with categories
//! - JSON config loading
//! - Logging configuration and setup
//! - Result extension traits

use thiserror::Error;

pub mod config;
pub mod logging;

pub use config::load_json;
pub use logging::{init_logging, LogConfig, LogFormat};

/// Unified error type for Rakla host-side operations.
#[derive(Error, Debug)]
pub enum RaklaError {
    /// Configuration errors (missing file, bad values).
    #[error("Config error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Errors surfaced by the offline agent.
    #[error("Agent error: {message}")]
    Agent {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// I/O errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Resource not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl RaklaError {
    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Create a config error with source.
    pub fn config_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an agent error with source.
    pub fn agent_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Agent {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Get the error category for log fields.
    pub fn category(&self) -> &'static str {
        match self {
            RaklaError::Config { .. } => "config",
            RaklaError::Agent { .. } => "agent",
            RaklaError::Io(_) => "io",
            RaklaError::Json(_) => "json",
            RaklaError::NotFound(_) => "not_found",
            RaklaError::InvalidArgument(_) => "invalid_argument",
        }
    }
}

/// Result type alias for Rakla operations.
pub type Result<T> = std::result::Result<T, RaklaError>;

/// Extension trait for Result.
pub trait ResultExt<T> {
    /// Wrap an agent-side error with a message.
    fn context(self, message: impl Into<String>) -> Result<T>;
}

impl<T, E: std::error::Error + Send + Sync + 'static> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| RaklaError::agent_with_source(message, e))
    }
}

/// Extension trait for Option.
pub trait OptionExt<T> {
    /// Convert None to a NotFound error.
    fn ok_or_not_found(self, resource: impl Into<String>) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self, resource: impl Into<String>) -> Result<T> {
        self.ok_or_else(|| RaklaError::NotFound(resource.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert_eq!(RaklaError::config("test").category(), "config");
        assert_eq!(RaklaError::NotFound("x".into()).category(), "not_found");
        assert_eq!(
            RaklaError::InvalidArgument("x".into()).category(),
            "invalid_argument"
        );
    }

    #[test]
    fn test_context_keeps_source() {
        let err: std::result::Result<(), std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        let wrapped = err.context("install failed").unwrap_err();

        assert_eq!(wrapped.to_string(), "Agent error: install failed");
        assert!(std::error::Error::source(&wrapped).is_some());
    }

    #[test]
    fn test_option_ext() {
        let some: Option<i32> = Some(42);
        assert_eq!(some.ok_or_not_found("test").unwrap(), 42);

        let none: Option<i32> = None;
        assert!(matches!(
            none.ok_or_not_found("test"),
            Err(RaklaError::NotFound(_))
        ));
    }
}
