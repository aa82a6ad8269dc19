//! Error types for ovd-modules.
//!
//! This module defines the crate-level error type shared by the directory
//! listing resolver, the admin service client and configuration loading.
//! Module execution wraps it in [`crate::modules::ModuleError`].

use std::path::PathBuf;
use thiserror::Error;

use crate::soap::SoapError;

/// Result type alias for ovd-modules operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for ovd-modules.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Directory Listing Errors
    // ========================================================================
    /// The listing page could not be fetched.
    #[error("Failed to fetch '{url}': {message}")]
    Fetch {
        /// Requested URL
        url: String,
        /// Error message
        message: String,
    },

    /// No file in the listing carries the required suffix.
    #[error("No file ending with '{suffix}' found at '{url}'")]
    NotFound {
        /// Listing URL
        url: String,
        /// Required filename suffix
        suffix: String,
    },

    // ========================================================================
    // Admin Service Errors
    // ========================================================================
    /// SOAP call or response decoding failed.
    #[error(transparent)]
    Soap(#[from] SoapError),

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid module arguments file.
    #[error("Invalid module arguments in '{path}': {message}")]
    ModuleArgs {
        /// Path to the arguments file
        path: PathBuf,
        /// Error message
        message: String,
    },

    // ========================================================================
    // IO / Serialization Errors
    // ========================================================================
    /// File not found.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error.
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// YAML parsing error.
    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Generic error with source.
    #[error("{message}")]
    Other {
        /// Error message
        message: String,
        /// Source error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    /// Creates a new fetch error.
    pub fn fetch(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fetch {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates a new not-found error.
    pub fn not_found(url: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self::NotFound {
            url: url.into(),
            suffix: suffix.into(),
        }
    }

    /// Creates a new module arguments error.
    pub fn module_args(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ModuleArgs {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Short error type name reported in failed module results.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Fetch { .. } => "FetchError",
            Error::NotFound { .. } => "NotFound",
            Error::Soap(e) => e.kind(),
            Error::Config(_) => "ConfigError",
            Error::ModuleArgs { .. } => "ArgumentError",
            Error::FileNotFound(_) | Error::Io(_) => "IOError",
            Error::JsonParse(_) | Error::YamlParse(_) | Error::TomlParse(_) => "ParseError",
            Error::Other { .. } => "UnexpectedException",
        }
    }

    /// Returns the error code for CLI exit status.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Fetch { .. } | Error::Soap(_) => 3,
            Error::NotFound { .. } => 2,
            Error::Config(_) | Error::ModuleArgs { .. } => 4,
            _ => 1,
        }
    }
}

/// Extension trait for adding context to errors.
pub trait ErrorContext<T> {
    /// Adds context with a closure that is only evaluated on error.
    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| Error::Other {
            message: f().into(),
            source: Some(Box::new(e)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soap::NormalizationConflict;

    #[test]
    fn test_kind_names() {
        assert_eq!(Error::fetch("http://x", "boom").kind(), "FetchError");
        assert_eq!(Error::not_found("http://x", ".exe").kind(), "NotFound");
        assert_eq!(
            Error::from(SoapError::from(NormalizationConflict)).kind(),
            "NormalizationConflict"
        );
    }

    #[test]
    fn test_not_found_message() {
        let err = Error::not_found("http://mirror/ovd/", "ApplicationServer.exe");
        let msg = err.to_string();
        assert!(msg.contains("ApplicationServer.exe"));
        assert!(msg.contains("http://mirror/ovd/"));
    }

    #[test]
    fn test_context_wraps_source() {
        let io: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::Other,
            "disk on fire",
        ));
        let err = io.with_context(|| "reading subscription key").unwrap_err();
        assert_eq!(err.to_string(), "reading subscription key");
        assert!(std::error::Error::source(&err).is_some());
        assert_eq!(err.exit_code(), 1);
    }
}
