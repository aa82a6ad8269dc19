//! SOAP plumbing for the session manager administration service.
//!
//! - [`value`]: wire values and the normalizer that flattens them
//! - [`envelope`]: rpc/encoded request building and response decoding
//! - [`client`]: the typed [`AdminApi`] interface and its HTTP implementation

pub mod client;
pub mod envelope;
pub mod value;

pub use client::{AdminApi, AdminConnector, Session, SoapAdminClient, SoapConnector};
pub use value::{denormalize, normalize, NormalizationConflict, NormalizedValue, Scalar, SoapValue};

use thiserror::Error;

/// Errors raised while talking to the administration service
#[derive(Error, Debug)]
pub enum SoapError {
    #[error("Transport error calling '{method}': {message}")]
    Transport { method: String, message: String },

    #[error("HTTP status {status} calling '{method}': {body}")]
    Http {
        method: String,
        status: u16,
        body: String,
    },

    #[error("SOAP fault {code}: {message}")]
    Fault { code: String, message: String },

    #[error("Malformed SOAP message: {0}")]
    Xml(String),

    #[error(transparent)]
    Conflict(#[from] NormalizationConflict),

    #[error("Unexpected response to '{method}': {message}")]
    UnexpectedResponse { method: String, message: String },
}

impl SoapError {
    /// Short error type name reported in failed module results
    pub fn kind(&self) -> &'static str {
        match self {
            SoapError::Transport { .. } | SoapError::Http { .. } => "FetchError",
            SoapError::Fault { .. } => "SoapFault",
            SoapError::Xml(_) => "XmlError",
            SoapError::Conflict(_) => "NormalizationConflict",
            SoapError::UnexpectedResponse { .. } => "UnexpectedResponse",
        }
    }

    pub(crate) fn unexpected(method: &str, message: impl Into<String>) -> Self {
        SoapError::UnexpectedResponse {
            method: method.to_string(),
            message: message.into(),
        }
    }
}

/// Result type for SOAP operations
pub type SoapResult<T> = Result<T, SoapError>;
