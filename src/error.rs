//! Error types for the market data client

use thiserror::Error;

/// Errors that can occur when fetching data from an upstream API
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProviderError {
    /// Upstream responded with a non-success status
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Request was sent but no response came back
    #[error("No response: {0}")]
    NoResponse(String),

    /// Timeout waiting for response
    #[error("Request timeout")]
    Timeout,

    /// Request could not be constructed
    #[error("Request setup failed: {0}")]
    Setup(String),

    /// Invalid response from provider
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Coarse category of a [`ProviderError`], used for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Server responded with an error status
    Status,
    /// No response was received (connection failure or timeout)
    NoResponse,
    /// Request could not be constructed
    Setup,
    /// Response arrived but did not have the expected shape
    Decode,
}

impl ProviderError {
    /// Creates a Status error
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::Status {
            status,
            body: body.into(),
        }
    }

    /// Creates a Setup error
    pub fn setup(msg: impl Into<String>) -> Self {
        Self::Setup(msg.into())
    }

    /// Creates an InvalidResponse error
    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// Returns the failure category
    pub fn kind(&self) -> FailureKind {
        match self {
            ProviderError::Status { .. } => FailureKind::Status,
            ProviderError::NoResponse(_) | ProviderError::Timeout => FailureKind::NoResponse,
            ProviderError::Setup(_) => FailureKind::Setup,
            ProviderError::InvalidResponse(_) => FailureKind::Decode,
        }
    }

    /// Returns true for failures a repeated attempt may fix
    ///
    /// Transport failures, rate limiting and server-side errors qualify.
    /// Client errors, setup errors and undecodable bodies do not.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::NoResponse(_) | ProviderError::Timeout => true,
            ProviderError::Status { status, .. } => *status == 429 || *status >= 500,
            ProviderError::Setup(_) | ProviderError::InvalidResponse(_) => false,
        }
    }

    /// Returns the upstream status code, if one was received
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ProviderError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout
        } else if err.is_builder() {
            ProviderError::Setup(err.to_string())
        } else if err.is_decode() {
            ProviderError::InvalidResponse(err.to_string())
        } else if let Some(status) = err.status() {
            ProviderError::status(status.as_u16(), err.to_string())
        } else {
            ProviderError::NoResponse(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::InvalidResponse(err.to_string())
    }
}

/// Errors raised while reading configuration from the environment
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    /// Variable is set but cannot be parsed
    #[error("Invalid value for {var}: {value}")]
    InvalidValue { var: String, value: String },
}

impl ConfigError {
    /// Creates an InvalidValue error
    pub fn invalid_value(var: &str, value: impl Into<String>) -> Self {
        Self::InvalidValue {
            var: var.to_string(),
            value: value.into(),
        }
    }
}

/// Errors raised by the news relay; each one maps to a 500 response
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RelayError {
    /// Query parameter is present but not a positive integer
    #[error("Invalid query parameter {name}: {value:?}")]
    InvalidParam { name: String, value: String },

    /// No API key is configured
    #[error("News API key is not configured")]
    MissingApiKey,

    /// Upstream could not be reached
    #[error(transparent)]
    Upstream(#[from] ProviderError),

    /// Upstream answered with a body of the wrong shape
    #[error("Malformed news response: {0}")]
    MalformedBody(String),
}

impl RelayError {
    /// Creates an InvalidParam error
    pub fn invalid_param(name: &str, value: impl Into<String>) -> Self {
        Self::InvalidParam {
            name: name.to_string(),
            value: value.into(),
        }
    }
}
