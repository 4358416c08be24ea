//! Error taxonomy for the extraction, analysis, and streaming pipeline.
//!
//! Extraction and analysis failures propagate to the caller as values of
//! these types. Streaming failures never do: once output has started, a
//! [`StreamError`] is rendered into the delta stream as a terminal marker
//! (see [`crate::stream`]).

use thiserror::Error;

use crate::providers::Provider;

/// The zip upload could not be turned into an extraction context.
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("archive is empty")]
    Empty,

    #[error("archive is {size} bytes, limit is {limit} bytes")]
    TooLarge { size: usize, limit: usize },

    #[error("not a valid zip archive: {0}")]
    Malformed(String),

    #[error("failed to read archive entry {name}: {message}")]
    Entry { name: String, message: String },

    #[error("failed to read archive file: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration problems, including a provider without a credential.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{0} API key is not configured")]
    MissingCredential(Provider),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Failure of a single-shot provider call, raised before any output exists.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{provider} request failed: {message}")]
    Transport { provider: Provider, message: String },

    #[error("{provider} returned HTTP {status}: {message}")]
    Status {
        provider: Provider,
        status: u16,
        message: String,
    },

    #[error("{provider} reported an error: {message}")]
    Upstream { provider: Provider, message: String },

    #[error("{provider} response was not valid JSON: {message}")]
    Malformed { provider: Provider, message: String },
}

/// The analysis phase failed, on either side of `POST /analyze`.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Provider(ProviderError),

    #[error("model did not return valid JSON. Raw: {excerpt}...")]
    InvalidJson { excerpt: String },

    #[error("analysis payload has the wrong shape: {0}")]
    Shape(String),

    #[error("analysis request failed: {0}")]
    Transport(String),

    /// Non-success status from the analysis service.
    #[error("{message}")]
    Status { status: u16, message: String },
}

impl From<ProviderError> for AnalysisError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Config(e) => AnalysisError::Config(e),
            other => AnalysisError::Provider(other),
        }
    }
}

/// A mid-stream fault. Only ever surfaced in-band via its `Display` form.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("stream error: {0}")]
pub struct StreamError(pub String);

impl StreamError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    /// The trailing delta appended after whatever output was already sent.
    pub fn marker(&self) -> String {
        format!("\n\n{}", self)
    }
}
