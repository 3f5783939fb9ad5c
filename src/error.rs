//! Error types for the Elasticsearch metrics exporter
//!
//! Configuration errors are fatal and surface when the exporter is built.
//! Collection errors are scoped to one query, collector or target and travel
//! through the sample stream as invalid samples instead of failing a scrape.

use thiserror::Error;

/// Main error type for the exporter
#[derive(Error, Debug)]
pub enum ExporterError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ExporterConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP server errors
    #[error("Server error: {0}")]
    Server(String),
}

/// Configuration-related errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExporterConfigError {
    /// Configuration file could not be read
    #[error("Invalid configuration file: {0}")]
    InvalidFile(String),

    /// Configuration file could not be parsed
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    /// Missing required configuration field
    #[error("Missing required field: {0}")]
    MissingRequiredField(String),

    /// Invalid URL format
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),

    /// Invalid interval or timeout value
    #[error("Invalid interval: {0}")]
    InvalidInterval(String),

    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// Aggregation type has no handler
    #[error("Unsupported aggregation kind: {0}")]
    UnsupportedAggregationKind(String),

    /// A label key is defined in more than one place
    #[error("Inconsistent label: {0}")]
    InconsistentLabel(String),

    /// A name refers to a query, aggregation or collector that does not exist
    #[error("Unknown reference: {0}")]
    UnknownReference(String),
}

/// The reason a collection step failed
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CollectErrorKind {
    /// The scrape context was cancelled
    #[error("context cancelled")]
    Cancelled,

    /// The scrape deadline passed
    #[error("context deadline exceeded")]
    DeadlineExceeded,

    /// The backend client could not be created
    #[error("failed to create backend client: {0}")]
    Connect(String),

    /// The request did not reach the backend or the body could not be read
    #[error("transport error: {0}")]
    Transport(String),

    /// The backend answered with a non-success status
    #[error("request failed with status code {0}")]
    Status(u16),

    /// The backend answered with a body that is not valid JSON
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The health probe reported the backend as unavailable
    #[error("backend unhealthy: {0}")]
    Unhealthy(String),
}

/// A collection failure together with the log context it happened in
#[derive(Error, Debug, Clone, PartialEq)]
#[error("[{context}] {kind}")]
pub struct CollectError {
    context: String,
    kind: CollectErrorKind,
}

impl CollectError {
    /// Wrap `kind` with a log context such as `collector="http", query="requests"`
    pub fn new(context: impl Into<String>, kind: CollectErrorKind) -> Self {
        Self {
            context: context.into(),
            kind,
        }
    }

    /// Log context of the failing component
    pub fn context(&self) -> &str {
        &self.context
    }

    /// Underlying failure reason
    pub fn kind(&self) -> &CollectErrorKind {
        &self.kind
    }
}
