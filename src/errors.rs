/*!
 * Error types for the epubwai application.
 *
 * This module contains custom error types for the different stages of a
 * translation run, using the thiserror crate for ergonomic error definitions.
 *
 * Fatal errors (`ContainerError::UnsafeInput`, `SegmentationError`) abort a run.
 * Segment-level errors (`SegmentError`) are handled by the orchestrator through
 * retry and failover and only surface as a partial-failure job status.
 */

use thiserror::Error;

/// Errors that can occur when working with provider APIs
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The request did not complete in time
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Error related to rate limiting
    #[error("Rate limit exceeded: {message}")]
    RateLimitExceeded {
        /// Message from the provider
        message: String,
        /// Retry-After hint in seconds, when the provider sent one
        retry_after_secs: Option<u64>,
    },

    /// Error with authentication
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// The provider answered with a different number of strings than it was sent
    #[error("Batch size mismatch: sent {sent}, received {received}")]
    BatchMismatch {
        /// Number of strings sent
        sent: usize,
        /// Number of strings received
        received: usize,
    },
}

impl ProviderError {
    /// Whether retrying the same request may succeed.
    ///
    /// Timeouts, connection failures, rate-limit rejections, server errors and
    /// garbled batch responses are transient. Authentication failures and
    /// client errors (malformed request) are terminal for the backend.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Timeout(_)
            | ProviderError::ConnectionError(_)
            | ProviderError::RateLimitExceeded { .. }
            | ProviderError::RequestFailed(_)
            | ProviderError::ParseError(_)
            | ProviderError::BatchMismatch { .. } => true,
            ProviderError::ApiError { status_code, .. } => {
                *status_code == 408 || *status_code == 429 || *status_code >= 500
            }
            ProviderError::AuthenticationError(_) => false,
        }
    }

    /// Classify an HTTP error status into a provider error
    pub fn from_status(status_code: u16, message: String) -> Self {
        match status_code {
            401 | 403 => ProviderError::AuthenticationError(message),
            429 => ProviderError::RateLimitExceeded {
                message,
                retry_after_secs: None,
            },
            _ => ProviderError::ApiError {
                status_code,
                message,
            },
        }
    }

    /// Classify a transport error from reqwest
    pub fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            ProviderError::Timeout(error.to_string())
        } else if error.is_connect() {
            ProviderError::ConnectionError(error.to_string())
        } else if error.is_decode() {
            ProviderError::ParseError(error.to_string())
        } else {
            ProviderError::RequestFailed(error.to_string())
        }
    }
}

/// Errors raised while opening, validating or writing the e-book container
#[derive(Error, Debug)]
pub enum ContainerError {
    /// The container failed a safety check (entry count, compression ratio,
    /// total size, entry path)
    #[error("Unsafe input: {0}")]
    UnsafeInput(String),

    /// The container is not a usable EPUB
    #[error("Invalid EPUB: {0}")]
    InvalidEpub(String),

    /// A linked markup document could not be parsed
    #[error("Malformed document {path}: {reason}")]
    MalformedDocument {
        /// Path of the document inside the container
        path: String,
        /// Parser message
        reason: String,
    },

    /// ZIP-level failure
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// XML-level failure in package or navigation documents
    #[error("XML parsing error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Internal invariant violations between segmentation and reconstruction.
///
/// These indicate a logic bug and are never recovered by retrying.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SegmentationError {
    /// Segment list and reconstruction map (or translated list) lengths differ
    #[error("Segmentation mismatch at {stage}: {segments} segments vs {entries} entries")]
    Mismatch {
        /// Pipeline stage where the mismatch was observed
        stage: String,
        /// Number of segments
        segments: usize,
        /// Number of map entries or results
        entries: usize,
    },

    /// A recorded address could not be replayed
    #[error("Reconstruction failed for segment {segment_index}: {reason}")]
    Reconstruction {
        /// Index of the segment being re-injected
        segment_index: usize,
        /// What went wrong
        reason: String,
    },
}

/// Segment-level failures that trigger retry or failover
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SegmentError {
    /// Placeholder tokens were lost, duplicated or mangled by the backend
    #[error("Placeholder integrity failure in segment {segment_index}: {reason}")]
    PlaceholderIntegrity {
        /// Segment index
        segment_index: usize,
        /// Which tokens were affected
        reason: String,
    },

    /// The translation failed a plausibility check
    #[error("Quality validation failure in segment {segment_index}: {reason}")]
    QualityValidation {
        /// Segment index
        segment_index: usize,
        /// Which check failed
        reason: String,
    },
}

/// Errors that can occur during translation
#[derive(Error, Debug)]
pub enum TranslationError {
    /// Error from the provider API
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Segment-level validation error
    #[error("Segment error: {0}")]
    Segment(#[from] SegmentError),

    /// Invariant violation between pipeline stages
    #[error("Segmentation error: {0}")]
    Segmentation(#[from] SegmentationError),

    /// No backend is configured for the requested language
    #[error("No translation backend available: {0}")]
    NoBackend(String),
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Error from a provider
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error from the container layer
    #[error("Container error: {0}")]
    Container(#[from] ContainerError),

    /// Error from segmentation or reconstruction
    #[error("Segmentation error: {0}")]
    Segmentation(#[from] SegmentationError),

    /// Error from translation
    #[error("Translation error: {0}")]
    Translation(#[from] TranslationError),

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl AppError {
    /// Short machine-readable reason used in job reports
    pub fn reason_code(&self) -> &'static str {
        match self {
            AppError::File(_) => "file_error",
            AppError::Provider(_) => "provider_error",
            AppError::Container(ContainerError::UnsafeInput(_)) => "unsafe_input",
            AppError::Container(_) => "container_error",
            AppError::Segmentation(SegmentationError::Mismatch { .. }) => "segmentation_mismatch",
            AppError::Segmentation(SegmentationError::Reconstruction { .. }) => "reconstruction_error",
            AppError::Translation(_) => "translation_error",
            AppError::Unknown(_) => "unknown",
        }
    }
}

// Utility functions for error conversion
impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::Unknown(error.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}
