//! Error types for the OVHcloud provider.

use thiserror::Error;

/// Errors returned by the vendor REST API layer.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The vendor replied with a non-success HTTP status.
    ///
    /// `message` carries the raw vendor error text so the host surfaces
    /// exactly what the API said.
    #[error("OVH API error calling {method} {path}: {status} {message}")]
    Api {
        /// HTTP method of the failed call.
        method: String,
        /// Endpoint path of the failed call.
        path: String,
        /// HTTP status returned by the vendor.
        status: u16,
        /// Raw vendor error text.
        message: String,
    },

    /// The request never produced a vendor response.
    #[error("transport error calling {method} {path}: {source}")]
    Transport {
        /// HTTP method of the failed call.
        method: String,
        /// Endpoint path of the failed call.
        path: String,
        /// Underlying HTTP client error.
        #[source]
        source: reqwest::Error,
    },

    /// A response body could not be decoded into the expected shape.
    #[error("invalid JSON from {path}: {source}")]
    Json {
        /// Endpoint path whose response failed to decode.
        path: String,
        /// Underlying decode error.
        #[source]
        source: serde_json::Error,
    },
}

impl ApiError {
    /// Whether this error is a vendor HTTP 404.
    ///
    /// Delete-polling reinterprets a 404 as successful completion; see
    /// [`crate::poll::StateWaiter::absent_means`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::Api { status: 404, .. })
    }
}

/// Errors that can occur in provider operations.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The requested resource was not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// A validation error occurred.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A configuration error occurred.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The requested resource type is unknown.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A vendor API call failed.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// A wait on a vendor-side asynchronous operation timed out.
    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),

    /// Fixed-format text extraction from a vendor document failed.
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Operation not supported by this resource type.
    #[error("Unimplemented: {0}")]
    Unimplemented(String),
}

impl ProviderError {
    /// Whether this error means the underlying vendor object is gone.
    pub fn is_not_found(&self) -> bool {
        match self {
            ProviderError::NotFound(_) => true,
            ProviderError::Api(e) => e.is_not_found(),
            _ => false,
        }
    }
}
