//! Error types produced by the remote table transport.

use std::io;

use thiserror::Error;

use verdant_core::AdapterError;

/// Transport-level errors encountered while issuing HTTP requests.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    /// The server returned an HTTP error status.
    #[error("request to {url} failed with status {status}: {message}")]
    Http {
        /// Fully qualified request URL.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Short error description supplied by the server.
        message: String,
    },
    /// The request failed before a response arrived.
    #[error("network error contacting {url}: {source}")]
    Network {
        /// Fully qualified request URL.
        url: String,
        /// I/O error reported by the transport.
        source: io::Error,
    },
    /// The response body did not match the wire contract.
    #[error("failed to decode response from {url}: {message}")]
    Decode {
        /// Fully qualified request URL.
        url: String,
        /// Short description of the decoding failure.
        message: String,
    },
}

impl TransportError {
    /// HTTP status of the failure, when the server answered at all.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Network { .. } | Self::Decode { .. } => None,
        }
    }

    /// Fully qualified URL of the failed request.
    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Self::Http { url, .. } | Self::Network { url, .. } | Self::Decode { url, .. } => url,
        }
    }
}

impl From<TransportError> for AdapterError {
    fn from(error: TransportError) -> Self {
        let status = error.status();
        let message = match &error {
            TransportError::Http { message, .. } | TransportError::Decode { message, .. } => {
                message.clone()
            }
            TransportError::Network { source, .. } => source.to_string(),
        };
        Self::Remote {
            url: error.url().to_owned(),
            status,
            message,
        }
    }
}

/// Failure to construct the HTTP client behind a store.
#[derive(Debug, Error)]
#[error("failed to build HTTP client: {source}")]
pub struct StoreBuildError {
    /// Error reported by the client builder.
    #[from]
    source: reqwest::Error,
}

impl From<StoreBuildError> for AdapterError {
    fn from(error: StoreBuildError) -> Self {
        Self::Config {
            message: error.to_string(),
        }
    }
}
