//! Error types for outbound webhook delivery.

use thiserror::Error;

/// Failures attempting an outbound webhook POST.
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    /// Request exceeded the configured timeout.
    #[error("request timeout after {timeout_secs}s")]
    Timeout {
        /// Seconds before the request timed out.
        timeout_secs: u64,
    },

    /// Connection-level failure (DNS, refused, TLS, reset).
    #[error("network error: {message}")]
    Network {
        /// Description of the network failure.
        message: String,
    },

    /// The subscription's URL could not be used.
    #[error("invalid webhook configuration: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },
}

impl DeliveryError {
    /// Creates a timeout error.
    pub fn timeout(timeout_secs: u64) -> Self {
        Self::Timeout { timeout_secs }
    }

    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network { message: message.into() }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Network { .. })
    }
}
