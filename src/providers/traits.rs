//! Contracts for the remote services the relay depends on
//!
//! The identity service turns a caller's bearer token into a stable user id,
//! and the inference service turns a prompt into image bytes. Both sit behind
//! traits so the request pipeline can be exercised without the network.

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Provider error types
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unauthorized ({status}): {body}")]
    Unauthorized { status: u16, body: String },

    #[error("Model is still loading (status {status}): {body}")]
    ColdStart {
        status: u16,
        estimated_time: Option<f64>,
        body: String,
    },

    #[error("Rate limited, retry after {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    #[error("Expected an image, got '{content_type}': {body}")]
    UnexpectedContentType { content_type: String, body: String },

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("Parse error: {0}")]
    ParseError(String),
}

impl ProviderError {
    /// Whether another attempt may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Http(e) => e.is_timeout() || e.is_connect(),
            ProviderError::ColdStart { .. } | ProviderError::RateLimited { .. } => true,
            _ => false,
        }
    }

    /// Wait suggested by the remote service, if any
    pub fn retry_hint(&self) -> Option<Duration> {
        match self {
            // Remote value: out-of-range or NaN hints are ignored
            ProviderError::ColdStart { estimated_time: Some(secs), .. } if *secs > 0.0 => {
                Duration::try_from_secs_f64(*secs).ok()
            }
            ProviderError::RateLimited { retry_after_secs } => {
                Some(Duration::from_secs(*retry_after_secs))
            }
            _ => None,
        }
    }
}

/// Result type for provider operations
pub type ProviderResult<T> = Result<T, ProviderError>;

// ============================================================================
// Image Types
// ============================================================================

/// Image formats accepted from the inference service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageContentType {
    Png,
    Jpeg,
}

impl ImageContentType {
    /// Parse a `Content-Type` header value, ignoring parameters
    pub fn from_header(value: &str) -> Option<Self> {
        let essence = value.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        match essence.as_str() {
            "image/png" => Some(ImageContentType::Png),
            "image/jpeg" => Some(ImageContentType::Jpeg),
            _ => None,
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            ImageContentType::Png => "image/png",
            ImageContentType::Jpeg => "image/jpeg",
        }
    }
}

/// Image returned by the inference service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub bytes: Bytes,
    pub content_type: ImageContentType,
}

// ============================================================================
// Provider Traits
// ============================================================================

/// Resolves a caller's bearer token to a stable user id
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Look up the subject identifier for `token`. A single attempt.
    async fn resolve(&self, token: &str) -> ProviderResult<String>;
}

/// Produces an image from a text prompt
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> ProviderResult<GeneratedImage>;
}
