//! Quota-gated generation pipeline
//!
//! identity lookup → daily usage check-and-increment → image generation.
//! The first failing stage ends the request; nothing after it runs.

use chrono::NaiveDate;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};
use utoipa::ToSchema;

use crate::db::{today_local, StoreError, UsageError, UsageLedger};
use crate::providers::{GeneratedImage, IdentityProvider, ImageGenerator, ProviderError};

/// Request body for `POST /generate`
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct GenerationRequest {
    /// Text prompt
    pub prompt: String,
    /// Optional style, composed as "In <style> style: <prompt>"
    #[serde(default)]
    pub style: Option<String>,
    /// Caller IP as seen by the frontend; recorded with the day's usage
    #[serde(default)]
    pub ip: Option<String>,
}

impl GenerationRequest {
    /// Prompt sent to the inference service
    pub fn full_prompt(&self) -> String {
        match self.style.as_deref().map(str::trim) {
            Some(style) if !style.is_empty() => format!("In {} style: {}", style, self.prompt),
            _ => self.prompt.clone(),
        }
    }
}

/// Pipeline failures, one per stage
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Missing or malformed bearer credential")]
    MissingCredential,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Identity resolution failed: {0}")]
    IdentityResolutionFailed(#[source] ProviderError),

    #[error("Daily image generation limit of {limit} reached")]
    LimitReached { limit: u32 },

    #[error("Usage store error: {0}")]
    Store(#[from] StoreError),

    #[error("Image generation failed: {0}")]
    GenerationFailed(#[source] ProviderError),
}

impl From<UsageError> for PipelineError {
    fn from(err: UsageError) -> Self {
        match err {
            UsageError::LimitReached { limit } => PipelineError::LimitReached { limit },
            UsageError::Store(e) => PipelineError::Store(e),
        }
    }
}

impl PipelineError {
    pub fn status_code(&self) -> actix_web::http::StatusCode {
        use actix_web::http::StatusCode;
        match self {
            PipelineError::MissingCredential | PipelineError::IdentityResolutionFailed(_) => {
                StatusCode::UNAUTHORIZED
            }
            PipelineError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            PipelineError::LimitReached { .. } => StatusCode::TOO_MANY_REQUESTS,
            PipelineError::Store(_) | PipelineError::GenerationFailed(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to show the caller. Internal failures stay generic.
    pub fn public_message(&self) -> String {
        match self {
            PipelineError::MissingCredential => "Missing Authorization header".to_string(),
            PipelineError::InvalidRequest(reason) => format!("Invalid request: {}", reason),
            PipelineError::IdentityResolutionFailed(_) => "Invalid user token".to_string(),
            PipelineError::LimitReached { .. } => self.to_string(),
            PipelineError::Store(_) => "Internal server error".to_string(),
            PipelineError::GenerationFailed(_) => "Image generation failed".to_string(),
        }
    }
}

/// Sequences identity, ledger and generation for one request
#[derive(Clone)]
pub struct GenerationPipeline {
    identity: Arc<dyn IdentityProvider>,
    ledger: UsageLedger,
    generator: Arc<dyn ImageGenerator>,
}

impl GenerationPipeline {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        ledger: UsageLedger,
        generator: Arc<dyn ImageGenerator>,
    ) -> Self {
        Self {
            identity,
            ledger,
            generator,
        }
    }

    pub fn daily_limit(&self) -> u32 {
        self.ledger.daily_limit()
    }

    /// Run the pipeline for today (server local time)
    pub async fn run(
        &self,
        token: &str,
        request: &GenerationRequest,
        client_ip: &str,
    ) -> Result<GeneratedImage, PipelineError> {
        self.run_on(token, request, client_ip, today_local()).await
    }

    /// Run the pipeline against the ledger day `today`
    pub async fn run_on(
        &self,
        token: &str,
        request: &GenerationRequest,
        client_ip: &str,
        today: NaiveDate,
    ) -> Result<GeneratedImage, PipelineError> {
        if request.prompt.trim().is_empty() {
            return Err(PipelineError::InvalidRequest("prompt must not be empty".to_string()));
        }

        let user_id = self.identity.resolve(token).await.map_err(|e| {
            warn!(error = %e, "Identity resolution failed");
            PipelineError::IdentityResolutionFailed(e)
        })?;

        let ip = request
            .ip
            .as_deref()
            .filter(|ip| !ip.is_empty())
            .unwrap_or(client_ip);

        let count = self
            .ledger
            .check_and_increment(&user_id, ip, today)
            .await
            .map_err(|e| {
                if let UsageError::Store(store_err) = &e {
                    error!(error = %store_err, user_id = %user_id, "Usage check failed");
                }
                PipelineError::from(e)
            })?;

        info!(
            user_id = %user_id,
            used = count,
            limit = self.ledger.daily_limit(),
            style = request.style.as_deref().unwrap_or(""),
            "Usage granted, generating image"
        );

        self.generator
            .generate(&request.full_prompt())
            .await
            .map_err(|e| {
                error!(error = %e, user_id = %user_id, "Image generation error");
                PipelineError::GenerationFailed(e)
            })
    }
}
