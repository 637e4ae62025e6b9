//! Hugging Face style inference client
//!
//! Posts `{"inputs": prompt}` and accepts only PNG or JPEG bodies. While a
//! model is loading the endpoint answers with a JSON status payload (often a
//! 503 carrying `estimated_time`); that shape is retried with backoff up to
//! the configured bound, everything else fails the call immediately.

use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::http_client::{body_snippet, OutboundLimiter, RetryPolicy};
use super::traits::{GeneratedImage, ImageContentType, ImageGenerator, ProviderError, ProviderResult};
use crate::config::InferenceSettings;

#[derive(Serialize)]
struct InferenceRequest<'a> {
    inputs: &'a str,
}

/// Status payload returned instead of an image
#[derive(Debug, Default, Deserialize)]
struct InferenceStatus {
    #[serde(default)]
    estimated_time: Option<f64>,
}

/// Client for the configured inference endpoint
pub struct InferenceClient {
    http: Client,
    url: String,
    bearer_token: String,
    timeout: Duration,
    retry: RetryPolicy,
    limiter: Option<OutboundLimiter>,
}

impl InferenceClient {
    pub fn new(settings: &InferenceSettings, http: Client) -> Self {
        // Deployments sometimes store the full header value
        let bearer_token = settings
            .bearer_token
            .strip_prefix("Bearer ")
            .unwrap_or(&settings.bearer_token)
            .to_string();

        InferenceClient {
            http,
            url: settings.url.clone(),
            bearer_token,
            timeout: settings.timeout(),
            retry: RetryPolicy::from_settings(settings),
            limiter: OutboundLimiter::per_minute(settings.requests_per_minute),
        }
    }

    async fn attempt(&self, prompt: &str) -> ProviderResult<GeneratedImage> {
        if let Some(limiter) = &self.limiter {
            limiter.acquire().await;
        }

        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.bearer_token)
            .json(&InferenceRequest { inputs: prompt })
            .timeout(self.timeout)
            .send()
            .await?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        match ImageContentType::from_header(&content_type) {
            Some(image_type) if response.status().is_success() => {
                let bytes = response.bytes().await?;
                Ok(GeneratedImage {
                    bytes,
                    content_type: image_type,
                })
            }
            _ => Err(Self::classify_failure(response, content_type).await),
        }
    }

    /// Turn a non-image response into the matching error
    async fn classify_failure(response: Response, content_type: String) -> ProviderError {
        let status = response.status();
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        let body = response.text().await.unwrap_or_default();

        warn!(
            status = status.as_u16(),
            content_type = %content_type,
            body = %body_snippet(&body),
            "Non-image response from inference service"
        );

        if status == StatusCode::TOO_MANY_REQUESTS {
            return ProviderError::RateLimited {
                retry_after_secs: retry_after.unwrap_or(60),
            };
        }

        let is_json = content_type.to_ascii_lowercase().contains("json");
        if is_json && (status.is_success() || status == StatusCode::SERVICE_UNAVAILABLE) {
            let hint: InferenceStatus = serde_json::from_str(&body).unwrap_or_default();
            return ProviderError::ColdStart {
                status: status.as_u16(),
                estimated_time: hint.estimated_time,
                body: body_snippet(&body),
            };
        }

        if status.is_success() {
            ProviderError::UnexpectedContentType {
                content_type,
                body: body_snippet(&body),
            }
        } else {
            ProviderError::ApiError {
                status: status.as_u16(),
                message: body_snippet(&body),
            }
        }
    }
}

#[async_trait]
impl ImageGenerator for InferenceClient {
    async fn generate(&self, prompt: &str) -> ProviderResult<GeneratedImage> {
        let mut attempt = 0;

        loop {
            match self.attempt(prompt).await {
                Ok(image) => {
                    info!(
                        bytes = image.bytes.len(),
                        content_type = image.content_type.mime(),
                        attempts = attempt + 1,
                        "Image generated"
                    );
                    return Ok(image);
                }
                Err(e) if e.is_retryable() && attempt < self.retry.max_retries => {
                    let delay = self.retry.delay(attempt, e.retry_hint());
                    warn!(
                        error = %e,
                        attempt = attempt + 1,
                        backoff_ms = delay.as_millis() as u64,
                        "Inference attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    debug!(error = %e, attempts = attempt + 1, "Inference failed");
                    return Err(e);
                }
            }
        }
    }
}
