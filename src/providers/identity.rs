//! Supabase auth client
//!
//! Exchanges a caller's access token for the user's subject id via
//! `GET /auth/v1/user`. Any failure is reported the same way upstream: the
//! caller is unauthorized, whether the token expired or the service is down.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::http_client::body_snippet;
use super::traits::{IdentityProvider, ProviderError, ProviderResult};
use crate::config::IdentitySettings;

/// Subset of the `/auth/v1/user` response we rely on
#[derive(Debug, Deserialize)]
struct AuthUser {
    sub: Option<String>,
    /// Newer GoTrue versions return the user object with `id`
    id: Option<String>,
}

/// Identity lookups against a Supabase project
pub struct SupabaseIdentity {
    http: Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl SupabaseIdentity {
    pub fn new(settings: &IdentitySettings, http: Client) -> Self {
        SupabaseIdentity {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            timeout: settings.timeout(),
        }
    }
}

#[async_trait]
impl IdentityProvider for SupabaseIdentity {
    async fn resolve(&self, token: &str) -> ProviderResult<String> {
        let url = format!("{}/auth/v1/user", self.base_url);
        debug!(url = %url, "Resolving caller identity");

        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .header("apikey", &self.api_key)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Identity service rejected token");
            return Err(ProviderError::Unauthorized {
                status: status.as_u16(),
                body: body_snippet(&body),
            });
        }

        let text = response.text().await?;
        let user: AuthUser = serde_json::from_str(&text)
            .map_err(|e| ProviderError::ParseError(format!("JSON parse error: {} - Body: {}", e, body_snippet(&text))))?;

        user.sub
            .or(user.id)
            .filter(|sub| !sub.is_empty())
            .ok_or_else(|| ProviderError::ParseError("Identity response has no subject".to_string()))
    }
}
