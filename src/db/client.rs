//! PostgREST client for the usage table

use async_trait::async_trait;
use chrono::NaiveDate;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::{Client, RequestBuilder, StatusCode};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use super::models::{CountUpdate, NewUsageRecord, RecordId, UsageRecord};
use super::usage::{InsertOutcome, RecordStore};
use crate::config::StoreSettings;
use crate::providers::http_client::body_snippet;

/// Characters left as-is inside a PostgREST filter value
const FILTER_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Record store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Store returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("{count} usage records found for user {user_id} on {date}")]
    DuplicateRecords { user_id: String, date: NaiveDate, count: usize },

    #[error("Usage record for user {user_id} kept changing after {attempts} attempts")]
    Contention { user_id: String, attempts: u32 },

    #[error("Configuration error: {0}")]
    Config(String),
}

/// HTTP client for the `image_usage` table
#[derive(Clone)]
pub struct StoreClient {
    http: Client,
    endpoint: Url,
    api_key: String,
    timeout: Duration,
}

impl StoreClient {
    pub fn new(settings: &StoreSettings, http: Client) -> Result<Self, StoreError> {
        let endpoint = Url::parse(&settings.endpoint())
            .map_err(|e| StoreError::Config(format!("Invalid store URL: {}", e)))?;

        info!(endpoint = %endpoint, "Usage store client created");

        Ok(StoreClient {
            http,
            endpoint,
            api_key: settings.api_key.clone(),
            timeout: settings.timeout(),
        })
    }

    /// Table URL with `column=eq.value` filters appended
    fn filtered_url(&self, filters: &[(&str, String)]) -> String {
        let query = filters
            .iter()
            .map(|(column, value)| {
                format!("{}=eq.{}", column, utf8_percent_encode(value, FILTER_VALUE))
            })
            .collect::<Vec<_>>()
            .join("&");

        format!("{}?{}", self.endpoint, query)
    }

    /// Both the `apikey` header and the bearer credential carry the service key
    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
    }

    async fn error_for_status(response: reqwest::Response) -> StoreError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        StoreError::Status {
            status,
            body: body_snippet(&body),
        }
    }
}

#[async_trait]
impl RecordStore for StoreClient {
    async fn find_daily(&self, user_id: &str, date: NaiveDate) -> Result<Vec<UsageRecord>, StoreError> {
        let url = self.filtered_url(&[
            ("user_id", user_id.to_string()),
            ("date", date.to_string()),
        ]);
        debug!(url = %url, "Querying usage record");

        let response = self
            .authorize(self.http.get(&url))
            .header("Accept", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_for_status(response).await);
        }

        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| StoreError::Decode(format!("{} - Body: {}", e, body_snippet(&text))))
    }

    async fn insert(&self, record: &NewUsageRecord) -> Result<InsertOutcome, StoreError> {
        let response = self
            .authorize(self.http.post(self.endpoint.as_str()))
            .header("Prefer", "return=minimal")
            .json(record)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(InsertOutcome::Inserted),
            StatusCode::CONFLICT => {
                debug!(user_id = %record.user_id, date = %record.date, "Usage insert conflicted");
                Ok(InsertOutcome::Conflict)
            }
            _ => Err(Self::error_for_status(response).await),
        }
    }

    async fn compare_and_set_count(
        &self,
        id: &RecordId,
        expected: u32,
        new: u32,
    ) -> Result<bool, StoreError> {
        let url = self.filtered_url(&[
            ("id", id.to_string()),
            ("count", expected.to_string()),
        ]);

        let response = self
            .authorize(self.http.patch(&url))
            .header("Prefer", "return=representation")
            .json(&CountUpdate { count: new })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::error_for_status(response).await);
        }

        let text = response.text().await?;
        // Without the representation a zero-row match is indistinguishable from success
        if text.trim().is_empty() {
            return Err(StoreError::Decode(format!(
                "PATCH returned {} without a representation; cannot confirm count update",
                status
            )));
        }

        let rows: Vec<serde_json::Value> = serde_json::from_str(&text)
            .map_err(|e| StoreError::Decode(format!("{} - Body: {}", e, body_snippet(&text))))?;

        Ok(!rows.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use httpmock::{Method::{GET, PATCH, POST}, MockServer};
    use serde_json::json;

    fn store_for(server: &MockServer) -> StoreClient {
        let mut settings = Settings::default().store;
        settings.base_url = server.base_url();
        settings.api_key = "anon-key".to_string();
        StoreClient::new(&settings, Client::new()).unwrap()
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    #[tokio::test]
    async fn test_find_daily_sends_filters_and_credentials() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/rest/v1/image_usage")
                    .query_param("user_id", "eq.u1")
                    .query_param("date", "eq.2024-05-01")
                    .header("apikey", "anon-key")
                    .header("authorization", "Bearer anon-key");
                then.status(200)
                    .header("content-type", "application/json")
                    .body(json!([{"id": 7, "user_id": "u1", "ip_address": "", "date": "2024-05-01", "count": 2}]).to_string());
            })
            .await;

        let records = store_for(&server).find_daily("u1", day()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, RecordId::Int(7));
        assert_eq!(records[0].count, 2);
    }

    #[tokio::test]
    async fn test_filter_values_are_percent_encoded() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/rest/v1/image_usage")
                    .query_param("user_id", "eq.a&b=c");
                then.status(200).body("[]");
            })
            .await;

        let records = store_for(&server).find_daily("a&b=c", day()).await.unwrap();

        mock.assert_async().await;
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_find_daily_surfaces_bad_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/rest/v1/image_usage");
                then.status(500).body("boom");
            })
            .await;

        let err = store_for(&server).find_daily("u1", day()).await.unwrap_err();
        assert!(matches!(err, StoreError::Status { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_insert_conflict_is_not_an_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/rest/v1/image_usage")
                    .json_body(json!({"user_id": "u1", "ip_address": "", "date": "2024-05-01", "count": 1}));
                then.status(409).body(r#"{"code":"23505"}"#);
            })
            .await;

        let outcome = store_for(&server)
            .insert(&NewUsageRecord::first_of_day("u1", "", day()))
            .await
            .unwrap();
        assert_eq!(outcome, InsertOutcome::Conflict);
    }

    #[tokio::test]
    async fn test_compare_and_set_reports_lost_race() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(PATCH)
                    .path("/rest/v1/image_usage")
                    .query_param("id", "eq.7")
                    .query_param("count", "eq.3")
                    .header("prefer", "return=representation")
                    .json_body(json!({"count": 4}));
                then.status(200).body("[]");
            })
            .await;

        let applied = store_for(&server)
            .compare_and_set_count(&RecordId::Int(7), 3, 4)
            .await
            .unwrap();

        mock.assert_async().await;
        assert!(!applied);
    }

    #[tokio::test]
    async fn test_compare_and_set_without_representation_is_an_error() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(PATCH)
                    .path("/rest/v1/image_usage")
                    .query_param("id", "eq.7")
                    .query_param("count", "eq.4");
                then.status(204);
            })
            .await;

        let err = store_for(&server)
            .compare_and_set_count(&RecordId::Int(7), 4, 5)
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert!(matches!(err, StoreError::Decode(_)), "got {:?}", err);
    }
}
