//! Configuration module for the relay service

use serde::{Deserialize, Serialize};
use config::{Config, ConfigError, Environment, File};
use std::path::PathBuf;
use std::time::Duration;

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub identity: IdentitySettings,
    pub store: StoreSettings,
    pub inference: InferenceSettings,
    pub quota: QuotaSettings,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
    /// How `POST /generate` presents its result
    pub response_encoding: ResponseEncoding,
    pub cors_allowed_origins: Vec<String>,
}

/// Presentation contract for generated images
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseEncoding {
    /// `{"image_base64": "..."}` on success, `{"error": "..."}` on failure
    Json,
    /// Image bytes with the upstream image content type
    Raw,
}

/// Identity service (Supabase auth) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentitySettings {
    pub base_url: String,
    pub api_key: String,
    pub timeout_secs: u64,
}

/// Usage record store (PostgREST) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    pub base_url: String,
    pub table: String,
    /// Full table endpoint; takes precedence over `base_url` + `table`
    pub table_url: Option<String>,
    pub api_key: String,
    pub timeout_secs: u64,
    /// Upper bound on compare-and-set restarts per check-and-increment
    pub max_attempts: u32,
}

/// Inference endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceSettings {
    pub url: String,
    pub bearer_token: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub requests_per_minute: Option<u32>,
}

/// Daily quota configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaSettings {
    pub daily_limit: u32,
}

impl StoreSettings {
    /// Endpoint of the usage table
    pub fn endpoint(&self) -> String {
        match &self.table_url {
            Some(url) if !url.is_empty() => url.trim_end_matches('/').to_string(),
            _ => format!("{}/rest/v1/{}", self.base_url.trim_end_matches('/'), self.table),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl IdentitySettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl InferenceSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Settings {
    /// Load configuration from defaults, files and environment variables
    ///
    /// Configuration priority (highest to lowest):
    /// 1. Legacy deployment variables (`supabaseProjectURL`, `hfURL`, ...)
    /// 2. Environment variables (prefixed with RELAY_)
    /// 3. config/local.toml (gitignored)
    /// 4. config/default.toml
    /// 5. Built-in defaults
    pub fn load() -> Result<Self, ConfigError> {
        let config_dir = std::env::var("CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"));

        let builder = Config::builder()
            .add_source(Config::try_from(&Settings::default())?)
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            // RELAY_SERVER__PORT, RELAY_INFERENCE__URL, etc.
            .add_source(
                Environment::with_prefix("RELAY")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("server.cors_allowed_origins")
                    .try_parsing(true)
            )
            .set_override_option("identity.base_url", legacy_var("supabaseProjectURL"))?
            .set_override_option("store.base_url", legacy_var("supabaseProjectURL"))?
            .set_override_option("identity.api_key", legacy_var("supabaseAnonKey"))?
            .set_override_option("store.api_key", legacy_var("supabaseAnonKey"))?
            .set_override_option("store.table_url", legacy_var("supabaseDBURL"))?
            .set_override_option("inference.url", legacy_var("hfURL"))?
            .set_override_option("inference.bearer_token", legacy_var("BEARER_TOKEN"))?;

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check that every collaborator the pipeline needs is configured
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("identity.base_url", self.identity.base_url.as_str()),
            ("identity.api_key", self.identity.api_key.as_str()),
            ("store.api_key", self.store.api_key.as_str()),
            ("inference.url", self.inference.url.as_str()),
            ("inference.bearer_token", self.inference.bearer_token.as_str()),
        ];

        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Message(format!("{} must be set", key)));
            }
        }

        if self.store.table_url.as_deref().unwrap_or("").is_empty() && self.store.base_url.is_empty() {
            return Err(ConfigError::Message(
                "store.base_url or store.table_url must be set".to_string(),
            ));
        }

        if self.quota.daily_limit == 0 {
            return Err(ConfigError::Message("quota.daily_limit must be positive".to_string()));
        }

        if self.store.max_attempts == 0 {
            return Err(ConfigError::Message("store.max_attempts must be positive".to_string()));
        }

        Ok(())
    }
}

fn legacy_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            server: ServerSettings {
                host: "0.0.0.0".to_string(),
                port: 8080,
                workers: None,
                response_encoding: ResponseEncoding::Json,
                cors_allowed_origins: vec!["http://localhost:5173".to_string()],
            },
            identity: IdentitySettings {
                base_url: String::new(),
                api_key: String::new(),
                timeout_secs: 10,
            },
            store: StoreSettings {
                base_url: String::new(),
                table: "image_usage".to_string(),
                table_url: None,
                api_key: String::new(),
                timeout_secs: 10,
                max_attempts: 5,
            },
            inference: InferenceSettings {
                url: String::new(),
                bearer_token: String::new(),
                timeout_secs: 120,
                max_retries: 3,
                initial_backoff_ms: 1_000,
                max_backoff_ms: 30_000,
                requests_per_minute: None,
            },
            quota: QuotaSettings {
                daily_limit: 5,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> Settings {
        let mut settings = Settings::default();
        settings.identity.base_url = "https://project.supabase.co".to_string();
        settings.identity.api_key = "anon".to_string();
        settings.store.base_url = "https://project.supabase.co/".to_string();
        settings.store.api_key = "anon".to_string();
        settings.inference.url = "https://inference.example/models/sd".to_string();
        settings.inference.bearer_token = "hf_token".to_string();
        settings
    }

    #[test]
    fn test_default_quota_is_five() {
        assert_eq!(Settings::default().quota.daily_limit, 5);
        assert_eq!(Settings::default().server.response_encoding, ResponseEncoding::Json);
    }

    #[test]
    fn test_default_settings_fail_validation() {
        assert!(Settings::default().validate().is_err());
        assert!(configured().validate().is_ok());
    }

    #[test]
    fn test_store_endpoint_from_base_url() {
        let settings = configured();
        assert_eq!(
            settings.store.endpoint(),
            "https://project.supabase.co/rest/v1/image_usage"
        );
    }

    #[test]
    fn test_store_endpoint_prefers_table_url() {
        let mut settings = configured();
        settings.store.table_url = Some("https://db.example/rest/v1/usage/".to_string());
        assert_eq!(settings.store.endpoint(), "https://db.example/rest/v1/usage");
    }

    #[test]
    fn test_zero_daily_limit_rejected() {
        let mut settings = configured();
        settings.quota.daily_limit = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_response_encoding_parses_lowercase() {
        let encoding: ResponseEncoding = serde_json::from_str("\"raw\"").unwrap();
        assert_eq!(encoding, ResponseEncoding::Raw);
    }

    /// The only test touching process environment; all cases share it
    #[test]
    fn test_load_honors_legacy_deployment_variables() {
        let vars = [
            ("CONFIG_PATH", std::env::temp_dir().join("r-image-relay-no-config").display().to_string()),
            ("supabaseProjectURL", "https://legacy.supabase.co".to_string()),
            ("supabaseAnonKey", "legacy-anon".to_string()),
            ("hfURL", "https://inference.example/models/sdxl".to_string()),
            ("BEARER_TOKEN", "hf_legacy".to_string()),
        ];
        for (name, value) in &vars {
            std::env::set_var(name, value);
        }
        std::env::remove_var("supabaseDBURL");

        let settings = Settings::load().unwrap();
        assert_eq!(settings.identity.base_url, "https://legacy.supabase.co");
        assert_eq!(settings.store.base_url, "https://legacy.supabase.co");
        assert_eq!(settings.identity.api_key, "legacy-anon");
        assert_eq!(settings.store.api_key, "legacy-anon");
        assert_eq!(settings.inference.url, "https://inference.example/models/sdxl");
        assert_eq!(settings.inference.bearer_token, "hf_legacy");
        assert_eq!(
            settings.store.endpoint(),
            "https://legacy.supabase.co/rest/v1/image_usage"
        );
        assert_eq!(settings.quota.daily_limit, 5);

        std::env::set_var("supabaseDBURL", "https://db.legacy.example/rest/v1/usage_log");
        let settings = Settings::load().unwrap();
        assert_eq!(settings.store.endpoint(), "https://db.legacy.example/rest/v1/usage_log");

        // Missing collaborator settings fail at load time
        std::env::remove_var("hfURL");
        assert!(Settings::load().is_err());

        for (name, _) in &vars {
            std::env::remove_var(name);
        }
        std::env::remove_var("supabaseDBURL");
    }
}
