//! R-Image-Relay
//!
//! Quota-gated image generation relay using Rust + Actix-Web.
//! Verifies the caller's bearer token with the identity service, enforces a
//! per-user daily generation limit stored in a PostgREST table, then proxies
//! the prompt to the inference endpoint.

use actix_cors::Cors;
use actix_web::{http::header, middleware, web, App, HttpServer};
use anyhow::Context;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use tracing_actix_web::TracingLogger;

mod api;
mod config;
mod db;
mod providers;
mod relay;

use crate::api::middleware::BearerAuth;
use crate::config::{ServerSettings, Settings};
use crate::db::{StoreClient, UsageLedger};
use crate::providers::{build_http_client, InferenceClient, SupabaseIdentity};
use crate::relay::GenerationPipeline;

/// Application state shared across all handlers
pub struct AppState {
    pub settings: Settings,
    pub pipeline: GenerationPipeline,
    pub started_at: Instant,
}

fn cors(server: &ServerSettings) -> Cors {
    server
        .cors_allowed_origins
        .iter()
        .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
        .allowed_methods(vec!["GET", "POST", "OPTIONS"])
        .allowed_headers(vec![header::AUTHORIZATION, header::CONTENT_TYPE])
        .supports_credentials()
        .max_age(3600)
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing subscriber for structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("r_image_relay=info".parse()?)
                .add_directive("actix_web=info".parse()?)
        )
        .json()
        .init();

    // Load configuration
    let settings = Settings::load().context("Failed to load configuration")?;
    let bind_addr = format!("{}:{}", settings.server.host, settings.server.port);

    info!(
        "Starting R-Image-Relay v{} on {}",
        env!("CARGO_PKG_VERSION"),
        bind_addr
    );

    // One pooled client for every outbound call; timeouts are set per request
    let http = build_http_client().context("Failed to build HTTP client")?;

    let store = StoreClient::new(&settings.store, http.clone()).context("Invalid usage store settings")?;
    let ledger = UsageLedger::new(
        Arc::new(store),
        settings.quota.daily_limit,
        settings.store.max_attempts,
    );
    let pipeline = GenerationPipeline::new(
        Arc::new(SupabaseIdentity::new(&settings.identity, http.clone())),
        ledger,
        Arc::new(InferenceClient::new(&settings.inference, http)),
    );

    info!(
        daily_limit = settings.quota.daily_limit,
        encoding = ?settings.server.response_encoding,
        store = %settings.store.endpoint(),
        "Generation pipeline ready"
    );

    let workers = settings.server.workers.unwrap_or_else(|| num_cpus::get() * 2);

    // Create shared application state
    let app_state = web::Data::new(AppState {
        settings,
        pipeline,
        started_at: Instant::now(),
    });

    // Configure and start HTTP server
    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            // Rejects requests without a bearer credential before any handler runs
            .wrap(BearerAuth::new())
            .wrap(TracingLogger::default())
            .wrap(middleware::Compress::default())
            .wrap(
                middleware::DefaultHeaders::new()
                    .add(("X-Service", "r-image-relay"))
                    .add(("X-Version", env!("CARGO_PKG_VERSION")))
            )
            // Outermost so preflight and 401 responses still carry CORS headers
            .wrap(cors(&app_state.settings.server))
            .configure(api::configure_routes)
    })
    .workers(workers)
    .bind(&bind_addr)?
    .run()
    .await?;

    Ok(())
}
