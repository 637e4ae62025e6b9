//! Health check endpoint

use actix_web::{web, HttpResponse};
use serde::Serialize;
use utoipa::ToSchema;

use crate::AppState;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
    /// Generations allowed per user per calendar day
    pub daily_limit: u32,
}

/// GET /health - Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    tag = "system",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let response = HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        daily_limit: state.pipeline.daily_limit(),
    };

    HttpResponse::Ok().json(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::db::{usage::tests::MemoryStore, UsageLedger};
    use crate::relay::pipeline::tests::{FixedIdentity, RecordingGenerator};
    use crate::relay::GenerationPipeline;
    use actix_web::{http::StatusCode, test, App};
    use parking_lot::Mutex;
    use std::sync::{atomic::AtomicUsize, Arc};
    use std::time::Instant;

    #[actix_web::test]
    async fn test_health_needs_no_credential() {
        let settings = Settings::default();
        let pipeline = GenerationPipeline::new(
            Arc::new(FixedIdentity {
                user_id: Some("u1".to_string()),
                calls: AtomicUsize::new(0),
            }),
            UsageLedger::new(Arc::new(MemoryStore::default()), 7, 3),
            Arc::new(RecordingGenerator {
                prompts: Mutex::new(Vec::new()),
                fail: false,
            }),
        );
        let state = web::Data::new(AppState {
            settings,
            pipeline,
            started_at: Instant::now(),
        });
        let app = test::init_service(
            App::new()
                .app_data(state)
                .wrap(crate::api::middleware::BearerAuth::new())
                .route("/health", web::get().to(health_check)),
        )
        .await;

        let res = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
        assert_eq!(res.status(), StatusCode::OK);

        let body: serde_json::Value = test::read_body_json(res).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["daily_limit"], 7);
    }
}
