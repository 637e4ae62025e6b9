//! API module - HTTP routes and handlers

pub mod encoding;
pub mod handlers;
pub mod middleware;
pub mod openapi;

use actix_web::web;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::openapi::ApiDoc;

/// Configure all API routes
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/generate", web::post().to(handlers::generate::generate_image))
        .route("/health", web::get().to(handlers::health::health_check))
        // Swagger UI and OpenAPI document
        .service(
            SwaggerUi::new("/swagger-ui/{_:.*}")
                .url("/api-docs/openapi.json", ApiDoc::openapi())
        );
}
