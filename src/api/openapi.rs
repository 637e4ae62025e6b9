//! OpenAPI 3.0 document

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::api::encoding::GenerateResponse;
use crate::api::handlers::health::HealthResponse;
use crate::relay::GenerationRequest;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "R-Image-Relay API",
        version = "1.0.0",
        description = "Quota-gated image generation: one bearer-authenticated endpoint that checks a per-user daily limit before calling the inference service",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "/", description = "Current server")
    ),
    tags(
        (name = "system", description = "System health and status endpoints"),
        (name = "generation", description = "Image generation endpoint")
    ),
    paths(
        crate::api::handlers::health::health_check,
        crate::api::handlers::generate::generate_image,
    ),
    components(
        schemas(
            HealthResponse,
            GenerationRequest,
            GenerateResponse,
        )
    ),
    modifiers(&BearerSecurity)
)]
pub struct ApiDoc;

/// Registers the `bearer` scheme referenced by protected paths
struct BearerSecurity;

impl Modify for BearerSecurity {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}
