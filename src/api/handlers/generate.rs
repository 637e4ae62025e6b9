//! Image generation endpoint

use actix_web::{http::header::AUTHORIZATION, web, HttpRequest, HttpResponse};
use std::time::Instant;
use tracing::{error, info};

use crate::api::encoding::encoder_for;
use crate::api::middleware::{extract_bearer_token, extract_client_ip, token_fingerprint, BearerTokenExt};
use crate::relay::{GenerationRequest, PipelineError};
use crate::AppState;

/// POST /generate - Generate an image within the caller's daily quota
#[utoipa::path(
    post,
    path = "/generate",
    tag = "generation",
    request_body = GenerationRequest,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Image generated (JSON envelope or raw image bytes)", body = crate::api::encoding::GenerateResponse),
        (status = 400, description = "Malformed JSON body or empty prompt", body = String),
        (status = 401, description = "Missing credential or identity resolution failed", body = String),
        (status = 429, description = "Daily limit reached", body = String),
        (status = 500, description = "Usage store or generation failure", body = crate::api::encoding::GenerateResponse)
    )
)]
pub async fn generate_image(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Bytes,
) -> HttpResponse {
    let start = Instant::now();
    let encoder = encoder_for(state.settings.server.response_encoding);

    // Normally set by BearerAuth; checked again so the handler never runs unauthenticated
    let token = match req.bearer_token() {
        Some(token) => token.0,
        None => match extract_bearer_token(req.headers().get(AUTHORIZATION)) {
            Ok(token) => token,
            Err(_) => return encoder.failure(&PipelineError::MissingCredential),
        },
    };

    let request: GenerationRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            return encoder.failure(&PipelineError::InvalidRequest(format!("malformed JSON body ({})", e)));
        }
    };

    let client_ip = extract_client_ip(&req)
        .map(|ip| ip.to_string())
        .unwrap_or_default();

    info!(
        token = %token_fingerprint(&token),
        prompt_chars = request.prompt.chars().count(),
        "Processing image generation request"
    );

    match state.pipeline.run(&token, &request, &client_ip).await {
        Ok(image) => {
            info!(
                bytes = image.bytes.len(),
                generation_time_ms = start.elapsed().as_millis() as u64,
                "Image generation request completed"
            );
            encoder.success(&image)
        }
        Err(e) => {
            if e.status_code().is_server_error() {
                error!(error = %e, "Image generation request failed");
            } else {
                info!(error = %e, status = e.status_code().as_u16(), "Image generation request refused");
            }
            encoder.failure(&e)
        }
    }
}
