//! Response encoders for the generation endpoint
//!
//! The pipeline produces one outcome; how it is presented to the caller is
//! chosen per deployment (`server.response_encoding`).

use actix_web::HttpResponse;
use base64::Engine;
use serde::Serialize;
use utoipa::ToSchema;

use crate::config::ResponseEncoding;
use crate::providers::GeneratedImage;
use crate::relay::PipelineError;

/// JSON envelope returned by the `json` encoding
#[derive(Debug, Serialize, ToSchema)]
pub struct GenerateResponse {
    /// Base64 (standard alphabet) image bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_base64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Turns pipeline outcomes into HTTP responses
pub trait ResponseEncoder: Send + Sync {
    fn success(&self, image: &GeneratedImage) -> HttpResponse;

    /// Plain-text error with the pipeline's status code
    fn failure(&self, err: &PipelineError) -> HttpResponse {
        HttpResponse::build(err.status_code())
            .content_type("text/plain; charset=utf-8")
            .body(err.public_message())
    }
}

/// `{"image_base64": ...}` / `{"error": ...}`
pub struct JsonEnvelope;

impl ResponseEncoder for JsonEnvelope {
    fn success(&self, image: &GeneratedImage) -> HttpResponse {
        HttpResponse::Ok().json(GenerateResponse {
            image_base64: Some(base64::engine::general_purpose::STANDARD.encode(&image.bytes)),
            error: None,
        })
    }

    fn failure(&self, err: &PipelineError) -> HttpResponse {
        let status = err.status_code();
        if status.is_server_error() {
            HttpResponse::build(status).json(GenerateResponse {
                image_base64: None,
                error: Some(err.public_message()),
            })
        } else {
            HttpResponse::build(status)
                .content_type("text/plain; charset=utf-8")
                .body(err.public_message())
        }
    }
}

/// Image bytes with the upstream content type
pub struct RawImage;

impl ResponseEncoder for RawImage {
    fn success(&self, image: &GeneratedImage) -> HttpResponse {
        HttpResponse::Ok()
            .content_type(image.content_type.mime())
            .body(image.bytes.clone())
    }
}

/// Encoder for the configured presentation
pub fn encoder_for(encoding: ResponseEncoding) -> &'static dyn ResponseEncoder {
    match encoding {
        ResponseEncoding::Json => &JsonEnvelope,
        ResponseEncoding::Raw => &RawImage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{ImageContentType, ProviderError};
    use actix_web::{body::to_bytes, http::{header::CONTENT_TYPE, StatusCode}};
    use bytes::Bytes;

    fn image() -> GeneratedImage {
        GeneratedImage {
            bytes: Bytes::from_static(&[0x89, b'P', b'N', b'G', 0xff, 0x00]),
            content_type: ImageContentType::Png,
        }
    }

    #[actix_web::test]
    async fn test_json_envelope_round_trips_bytes() {
        let res = encoder_for(ResponseEncoding::Json).success(&image());
        assert_eq!(res.status(), StatusCode::OK);

        let body = to_bytes(res.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(json.get("error").is_none());

        let decoded = base64::engine::general_purpose::STANDARD
            .decode(json["image_base64"].as_str().unwrap())
            .unwrap();
        assert_eq!(decoded, image().bytes.to_vec());
    }

    #[actix_web::test]
    async fn test_raw_image_keeps_content_type() {
        let res = encoder_for(ResponseEncoding::Raw).success(&image());
        assert_eq!(res.headers().get(CONTENT_TYPE).unwrap(), "image/png");

        let body = to_bytes(res.into_body()).await.unwrap();
        assert_eq!(body, image().bytes);
    }

    #[actix_web::test]
    async fn test_generation_failure_envelope() {
        let err = PipelineError::GenerationFailed(ProviderError::ParseError("x".to_string()));
        let res = JsonEnvelope.failure(&err);
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = to_bytes(res.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json, serde_json::json!({"error": "Image generation failed"}));
    }

    #[actix_web::test]
    async fn test_limit_reached_is_plain_text_in_both_encodings() {
        let err = PipelineError::LimitReached { limit: 5 };
        for encoding in [ResponseEncoding::Json, ResponseEncoding::Raw] {
            let res = encoder_for(encoding).failure(&err);
            assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
            assert_eq!(res.headers().get(CONTENT_TYPE).unwrap(), "text/plain; charset=utf-8");

            let body = to_bytes(res.into_body()).await.unwrap();
            assert_eq!(body, "Daily image generation limit of 5 reached");
        }
    }
}
