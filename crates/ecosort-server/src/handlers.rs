//! API route handlers.
//!
//! Classification handlers admit the request (auth, then rate limit) before
//! they look at the body, so rejected clients never cost a parse or decode.

use std::path::Path;
use std::time::Instant;

use axum::extract::multipart::{Field, MultipartError, MultipartRejection};
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Multipart, Request, State};
use axum::http::{StatusCode, Uri};
use axum::Json;
use tracing::{debug, info};

use ecosort_core::envelope::Envelope;
use ecosort_core::validation::ImageMime;

use crate::error::{ApiError, Result};
use crate::extract::ClientContext;
use crate::metrics::{ClassificationKind, MetricsSnapshot};
use crate::models::{
    ClassifyTextRequest, Features, HealthResponse, ImageClassification, ImageInfo, LimitsInfo,
    TextClassification, INPUT_PREVIEW_CHARS,
};
use crate::state::AppState;

/// Service name reported by the health endpoint.
pub const SERVICE_NAME: &str = "EcoSort AI Waste Classifier";

/// Longest text excerpt written to logs.
const LOG_PREVIEW_CHARS: usize = 50;

/// Multipart field names accepted for the uploaded image.
const IMAGE_FIELDS: &[&str] = &["image", "file"];

/// POST /classify-text - Classify a free-text item description.
pub async fn classify_text(
    State(state): State<AppState>,
    client: ClientContext,
    request: Request,
) -> Result<Json<Envelope<TextClassification>>> {
    let admitted = state
        .service
        .admit(client.credential.as_deref(), &client.peer, Instant::now())?;

    let Json(req) = Json::<ClassifyTextRequest>::from_request(request, &state)
        .await
        .map_err(json_error)?;

    let outcome = state.service.classify_text(&req.text)?;
    state
        .metrics
        .record_classification(ClassificationKind::Text, outcome.result.label);

    info!(
        client = %admitted.client,
        label = %outcome.result.label,
        confidence = outcome.result.confidence,
        chars = outcome.text.char_len(),
        "Text classified"
    );
    debug!(preview = %outcome.text.preview(LOG_PREVIEW_CHARS), "Classified text");

    Ok(Json(Envelope::success(TextClassification {
        input_text: outcome.text.preview(INPUT_PREVIEW_CHARS),
        result: outcome.result,
    })))
}

/// POST /classify-image - Classify an uploaded photo.
pub async fn classify_image(
    State(state): State<AppState>,
    client: ClientContext,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<Envelope<ImageClassification>>> {
    let admitted = state
        .service
        .admit(client.credential.as_deref(), &client.peer, Instant::now())?;

    let mut multipart =
        multipart.map_err(|rejection| ApiError::MalformedRequest(rejection.body_text()))?;

    let (declared_type, bytes) = loop {
        let Some(field) = multipart.next_field().await.map_err(multipart_error)? else {
            return Err(ApiError::MalformedRequest(
                "no image file provided; expected field 'image'".to_string(),
            ));
        };

        if field.name().is_some_and(|name| IMAGE_FIELDS.contains(&name)) {
            let declared_type = part_content_type(&field);
            let bytes = field.bytes().await.map_err(multipart_error)?;
            break (declared_type, bytes);
        }

        debug!(field = ?field.name(), "Skipping multipart field");
    };

    let service = state.service.clone();
    let size = bytes.len();
    let outcome = tokio::task::spawn_blocking(move || {
        service.classify_image(bytes, &declared_type, size)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("classification task failed: {}", e)))??;

    state
        .metrics
        .record_classification(ClassificationKind::Image, outcome.result.label);

    info!(
        client = %admitted.client,
        label = %outcome.result.label,
        confidence = outcome.result.confidence,
        width = outcome.width,
        height = outcome.height,
        bytes = size,
        "Image classified"
    );

    Ok(Json(Envelope::success(ImageClassification {
        result: outcome.result,
        image_info: ImageInfo {
            width: outcome.width,
            height: outcome.height,
            format: outcome.mime.short_name(),
        },
    })))
}

/// Part content type, or a type derived from the file extension when the
/// client sent none or a generic one.
fn part_content_type(field: &Field<'_>) -> String {
    let content_type = field
        .content_type()
        .map(str::trim)
        .filter(|ct| !ct.is_empty() && !ct.eq_ignore_ascii_case("application/octet-stream"));

    if let Some(ct) = content_type {
        return ct.to_string();
    }

    field
        .file_name()
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .and_then(ImageMime::from_extension)
        .map(|mime| mime.as_mime().to_string())
        .unwrap_or_default()
}

fn json_error(rejection: JsonRejection) -> ApiError {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(rejection.body_text())
    } else {
        ApiError::MalformedRequest(rejection.body_text())
    }
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge("upload exceeds the maximum request size".to_string())
    } else {
        ApiError::MalformedRequest(err.body_text())
    }
}

/// GET / and GET /health - Service metadata.
pub async fn health(State(state): State<AppState>) -> Json<Envelope<HealthResponse>> {
    let service = &state.service;

    Json(Envelope::success(HealthResponse {
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        status: "healthy",
        features: Features {
            text_classification: true,
            image_classification: true,
            rate_limiting: true,
            api_auth: service.auth_enabled(),
            metrics: state.enable_metrics,
        },
        limits: LimitsInfo::from(service.limits()),
    }))
}

/// GET /metrics - Request counters, when enabled.
pub async fn metrics(State(state): State<AppState>) -> Result<Json<Envelope<MetricsSnapshot>>> {
    if !state.enable_metrics {
        return Err(ApiError::NotFound("metrics are disabled".to_string()));
    }

    let tracked = state.service.limiter().tracked_clients();
    Ok(Json(Envelope::success(state.metrics.snapshot(tracked))))
}

/// Fallback for unknown routes.
pub async fn not_found(uri: Uri) -> ApiError {
    ApiError::NotFound(format!("no route for {}", uri.path()))
}
