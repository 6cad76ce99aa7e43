//! API handlers for the book cover server
//!
//! Provides REST endpoints for:
//! - PDF upload with cover compositing
//! - Registration status polling
//! - Variant price updates

use std::path::Path;

use axum::{
    body::Bytes,
    extract::{FromRequest, Multipart, Path as UrlPath, Request, State},
    http::header::CONTENT_TYPE,
    Form, Json,
};
use bookcover_core::{compose_file, decode_cover_payload};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::ServerError;
use crate::registration::RegistrationStatus;
use crate::state::AppState;

/// Multipart field carrying the PDF
pub const PDF_FIELD: &str = "pdf";
/// Multipart field carrying the front cover PNG
pub const FRONT_COVER_FIELD: &str = "book_coverFront";
/// Multipart field carrying the back cover PNG
pub const BACK_COVER_FIELD: &str = "book_coverBack";

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Handler: GET /health
pub async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "bookcover-server",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Upload response
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: &'static str,
    /// Name of the composited file under `/uploads`
    #[serde(rename = "Filename")]
    pub filename: String,
    /// Poll `/api/registrations/{id}` for the Shopify registration outcome
    #[serde(rename = "registrationId")]
    pub registration_id: Uuid,
}

/// Fields of an upload form
struct UploadForm {
    file_name: String,
    pdf: Bytes,
    front: Bytes,
    back: Bytes,
}

async fn read_upload_form(mut multipart: Multipart) -> Result<UploadForm, ServerError> {
    let mut pdf = None;
    let mut front = None;
    let mut back = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::InvalidUpload(e.body_text()))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some(PDF_FIELD) => {
                let file_name = field.file_name().unwrap_or("upload.pdf").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ServerError::InvalidUpload(e.body_text()))?;
                pdf = Some((file_name, data));
            }
            Some(FRONT_COVER_FIELD) => {
                front = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| ServerError::InvalidUpload(e.body_text()))?,
                );
            }
            Some(BACK_COVER_FIELD) => {
                back = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| ServerError::InvalidUpload(e.body_text()))?,
                );
            }
            other => debug!("Ignoring multipart field {:?}", other),
        }
    }

    let (file_name, pdf) =
        pdf.ok_or_else(|| ServerError::InvalidUpload(format!("Missing '{}' file", PDF_FIELD)))?;
    let front = front.ok_or_else(|| {
        ServerError::InvalidUpload(format!("Missing '{}' field", FRONT_COVER_FIELD))
    })?;
    let back = back.ok_or_else(|| {
        ServerError::InvalidUpload(format!("Missing '{}' field", BACK_COVER_FIELD))
    })?;

    Ok(UploadForm {
        file_name,
        pdf,
        front,
        back,
    })
}

/// Reduce a client-supplied file name to a safe final path component
pub fn sanitize_file_name(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.trim_matches('.').is_empty() {
        "upload.pdf".to_string()
    } else {
        cleaned
    }
}

/// Handler: POST /upload
pub async fn handle_upload(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, ServerError> {
    let form = read_upload_form(multipart).await?;

    let stored_name = format!("{}-{}", Uuid::new_v4(), sanitize_file_name(&form.file_name));
    let source = state.config.upload_dir.join(&stored_name);
    tokio::fs::write(&source, &form.pdf)
        .await
        .map_err(|e| ServerError::Internal(format!("Failed to store upload: {}", e)))?;

    info!(
        "Stored upload {} ({} bytes) as {}",
        form.file_name,
        form.pdf.len(),
        stored_name
    );

    let options = state.config.compose;
    let compose_source = source.clone();
    let composited = tokio::task::spawn_blocking(move || {
        let front = decode_cover_payload(&form.front)?;
        let back = decode_cover_payload(&form.back)?;
        compose_file(&compose_source, &front, &back, &options)
    })
    .await
    .map_err(|e| ServerError::Internal(format!("Compositing task failed: {}", e)))??;

    let filename = composited
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    info!("Composited {} into {}", stored_name, filename);

    let registration_id = state.registrations.enqueue(source, composited).await;

    Ok(Json(UploadResponse {
        message: "File uploaded and modified successfully, Shopify upload queued",
        filename,
        registration_id,
    }))
}

/// Handler: GET /api/registrations/:id
pub async fn handle_registration_status(
    State(state): State<AppState>,
    UrlPath(id): UrlPath<String>,
) -> Result<Json<RegistrationStatus>, ServerError> {
    let uuid = Uuid::parse_str(&id).map_err(|_| ServerError::RegistrationNotFound(id.clone()))?;

    state
        .registrations
        .status(uuid)
        .await
        .map(Json)
        .ok_or(ServerError::RegistrationNotFound(id))
}

/// `rate` sent as a JSON string, JSON number or form value
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RateValue {
    Text(String),
    Number(serde_json::Number),
}

/// Rate request body
#[derive(Debug, Deserialize)]
struct RateRequest {
    rate: RateValue,
}

/// Validate a rate and normalise it to the decimal string Shopify expects
pub fn parse_rate(raw: &str) -> Result<String, ServerError> {
    let rate = raw.trim();
    match rate.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => Ok(rate.to_string()),
        _ => Err(ServerError::InvalidRequest(format!(
            "Invalid rate '{}'. Must be a non-negative number",
            raw
        ))),
    }
}

async fn read_rate(request: Request) -> Result<String, ServerError> {
    let is_json = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.starts_with("application/json"))
        .unwrap_or(false);

    let body = if is_json {
        Json::<RateRequest>::from_request(request, &())
            .await
            .map_err(|e| ServerError::InvalidRequest(e.body_text()))?
            .0
    } else {
        Form::<RateRequest>::from_request(request, &())
            .await
            .map_err(|e| ServerError::InvalidRequest(e.body_text()))?
            .0
    };

    match body.rate {
        RateValue::Text(text) => parse_rate(&text),
        RateValue::Number(number) => parse_rate(&number.to_string()),
    }
}

/// Handler: POST /rate
pub async fn handle_rate(
    State(state): State<AppState>,
    request: Request,
) -> Result<Json<Value>, ServerError> {
    let rate = read_rate(request).await?;
    let variant_id = state
        .config
        .variant_id
        .ok_or(ServerError::NotConfigured("SHOPIFY_VARIANT_ID"))?;

    info!("Updating variant {} price to {}", variant_id, rate);
    let data = state.admin.update_variant_price(variant_id, &rate).await?;

    Ok(Json(json!({ "data": data })))
}
