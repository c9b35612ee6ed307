use actix_multipart::{Multipart, MultipartError};
use actix_web::http::header::ContentType;
use actix_web::{HttpResponse, get, post, web};
use futures_util::TryStreamExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::classification::{Classifier, decode_image, echo_png_base64};
use crate::config::ResponseConfig;
use crate::error::{ClassifierError, Result};
use crate::fetch::ImageFetcher;

const INDEX_HTML: &str = include_str!("../static/index.html");

pub struct AppState {
    pub classifier: Arc<Classifier>,
    pub fetcher: ImageFetcher,
    pub response: ResponseConfig,
    pub body_limit_bytes: usize,
}

#[derive(Debug, Deserialize)]
struct UrlRequest {
    url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PredictResponse {
    pub success: bool,
    pub predicted_class: String,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_probabilities: Option<BTreeMap<String, f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    let json_config = web::JsonConfig::default()
        .error_handler(|err, _req| ClassifierError::BadRequest(err.to_string()).into());

    cfg.app_data(json_config)
        .service(home)
        .service(health)
        .service(predict)
        .service(predict_url);
}

#[get("/")]
async fn home() -> HttpResponse {
    HttpResponse::Ok()
        .content_type(ContentType::html())
        .body(INDEX_HTML)
}

#[get("/health")]
async fn health(data: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "labels": data.classifier.labels().len(),
    }))
}

#[post("/predict")]
async fn predict(data: web::Data<AppState>, mut payload: Multipart) -> Result<HttpResponse> {
    let bytes = read_file_field(&mut payload, data.body_limit_bytes)
        .await
        .inspect_err(|e| tracing::warn!("Upload rejected: {}", e))?;

    tracing::info!("Classifying uploaded image ({} bytes)", bytes.len());
    classify_and_respond(&data, bytes).await
}

#[post("/predict_url")]
async fn predict_url(data: web::Data<AppState>, req: web::Json<UrlRequest>) -> Result<HttpResponse> {
    let url = match req.into_inner().url {
        Some(url) if !url.trim().is_empty() => url,
        _ => return Err(ClassifierError::NoUrl),
    };

    let bytes = data
        .fetcher
        .download_image(url.trim())
        .await
        .inspect_err(|e| tracing::warn!("Download of {} failed: {}", url, e))?;

    tracing::info!("Classifying image from {} ({} bytes)", url, bytes.len());
    classify_and_respond(&data, bytes).await
}

fn multipart_error(e: MultipartError) -> ClassifierError {
    let message = match e {
        MultipartError::ContentTypeMissing
        | MultipartError::ContentTypeParse
        | MultipartError::ContentTypeIncompatible
        | MultipartError::BoundaryMissing => "expected multipart/form-data".to_string(),
        other => other.to_string(),
    };
    ClassifierError::BadRequest(message)
}

/// Reads the `file` field of a multipart form. Other fields are skipped.
async fn read_file_field(payload: &mut Multipart, limit: usize) -> Result<Vec<u8>> {
    while let Some(mut field) = payload.try_next().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = field.try_next().await.map_err(multipart_error)? {
            if bytes.len() + chunk.len() > limit {
                return Err(ClassifierError::PayloadTooLarge { limit });
            }
            bytes.extend_from_slice(&chunk);
        }

        if bytes.is_empty() {
            return Err(ClassifierError::NoFile);
        }
        return Ok(bytes);
    }

    Err(ClassifierError::NoFile)
}

async fn classify_and_respond(data: &AppState, bytes: Vec<u8>) -> Result<HttpResponse> {
    let classifier = Arc::clone(&data.classifier);
    let echo_image = data.response.echo_image;

    let (classification, image) = web::block(move || -> Result<_> {
        let image = decode_image(&bytes)?;
        let classification = classifier.classify_image(&image)?;
        let echoed = if echo_image {
            Some(echo_png_base64(&image)?)
        } else {
            None
        };
        Ok((classification, echoed))
    })
    .await
    .map_err(|e| ClassifierError::Inference(e.to_string()))??;

    tracing::info!(
        "Predicted {} with confidence {:.4}",
        classification.predicted_class,
        classification.confidence
    );

    let class_probabilities = data
        .response
        .include_probabilities
        .then(|| classification.scores.iter().cloned().collect());

    Ok(HttpResponse::Ok().json(PredictResponse {
        success: true,
        predicted_class: classification.predicted_class,
        confidence: classification.confidence,
        class_probabilities,
        image,
    }))
}
