use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("No file uploaded")]
    NoFile,

    #[error("No URL provided")]
    NoUrl,

    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid request body: {0}")]
    BadRequest(String),

    #[error("Image decode error: {0}")]
    Decode(#[from] image::ImageError),

    #[error("Payload exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("Image download error: {0}")]
    Download(#[from] reqwest::Error),

    #[error("Failed to download image: {status}")]
    DownloadStatus { status: reqwest::StatusCode },

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Model returned {outputs} scores for {labels} labels")]
    LabelMismatch { labels: usize, outputs: usize },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid value for {field}: {value} ({reason})")]
    InvalidConfigValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ClassifierError>;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ResponseError for ClassifierError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::NoFile
            | Self::NoUrl
            | Self::InvalidUrl { .. }
            | Self::BadRequest(_)
            | Self::Decode(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Download(_) | Self::DownloadStatus { .. } => StatusCode::BAD_GATEWAY,
            Self::Inference(_)
            | Self::LabelMismatch { .. }
            | Self::Config { .. }
            | Self::InvalidConfigValue { .. }
            | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.to_string(),
        })
    }
}
