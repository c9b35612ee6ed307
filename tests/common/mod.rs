#![allow(dead_code)]

use actix_web::web;
use garbage_classifier::classification::Preprocess;
use garbage_classifier::config::{DownloadConfig, Normalization, ResponseConfig, TensorLayout};
use garbage_classifier::fetch::ImageFetcher;
use garbage_classifier::labels::default_labels;
use garbage_classifier::{AppState, Classifier, InferenceBackend, Result};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use ndarray::Array4;
use std::io::{Cursor, Read, Write};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::thread;

pub const BOUNDARY: &str = "----garbage-classifier-test-boundary";

/// Returns fixed scores and remembers the shape of every input it sees.
pub struct StubBackend {
    pub scores: Vec<f32>,
    pub seen_shapes: Mutex<Vec<Vec<usize>>>,
}

impl StubBackend {
    pub fn new(scores: Vec<f32>) -> Self {
        Self {
            scores,
            seen_shapes: Mutex::new(Vec::new()),
        }
    }
}

impl InferenceBackend for StubBackend {
    fn run(&self, input: Array4<f32>) -> Result<Vec<f32>> {
        self.seen_shapes.lock().unwrap().push(input.shape().to_vec());
        Ok(self.scores.clone())
    }
}

/// Scores favouring "plastic".
pub fn plastic_scores() -> Vec<f32> {
    vec![0.02, 0.08, 0.05, 0.1, 0.7, 0.05]
}

pub fn preprocess() -> Preprocess {
    Preprocess {
        width: 32,
        height: 24,
        layout: TensorLayout::Nhwc,
        normalization: Normalization::Unit,
    }
}

pub fn app_state(backend: Arc<StubBackend>, response: ResponseConfig) -> web::Data<AppState> {
    app_state_with_limit(backend, response, 1024 * 1024)
}

pub fn app_state_with_limit(
    backend: Arc<StubBackend>,
    response: ResponseConfig,
    body_limit_bytes: usize,
) -> web::Data<AppState> {
    build_state(backend, response, body_limit_bytes, DownloadConfig::default())
}

pub fn app_state_with_download(
    backend: Arc<StubBackend>,
    download: DownloadConfig,
) -> web::Data<AppState> {
    build_state(backend, ResponseConfig::default(), 1024 * 1024, download)
}

fn build_state(
    backend: Arc<StubBackend>,
    response: ResponseConfig,
    body_limit_bytes: usize,
    download: DownloadConfig,
) -> web::Data<AppState> {
    let classifier = Classifier::new(backend, default_labels(), preprocess(), false).unwrap();
    web::Data::new(AppState {
        classifier: Arc::new(classifier),
        fetcher: ImageFetcher::new(&download).unwrap(),
        response,
        body_limit_bytes,
    })
}

/// Serves `body` once over a raw socket with no Content-Length, ending the
/// body by closing the connection. httpmock always sends a length.
pub fn serve_once_without_length(body: Vec<u8>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    thread::spawn(move || {
        let Ok((mut stream, _)) = listener.accept() else {
            return;
        };
        let mut request = Vec::new();
        let mut buf = [0u8; 512];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            match stream.read(&mut buf) {
                Ok(0) | Err(_) => return,
                Ok(n) => request.extend_from_slice(&buf[..n]),
            }
        }
        let _ = stream.write_all(
            b"HTTP/1.1 200 OK\r\nContent-Type: image/png\r\nConnection: close\r\n\r\n",
        );
        let _ = stream.write_all(&body);
    });

    format!("http://{}/streamed.png", addr)
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([30, 144, 255])));
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png).unwrap();
    buffer.into_inner()
}

pub fn multipart_body(field_name: &str, filename: &str, content: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            field_name, filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={}", BOUNDARY)
}
