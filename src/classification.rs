use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader, RgbImage};
use ndarray::{Array, Array3, Array4, Axis};
use std::cmp::Ordering;
use std::io::Cursor;
use std::sync::Arc;

use crate::config::{ModelConfig, Normalization, TensorLayout};
use crate::error::{ClassifierError, Result};
use crate::labels;
use crate::model::{InferenceBackend, OnnxBackend};

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preprocess {
    pub width: u32,
    pub height: u32,
    pub layout: TensorLayout,
    pub normalization: Normalization,
}

impl From<&ModelConfig> for Preprocess {
    fn from(config: &ModelConfig) -> Self {
        Self {
            width: config.input_width,
            height: config.input_height,
            layout: config.layout,
            normalization: config.normalization,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub predicted_class: String,
    pub confidence: f32,
    /// Every label paired with its score, in label order.
    pub scores: Vec<(String, f32)>,
}

pub struct Classifier {
    backend: Arc<dyn InferenceBackend>,
    labels: Vec<String>,
    preprocess: Preprocess,
    softmax: bool,
}

impl Classifier {
    pub fn new(
        backend: Arc<dyn InferenceBackend>,
        labels: Vec<String>,
        preprocess: Preprocess,
        softmax: bool,
    ) -> Result<Self> {
        if labels.is_empty() {
            return Err(ClassifierError::Config {
                message: "at least one label is required".to_string(),
            });
        }
        if let Some(outputs) = backend.output_width() {
            if outputs != labels.len() {
                return Err(ClassifierError::LabelMismatch {
                    labels: labels.len(),
                    outputs,
                });
            }
        }

        Ok(Self {
            backend,
            labels,
            preprocess,
            softmax,
        })
    }

    /// Loads the ONNX model and labels named by the config.
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        let labels = match &config.labels_path {
            Some(path) => labels::load_labels(path)?,
            None => labels::default_labels(),
        };
        let backend = OnnxBackend::load(
            &config.path,
            config.input_width,
            config.input_height,
            config.layout,
        )?;

        Self::new(Arc::new(backend), labels, config.into(), config.softmax)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn classify_bytes(&self, bytes: &[u8]) -> Result<Classification> {
        let image = decode_image(bytes)?;
        self.classify_image(&image)
    }

    pub fn classify_image(&self, image: &DynamicImage) -> Result<Classification> {
        let input = image_to_tensor(image, &self.preprocess)?;
        let raw = self.backend.run(input)?;

        if raw.len() != self.labels.len() {
            return Err(ClassifierError::LabelMismatch {
                labels: self.labels.len(),
                outputs: raw.len(),
            });
        }
        if raw.iter().any(|v| !v.is_finite()) {
            return Err(ClassifierError::Inference(
                "model produced non-finite scores".to_string(),
            ));
        }

        let scores = if self.softmax { softmax(&raw) } else { raw };
        let (best, confidence) = argmax(&scores)
            .ok_or_else(|| ClassifierError::Inference("model produced no scores".to_string()))?;

        tracing::debug!("Scores: {:?}", scores);

        Ok(Classification {
            predicted_class: self.labels[best].clone(),
            confidence,
            scores: self.labels.iter().cloned().zip(scores).collect(),
        })
    }
}

pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
    Ok(reader.decode()?)
}

/// Resizes to the model input and lays the normalised pixels out as a batch of one.
pub fn image_to_tensor(image: &DynamicImage, preprocess: &Preprocess) -> Result<Array4<f32>> {
    let (width, height) = (preprocess.width, preprocess.height);
    let resized = image.resize_exact(width, height, FilterType::Lanczos3);
    let rgb_img: RgbImage = resized.to_rgb8();

    let normalized: Vec<f32> = rgb_img
        .as_raw()
        .iter()
        .enumerate()
        .map(|(i, &pixel)| {
            let value = pixel as f32 / 255.0;
            match preprocess.normalization {
                Normalization::Unit => value,
                Normalization::Imagenet => {
                    let channel = i % 3;
                    (value - IMAGENET_MEAN[channel]) / IMAGENET_STD[channel]
                }
            }
        })
        .collect();

    let hwc = Array3::from_shape_vec((height as usize, width as usize, 3), normalized)
        .map_err(|e| ClassifierError::Inference(e.to_string()))?;

    let tensor = match preprocess.layout {
        TensorLayout::Nhwc => hwc.insert_axis(Axis(0)),
        TensorLayout::Nchw => hwc
            .permuted_axes([2, 0, 1])
            .as_standard_layout()
            .to_owned()
            .insert_axis(Axis(0)),
    };

    Ok(tensor)
}

pub fn softmax(scores: &[f32]) -> Vec<f32> {
    let output = Array::from_vec(scores.to_vec());
    let max = output.fold(f32::NEG_INFINITY, |acc, &v| acc.max(v));
    let exp_output = output.mapv(|x| (x - max).exp());
    let sum = exp_output.sum();
    (exp_output / sum).to_vec()
}

/// Index and value of the highest score. Ties resolve to the lowest index.
pub fn argmax(scores: &[f32]) -> Option<(usize, f32)> {
    scores
        .iter()
        .copied()
        .enumerate()
        .fold(None, |best, (index, score)| match best {
            Some((_, top)) if score.total_cmp(&top) != Ordering::Greater => best,
            _ => Some((index, score)),
        })
}

/// Re-encodes the image as PNG and returns it base64-encoded.
pub fn echo_png_base64(image: &DynamicImage) -> Result<String> {
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageFormat::Png)
        .map_err(|e| ClassifierError::Inference(format!("PNG encode failed: {}", e)))?;
    Ok(STANDARD.encode(buffer.into_inner()))
}
