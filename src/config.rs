use crate::error::{ClassifierError, Result};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub response: ResponseConfig,
    pub download: DownloadConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Upper bound for an uploaded file, in bytes.
    pub body_limit_bytes: usize,
    pub workers: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5001,
            body_limit_bytes: 10 * 1024 * 1024,
            workers: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
    Nhwc,
    Nchw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Normalization {
    /// Pixel values divided by 255.
    Unit,
    /// Unit scaling followed by the ImageNet per-channel mean/std.
    Imagenet,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub path: PathBuf,
    /// One label per line. The built-in garbage labels are used when unset.
    pub labels_path: Option<PathBuf>,
    pub input_width: u32,
    pub input_height: u32,
    pub layout: TensorLayout,
    pub normalization: Normalization,
    /// Apply softmax to raw model outputs. Leave off for models that already
    /// end in a softmax layer.
    pub softmax: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("weights/model.onnx"),
            labels_path: None,
            input_width: 300,
            input_height: 300,
            layout: TensorLayout::Nhwc,
            normalization: Normalization::Unit,
            softmax: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseConfig {
    pub include_probabilities: bool,
    pub echo_image: bool,
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            include_probabilities: true,
            echo_image: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    pub timeout_seconds: u64,
    pub max_bytes: usize,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 10,
            max_bytes: 10 * 1024 * 1024,
        }
    }
}

impl AppConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed = substitute_env_vars(content)?;

        toml::from_str(&processed).map_err(|e| ClassifierError::Config {
            message: format!("TOML parsing error: {}", e),
        })
    }
}

/// Replaces `${VAR}` with the value of `VAR`. Unset variables are left as-is.
fn substitute_env_vars(content: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| ClassifierError::Config {
        message: e.to_string(),
    })?;

    let result = re.replace_all(content, |caps: &Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
    });

    Ok(result.into_owned())
}

fn invalid(field: &str, value: impl ToString, reason: &str) -> ClassifierError {
    ClassifierError::InvalidConfigValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

pub fn validate_path(field: &str, path: &Path) -> Result<()> {
    let as_str = path.to_string_lossy();
    if as_str.is_empty() {
        return Err(invalid(field, as_str, "Path cannot be empty"));
    }
    if as_str.contains('\0') {
        return Err(invalid(field, as_str, "Path contains null bytes"));
    }
    Ok(())
}

pub fn validate_positive_number(field: &str, value: usize, min_value: usize) -> Result<()> {
    if value < min_value {
        return Err(invalid(
            field,
            value,
            &format!("Value must be at least {}", min_value),
        ));
    }
    Ok(())
}

impl Validate for AppConfig {
    fn validate(&self) -> Result<()> {
        if self.server.host.is_empty() {
            return Err(invalid("server.host", "", "Host cannot be empty"));
        }
        if self.server.port == 0 {
            return Err(invalid("server.port", 0, "Port must be non-zero"));
        }
        validate_positive_number("server.body_limit_bytes", self.server.body_limit_bytes, 1)?;
        if let Some(workers) = self.server.workers {
            validate_positive_number("server.workers", workers, 1)?;
        }

        validate_path("model.path", &self.model.path)?;
        if let Some(labels) = &self.model.labels_path {
            validate_path("model.labels_path", labels)?;
        }
        validate_positive_number("model.input_width", self.model.input_width as usize, 1)?;
        validate_positive_number("model.input_height", self.model.input_height as usize, 1)?;

        validate_positive_number("download.timeout_seconds", self.download.timeout_seconds as usize, 1)?;
        validate_positive_number("download.max_bytes", self.download.max_bytes, 1)?;

        Ok(())
    }
}
