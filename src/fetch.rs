use crate::config::DownloadConfig;
use crate::error::{ClassifierError, Result};
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone)]
pub struct ImageFetcher {
    client: reqwest::Client,
    max_bytes: usize,
}

impl ImageFetcher {
    pub fn new(config: &DownloadConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            max_bytes: config.max_bytes,
        })
    }

    pub async fn download_image(&self, url: &str) -> Result<Vec<u8>> {
        let url = parse_image_url(url)?;

        let mut response = self.client.get(url.clone()).send().await?;
        if !response.status().is_success() {
            return Err(ClassifierError::DownloadStatus {
                status: response.status(),
            });
        }

        if let Some(length) = response.content_length() {
            if length > self.max_bytes as u64 {
                return Err(ClassifierError::PayloadTooLarge {
                    limit: self.max_bytes,
                });
            }
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if bytes.len() + chunk.len() > self.max_bytes {
                return Err(ClassifierError::PayloadTooLarge {
                    limit: self.max_bytes,
                });
            }
            bytes.extend_from_slice(&chunk);
        }

        tracing::debug!("Downloaded {} bytes from {}", bytes.len(), url);
        Ok(bytes)
    }
}

fn parse_image_url(url_str: &str) -> Result<Url> {
    let invalid = |reason: String| ClassifierError::InvalidUrl {
        url: url_str.to_string(),
        reason,
    };

    let url = Url::parse(url_str).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(invalid(format!("unsupported scheme {}", scheme))),
    }
}
