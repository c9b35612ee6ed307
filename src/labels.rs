use crate::error::{ClassifierError, Result};
use std::fs;
use std::path::Path;

/// Class indices of the garbage dataset, in training order.
pub const GARBAGE_LABELS: [&str; 6] = ["cardboard", "glass", "metal", "paper", "plastic", "trash"];

pub fn default_labels() -> Vec<String> {
    GARBAGE_LABELS.iter().map(|s| s.to_string()).collect()
}

pub fn load_labels<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let content = fs::read_to_string(&path)?;
    let labels = parse_labels(&content);

    if labels.is_empty() {
        return Err(ClassifierError::Config {
            message: format!("labels file {} is empty", path.as_ref().display()),
        });
    }
    Ok(labels)
}

fn parse_labels(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}
