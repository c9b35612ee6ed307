pub mod classification;
pub mod cli;
pub mod config;
pub mod error;
pub mod fetch;
pub mod labels;
pub mod logger;
pub mod model;
pub mod routes;

pub use classification::{Classification, Classifier, Preprocess};
pub use config::AppConfig;
pub use error::{ClassifierError, Result};
pub use model::{InferenceBackend, OnnxBackend};
pub use routes::{AppState, PredictResponse};
