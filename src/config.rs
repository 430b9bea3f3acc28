//! Config handling

use std::time::Duration;

use tracing::log::LevelFilter;
use url::Url;

use crate::constants::{
    DEFAULT_API_BASE, DEFAULT_IMAGE_MODEL, DEFAULT_REQUEST_TIMEOUT_SECONDS, DEFAULT_TEXT_MODEL,
};
use crate::error::MonumentError;

/// Sets up logging based on the debug flag
pub fn setup_logging(debug: bool) -> Result<(), Box<std::io::Error>> {
    let level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let mut logger = simple_logger::SimpleLogger::new().with_level(level);
    if !debug {
        logger = logger
            .with_module_level("tracing", LevelFilter::Warn)
            .with_module_level("rustls", LevelFilter::Info)
            .with_module_level("hyper_util", LevelFilter::Info)
            .with_module_level("reqwest", LevelFilter::Info)
            .with_module_level("h2", LevelFilter::Info);
    }
    logger.init().map_err(|err| {
        eprintln!("Failed to initialize logger: {}", err);
        Box::new(std::io::Error::other(err))
    })
}

/// Where and how generation calls are made.
#[derive(Clone, Debug)]
pub struct GeminiSettings {
    /// API root, e.g. `https://generativelanguage.googleapis.com/v1beta`.
    pub api_base: Url,
    /// Model for image-producing calls.
    pub image_model: String,
    /// Model for scene descriptions.
    pub text_model: String,
    /// Per-call timeout.
    pub timeout: Duration,
}

impl Default for GeminiSettings {
    #[allow(clippy::expect_used)]
    fn default() -> Self {
        Self {
            api_base: Url::parse(DEFAULT_API_BASE).expect("default API base is a valid URL"),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECONDS),
        }
    }
}

impl GeminiSettings {
    /// Builds settings from user-supplied values, validating the API base.
    pub fn new(
        api_base: &str,
        image_model: &str,
        text_model: &str,
        timeout_seconds: u64,
    ) -> Result<Self, MonumentError> {
        let api_base = Url::parse(api_base.trim().trim_end_matches('/')).map_err(|err| {
            MonumentError::InputValidation(format!("Invalid API base {api_base:?}: {err}"))
        })?;
        Ok(Self {
            api_base,
            image_model: image_model.trim().to_string(),
            text_model: text_model.trim().to_string(),
            timeout: Duration::from_secs(timeout_seconds),
        })
    }

    /// The `generateContent` endpoint for a model.
    pub fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!(
            "{}/{}:generateContent",
            self.api_base.as_str().trim_end_matches('/'),
            model_path
        )
    }
}
