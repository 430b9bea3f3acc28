//! CLI parser
use clap::Parser;
use std::num::NonZeroU16;

use crate::constants::{
    DEFAULT_API_BASE, DEFAULT_BODY_LIMIT_BYTES, DEFAULT_IMAGE_MODEL,
    DEFAULT_REQUEST_TIMEOUT_SECONDS, DEFAULT_TEXT_MODEL,
};

#[derive(Parser, Debug)]
/// CLI Options
pub struct CliOptions {
    #[clap(long, help = "Enable debug logging", env = "MONUMENT_DEBUG")]
    /// Enable debug logging. Env: MONUMENT_DEBUG
    pub debug: bool,
    #[clap(long, short, default_value = "9000", env = "MONUMENT_PORT")]
    /// http listener, defaults to `9000`.
    /// Env: MONUMENT_PORT
    pub port: NonZeroU16,
    #[clap(
        long,
        short,
        default_value = "127.0.0.1",
        env = "MONUMENT_LISTEN_ADDRESS"
    )]
    /// Listen address, defaults to `127.0.0.1`.
    /// Env: MONUMENT_LISTEN_ADDRESS
    pub listen_address: String,

    #[clap(flatten)]
    /// Generation endpoint settings.
    pub gemini: GeminiOptions,

    #[clap(long, default_value_t = DEFAULT_BODY_LIMIT_BYTES, env = "MONUMENT_BODY_LIMIT")]
    /// Largest accepted `/api/generate` body in bytes.
    /// Env: MONUMENT_BODY_LIMIT
    pub body_limit: usize,
}

/// Options shared by every binary that calls the generation endpoint.
#[derive(clap::Args, Debug, Clone)]
pub struct GeminiOptions {
    #[clap(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    /// Gemini API key. Env: GEMINI_API_KEY
    pub api_key: Option<String>,

    #[clap(long, default_value = DEFAULT_API_BASE, env = "GEMINI_API_BASE")]
    /// API root. Env: GEMINI_API_BASE
    pub api_base: String,

    #[clap(long, default_value = DEFAULT_IMAGE_MODEL, env = "MONUMENT_IMAGE_MODEL")]
    /// Model for image generation. Env: MONUMENT_IMAGE_MODEL
    pub image_model: String,

    #[clap(long, default_value = DEFAULT_TEXT_MODEL, env = "MONUMENT_TEXT_MODEL")]
    /// Model for scene descriptions. Env: MONUMENT_TEXT_MODEL
    pub text_model: String,

    #[clap(
        long,
        default_value_t = DEFAULT_REQUEST_TIMEOUT_SECONDS,
        env = "MONUMENT_REQUEST_TIMEOUT"
    )]
    /// Per-call timeout in seconds. Env: MONUMENT_REQUEST_TIMEOUT
    pub request_timeout: u64,
}

impl GeminiOptions {
    /// Builds validated settings from the options.
    pub fn settings(&self) -> Result<crate::config::GeminiSettings, crate::error::MonumentError> {
        crate::config::GeminiSettings::new(
            &self.api_base,
            &self.image_model,
            &self.text_model,
            self.request_timeout,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse() {
        let options = CliOptions::try_parse_from(["monument-mixer"]).expect("parse");
        assert_eq!(options.port.get(), 9000);
        assert_eq!(options.body_limit, DEFAULT_BODY_LIMIT_BYTES);
        assert_eq!(options.gemini.image_model, DEFAULT_IMAGE_MODEL);
        assert!(options.gemini.settings().is_ok());
    }

    #[test]
    fn key_is_taken_from_flag() {
        let options =
            CliOptions::try_parse_from(["monument-mixer", "--api-key", "k-123", "--port", "8080"])
                .expect("parse");
        assert_eq!(options.gemini.api_key.as_deref(), Some("k-123"));
        assert_eq!(options.port.get(), 8080);
    }
}
