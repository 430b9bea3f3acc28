//! Monument operations: one composed prompt and one generation call each.

use std::future::Future;

use tracing::info;

use crate::codec::ImagePayload;
use crate::error::MonumentError;
use crate::gemini::{ApiKey, Generate, GenerationRequest};
use crate::prompts;

/// Who holds the API key for a service.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CredentialMode {
    /// The key was typed in by the user and lives in this process.
    ClientSupplied,
    /// The key stays on a server this process talks to.
    ServerProxied,
}

/// The operations the workflow needs, independent of where the key lives.
pub trait MonumentService: Send + Sync + 'static {
    /// Generates a monument from a free-text description.
    fn generate_monument(
        &self,
        prompt: &str,
    ) -> impl Future<Output = Result<ImagePayload, MonumentError>> + Send;

    /// Turns the subject of an image into a monument in the given style.
    fn generate_monument_from_image(
        &self,
        image: &ImagePayload,
        style: &str,
    ) -> impl Future<Output = Result<ImagePayload, MonumentError>> + Send;

    /// Produces a one-line description of a scene.
    fn describe_scene(
        &self,
        image: &ImagePayload,
    ) -> impl Future<Output = Result<String, MonumentError>> + Send;

    /// Generates a scene image from a prompt.
    fn generate_scene(
        &self,
        prompt: &str,
    ) -> impl Future<Output = Result<ImagePayload, MonumentError>> + Send;

    /// Composites the monument into the scene.
    fn place_monument(
        &self,
        scene: &ImagePayload,
        monument: &ImagePayload,
        instruction: &str,
    ) -> impl Future<Output = Result<ImagePayload, MonumentError>> + Send;

    /// Where the key for this service lives.
    fn credential_mode(&self) -> CredentialMode;

    /// Replaces the key used for later calls.
    fn set_credential(
        &self,
        key: ApiKey,
    ) -> impl Future<Output = Result<(), MonumentError>> + Send;
}

pub(crate) fn require_text<'a>(value: &'a str, what: &str) -> Result<&'a str, MonumentError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(MonumentError::InputValidation(format!("{what} is required")));
    }
    Ok(value)
}

/// Runs monument operations against a [`Generate`] backend held locally.
#[derive(Clone, Debug)]
pub struct Studio<G> {
    generator: G,
}

impl<G: Generate> Studio<G> {
    /// Wraps a generation backend.
    pub fn new(generator: G) -> Self {
        Self { generator }
    }
}

impl<G: Generate + 'static> MonumentService for Studio<G> {
    async fn generate_monument(&self, prompt: &str) -> Result<ImagePayload, MonumentError> {
        let prompt = require_text(prompt, "A monument description")?;
        info!("Generating monument from prompt");
        self.generator
            .generate(GenerationRequest::TextOnly {
                prompt: prompts::monument_from_text(prompt),
            })
            .await?
            .into_image()
    }

    async fn generate_monument_from_image(
        &self,
        image: &ImagePayload,
        style: &str,
    ) -> Result<ImagePayload, MonumentError> {
        let style = require_text(style, "A style description")?;
        info!("Generating monument from uploaded image");
        self.generator
            .generate(GenerationRequest::TextWithImage {
                image: image.clone(),
                prompt: prompts::monument_from_image(style),
            })
            .await?
            .into_image()
    }

    async fn describe_scene(&self, image: &ImagePayload) -> Result<String, MonumentError> {
        info!("Describing scene");
        let text = self
            .generator
            .generate(GenerationRequest::Describe {
                image: image.clone(),
                instruction: prompts::describe_scene().to_string(),
            })
            .await?
            .into_text()?;
        // One line only; the model sometimes adds a second sentence.
        Ok(text.lines().next().unwrap_or_default().trim().to_string())
    }

    async fn generate_scene(&self, prompt: &str) -> Result<ImagePayload, MonumentError> {
        let prompt = require_text(prompt, "A scene description")?;
        info!("Generating scene from prompt");
        self.generator
            .generate(GenerationRequest::TextOnly {
                prompt: prompts::scene_from_text(prompt),
            })
            .await?
            .into_image()
    }

    async fn place_monument(
        &self,
        scene: &ImagePayload,
        monument: &ImagePayload,
        instruction: &str,
    ) -> Result<ImagePayload, MonumentError> {
        let instruction = require_text(instruction, "A placement instruction")?;
        info!("Placing monument in scene");
        self.generator
            .generate(GenerationRequest::TextWithTwoImages {
                first: scene.clone(),
                second: monument.clone(),
                prompt: prompts::scene_composite(instruction),
            })
            .await?
            .into_image()
    }

    fn credential_mode(&self) -> CredentialMode {
        CredentialMode::ClientSupplied
    }

    async fn set_credential(&self, key: ApiKey) -> Result<(), MonumentError> {
        self.generator.set_credential(key).await;
        Ok(())
    }
}
