//! Client for the Gemini `generateContent` endpoint.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use crate::codec::ImagePayload;
use crate::config::GeminiSettings;
use crate::constants::API_KEY_HEADER;
use crate::error::{MonumentError, TransportErrorKind};

/// Longest chunk of an error body or stray text echoed back in errors.
const MAX_ECHO_CHARS: usize = 300;

/// An API key. Never printed: `Debug` and `Display` are redacted.
#[derive(Clone, Eq, PartialEq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wraps a key, rejecting blank input.
    pub fn new(value: impl Into<String>) -> Result<Self, MonumentError> {
        let value = value.into().trim().to_string();
        if value.is_empty() {
            return Err(MonumentError::InputValidation(
                "An API key is required".to_string(),
            ));
        }
        Ok(Self(value))
    }

    /// The raw key, for the single request it authorises.
    pub(crate) fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

impl fmt::Display for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

/// What the model is asked to return.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Modality {
    /// An inline image part.
    Image,
    /// Plain text.
    Text,
}

/// One call to the generation endpoint. The variant fixes the part layout:
/// image parts first, in order, then exactly one text part.
#[derive(Clone, Debug)]
pub enum GenerationRequest {
    /// Text in, image out.
    TextOnly {
        /// The composed instruction.
        prompt: String,
    },
    /// One image plus text in, image out.
    TextWithImage {
        /// The reference image.
        image: ImagePayload,
        /// The composed instruction.
        prompt: String,
    },
    /// Two images plus text in, image out.
    TextWithTwoImages {
        /// First image part.
        first: ImagePayload,
        /// Second image part.
        second: ImagePayload,
        /// The composed instruction.
        prompt: String,
    },
    /// One image plus an instruction in, text out.
    Describe {
        /// The image to describe.
        image: ImagePayload,
        /// What to say about it.
        instruction: String,
    },
}

impl GenerationRequest {
    /// The modality this request expects back.
    pub fn modality(&self) -> Modality {
        match self {
            Self::Describe { .. } => Modality::Text,
            _ => Modality::Image,
        }
    }

    /// The image parts, in the order they are sent.
    pub fn images(&self) -> Vec<&ImagePayload> {
        match self {
            Self::TextOnly { .. } => Vec::new(),
            Self::TextWithImage { image, .. } | Self::Describe { image, .. } => vec![image],
            Self::TextWithTwoImages { first, second, .. } => vec![first, second],
        }
    }

    /// The single text part.
    pub fn text(&self) -> &str {
        match self {
            Self::TextOnly { prompt }
            | Self::TextWithImage { prompt, .. }
            | Self::TextWithTwoImages { prompt, .. } => prompt,
            Self::Describe { instruction, .. } => instruction,
        }
    }
}

/// What a successful call produced.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum GenerationResult {
    /// The first inline image of the first candidate.
    Image(ImagePayload),
    /// The text of the first candidate.
    Text(String),
}

impl GenerationResult {
    /// Unwraps an image result, treating text as an empty response.
    pub fn into_image(self) -> Result<ImagePayload, MonumentError> {
        match self {
            Self::Image(image) => Ok(image),
            Self::Text(text) => Err(MonumentError::EmptyResponse(format!(
                "expected an image but the model replied with text: {}",
                truncate(&text)
            ))),
        }
    }

    /// Unwraps a text result.
    pub fn into_text(self) -> Result<String, MonumentError> {
        match self {
            Self::Text(text) => Ok(text),
            Self::Image(_) => Err(MonumentError::EmptyResponse(
                "expected text but the model returned an image".to_string(),
            )),
        }
    }
}

/// A backend able to run a single generation call.
pub trait Generate: Send + Sync {
    /// Runs one call. No retries happen here.
    fn generate(
        &self,
        request: GenerationRequest,
    ) -> impl Future<Output = Result<GenerationResult, MonumentError>> + Send;

    /// Replaces the credential used for later calls.
    fn set_credential(&self, _key: ApiKey) -> impl Future<Output = ()> + Send {
        async {}
    }
}

// -----------------------------
// Wire format
// -----------------------------

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize, Debug)]
struct RequestContent<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct RequestPart<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineDataRef<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct InlineDataRef<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<&'static str>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    #[serde(default, alias = "inline_data")]
    inline_data: Option<InlineData>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(default, alias = "mime_type")]
    mime_type: String,
    #[serde(default)]
    data: String,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize, Debug)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

fn build_body(request: &GenerationRequest) -> GenerateContentRequest<'_> {
    let mut parts: Vec<RequestPart<'_>> = request
        .images()
        .into_iter()
        .map(|image| RequestPart {
            inline_data: Some(InlineDataRef {
                mime_type: image.mime_type(),
                data: image.data(),
            }),
            text: None,
        })
        .collect();
    parts.push(RequestPart {
        inline_data: None,
        text: Some(request.text()),
    });

    let response_modalities = match request.modality() {
        Modality::Image => vec!["IMAGE", "TEXT"],
        Modality::Text => vec!["TEXT"],
    };

    GenerateContentRequest {
        contents: vec![RequestContent {
            role: "user",
            parts,
        }],
        generation_config: GenerationConfig {
            response_modalities,
        },
    }
}

impl GenerateContentResponse {
    fn first_parts(&self) -> &[ResponsePart] {
        self.candidates
            .first()
            .and_then(|candidate| candidate.content.as_ref())
            .map(|content| content.parts.as_slice())
            .unwrap_or_default()
    }

    /// Returns the first inline image of the first candidate. Parts are
    /// scanned in order and the scan stops at the first match.
    pub(crate) fn first_image(&self) -> Result<ImagePayload, MonumentError> {
        let found = self.first_parts().iter().find_map(|part| {
            part.inline_data
                .as_ref()
                .filter(|inline| !inline.data.is_empty())
        });
        match found {
            Some(inline) => ImagePayload::from_base64(inline.data.clone(), &inline.mime_type),
            None => Err(MonumentError::EmptyResponse(self.empty_reason("image"))),
        }
    }

    /// Concatenates the text parts of the first candidate.
    pub(crate) fn text(&self) -> Result<String, MonumentError> {
        let text = self
            .first_parts()
            .iter()
            .filter_map(|part| part.text.as_deref())
            .collect::<String>();
        let text = text.trim();
        if text.is_empty() {
            return Err(MonumentError::EmptyResponse(self.empty_reason("text")));
        }
        Ok(text.to_string())
    }

    fn empty_reason(&self, wanted: &str) -> String {
        if let Some(reason) = self
            .prompt_feedback
            .as_ref()
            .and_then(|feedback| feedback.block_reason.as_deref())
        {
            return format!("no {wanted} returned; the prompt was blocked ({reason})");
        }
        let candidate = self.candidates.first();
        let stray_text = self
            .first_parts()
            .iter()
            .filter_map(|part| part.text.as_deref())
            .collect::<Vec<_>>()
            .join(" ");
        match candidate.and_then(|c| c.finish_reason.as_deref()) {
            _ if candidate.is_none() => format!("no {wanted} returned; the response had no candidates"),
            Some(reason) if !stray_text.trim().is_empty() => format!(
                "no {wanted} returned (finish reason {reason}); the model said: {}",
                truncate(&stray_text)
            ),
            Some(reason) => format!("no {wanted} returned (finish reason {reason})"),
            None if !stray_text.trim().is_empty() => format!(
                "no {wanted} returned; the model said: {}",
                truncate(&stray_text)
            ),
            None => format!("no {wanted} returned"),
        }
    }
}

fn truncate(value: &str) -> String {
    let value = value.trim();
    if value.chars().count() <= MAX_ECHO_CHARS {
        return value.to_string();
    }
    value.chars().take(MAX_ECHO_CHARS).collect::<String>() + "…"
}

fn error_message(body: &[u8]) -> String {
    match serde_json::from_slice::<ErrorEnvelope>(body) {
        Ok(envelope) => match envelope.error.status {
            Some(status) if !envelope.error.message.is_empty() => {
                format!("{status}: {}", envelope.error.message)
            }
            Some(status) => status,
            None => envelope.error.message,
        },
        Err(_) => truncate(&String::from_utf8_lossy(body)),
    }
}

// -----------------------------
// Client
// -----------------------------

/// Calls Gemini directly with a key held by this process.
#[derive(Clone, Debug)]
pub struct GeminiClient {
    http: reqwest::Client,
    settings: GeminiSettings,
    credential: Arc<RwLock<Option<ApiKey>>>,
}

impl GeminiClient {
    /// Builds a client. Without a key every call fails as an invalid
    /// credential until [`Generate::set_credential`] is called.
    pub fn new(settings: GeminiSettings, key: Option<ApiKey>) -> Result<Self, MonumentError> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|err| MonumentError::transport(err.to_string()))?;
        Ok(Self {
            http,
            settings,
            credential: Arc::new(RwLock::new(key)),
        })
    }

    /// The settings this client calls with.
    pub fn settings(&self) -> &GeminiSettings {
        &self.settings
    }

    fn model_for(&self, modality: Modality) -> &str {
        match modality {
            Modality::Image => &self.settings.image_model,
            Modality::Text => &self.settings.text_model,
        }
    }
}

impl Generate for GeminiClient {
    #[instrument(level = "debug", skip_all, fields(modality = ?request.modality()))]
    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationResult, MonumentError> {
        let Some(key) = self.credential.read().await.clone() else {
            return Err(MonumentError::Transport {
                kind: TransportErrorKind::InvalidCredential,
                message: "No API key has been provided".to_string(),
            });
        };

        let modality = request.modality();
        let model = self.model_for(modality);
        let endpoint = self.settings.endpoint_for_model(model);
        let body = build_body(&request);
        debug!(
            "Calling {} with {} image part(s), expecting {:?}",
            model,
            request.images().len(),
            modality
        );

        let resp = self
            .http
            .post(&endpoint)
            .header(API_KEY_HEADER, key.expose())
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let bytes = resp.bytes().await?;
        if !status.is_success() {
            let message = error_message(&bytes);
            warn!("Generation endpoint returned {}: {}", status, message);
            return Err(MonumentError::Transport {
                kind: TransportErrorKind::from_status(status.as_u16(), &message),
                message: format!("{status}: {message}"),
            });
        }

        let parsed: GenerateContentResponse =
            serde_json::from_slice(&bytes).map_err(|err| MonumentError::Transport {
                kind: TransportErrorKind::Other,
                message: format!("Failed to parse generateContent response: {err}"),
            })?;

        match modality {
            Modality::Image => parsed.first_image().map(GenerationResult::Image),
            Modality::Text => parsed.text().map(GenerationResult::Text),
        }
    }

    async fn set_credential(&self, key: ApiKey) {
        *self.credential.write().await = Some(key);
    }
}
