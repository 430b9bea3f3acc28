//! `/api/*` handlers and their JSON bodies.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use super::AppState;
use crate::codec::ImagePayload;
use crate::error::MonumentError;
use crate::studio::MonumentService;

/// An image as it travels in a request body. Checked by
/// [`ImageBody::into_payload`] once the request is parsed, so a body that is
/// not an image is a format error rather than a JSON error.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageBody {
    /// Base64 body.
    pub data: String,
    /// Declared MIME type; sniffed when empty.
    #[serde(default)]
    pub mime_type: String,
}

impl ImageBody {
    /// Decodes and verifies the image.
    pub fn into_payload(self) -> Result<ImagePayload, MonumentError> {
        ImagePayload::from_base64(self.data, &self.mime_type)
    }
}

impl From<&ImagePayload> for ImageBody {
    fn from(image: &ImagePayload) -> Self {
        Self {
            data: image.data().to_string(),
            mime_type: image.mime_type().to_string(),
        }
    }
}

/// Body of `POST /api/generate`, tagged by `type`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum GenerateRequest {
    /// Monument from a text description.
    GenerateMonumentFromPrompt {
        /// Free-text description.
        prompt: String,
    },
    /// Monument from an uploaded image plus style text.
    GenerateMonumentFromImage {
        /// The uploaded image.
        image: ImageBody,
        /// Style description.
        prompt: String,
    },
    /// One-line description of a scene.
    DescribeScene {
        /// The scene image.
        image: ImageBody,
    },
    /// Scene from a text prompt.
    GenerateScene {
        /// Scene description.
        prompt: String,
    },
    /// Composite a monument into a scene.
    PlaceMonument {
        /// The scene image.
        scene_image: ImageBody,
        /// The monument image.
        monument_image: ImageBody,
        /// Placement instruction.
        prompt: String,
    },
}

impl GenerateRequest {
    /// The wire name of the operation, for logging.
    pub fn operation(&self) -> &'static str {
        match self {
            Self::GenerateMonumentFromPrompt { .. } => "generateMonumentFromPrompt",
            Self::GenerateMonumentFromImage { .. } => "generateMonumentFromImage",
            Self::DescribeScene { .. } => "describeScene",
            Self::GenerateScene { .. } => "generateScene",
            Self::PlaceMonument { .. } => "placeMonument",
        }
    }
}

/// `{ imageUrl }` returned for monument and scene generation.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageUrlResponse {
    /// The generated image as a data URL.
    pub image_url: String,
}

/// `{ finalImageUrl }` returned for placement.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalImageResponse {
    /// The composite as a data URL.
    pub final_image_url: String,
}

/// `{ description }` returned for scene descriptions.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DescriptionResponse {
    /// One-line description of the scene.
    pub description: String,
}

/// `{ error, code }` returned with a non-2xx status.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// What went wrong.
    pub error: String,
    /// Machine-readable error kind.
    #[serde(default)]
    pub code: Option<String>,
}

pub(crate) async fn generate_handler<S: MonumentService>(
    State(state): State<AppState<S>>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection @ (JsonRejection::JsonDataError(_) | JsonRejection::JsonSyntaxError(_))) => {
            info!("Rejected /api/generate body: {}", rejection.body_text());
            return MonumentError::InputValidation(rejection.body_text()).into_response();
        }
        Err(rejection) => {
            info!("Rejected /api/generate body: {}", rejection.body_text());
            return (
                rejection.status(),
                Json(json!({ "error": rejection.body_text(), "code": "BAD_REQUEST" })),
            )
                .into_response();
        }
    };

    let operation = request.operation();
    info!("Handling {} request", operation);
    let result = run(state.service.as_ref(), request).await;

    match result {
        Ok(response) => {
            debug!("{} succeeded", operation);
            response
        }
        Err(err) => err.into_response(),
    }
}

fn image_url(image: &ImagePayload) -> Response {
    Json(ImageUrlResponse {
        image_url: image.to_data_url(),
    })
    .into_response()
}

async fn run<S: MonumentService>(
    service: &S,
    request: GenerateRequest,
) -> Result<Response, MonumentError> {
    match request {
        GenerateRequest::GenerateMonumentFromPrompt { prompt } => {
            let image = service.generate_monument(&prompt).await?;
            Ok(image_url(&image))
        }
        GenerateRequest::GenerateMonumentFromImage { image, prompt } => {
            let image = service
                .generate_monument_from_image(&image.into_payload()?, &prompt)
                .await?;
            Ok(image_url(&image))
        }
        GenerateRequest::DescribeScene { image } => {
            let description = service.describe_scene(&image.into_payload()?).await?;
            Ok(Json(DescriptionResponse { description }).into_response())
        }
        GenerateRequest::GenerateScene { prompt } => {
            let image = service.generate_scene(&prompt).await?;
            Ok(image_url(&image))
        }
        GenerateRequest::PlaceMonument {
            scene_image,
            monument_image,
            prompt,
        } => {
            let scene = scene_image.into_payload()?;
            let monument = monument_image.into_payload()?;
            let image = service.place_monument(&scene, &monument, &prompt).await?;
            Ok(Json(FinalImageResponse {
                final_image_url: image.to_data_url(),
            })
            .into_response())
        }
    }
}

pub(crate) async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}
