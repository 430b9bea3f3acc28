//! Error handling

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::{error, info};

/// Sub-classification of failed calls to the generation endpoint.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TransportErrorKind {
    /// The API key was missing, rejected or lacks permission.
    InvalidCredential,
    /// The account ran out of quota or was rate limited.
    QuotaExceeded,
    /// Anything else: network failures, malformed requests, server errors.
    Other,
}

const CREDENTIAL_MARKERS: &[&str] = &[
    "api key",
    "api_key",
    "apikey",
    "permission denied",
    "permission_denied",
    "unauthenticated",
    "credential",
];

const QUOTA_MARKERS: &[&str] = &[
    "quota",
    "rate limit",
    "rate_limit",
    "resource_exhausted",
    "resource exhausted",
    "too many requests",
    "429",
];

impl TransportErrorKind {
    /// Works out what kind of failure a message describes by looking for
    /// credential- and quota-related wording.
    pub fn classify(message: &str) -> Self {
        let lowered = message.to_ascii_lowercase();
        if CREDENTIAL_MARKERS
            .iter()
            .any(|marker| lowered.contains(marker))
        {
            Self::InvalidCredential
        } else if QUOTA_MARKERS.iter().any(|marker| lowered.contains(marker)) {
            Self::QuotaExceeded
        } else {
            Self::Other
        }
    }

    /// Classifies using the HTTP status first and the message second.
    pub fn from_status(status: u16, message: &str) -> Self {
        match status {
            401 | 403 => Self::InvalidCredential,
            429 => Self::QuotaExceeded,
            _ => Self::classify(message),
        }
    }
}

/// Everything that can go wrong while generating monuments.
#[derive(Debug, thiserror::Error)]
pub enum MonumentError {
    /// A required prompt or image was missing before any call was made.
    #[error("{0}")]
    InputValidation(String),
    /// An image file could not be read.
    #[error("Failed to read image: {0}")]
    Read(String),
    /// Image bytes or a data URL were not in a recognisable format.
    #[error("Invalid image data: {0}")]
    Format(String),
    /// The generation endpoint could not be reached or rejected the call.
    #[error("Generation request failed: {message}")]
    Transport {
        /// What kind of transport failure this was.
        kind: TransportErrorKind,
        /// The message reported by the endpoint or the HTTP stack.
        message: String,
    },
    /// The endpoint answered but without a usable image or text.
    #[error("The model returned no usable result: {0}")]
    EmptyResponse(String),
    /// Another generation is still running for this workflow.
    #[error("Another generation is already in progress")]
    Busy,
}

impl MonumentError {
    /// Builds a transport error, classifying the message.
    pub fn transport(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::Transport {
            kind: TransportErrorKind::classify(&message),
            message,
        }
    }

    /// Returns true when the failure was a rejected or missing API key.
    pub fn is_invalid_credential(&self) -> bool {
        matches!(
            self,
            Self::Transport {
                kind: TransportErrorKind::InvalidCredential,
                ..
            }
        )
    }

    /// The text shown to the user next to the step that failed.
    pub fn user_message(&self) -> String {
        match self {
            Self::Transport {
                kind: TransportErrorKind::InvalidCredential,
                ..
            } => "Your API key is invalid or missing. Please enter a valid key and try again."
                .to_string(),
            Self::Transport {
                kind: TransportErrorKind::QuotaExceeded,
                ..
            } => "The API quota has been exceeded. Please wait a moment and try again."
                .to_string(),
            other => other.to_string(),
        }
    }

    /// Stable code sent next to the message on the HTTP boundary.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InputValidation(_) => "INPUT_VALIDATION",
            Self::Read(_) => "READ",
            Self::Format(_) => "FORMAT",
            Self::Transport { kind, .. } => match kind {
                TransportErrorKind::InvalidCredential => "INVALID_CREDENTIAL",
                TransportErrorKind::QuotaExceeded => "QUOTA_EXCEEDED",
                TransportErrorKind::Other => "TRANSPORT",
            },
            Self::EmptyResponse(_) => "EMPTY_RESPONSE",
            Self::Busy => "BUSY",
        }
    }

    /// The message without the variant's prefix.
    pub fn detail(&self) -> String {
        match self {
            Self::InputValidation(message)
            | Self::Read(message)
            | Self::Format(message)
            | Self::EmptyResponse(message)
            | Self::Transport { message, .. } => message.clone(),
            Self::Busy => self.to_string(),
        }
    }

    /// Rebuilds an error received over HTTP from its code and detail. Unknown
    /// codes fall back to the HTTP status.
    pub fn from_code(code: Option<&str>, status: u16, detail: String) -> Self {
        fn transport(kind: TransportErrorKind, message: String) -> MonumentError {
            MonumentError::Transport { kind, message }
        }
        match code {
            Some("INPUT_VALIDATION") => Self::InputValidation(detail),
            Some("READ") => Self::Read(detail),
            Some("FORMAT") => Self::Format(detail),
            Some("INVALID_CREDENTIAL") => transport(TransportErrorKind::InvalidCredential, detail),
            Some("QUOTA_EXCEEDED") => transport(TransportErrorKind::QuotaExceeded, detail),
            Some("TRANSPORT") => transport(TransportErrorKind::Other, detail),
            Some("EMPTY_RESPONSE") => Self::EmptyResponse(detail),
            Some("BUSY") => Self::Busy,
            _ if status == 400 || status == 413 || status == 422 => Self::InputValidation(detail),
            _ => transport(TransportErrorKind::from_status(status, &detail), detail),
        }
    }

    /// HTTP status used when this error crosses the server boundary.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InputValidation(_) | Self::Read(_) | Self::Format(_) => StatusCode::BAD_REQUEST,
            Self::Transport { kind, .. } => match kind {
                TransportErrorKind::InvalidCredential => StatusCode::UNAUTHORIZED,
                TransportErrorKind::QuotaExceeded => StatusCode::TOO_MANY_REQUESTS,
                TransportErrorKind::Other => StatusCode::BAD_GATEWAY,
            },
            Self::EmptyResponse(_) => StatusCode::BAD_GATEWAY,
            Self::Busy => StatusCode::CONFLICT,
        }
    }
}

impl From<reqwest::Error> for MonumentError {
    fn from(err: reqwest::Error) -> Self {
        let kind = match err.status() {
            Some(status) => TransportErrorKind::from_status(status.as_u16(), &err.to_string()),
            None => TransportErrorKind::Other,
        };
        Self::Transport {
            kind,
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for MonumentError {
    fn from(err: std::io::Error) -> Self {
        MonumentError::Read(err.to_string())
    }
}

impl From<base64::DecodeError> for MonumentError {
    fn from(err: base64::DecodeError) -> Self {
        MonumentError::Format(format!("invalid base64: {err}"))
    }
}

impl IntoResponse for MonumentError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Generation failed: {}", self);
        } else {
            info!("Rejected generation request: {}", self);
        }
        let body = json!({ "error": self.detail(), "code": self.code() });
        (status, Json(body)).into_response()
    }
}
