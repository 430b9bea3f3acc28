//! Image codec: files, base64 payloads and data URLs.

use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::ImageFormat;
use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_UPLOAD_NAME;
use crate::error::MonumentError;

const DATA_URL_PREFIX: &str = "data:";
const BASE64_MARKER: &str = ";base64,";

/// A base64-encoded image tagged with its MIME type.
///
/// Only built through validating constructors, so the MIME type always
/// matches the encoded bytes.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawImagePayload", rename_all = "camelCase")]
pub struct ImagePayload {
    data: String,
    mime_type: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawImagePayload {
    data: String,
    #[serde(default)]
    mime_type: String,
}

impl TryFrom<RawImagePayload> for ImagePayload {
    type Error = MonumentError;

    fn try_from(raw: RawImagePayload) -> Result<Self, Self::Error> {
        Self::from_base64(raw.data, &raw.mime_type)
    }
}

impl ImagePayload {
    /// Encodes raw image bytes. An empty `declared_mime` (or
    /// `application/octet-stream`) is replaced by the sniffed type.
    pub fn from_bytes(bytes: &[u8], declared_mime: &str) -> Result<Self, MonumentError> {
        let mime_type = verified_mime(bytes, declared_mime)?;
        Ok(Self {
            data: BASE64.encode(bytes),
            mime_type,
        })
    }

    /// Wraps an existing base64 body after checking it decodes to an image.
    pub fn from_base64(data: String, declared_mime: &str) -> Result<Self, MonumentError> {
        let data = data.trim().to_string();
        let bytes = BASE64.decode(data.as_bytes())?;
        let mime_type = verified_mime(&bytes, declared_mime)?;
        Ok(Self { data, mime_type })
    }

    /// Accepts either a full `data:<mime>;base64,<body>` URL or a bare
    /// base64 body, stripping the prefix when present.
    pub fn from_data_url(value: &str) -> Result<Self, MonumentError> {
        let value = value.trim();
        if value.starts_with(DATA_URL_PREFIX) {
            let (mime, body) = split_data_url(value)?;
            Self::from_base64(body.to_string(), mime)
        } else {
            Self::from_base64(value.to_string(), "")
        }
    }

    /// The base64 body, without any data URL prefix.
    pub fn data(&self) -> &str {
        &self.data
    }

    /// The MIME type of the encoded image.
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Formats the payload for direct display.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }

    /// Decodes the base64 body back into raw bytes.
    pub fn decode_bytes(&self) -> Result<Vec<u8>, MonumentError> {
        Ok(BASE64.decode(self.data.as_bytes())?)
    }

    /// File extension matching the MIME type, used when saving images.
    pub fn file_extension(&self) -> &'static str {
        ImageFormat::from_mime_type(&self.mime_type)
            .and_then(|format| format.extensions_str().first().copied())
            .unwrap_or("bin")
    }
}

/// A named binary image, as picked by a user or rebuilt from a data URL.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ImageFile {
    /// File name shown to the user.
    pub name: String,
    /// MIME type declared for the file.
    pub mime_type: String,
    /// The raw file contents.
    pub bytes: Vec<u8>,
}

impl ImageFile {
    /// Builds an in-memory file.
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    /// Reads a file from disk, declaring its MIME type from the extension.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, MonumentError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|err| MonumentError::Read(format!("{}: {err}", path.display())))?;
        let mime_type = ImageFormat::from_path(path)
            .map(|format| format.to_mime_type().to_string())
            .unwrap_or_default();
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(DEFAULT_UPLOAD_NAME)
            .to_string();
        Ok(Self {
            name,
            mime_type,
            bytes,
        })
    }
}

/// Turns a selected file into a payload ready for a generation request.
pub fn encode(file: &ImageFile) -> Result<ImagePayload, MonumentError> {
    if file.bytes.is_empty() {
        return Err(MonumentError::Read(format!("{} is empty", file.name)));
    }
    ImagePayload::from_bytes(&file.bytes, &file.mime_type)
}

/// Rebuilds a named file from a data URL so it can be submitted again as an
/// upload.
pub fn decode_to_binary(data_url: &str, filename: &str) -> Result<ImageFile, MonumentError> {
    let (mime, body) = split_data_url(data_url.trim())?;
    let bytes = BASE64.decode(body.as_bytes())?;
    Ok(ImageFile::new(filename, mime, bytes))
}

fn split_data_url(value: &str) -> Result<(&str, &str), MonumentError> {
    let rest = value
        .strip_prefix(DATA_URL_PREFIX)
        .ok_or_else(|| MonumentError::Format("missing data: prefix".to_string()))?;
    let (mime, body) = rest
        .split_once(BASE64_MARKER)
        .ok_or_else(|| MonumentError::Format("missing ;base64, marker".to_string()))?;
    if mime.is_empty() || !mime.contains('/') {
        return Err(MonumentError::Format(format!(
            "unrecognised MIME type {mime:?}"
        )));
    }
    Ok((mime, body))
}

fn normalize_mime(mime: &str) -> String {
    let mime = mime.trim().to_ascii_lowercase();
    match mime.as_str() {
        "image/jpg" | "image/pjpeg" => "image/jpeg".to_string(),
        _ => mime,
    }
}

fn verified_mime(bytes: &[u8], declared: &str) -> Result<String, MonumentError> {
    if bytes.is_empty() {
        return Err(MonumentError::Format("image data is empty".to_string()));
    }
    let sniffed = image::guess_format(bytes)
        .map_err(|_| MonumentError::Format("data is not a recognised image".to_string()))?
        .to_mime_type();
    let declared = normalize_mime(declared);
    if declared.is_empty() || declared == "application/octet-stream" {
        return Ok(sniffed.to_string());
    }
    if declared != sniffed {
        return Err(MonumentError::Format(format!(
            "declared {declared} but the data is {sniffed}"
        )));
    }
    Ok(declared)
}
