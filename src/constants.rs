//! Shared constants/defaults
//!

/// Base URL of the Gemini REST API.
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Model used for every image-producing call.
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image-preview";

/// Model used for scene description calls.
pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-flash";

/// Header carrying the API key on generation calls.
pub const API_KEY_HEADER: &str = "x-goog-api-key";

/// Per-call timeout for the generation endpoint, in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 120;

/// Request bodies on `/api/generate` carry up to two images; allow 20 MiB.
pub const DEFAULT_BODY_LIMIT_BYTES: usize = 20 * 1024 * 1024;

/// Placement instruction used when the scene description call fails.
pub const FALLBACK_PLACEMENT_INSTRUCTION: &str =
    "Add the monument to the scene, making it look natural";

/// Style text pre-filled when the user switches to building from an upload.
pub const DEFAULT_STYLE_PROMPT: &str = "A classical bronze statue";

/// Notice shown when the scene could not be described automatically.
pub const DESCRIPTION_FAILED_NOTICE: &str =
    "Could not describe the scene automatically; using a generic placement instruction.";

/// Placeholder file name used when an uploaded image has no name.
pub const DEFAULT_UPLOAD_NAME: &str = "upload";
