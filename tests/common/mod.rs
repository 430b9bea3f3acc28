#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::{ImageFormat, Rgb, RgbImage};
use monument_mixer::codec::{ImageFile, ImagePayload};
use monument_mixer::error::{MonumentError, TransportErrorKind};
use monument_mixer::gemini::ApiKey;
use monument_mixer::studio::{CredentialMode, MonumentService};
use monument_mixer::workflow::Workflow;
use tokio::sync::Notify;

pub fn png_bytes(colour: [u8; 3]) -> Vec<u8> {
    let img = RgbImage::from_pixel(3, 3, Rgb(colour));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)
        .expect("encode png");
    out.into_inner()
}

pub fn payload(colour: [u8; 3]) -> ImagePayload {
    ImagePayload::from_bytes(&png_bytes(colour), "image/png").expect("payload")
}

pub fn monument_image() -> ImagePayload {
    payload([180, 140, 40])
}

pub fn scene_image() -> ImagePayload {
    payload([40, 160, 60])
}

pub fn composite_image() -> ImagePayload {
    payload([30, 60, 200])
}

pub fn photo(name: &str) -> ImageFile {
    ImageFile::new(name, "image/png", png_bytes([120, 120, 120]))
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Op {
    Monument,
    MonumentFromImage,
    Describe,
    Scene,
    Place,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Call {
    pub op: Op,
    pub text: String,
}

#[derive(Clone, Copy, Debug)]
pub enum Failure {
    Empty,
    BadKey,
    Quota,
}

impl Failure {
    fn error(self) -> MonumentError {
        match self {
            Self::Empty => MonumentError::EmptyResponse("no image returned".to_string()),
            Self::BadKey => MonumentError::Transport {
                kind: TransportErrorKind::InvalidCredential,
                message: "API key not valid".to_string(),
            },
            Self::Quota => MonumentError::Transport {
                kind: TransportErrorKind::QuotaExceeded,
                message: "RESOURCE_EXHAUSTED".to_string(),
            },
        }
    }
}

/// Records every call and answers with fixed images. Failures can be queued
/// per operation, and a gate can hold calls until the test releases them.
#[derive(Clone)]
pub struct ScriptedService {
    mode: CredentialMode,
    calls: Arc<Mutex<Vec<Call>>>,
    failures: Arc<Mutex<HashMap<Op, Failure>>>,
    gate: Option<Arc<Notify>>,
    description: String,
}

impl ScriptedService {
    pub fn new(mode: CredentialMode) -> Self {
        Self {
            mode,
            calls: Arc::default(),
            failures: Arc::default(),
            gate: None,
            description: "a sunny city park".to_string(),
        }
    }

    pub fn gated(mode: CredentialMode, gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new(mode)
        }
    }

    pub fn fail(&self, op: Op, failure: Failure) {
        self.failures
            .lock()
            .expect("lock")
            .insert(op, failure);
    }

    async fn record(&self, op: Op, text: &str) -> Result<(), MonumentError> {
        self.calls.lock().expect("lock").push(Call {
            op,
            text: text.to_string(),
        });
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let failure = self.failures.lock().expect("lock").get(&op).copied();
        match failure {
            Some(failure) => Err(failure.error()),
            None => Ok(()),
        }
    }
}

impl MonumentService for ScriptedService {
    async fn generate_monument(&self, prompt: &str) -> Result<ImagePayload, MonumentError> {
        self.record(Op::Monument, prompt).await?;
        Ok(monument_image())
    }

    async fn generate_monument_from_image(
        &self,
        _image: &ImagePayload,
        style: &str,
    ) -> Result<ImagePayload, MonumentError> {
        self.record(Op::MonumentFromImage, style).await?;
        Ok(monument_image())
    }

    async fn describe_scene(&self, _image: &ImagePayload) -> Result<String, MonumentError> {
        self.record(Op::Describe, "").await?;
        Ok(self.description.clone())
    }

    async fn generate_scene(&self, prompt: &str) -> Result<ImagePayload, MonumentError> {
        self.record(Op::Scene, prompt).await?;
        Ok(scene_image())
    }

    async fn place_monument(
        &self,
        _scene: &ImagePayload,
        _monument: &ImagePayload,
        instruction: &str,
    ) -> Result<ImagePayload, MonumentError> {
        self.record(Op::Place, instruction).await?;
        Ok(composite_image())
    }

    fn credential_mode(&self) -> CredentialMode {
        self.mode
    }

    async fn set_credential(&self, _key: ApiKey) -> Result<(), MonumentError> {
        self.failures
            .lock()
            .expect("lock")
            .retain(|_, failure| !matches!(failure, Failure::BadKey));
        Ok(())
    }
}

impl ScriptedService {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("lock").clone()
    }
}

/// Builds a workflow over a scripted service. The returned clone shares the
/// call log and failure table with the one inside the workflow.
pub fn workflow(mode: CredentialMode) -> (Workflow<ScriptedService>, ScriptedService) {
    let service = ScriptedService::new(mode);
    (Workflow::new(service.clone()), service)
}

/// Waits until the workflow reports an in-flight call.
pub async fn wait_until_busy<S: MonumentService>(workflow: &Workflow<S>) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !workflow.snapshot().await.is_busy() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("workflow never became busy");
}
