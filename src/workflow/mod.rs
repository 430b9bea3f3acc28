//! The create → place → share wizard.
//!
//! A [`Workflow`] owns the wizard state and the [`MonumentService`] chosen at
//! construction. Actions hold the state lock only while validating and while
//! applying a result, never across the external call, so a clone of the
//! handle can keep navigating while a call is running. Results that arrive
//! after the user moved on are discarded.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::codec::{self, ImageFile, ImagePayload};
use crate::constants::{DESCRIPTION_FAILED_NOTICE, FALLBACK_PLACEMENT_INSTRUCTION};
use crate::error::MonumentError;
use crate::gemini::ApiKey;
use crate::prompts;
use crate::studio::{CredentialMode, MonumentService, require_text};

mod state;

pub use state::{MonumentSource, SceneSource, Ticket, WorkflowState, WorkflowStep};
use state::SceneInput;

/// What happened to the result of an action.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outcome {
    /// The result was stored.
    Applied,
    /// The state moved on while the call ran; the result was dropped.
    Discarded,
}

enum MonumentJob {
    FromPrompt(String),
    FromImage(ImagePayload, String),
}

enum ScenePlan {
    Ready(ImagePayload),
    Generate(String),
}

/// Handle on one user's wizard. Clones share the same state.
#[derive(Debug)]
pub struct Workflow<S> {
    service: Arc<S>,
    state: Arc<Mutex<WorkflowState>>,
}

impl<S> Clone for Workflow<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            state: Arc::clone(&self.state),
        }
    }
}

/// Records an error against the current step and hands it back.
fn fail(state: &mut WorkflowState, err: MonumentError) -> MonumentError {
    state.error = Some(err.user_message());
    err
}

/// Rejects an action that belongs to another step, recording why.
fn on_step(state: &mut WorkflowState, step: WorkflowStep) -> Result<(), MonumentError> {
    state.require_step(step).map_err(|err| fail(state, err))
}

impl<S: MonumentService> Workflow<S> {
    /// Starts an empty session on the first step.
    pub fn new(service: S) -> Self {
        Self {
            service: Arc::new(service),
            state: Arc::new(Mutex::new(WorkflowState::default())),
        }
    }

    /// A copy of the current state.
    pub async fn snapshot(&self) -> WorkflowState {
        self.state.lock().await.clone()
    }

    /// Where the API key for this session lives.
    pub fn credential_mode(&self) -> CredentialMode {
        self.service.credential_mode()
    }

    /// Stores a new key for client-supplied sessions.
    pub async fn set_credential(&self, key: ApiKey) -> Result<(), MonumentError> {
        self.service.set_credential(key).await?;
        let mut state = self.state.lock().await;
        state.credential_required = false;
        state.error = None;
        Ok(())
    }

    /// Switches between describing and uploading the monument.
    pub async fn set_monument_source(&self, source: MonumentSource) -> Result<(), MonumentError> {
        let mut state = self.state.lock().await;
        on_step(&mut state, WorkflowStep::CreateMonument)?;
        state.set_monument_source(source);
        Ok(())
    }

    /// Updates the monument description or style text.
    pub async fn set_monument_prompt(&self, text: impl Into<String>) -> Result<(), MonumentError> {
        let mut state = self.state.lock().await;
        on_step(&mut state, WorkflowStep::CreateMonument)?;
        state.monument_prompt = text.into();
        Ok(())
    }

    /// Picks the image a monument will be built from.
    pub async fn select_monument_file(&self, file: ImageFile) -> Result<(), MonumentError> {
        let mut state = self.state.lock().await;
        on_step(&mut state, WorkflowStep::CreateMonument)?;
        state.monument_file = Some(file);
        state.error = None;
        state.bump();
        Ok(())
    }

    /// Switches between uploading and generating the scene.
    pub async fn set_scene_source(&self, source: SceneSource) -> Result<(), MonumentError> {
        let mut state = self.state.lock().await;
        on_step(&mut state, WorkflowStep::PlaceInScene)?;
        state.set_scene_source(source);
        Ok(())
    }

    /// Updates the prompt used to generate the scene.
    pub async fn set_scene_prompt(&self, text: impl Into<String>) -> Result<(), MonumentError> {
        let mut state = self.state.lock().await;
        on_step(&mut state, WorkflowStep::PlaceInScene)?;
        state.scene_prompt = text.into();
        Ok(())
    }

    /// Updates the placement instruction.
    pub async fn set_placement_instruction(
        &self,
        text: impl Into<String>,
    ) -> Result<(), MonumentError> {
        let mut state = self.state.lock().await;
        on_step(&mut state, WorkflowStep::PlaceInScene)?;
        state.placement_instruction = text.into();
        Ok(())
    }

    /// Moves to the next step if its requirements are met.
    pub async fn advance(&self) -> Result<WorkflowStep, MonumentError> {
        let mut state = self.state.lock().await;
        state.advance().map_err(|err| fail(&mut state, err))
    }

    /// Moves one step back.
    pub async fn go_back(&self) -> WorkflowStep {
        self.state.lock().await.go_back()
    }

    /// Clears everything and returns to the first step.
    pub async fn reset(&self) {
        info!("Resetting workflow");
        self.state.lock().await.reset();
    }

    /// Checks that a client-supplied session still has a usable key.
    fn check_credential(&self, state: &WorkflowState) -> Result<(), MonumentError> {
        if state.credential_required
            && self.service.credential_mode() == CredentialMode::ClientSupplied
        {
            return Err(MonumentError::InputValidation(
                "Enter a valid API key to continue".to_string(),
            ));
        }
        Ok(())
    }

    /// Applies a finished call if its ticket is still current.
    fn settle<T>(
        &self,
        state: &mut WorkflowState,
        ticket: Ticket,
        result: Result<T, MonumentError>,
        apply: impl FnOnce(&mut WorkflowState, T),
    ) -> Result<Outcome, MonumentError> {
        if let Err(err) = &result
            && err.is_invalid_credential()
            && self.service.credential_mode() == CredentialMode::ClientSupplied
        {
            state.credential_required = true;
        }
        if !state.is_current(ticket) {
            match &result {
                Ok(_) => info!("Discarding result that arrived after the workflow moved on"),
                Err(err) => debug!("Discarding stale failure: {}", err),
            }
            return Ok(Outcome::Discarded);
        }
        match result {
            Ok(value) => {
                apply(state, value);
                state.error = None;
                Ok(Outcome::Applied)
            }
            Err(err) => {
                warn!("Generation failed: {}", err);
                Err(fail(state, err))
            }
        }
    }

    /// Generates the monument from the prompt or from the uploaded image,
    /// depending on the monument source.
    pub async fn generate_monument(&self) -> Result<Outcome, MonumentError> {
        let (ticket, job) = {
            let mut state = self.state.lock().await;
            state
                .require_step(WorkflowStep::CreateMonument)
                .and_then(|()| self.check_credential(&state))
                .map_err(|err| fail(&mut state, err))?;
            if state.busy.is_some() {
                return Err(MonumentError::Busy);
            }
            let job = match state.monument_source {
                MonumentSource::Prompt => {
                    match require_text(&state.monument_prompt, "A monument description") {
                        Ok(prompt) => MonumentJob::FromPrompt(prompt.to_string()),
                        Err(err) => return Err(fail(&mut state, err)),
                    }
                }
                MonumentSource::Upload => match Self::upload_job(&state) {
                    Ok(job) => job,
                    Err(err) => return Err(fail(&mut state, err)),
                },
            };
            let ticket = state.issue_ticket();
            state.busy = Some(ticket);
            state.error = None;
            (ticket, job)
        };

        let result = match &job {
            MonumentJob::FromPrompt(prompt) => self.service.generate_monument(prompt).await,
            MonumentJob::FromImage(image, style) => {
                self.service
                    .generate_monument_from_image(image, style)
                    .await
            }
        };

        let mut state = self.state.lock().await;
        state.finish_busy(ticket);
        self.settle(&mut state, ticket, result, |state, image| {
            state.monument = Some(image);
            state.composite = None;
        })
    }

    fn upload_job(state: &WorkflowState) -> Result<MonumentJob, MonumentError> {
        let file = state.monument_file.as_ref().ok_or_else(|| {
            MonumentError::InputValidation("Upload an image to build the monument from".to_string())
        })?;
        let style = require_text(&state.monument_prompt, "A style description")?;
        let image = codec::encode(file)?;
        Ok(MonumentJob::FromImage(image, style.to_string()))
    }

    /// Stores an uploaded scene and describes it straight away. A failed
    /// description falls back to a generic instruction and a notice.
    pub async fn upload_scene(&self, file: ImageFile) -> Result<Outcome, MonumentError> {
        let (ticket, image) = {
            let mut state = self.state.lock().await;
            on_step(&mut state, WorkflowStep::PlaceInScene)?;
            if state.scene_source != SceneSource::Upload {
                return Err(fail(
                    &mut state,
                    MonumentError::InputValidation(
                        "Switch to scene upload before uploading a scene".to_string(),
                    ),
                ));
            }
            let image = match codec::encode(&file) {
                Ok(image) => image,
                Err(err) => return Err(fail(&mut state, err)),
            };
            state.bump();
            state.scene_file = Some(file);
            state.scene_description = None;
            state.notice = None;
            state.error = None;
            let ticket = state.issue_ticket();
            state.describing = Some(ticket);
            (ticket, image)
        };

        let result = self.service.describe_scene(&image).await;

        let mut state = self.state.lock().await;
        state.finish_describing(ticket);
        let result = match result {
            Ok(description) => Ok(Some(description)),
            Err(err) => {
                warn!("Scene description failed, using fallback: {}", err);
                if err.is_invalid_credential()
                    && self.service.credential_mode() == CredentialMode::ClientSupplied
                {
                    state.credential_required = true;
                }
                Ok(None)
            }
        };
        self.settle(&mut state, ticket, result, |state, description| {
            match description {
                Some(description) => {
                    state.placement_instruction = prompts::placement_from_description(&description);
                    state.scene_description = Some(description);
                }
                None => {
                    state.placement_instruction = FALLBACK_PLACEMENT_INSTRUCTION.to_string();
                    state.notice = Some(DESCRIPTION_FAILED_NOTICE.to_string());
                }
            }
        })
    }

    /// Composites the monument into the scene, generating the scene first in
    /// prompt mode. Success moves the wizard to the share step.
    pub async fn place_monument(&self) -> Result<Outcome, MonumentError> {
        let (ticket, monument, plan, instruction) = {
            let mut state = self.state.lock().await;
            state
                .require_step(WorkflowStep::PlaceInScene)
                .and_then(|()| self.check_credential(&state))
                .map_err(|err| fail(&mut state, err))?;
            if state.is_busy() {
                return Err(MonumentError::Busy);
            }
            let (monument, scene, instruction) = match state.placement_inputs() {
                Ok(inputs) => inputs,
                Err(err) => return Err(fail(&mut state, err)),
            };
            let plan = match scene {
                SceneInput::Uploaded(file) => match codec::encode(&file) {
                    Ok(image) => ScenePlan::Ready(image),
                    Err(err) => return Err(fail(&mut state, err)),
                },
                SceneInput::Prompt(prompt) => ScenePlan::Generate(prompt),
            };
            let ticket = state.issue_ticket();
            state.busy = Some(ticket);
            state.error = None;
            (ticket, monument, plan, instruction)
        };

        let result = self.composite(&monument, plan, &instruction).await;

        let mut state = self.state.lock().await;
        state.finish_busy(ticket);
        self.settle(&mut state, ticket, result, |state, composite| {
            state.composite = Some(composite);
            state.move_to(WorkflowStep::Share);
        })
    }

    async fn composite(
        &self,
        monument: &ImagePayload,
        plan: ScenePlan,
        instruction: &str,
    ) -> Result<ImagePayload, MonumentError> {
        let scene = match plan {
            ScenePlan::Ready(image) => image,
            ScenePlan::Generate(prompt) => self.service.generate_scene(&prompt).await?,
        };
        self.service
            .place_monument(&scene, monument, instruction)
            .await
    }
}
