//! Wizard state and the transitions that do not involve a generation call.

use crate::codec::{ImageFile, ImagePayload};
use crate::constants::DEFAULT_STYLE_PROMPT;
use crate::error::MonumentError;

/// The three wizard steps, in order.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WorkflowStep {
    /// Describe or upload the monument and generate it.
    CreateMonument,
    /// Pick a scene and composite the monument into it.
    PlaceInScene,
    /// Show the final composite.
    Share,
}

/// Where the monument comes from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MonumentSource {
    /// A text description.
    Prompt,
    /// An uploaded image plus style text.
    Upload,
}

impl MonumentSource {
    fn default_prompt(self) -> &'static str {
        match self {
            Self::Prompt => "",
            Self::Upload => DEFAULT_STYLE_PROMPT,
        }
    }
}

/// Where the scene comes from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SceneSource {
    /// An uploaded photo, described automatically.
    Upload,
    /// Generated from a prompt when placing.
    Prompt,
}

/// Issued when an action starts. Its result is only applied while the
/// state's epoch still matches.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Ticket {
    id: u64,
    epoch: u64,
    step: WorkflowStep,
}

/// How the scene for a placement will be obtained.
#[derive(Clone, Debug)]
pub(crate) enum SceneInput {
    Uploaded(ImageFile),
    Prompt(String),
}

/// Everything the wizard knows. Read it through [`super::Workflow::snapshot`];
/// only the workflow's actions change it.
#[derive(Clone, Debug)]
pub struct WorkflowState {
    /// Current step.
    pub step: WorkflowStep,
    /// How the monument is produced.
    pub monument_source: MonumentSource,
    /// Description (prompt mode) or style text (upload mode).
    pub monument_prompt: String,
    /// Image picked in upload mode.
    pub monument_file: Option<ImageFile>,
    /// The generated monument.
    pub monument: Option<ImagePayload>,
    /// How the scene is produced.
    pub scene_source: SceneSource,
    /// Scene prompt for prompt mode.
    pub scene_prompt: String,
    /// Scene photo for upload mode.
    pub scene_file: Option<ImageFile>,
    /// Automatic description of the uploaded scene.
    pub scene_description: Option<String>,
    /// How to place the monument.
    pub placement_instruction: String,
    /// The final composite.
    pub composite: Option<ImagePayload>,
    /// Set while a monument or placement call runs.
    pub busy: Option<Ticket>,
    /// Set while a scene description call runs.
    pub describing: Option<Ticket>,
    /// Last error for the current step.
    pub error: Option<String>,
    /// Non-blocking notice, e.g. a failed scene description.
    pub notice: Option<String>,
    /// The key was rejected and a new one must be entered.
    pub credential_required: bool,
    epoch: u64,
    next_ticket: u64,
}

impl Default for WorkflowState {
    fn default() -> Self {
        Self {
            step: WorkflowStep::CreateMonument,
            monument_source: MonumentSource::Prompt,
            monument_prompt: String::new(),
            monument_file: None,
            monument: None,
            scene_source: SceneSource::Upload,
            scene_prompt: String::new(),
            scene_file: None,
            scene_description: None,
            placement_instruction: String::new(),
            composite: None,
            busy: None,
            describing: None,
            error: None,
            notice: None,
            credential_required: false,
            epoch: 0,
            next_ticket: 0,
        }
    }
}

impl WorkflowState {
    pub(crate) fn bump(&mut self) {
        self.epoch = self.epoch.wrapping_add(1);
    }

    pub(crate) fn issue_ticket(&mut self) -> Ticket {
        self.next_ticket = self.next_ticket.wrapping_add(1);
        Ticket {
            id: self.next_ticket,
            epoch: self.epoch,
            step: self.step,
        }
    }

    /// True when nothing has moved since the ticket was issued.
    pub(crate) fn is_current(&self, ticket: Ticket) -> bool {
        ticket.epoch == self.epoch && ticket.step == self.step
    }

    pub(crate) fn finish_busy(&mut self, ticket: Ticket) {
        if self.busy == Some(ticket) {
            self.busy = None;
        }
    }

    pub(crate) fn finish_describing(&mut self, ticket: Ticket) {
        if self.describing == Some(ticket) {
            self.describing = None;
        }
    }

    pub(crate) fn require_step(&self, step: WorkflowStep) -> Result<(), MonumentError> {
        if self.step != step {
            return Err(MonumentError::InputValidation(format!(
                "This action is only available on the {step:?} step"
            )));
        }
        Ok(())
    }

    /// Whether the forward button is enabled.
    pub fn can_advance(&self) -> bool {
        match self.step {
            WorkflowStep::CreateMonument => self.monument.is_some(),
            WorkflowStep::PlaceInScene => self.composite.is_some(),
            WorkflowStep::Share => false,
        }
    }

    /// Whether any generation call is in flight.
    pub fn is_busy(&self) -> bool {
        self.busy.is_some() || self.describing.is_some()
    }

    /// Switches monument mode, discarding the monument and upload from the
    /// other mode.
    pub(crate) fn set_monument_source(&mut self, source: MonumentSource) {
        if self.monument_source == source {
            return;
        }
        self.monument_source = source;
        self.monument_prompt = source.default_prompt().to_string();
        self.monument_file = None;
        self.clear_monument();
        self.error = None;
        self.bump();
    }

    /// Drops the monument and anything composited from it.
    pub(crate) fn clear_monument(&mut self) {
        self.monument = None;
        self.composite = None;
    }

    pub(crate) fn set_scene_source(&mut self, source: SceneSource) {
        if self.scene_source == source {
            return;
        }
        self.scene_source = source;
        self.scene_file = None;
        self.scene_description = None;
        self.placement_instruction.clear();
        self.notice = None;
        self.error = None;
        self.bump();
    }

    pub(crate) fn advance(&mut self) -> Result<WorkflowStep, MonumentError> {
        let next = match self.step {
            WorkflowStep::CreateMonument if self.monument.is_some() => WorkflowStep::PlaceInScene,
            WorkflowStep::CreateMonument => {
                return Err(MonumentError::InputValidation(
                    "Generate a monument before continuing".to_string(),
                ));
            }
            WorkflowStep::PlaceInScene if self.composite.is_some() => WorkflowStep::Share,
            WorkflowStep::PlaceInScene => {
                return Err(MonumentError::InputValidation(
                    "Place the monument in a scene before continuing".to_string(),
                ));
            }
            WorkflowStep::Share => {
                return Err(MonumentError::InputValidation(
                    "Already on the last step".to_string(),
                ));
            }
        };
        self.move_to(next);
        Ok(next)
    }

    pub(crate) fn go_back(&mut self) -> WorkflowStep {
        let previous = match self.step {
            WorkflowStep::CreateMonument | WorkflowStep::PlaceInScene => {
                WorkflowStep::CreateMonument
            }
            WorkflowStep::Share => WorkflowStep::PlaceInScene,
        };
        if previous != self.step {
            self.move_to(previous);
        }
        previous
    }

    pub(crate) fn move_to(&mut self, step: WorkflowStep) {
        self.step = step;
        self.error = None;
        self.bump();
    }

    /// Clears every field, in-flight flags included. Calls still running
    /// hold tickets from the old epoch, so their results are discarded and
    /// they cannot clear flags set after the reset.
    pub(crate) fn reset(&mut self) {
        let cleared = Self {
            credential_required: self.credential_required,
            epoch: self.epoch.wrapping_add(1),
            next_ticket: self.next_ticket,
            ..Self::default()
        };
        *self = cleared;
    }

    /// Collects and checks everything a placement needs.
    pub(crate) fn placement_inputs(
        &self,
    ) -> Result<(ImagePayload, SceneInput, String), MonumentError> {
        let monument = self.monument.clone().ok_or_else(|| {
            MonumentError::InputValidation("Generate a monument first".to_string())
        })?;
        let scene = match self.scene_source {
            SceneSource::Upload => SceneInput::Uploaded(self.scene_file.clone().ok_or_else(
                || MonumentError::InputValidation("Upload a scene image first".to_string()),
            )?),
            SceneSource::Prompt => {
                let prompt = self.scene_prompt.trim();
                if prompt.is_empty() {
                    return Err(MonumentError::InputValidation(
                        "Describe the scene to generate".to_string(),
                    ));
                }
                SceneInput::Prompt(prompt.to_string())
            }
        };
        let instruction = self.placement_instruction.trim();
        if instruction.is_empty() {
            return Err(MonumentError::InputValidation(
                "A placement instruction is required".to_string(),
            ));
        }
        Ok((monument, scene, instruction.to_string()))
    }
}
