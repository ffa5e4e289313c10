//! Interaction manifest: the interactions an app can show and the event table
//! that targets them.

use std::path::Path;

use engage_types::{DataContext, EngageError, Result};
use serde::Deserialize;
use serde_json::Value;

use crate::question::SurveyDefinition;
use crate::targeting::{resolve, resolve_candidates, Invocation, TargetTable};

pub const SURVEY_TYPE: &str = "Survey";
pub const TEXT_MODAL_TYPE: &str = "TextModal";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub interactions: Vec<Interaction>,
    #[serde(default)]
    pub targets: TargetTable,
}

impl Manifest {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let manifest = Self::from_json(&text)?;
        tracing::info!(
            path = %path.display(),
            interactions = manifest.interactions.len(),
            events = manifest.targets.len(),
            "Loaded manifest"
        );
        Ok(manifest)
    }

    pub fn interaction(&self, id: &str) -> Option<&Interaction> {
        self.interactions.iter().find(|i| i.id == id)
    }

    /// Resolve `event` and look up the selected interaction. A target naming
    /// an interaction missing from the manifest is logged and yields `None`.
    pub fn interaction_for_event(&self, event: &str, context: &DataContext) -> Option<&Interaction> {
        let invocation = resolve(event, &self.targets, context)?;
        let interaction = self.interaction(&invocation.interaction_id);
        if interaction.is_none() {
            tracing::warn!(%event, interaction_id = %invocation.interaction_id, "Targeted interaction is not in the manifest");
        }
        interaction
    }

    /// Parsed survey definition of interaction `id`.
    pub fn survey(&self, id: &str) -> Result<SurveyDefinition> {
        self.interaction(id)
            .ok_or_else(|| EngageError::UnknownInteraction(id.to_string()))?
            .survey_definition()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Interaction {
    pub id: String,
    #[serde(rename = "type")]
    pub interaction_type: String,
    #[serde(default)]
    pub configuration: Value,
}

impl Interaction {
    pub fn is_survey(&self) -> bool {
        self.interaction_type == SURVEY_TYPE
    }

    fn expect_type(&self, expected: &str) -> Result<()> {
        if self.interaction_type == expected {
            Ok(())
        } else {
            Err(EngageError::WrongInteractionType {
                id: self.id.clone(),
                expected: expected.to_string(),
                actual: self.interaction_type.clone(),
            })
        }
    }

    pub fn survey_definition(&self) -> Result<SurveyDefinition> {
        self.expect_type(SURVEY_TYPE)?;
        let mut definition: SurveyDefinition = serde_json::from_value(self.configuration.clone())
            .map_err(|e| EngageError::Configuration(format!("survey '{}': {e}", self.id)))?;
        if definition.id.is_empty() {
            definition.id = self.id.clone();
        }
        Ok(definition)
    }

    pub fn note_actions(&self) -> Result<Vec<NoteAction>> {
        self.expect_type(TEXT_MODAL_TYPE)?;
        let actions = self.configuration.get("actions").cloned().unwrap_or(Value::Array(Vec::new()));
        serde_json::from_value(actions)
            .map_err(|e| EngageError::Configuration(format!("note '{}': {e}", self.id)))
    }

    /// First invocation of note action `action_id` whose criteria holds.
    pub fn action_target(&self, action_id: &str, context: &DataContext) -> Result<Option<Invocation>> {
        let actions = self.note_actions()?;
        let action = actions
            .iter()
            .find(|a| a.id == action_id)
            .ok_or_else(|| EngageError::Configuration(format!("note '{}' has no action '{action_id}'", self.id)))?;
        Ok(resolve_candidates(&action.invokes, context).cloned())
    }
}

/// A button on a text modal. `invoke` actions carry candidate interactions.
#[derive(Debug, Clone, Deserialize)]
pub struct NoteAction {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub invokes: Vec<Invocation>,
}
