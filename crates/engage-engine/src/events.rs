//! Survey lifecycle events for telemetry and engagement-count collaborators.
//!
//! Emits [`SurveyEvent`]s via a [`tokio::sync::broadcast`] channel so that
//! external observers (count stores, analytics, UI) can follow a survey without
//! coupling to the state machine.

use engage_types::AnswerSet;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurveyEventKind {
    Launch,
    NextQuestionSet,
    Submit,
    Close,
    Cancel,
    CancelPartial,
    Error,
}

impl SurveyEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SurveyEventKind::Launch => "launch",
            SurveyEventKind::NextQuestionSet => "next_question_set",
            SurveyEventKind::Submit => "submit",
            SurveyEventKind::Close => "close",
            SurveyEventKind::Cancel => "cancel",
            SurveyEventKind::CancelPartial => "cancel_partial",
            SurveyEventKind::Error => "error",
        }
    }
}

/// A lifecycle event. `id` is the subject of the event: the question set
/// entered for `next_question_set`, the survey id otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyEvent {
    pub kind: SurveyEventKind,
    pub id: String,
    pub interaction_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answers: Option<AnswerSet>,
}

impl SurveyEvent {
    pub fn new(kind: SurveyEventKind, id: impl Into<String>, interaction_id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            interaction_id: interaction_id.into(),
            answers: None,
        }
    }

    pub fn with_answers(mut self, answers: AnswerSet) -> Self {
        self.answers = Some(answers);
        self
    }
}

/// Event emitter wrapping a broadcast sender.
#[derive(Clone)]
pub struct EventEmitter {
    sender: tokio::sync::broadcast::Sender<SurveyEvent>,
}

impl EventEmitter {
    /// Create a new emitter with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all current subscribers.
    ///
    /// If there are no active receivers the event is silently dropped.
    pub fn emit(&self, event: SurveyEvent) {
        tracing::debug!(
            kind = event.kind.as_str(),
            id = %event.id,
            interaction_id = %event.interaction_id,
            "Survey event"
        );
        let _ = self.sender.send(event);
    }

    /// Subscribe to events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<SurveyEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}
