//! Non-branching survey: every question shown at once, one submission.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use engage_types::{AnswerSet, EngageError, RawAnswer, Result};

use crate::answer_validation::is_valid;
use crate::answers::{backfill_skipped, serialize, AnswerStore};
use crate::events::{EventEmitter, SurveyEvent, SurveyEventKind};
use crate::question::SurveyDefinition;
use crate::submission::{SurveyPayload, SurveySubmitter};
use crate::survey::SurveyConfig;

#[derive(Debug, Clone, PartialEq)]
pub enum ListSubmission {
    /// Question id -> error message for every question that failed.
    Invalid { errors: BTreeMap<String, String> },
    Submitted(SurveyPayload),
}

pub struct ListSurvey {
    interaction_id: String,
    session_id: String,
    definition: Arc<SurveyDefinition>,
    emitter: EventEmitter,
    store: AnswerStore,
    pending: Option<SurveyPayload>,
    submitted: bool,
}

impl ListSurvey {
    pub fn new(
        interaction_id: impl Into<String>,
        definition: Arc<SurveyDefinition>,
        emitter: EventEmitter,
        config: &SurveyConfig,
    ) -> Result<Self> {
        if definition.question_sets.is_empty() {
            return Err(EngageError::Configuration(format!(
                "survey '{}' has no question sets",
                definition.id
            )));
        }
        let survey = Self {
            interaction_id: interaction_id.into(),
            session_id: config.session_id.clone(),
            definition,
            emitter,
            store: AnswerStore::new(),
            pending: None,
            submitted: false,
        };
        for question in survey.definition.all_questions().filter(|q| !q.is_supported()) {
            tracing::warn!(
                survey = %survey.definition.id,
                question_id = %question.id,
                question_type = %question.type_name(),
                "Skipping unsupported question"
            );
        }
        tracing::info!(survey = %survey.definition.id, questions = survey.definition.answerable_questions().count(), "List survey launched");
        survey.emit(SurveyEventKind::Launch);
        Ok(survey)
    }

    pub fn survey_id(&self) -> &str {
        &self.definition.id
    }

    pub fn definition(&self) -> &Arc<SurveyDefinition> {
        &self.definition
    }

    /// Replace the entries of one question. Invalidates any payload kept from
    /// a failed submission.
    pub fn record(&mut self, question_id: &str, entries: Vec<RawAnswer>) {
        self.store.reset(question_id);
        self.store.record(question_id, entries);
        self.pending = None;
    }

    /// Every failing question with its error message. Empty when all pass.
    pub fn validate(&self) -> BTreeMap<String, String> {
        self.definition
            .answerable_questions()
            .filter(|q| !is_valid(q, self.store.get(&q.id).unwrap_or_default()))
            .map(|q| (q.id.clone(), q.error_message().to_string()))
            .collect()
    }

    /// Serialized answers with unanswered questions marked skipped.
    pub fn answers(&self) -> AnswerSet {
        let mut answers = serialize(self.definition.all_questions(), &self.store);
        backfill_skipped(self.definition.all_questions(), &mut answers);
        answers
    }

    /// Record `answers` and submit.
    pub async fn submit_answers(
        &mut self,
        answers: HashMap<String, Vec<RawAnswer>>,
        submitter: &dyn SurveySubmitter,
    ) -> Result<ListSubmission> {
        for (question_id, entries) in answers {
            self.record(&question_id, entries);
        }
        self.submit(submitter).await
    }

    /// Validate every question, then submit once. Validation failures are
    /// returned as [`ListSubmission::Invalid`], not as an error.
    pub async fn submit(&mut self, submitter: &dyn SurveySubmitter) -> Result<ListSubmission> {
        if self.submitted {
            return Err(EngageError::AlreadySubmitted {
                survey: self.survey_id().to_string(),
            });
        }

        let errors = self.validate();
        if !errors.is_empty() {
            tracing::debug!(survey = %self.survey_id(), invalid = errors.len(), "List survey has invalid answers");
            return Ok(ListSubmission::Invalid { errors });
        }

        let payload = match &self.pending {
            Some(payload) => payload.clone(),
            None => {
                let payload = SurveyPayload::new(self.survey_id(), self.answers(), &self.session_id);
                self.pending = Some(payload.clone());
                payload
            }
        };

        let survey_id = self.survey_id().to_string();
        match submitter.submit_survey(&payload, &survey_id).await {
            Ok(()) => {
                self.submitted = true;
                self.pending = None;
                tracing::info!(survey = %survey_id, "List survey submitted");
                self.emitter.emit(
                    SurveyEvent::new(SurveyEventKind::Submit, &survey_id, &self.interaction_id)
                        .with_answers(payload.response.answers.clone()),
                );
                Ok(ListSubmission::Submitted(payload))
            }
            Err(e) => {
                tracing::error!(survey = %survey_id, error = %e, "List survey submission failed");
                self.emit(SurveyEventKind::Error);
                Err(e)
            }
        }
    }

    pub fn close(self) {
        if !self.submitted {
            if self.store.has_any_answer() {
                let partial = serialize(self.definition.all_questions(), &self.store);
                self.emitter.emit(
                    SurveyEvent::new(SurveyEventKind::CancelPartial, self.survey_id(), &self.interaction_id)
                        .with_answers(partial),
                );
            } else {
                self.emit(SurveyEventKind::Cancel);
            }
        }
        self.emit(SurveyEventKind::Close);
    }

    fn emit(&self, kind: SurveyEventKind) {
        self.emitter
            .emit(SurveyEvent::new(kind, self.survey_id(), &self.interaction_id));
    }
}
