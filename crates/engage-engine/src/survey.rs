//! Branching survey state machine.
//!
//! A [`BranchedSurvey`] walks one question at a time through the survey graph.
//! When a question set is exhausted its answers are serialized into the
//! session aggregate and the set's invokes pick the next set, evaluated
//! against the caller's data context overlaid with those answers.

use std::sync::Arc;

use engage_types::{AnswerSet, DataContext, EngageError, RawAnswer, Result};

use crate::answer_validation::is_valid;
use crate::answers::{answers_context, backfill_skipped, merge_answers, serialize, AnswerStore};
use crate::criteria::evaluate;
use crate::events::{EventEmitter, SurveyEvent, SurveyEventKind};
use crate::graph::SurveyGraph;
use crate::question::{Invoke, InvokeBehavior, Question, QuestionSet, SurveyDefinition};
use crate::retry::SubmitRetry;
use crate::submission::{SurveyPayload, SurveySubmitter};

/// Per-session settings.
#[derive(Debug, Clone)]
pub struct SurveyConfig {
    pub session_id: String,
    /// Responses collected for one question before the driver gives up.
    pub max_attempts: usize,
    pub submit_retry: SubmitRetry,
}

impl Default for SurveyConfig {
    fn default() -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            max_attempts: 3,
            submit_retry: SubmitRetry::once(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurveyState {
    AtQuestion { set_id: String, question_index: usize },
    Terminal,
}

/// Outcome of [`BranchedSurvey::advance`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    /// The response was rejected; the survey did not move.
    Invalid { question_id: String, error_message: String },
    NextQuestion { set_id: String, question_index: usize },
    NextQuestionSet { set_id: String },
    ReadyToSubmit,
}

// ---------------------------------------------------------------------------
// Pure transitions
// ---------------------------------------------------------------------------

/// First invoke of `set` whose criteria holds in `context`.
pub fn select_invoke<'a>(set: &'a QuestionSet, context: &DataContext) -> Option<&'a Invoke> {
    set.invokes
        .iter()
        .flatten()
        .find(|invoke| evaluate(&invoke.criteria, context))
}

/// The state after the current question has been accepted.
///
/// Within a set this moves to the next question. Past the last question the
/// set's first matching invoke decides: a `continue` to a known set enters it,
/// anything else ends the survey.
pub fn next_state(graph: &SurveyGraph, state: &SurveyState, context: &DataContext) -> SurveyState {
    let SurveyState::AtQuestion { set_id, question_index } = state else {
        return SurveyState::Terminal;
    };
    let Some(set) = graph.set(set_id) else {
        tracing::warn!(survey = %graph.survey_id(), %set_id, "Current question set is not in the survey");
        return SurveyState::Terminal;
    };
    if question_index + 1 < set.questions.len() {
        return SurveyState::AtQuestion {
            set_id: set_id.clone(),
            question_index: question_index + 1,
        };
    }
    exit_set(graph, set, context)
}

fn exit_set(graph: &SurveyGraph, set: &QuestionSet, context: &DataContext) -> SurveyState {
    let Some(invoke) = select_invoke(set, context) else {
        tracing::debug!(survey = %graph.survey_id(), set_id = %set.id, "No invoke matched; survey complete");
        return SurveyState::Terminal;
    };
    if invoke.behavior == InvokeBehavior::End {
        return SurveyState::Terminal;
    }
    match invoke.next_question_set_id.as_deref() {
        Some(next) if graph.contains(next) => SurveyState::AtQuestion {
            set_id: next.to_string(),
            question_index: 0,
        },
        target => {
            tracing::warn!(
                survey = %graph.survey_id(),
                set_id = %set.id,
                target = target.unwrap_or("<none>"),
                "Invoke target does not resolve; ending survey"
            );
            SurveyState::Terminal
        }
    }
}

// ---------------------------------------------------------------------------
// BranchedSurvey
// ---------------------------------------------------------------------------

pub struct BranchedSurvey {
    interaction_id: String,
    session_id: String,
    graph: SurveyGraph,
    base_context: DataContext,
    emitter: EventEmitter,
    state: SurveyState,
    store: AnswerStore,
    aggregate: AnswerSet,
    visited: Vec<String>,
    /// Built on the first submission attempt and reused by retries.
    pending: Option<SurveyPayload>,
    submitted: bool,
}

impl BranchedSurvey {
    /// Start a survey at the first question of its first set and emit
    /// `launch`. Fails when the survey has no question sets.
    pub fn new(
        interaction_id: impl Into<String>,
        definition: Arc<SurveyDefinition>,
        context: DataContext,
        emitter: EventEmitter,
        config: &SurveyConfig,
    ) -> Result<Self> {
        let graph = SurveyGraph::new(definition)?;
        let entry = graph.entry().id.clone();
        let mut survey = Self {
            interaction_id: interaction_id.into(),
            session_id: config.session_id.clone(),
            graph,
            base_context: context,
            emitter,
            state: SurveyState::AtQuestion {
                set_id: entry.clone(),
                question_index: 0,
            },
            store: AnswerStore::new(),
            aggregate: AnswerSet::new(),
            visited: vec![entry],
            pending: None,
            submitted: false,
        };
        tracing::info!(survey = %survey.survey_id(), interaction_id = %survey.interaction_id, "Survey launched");
        survey.emit(SurveyEventKind::Launch, survey.survey_id().to_string());
        survey.settle();
        Ok(survey)
    }

    pub fn survey_id(&self) -> &str {
        self.graph.survey_id()
    }

    pub fn interaction_id(&self) -> &str {
        &self.interaction_id
    }

    pub fn definition(&self) -> &Arc<SurveyDefinition> {
        self.graph.definition()
    }

    pub fn state(&self) -> &SurveyState {
        &self.state
    }

    pub fn current_set(&self) -> Option<&QuestionSet> {
        match &self.state {
            SurveyState::AtQuestion { set_id, .. } => self.graph.set(set_id),
            SurveyState::Terminal => None,
        }
    }

    pub fn current_question(&self) -> Option<&Question> {
        match &self.state {
            SurveyState::AtQuestion { question_index, .. } => {
                self.current_set()?.questions.get(*question_index)
            }
            SurveyState::Terminal => None,
        }
    }

    /// Serialized answers of every exhausted set so far.
    pub fn answers(&self) -> &AnswerSet {
        &self.aggregate
    }

    /// Set ids entered so far, in order.
    pub fn visited(&self) -> &[String] {
        &self.visited
    }

    pub fn is_ready_to_submit(&self) -> bool {
        self.state == SurveyState::Terminal && !self.submitted
    }

    pub fn is_submitted(&self) -> bool {
        self.submitted
    }

    /// The data context invokes are evaluated against.
    pub fn answer_context(&self) -> DataContext {
        self.base_context.overlay(&answers_context(&self.aggregate))
    }

    /// Aggregate answers with every question never answered marked skipped.
    pub fn final_answers(&self) -> AnswerSet {
        let mut answers = self.aggregate.clone();
        backfill_skipped(self.graph.definition().all_questions(), &mut answers);
        answers
    }

    /// Accept the entries collected for the current question and move on.
    pub fn advance(&mut self, entries: Vec<RawAnswer>) -> Advance {
        let SurveyState::AtQuestion { set_id, question_index } = self.state.clone() else {
            return Advance::ReadyToSubmit;
        };
        let Some(question) = self.current_question().cloned() else {
            tracing::warn!(survey = %self.survey_id(), %set_id, question_index, "No question at current position; ending survey");
            self.state = SurveyState::Terminal;
            return Advance::ReadyToSubmit;
        };

        self.store.reset(&question.id);
        self.store.record(question.id.clone(), entries);

        if !is_valid(&question, self.store.get(&question.id).unwrap_or_default()) {
            tracing::debug!(survey = %self.survey_id(), question_id = %question.id, "Answer rejected");
            return Advance::Invalid {
                question_id: question.id.clone(),
                error_message: question.error_message().to_string(),
            };
        }

        let entered = self.visited.len();
        let set_len = self.current_set().map_or(0, |set| set.questions.len());
        if question_index + 1 < set_len {
            self.state = SurveyState::AtQuestion {
                set_id: set_id.clone(),
                question_index: question_index + 1,
            };
        } else {
            self.complete_set(&set_id);
            let next = next_state(&self.graph, &self.state, &self.answer_context());
            self.enter(next);
        }
        self.settle();

        match &self.state {
            SurveyState::AtQuestion { set_id, question_index } if self.visited.len() == entered => {
                Advance::NextQuestion {
                    set_id: set_id.clone(),
                    question_index: *question_index,
                }
            }
            SurveyState::AtQuestion { set_id, .. } => Advance::NextQuestionSet { set_id: set_id.clone() },
            SurveyState::Terminal => Advance::ReadyToSubmit,
        }
    }

    /// Send the final answers. A failed attempt leaves the survey ready to
    /// submit with the same payload.
    pub async fn submit(&mut self, submitter: &dyn SurveySubmitter) -> Result<SurveyPayload> {
        if self.submitted {
            return Err(EngageError::AlreadySubmitted {
                survey: self.survey_id().to_string(),
            });
        }
        if self.state != SurveyState::Terminal {
            return Err(EngageError::NotReadyToSubmit {
                survey: self.survey_id().to_string(),
            });
        }

        let payload = match &self.pending {
            Some(payload) => payload.clone(),
            None => {
                let payload = SurveyPayload::new(self.survey_id(), self.final_answers(), &self.session_id);
                self.pending = Some(payload.clone());
                payload
            }
        };

        let survey_id = self.survey_id().to_string();
        match submitter.submit_survey(&payload, &survey_id).await {
            Ok(()) => {
                self.submitted = true;
                self.pending = None;
                tracing::info!(survey = %survey_id, answers = payload.response.answers.len(), "Survey submitted");
                self.emitter.emit(
                    SurveyEvent::new(SurveyEventKind::Submit, &survey_id, &self.interaction_id)
                        .with_answers(payload.response.answers.clone()),
                );
                Ok(payload)
            }
            Err(e) => {
                tracing::error!(survey = %survey_id, error = %e, "Survey submission failed");
                self.emit(SurveyEventKind::Error, survey_id);
                Err(e)
            }
        }
    }

    /// Dismiss the survey. Unsubmitted surveys report `cancel_partial` with
    /// what was collected, or `cancel` when nothing was; `close` always
    /// follows.
    pub fn close(self) {
        let survey_id = self.survey_id().to_string();
        if !self.submitted {
            let mut partial = self.aggregate.clone();
            if let Some(set) = self.current_set() {
                merge_answers(&mut partial, serialize(&set.questions, &self.store));
            }
            if self.store.has_any_answer() {
                self.emitter.emit(
                    SurveyEvent::new(SurveyEventKind::CancelPartial, &survey_id, &self.interaction_id)
                        .with_answers(partial),
                );
            } else {
                self.emit(SurveyEventKind::Cancel, survey_id.clone());
            }
        }
        tracing::info!(survey = %survey_id, submitted = self.submitted, "Survey closed");
        self.emit(SurveyEventKind::Close, survey_id);
    }

    // -- internals ----------------------------------------------------------

    fn emit(&self, kind: SurveyEventKind, id: String) {
        self.emitter.emit(SurveyEvent::new(kind, id, &self.interaction_id));
    }

    fn complete_set(&mut self, set_id: &str) {
        let Some(set) = self.graph.set(set_id) else {
            return;
        };
        let serialized = serialize(&set.questions, &self.store);
        merge_answers(&mut self.aggregate, serialized);
    }

    fn enter(&mut self, next: SurveyState) {
        if let SurveyState::AtQuestion { set_id, .. } = &next {
            self.visited.push(set_id.clone());
            self.emitter.emit(
                SurveyEvent::new(SurveyEventKind::NextQuestionSet, set_id, &self.interaction_id)
                    .with_answers(self.aggregate.clone()),
            );
        } else {
            tracing::info!(survey = %self.survey_id(), "Survey ready to submit");
        }
        self.state = next;
    }

    /// Move past positions with nothing to ask: sets without questions and
    /// questions of unsupported types. More hops than the survey has sets and
    /// questions can only be a cycle and ends the survey.
    fn settle(&mut self) {
        let limit = self.graph.sets().map(|set| set.questions.len() + 1).sum::<usize>();
        let mut hops = 0;
        loop {
            let SurveyState::AtQuestion { set_id, question_index } = self.state.clone() else {
                return;
            };
            let Some(set) = self.graph.set(&set_id) else {
                return;
            };
            let set_len = set.questions.len();
            match set.questions.get(question_index) {
                Some(question) if question.is_supported() => return,
                Some(question) => {
                    tracing::warn!(
                        survey = %self.survey_id(),
                        question_id = %question.id,
                        question_type = %question.type_name(),
                        "Skipping unsupported question"
                    );
                }
                None => {}
            }

            hops += 1;
            if hops > limit {
                tracing::warn!(survey = %self.survey_id(), "Cycle of question sets with nothing to ask; ending survey");
                self.state = SurveyState::Terminal;
                return;
            }
            if question_index + 1 < set_len {
                self.state = SurveyState::AtQuestion {
                    set_id,
                    question_index: question_index + 1,
                };
            } else {
                self.complete_set(&set_id);
                let next = next_state(&self.graph, &self.state, &self.answer_context());
                self.enter(next);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::submission::RecordingSubmitter;
    use engage_types::SerializedAnswerState;
    use serde_json::json;

    fn definition(value: serde_json::Value) -> Arc<SurveyDefinition> {
        Arc::new(serde_json::from_value(value).unwrap())
    }

    fn branching() -> Arc<SurveyDefinition> {
        definition(json!({
            "id": "survey-1",
            "question_sets": [
                { "id": "set1", "questions": [
                    { "id": "q1", "type": "multichoice", "required": true,
                      "answer_choices": [{ "id": "yes", "value": "Yes" }, { "id": "no", "value": "No" }] },
                    { "id": "q2", "type": "singleline" }
                  ],
                  "invokes": [
                    { "behavior": "continue", "next_question_set_id": "set2",
                      "criteria": { "interactions/q1/current_answer/id": "yes" } },
                    { "behavior": "continue", "next_question_set_id": "set3" }
                  ]
                },
                { "id": "set2", "questions": [{ "id": "q3", "type": "nps", "min": 0, "max": 10 }],
                  "invokes": [{ "behavior": "continue", "next_question_set_id": "set3" }] },
                { "id": "set3", "questions": [{ "id": "q4", "type": "singleline" }] }
            ]
        }))
    }

    fn start(def: Arc<SurveyDefinition>) -> BranchedSurvey {
        BranchedSurvey::new("interaction-1", def, DataContext::new(), EventEmitter::default(), &SurveyConfig::default())
            .unwrap()
    }

    #[test]
    fn starts_at_first_question() {
        let survey = start(branching());
        assert_eq!(
            survey.state(),
            &SurveyState::AtQuestion { set_id: "set1".into(), question_index: 0 }
        );
        assert_eq!(survey.current_question().unwrap().id, "q1");
    }

    #[test]
    fn invalid_answer_keeps_position() {
        let mut survey = start(branching());
        let step = survey.advance(Vec::new());
        assert_eq!(
            step,
            Advance::Invalid { question_id: "q1".into(), error_message: crate::question::DEFAULT_ERROR_MESSAGE.into() }
        );
        assert_eq!(survey.current_question().unwrap().id, "q1");
    }

    #[test]
    fn branches_on_answers_of_the_exhausted_set() {
        let mut survey = start(branching());
        assert_eq!(
            survey.advance(vec![RawAnswer::choice("no")]),
            Advance::NextQuestion { set_id: "set1".into(), question_index: 1 }
        );
        assert_eq!(survey.advance(vec![]), Advance::NextQuestionSet { set_id: "set3".into() });
        assert_eq!(survey.advance(vec![RawAnswer::text("bye")]), Advance::ReadyToSubmit);
        assert_eq!(survey.visited(), &["set1", "set3"]);

        let answers = survey.final_answers();
        assert_eq!(answers["q2"], SerializedAnswerState::empty());
        assert_eq!(answers["q3"], SerializedAnswerState::skipped());
        assert_eq!(answers.len(), 4);
    }

    #[test]
    fn matching_branch_is_taken() {
        let mut survey = start(branching());
        survey.advance(vec![RawAnswer::choice("yes")]);
        assert_eq!(survey.advance(vec![]), Advance::NextQuestionSet { set_id: "set2".into() });
        assert_eq!(survey.current_question().unwrap().id, "q3");
        assert_eq!(
            survey.answer_context().resolve("interactions/q1/current_answer/id"),
            Some(&json!("yes"))
        );
    }

    #[test]
    fn pure_next_state_matches_driver() {
        let def = branching();
        let graph = SurveyGraph::new(Arc::clone(&def)).unwrap();
        let at = |set: &str, i: usize| SurveyState::AtQuestion { set_id: set.into(), question_index: i };
        let yes = DataContext::new().with("interactions/q1/current_answer/id", json!("yes"));

        assert_eq!(next_state(&graph, &at("set1", 0), &yes), at("set1", 1));
        assert_eq!(next_state(&graph, &at("set1", 1), &yes), at("set2", 0));
        assert_eq!(next_state(&graph, &at("set1", 1), &DataContext::new()), at("set3", 0));
        assert_eq!(next_state(&graph, &at("set3", 0), &yes), SurveyState::Terminal);
        assert_eq!(next_state(&graph, &SurveyState::Terminal, &yes), SurveyState::Terminal);
    }

    #[test]
    fn unresolved_target_and_end_are_terminal() {
        let def = definition(json!({
            "question_sets": [
                { "id": "a", "questions": [{ "id": "q1", "type": "singleline" }],
                  "invokes": [{ "behavior": "continue", "next_question_set_id": "missing" }] },
                { "id": "b", "questions": [{ "id": "q2", "type": "singleline" }],
                  "invokes": [{ "behavior": "end" }, { "behavior": "continue", "next_question_set_id": "a" }] }
            ]
        }));
        let graph = SurveyGraph::new(def).unwrap();
        let at = |set: &str| SurveyState::AtQuestion { set_id: set.into(), question_index: 0 };
        assert_eq!(next_state(&graph, &at("a"), &DataContext::new()), SurveyState::Terminal);
        assert_eq!(next_state(&graph, &at("b"), &DataContext::new()), SurveyState::Terminal);
    }

    #[test]
    fn empty_sets_are_passed_through() {
        let def = definition(json!({
            "question_sets": [
                { "id": "intro", "questions": [],
                  "invokes": [{ "behavior": "continue", "next_question_set_id": "main" }] },
                { "id": "main", "questions": [{ "id": "q1", "type": "singleline" }] }
            ]
        }));
        let survey = start(def);
        assert_eq!(survey.current_question().unwrap().id, "q1");
        assert_eq!(survey.visited(), &["intro", "main"]);
    }

    #[test]
    fn cycle_of_empty_sets_terminates() {
        let def = definition(json!({
            "question_sets": [
                { "id": "a", "questions": [], "invokes": [{ "behavior": "continue", "next_question_set_id": "b" }] },
                { "id": "b", "questions": [], "invokes": [{ "behavior": "continue", "next_question_set_id": "a" }] }
            ]
        }));
        assert!(start(def).is_ready_to_submit());
    }

    #[test]
    fn unsupported_questions_are_never_presented() {
        let def = definition(json!({
            "question_sets": [
                { "id": "s1", "questions": [
                    { "id": "rank", "type": "ranking", "required": true },
                    { "id": "q1", "type": "singleline" },
                    { "id": "grid", "type": "matrix" },
                    { "id": "q2", "type": "singleline" }
                  ],
                  "invokes": [{ "behavior": "continue", "next_question_set_id": "s2" }] },
                { "id": "s2", "questions": [{ "id": "odd", "type": "ranking", "required": true }] }
            ]
        }));
        let mut survey = start(def);
        assert_eq!(survey.current_question().unwrap().id, "q1");
        assert_eq!(
            survey.advance(vec![]),
            Advance::NextQuestion { set_id: "s1".into(), question_index: 3 }
        );
        assert_eq!(survey.advance(vec![RawAnswer::text("done")]), Advance::ReadyToSubmit);
        assert_eq!(survey.visited(), &["s1", "s2"]);

        let answers = survey.final_answers();
        assert_eq!(answers.len(), 2);
        assert_eq!(answers["q1"], SerializedAnswerState::empty());
        assert!(!answers.contains_key("rank"));
        assert!(!answers.contains_key("odd"));
    }

    #[test]
    fn self_loop_reports_next_question_set() {
        let def = definition(json!({
            "question_sets": [
                { "id": "again", "questions": [{ "id": "q1", "type": "singleline", "required": true }],
                  "invokes": [
                    { "behavior": "continue", "next_question_set_id": "again",
                      "criteria": { "interactions/q1/current_answer/value": "more" } }
                  ] }
            ]
        }));
        let mut survey = start(def);
        assert_eq!(
            survey.advance(vec![RawAnswer::text("more")]),
            Advance::NextQuestionSet { set_id: "again".into() }
        );
        assert_eq!(survey.advance(vec![RawAnswer::text("stop")]), Advance::ReadyToSubmit);
    }

    #[test]
    fn empty_survey_is_rejected() {
        let err = BranchedSurvey::new(
            "i",
            definition(json!({ "question_sets": [] })),
            DataContext::new(),
            EventEmitter::default(),
            &SurveyConfig::default(),
        )
        .err()
        .unwrap();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn submit_requires_terminal_state() {
        let mut survey = start(branching());
        let err = survey.submit(&RecordingSubmitter::new()).await.unwrap_err();
        assert!(matches!(err, EngageError::NotReadyToSubmit { .. }));
    }

    #[tokio::test]
    async fn failed_submit_keeps_payload_for_retry() {
        let mut survey = start(branching());
        survey.advance(vec![RawAnswer::choice("no")]);
        survey.advance(vec![]);
        survey.advance(vec![]);

        let submitter = RecordingSubmitter::failing(1);
        assert!(survey.submit(&submitter).await.is_err());
        assert!(survey.is_ready_to_submit());
        let payload = survey.submit(&submitter).await.unwrap();
        assert_eq!(submitter.payloads(), vec![payload.clone()]);
        assert!(survey.is_submitted());
        assert!(matches!(
            survey.submit(&submitter).await.unwrap_err(),
            EngageError::AlreadySubmitted { .. }
        ));
    }

    #[tokio::test]
    async fn close_reports_partial_answers() {
        let emitter = EventEmitter::default();
        let mut rx = emitter.subscribe();
        let mut survey =
            BranchedSurvey::new("interaction-1", branching(), DataContext::new(), emitter, &SurveyConfig::default())
                .unwrap();
        survey.advance(vec![RawAnswer::choice("yes")]);
        survey.close();

        assert_eq!(rx.recv().await.unwrap().kind, SurveyEventKind::Launch);
        let cancel = rx.recv().await.unwrap();
        assert_eq!(cancel.kind, SurveyEventKind::CancelPartial);
        assert!(cancel.answers.unwrap().contains_key("q1"));
        assert_eq!(rx.recv().await.unwrap().kind, SurveyEventKind::Close);
    }

    #[tokio::test]
    async fn close_without_answers_is_cancel() {
        let emitter = EventEmitter::default();
        let mut rx = emitter.subscribe();
        let survey =
            BranchedSurvey::new("interaction-1", branching(), DataContext::new(), emitter, &SurveyConfig::default())
                .unwrap();
        survey.close();
        assert_eq!(rx.recv().await.unwrap().kind, SurveyEventKind::Launch);
        assert_eq!(rx.recv().await.unwrap().kind, SurveyEventKind::Cancel);
        assert_eq!(rx.recv().await.unwrap().kind, SurveyEventKind::Close);
    }
}
