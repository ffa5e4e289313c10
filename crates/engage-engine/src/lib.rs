//! Targeting and branching survey engine.
//!
//! This crate implements the core Engage runtime: criteria evaluation over a
//! data context, first-match event targeting, answer serialization and
//! validation, the branching and list survey state machines, submission, and
//! the built-in manifest lint rules.

pub mod answer_validation;
pub mod answers;
pub mod criteria;
pub mod events;
pub mod graph;
pub mod list_survey;
pub mod manifest;
pub mod operators;
pub mod question;
pub mod responder;
pub mod retry;
pub mod runner;
pub mod submission;
pub mod survey;
pub mod targeting;
pub mod validation;

pub use answer_validation::{entry_has_answer, is_valid};
pub use answers::{answers_context, backfill_skipped, merge_answers, serialize, serialize_question, AnswerStore};
pub use criteria::{evaluate, evaluate_with, parse_criteria, Criteria};
pub use events::{EventEmitter, SurveyEvent, SurveyEventKind};
pub use graph::SurveyGraph;
pub use list_survey::{ListSubmission, ListSurvey};
pub use manifest::{Interaction, Manifest, NoteAction};
pub use operators::{default_operators, shared_operators, ComparisonOperator, OperatorRegistry};
pub use question::{
    AnswerChoice, ChoiceType, Invoke, InvokeBehavior, Question, QuestionKind, QuestionSet,
    RenderMode, SurveyDefinition,
};
pub use responder::{ConsoleResponder, Responder, ScriptedResponder, SkipResponder};
pub use retry::SubmitRetry;
pub use runner::{run_list_survey, run_survey};
pub use submission::{HttpSurveySubmitter, RecordingSubmitter, SurveyPayload, SurveyResponse, SurveySubmitter};
pub use survey::{next_state, select_invoke, Advance, BranchedSurvey, SurveyConfig, SurveyState};
pub use targeting::{resolve, resolve_candidates, Invocation, TargetTable};
pub use validation::{find_cycles, validate, validate_or_raise, Diagnostic, LintRule, Severity};
