//! Survey definition model: questions, question sets, and the invokes that
//! connect them.

use serde::Deserialize;

use crate::criteria::Criteria;

/// Fallback message shown when a question has no `error_message` of its own.
pub const DEFAULT_ERROR_MESSAGE: &str = "There was a problem with your answer";

// ---------------------------------------------------------------------------
// Questions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChoiceType {
    #[default]
    SelectOption,
    /// Write-in choice: selecting it asks for free text.
    SelectOther,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AnswerChoice {
    pub id: String,
    #[serde(default)]
    pub value: String,
    #[serde(rename = "type", default)]
    pub choice_type: ChoiceType,
    #[serde(default)]
    pub hint: Option<String>,
}

impl AnswerChoice {
    pub fn is_other(&self) -> bool {
        self.choice_type == ChoiceType::SelectOther
    }
}

/// Variant-specific part of a question.
#[derive(Debug, Clone, PartialEq)]
pub enum QuestionKind {
    MultiChoice {
        answer_choices: Vec<AnswerChoice>,
    },
    MultiSelect {
        answer_choices: Vec<AnswerChoice>,
        min_selections: Option<usize>,
        max_selections: Option<usize>,
    },
    SingleLine {
        multiline: bool,
        freeform_hint: Option<String>,
    },
    Nps {
        min: Option<i64>,
        max: Option<i64>,
        min_label: Option<String>,
        max_label: Option<String>,
    },
    Range {
        min: Option<i64>,
        max: Option<i64>,
        min_label: Option<String>,
        max_label: Option<String>,
    },
    /// A `type` this engine does not know. Kept so it can be reported.
    Unsupported {
        type_name: String,
    },
}

impl QuestionKind {
    pub fn type_name(&self) -> &str {
        match self {
            QuestionKind::MultiChoice { .. } => "multichoice",
            QuestionKind::MultiSelect { .. } => "multiselect",
            QuestionKind::SingleLine { .. } => "singleline",
            QuestionKind::Nps { .. } => "nps",
            QuestionKind::Range { .. } => "range",
            QuestionKind::Unsupported { type_name } => type_name,
        }
    }

    /// `false` for types this engine cannot present or serialize.
    pub fn is_supported(&self) -> bool {
        !matches!(self, QuestionKind::Unsupported { .. })
    }

    pub fn answer_choices(&self) -> &[AnswerChoice] {
        match self {
            QuestionKind::MultiChoice { answer_choices }
            | QuestionKind::MultiSelect { answer_choices, .. } => answer_choices,
            _ => &[],
        }
    }

    /// `(min, max)` for bounded-value questions.
    pub fn value_bounds(&self) -> Option<(Option<i64>, Option<i64>)> {
        match self {
            QuestionKind::Nps { min, max, .. } | QuestionKind::Range { min, max, .. } => {
                Some((*min, *max))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "QuestionRecord")]
pub struct Question {
    pub id: String,
    pub required: bool,
    pub error_message: Option<String>,
    /// Prompt text shown to the user.
    pub value: String,
    pub instructions: Option<String>,
    pub kind: QuestionKind,
}

impl Question {
    pub fn error_message(&self) -> &str {
        self.error_message.as_deref().unwrap_or(DEFAULT_ERROR_MESSAGE)
    }

    pub fn type_name(&self) -> &str {
        self.kind.type_name()
    }

    pub fn is_supported(&self) -> bool {
        self.kind.is_supported()
    }
}

/// Flat manifest shape of a question, discriminated by `type`.
#[derive(Deserialize)]
struct QuestionRecord {
    id: String,
    #[serde(rename = "type")]
    question_type: String,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    value: String,
    #[serde(default)]
    instructions: Option<String>,
    #[serde(default)]
    answer_choices: Vec<AnswerChoice>,
    #[serde(default)]
    min_selections: Option<usize>,
    #[serde(default)]
    max_selections: Option<usize>,
    #[serde(default)]
    multiline: bool,
    #[serde(default)]
    freeform_hint: Option<String>,
    #[serde(default)]
    min: Option<i64>,
    #[serde(default)]
    max: Option<i64>,
    #[serde(default)]
    min_label: Option<String>,
    #[serde(default)]
    max_label: Option<String>,
}

impl From<QuestionRecord> for Question {
    fn from(r: QuestionRecord) -> Self {
        let kind = match r.question_type.as_str() {
            "multichoice" => QuestionKind::MultiChoice {
                answer_choices: r.answer_choices,
            },
            "multiselect" => QuestionKind::MultiSelect {
                answer_choices: r.answer_choices,
                min_selections: r.min_selections,
                max_selections: r.max_selections,
            },
            "singleline" => QuestionKind::SingleLine {
                multiline: r.multiline,
                freeform_hint: r.freeform_hint,
            },
            "nps" => QuestionKind::Nps {
                min: r.min,
                max: r.max,
                min_label: r.min_label,
                max_label: r.max_label,
            },
            "range" => QuestionKind::Range {
                min: r.min,
                max: r.max,
                min_label: r.min_label,
                max_label: r.max_label,
            },
            other => {
                tracing::warn!(question_id = %r.id, question_type = %other, "Unsupported question type");
                QuestionKind::Unsupported {
                    type_name: other.to_string(),
                }
            }
        };
        Question {
            id: r.id,
            required: r.required,
            error_message: r.error_message,
            value: r.value,
            instructions: r.instructions,
            kind,
        }
    }
}

// ---------------------------------------------------------------------------
// Question sets and invokes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvokeBehavior {
    Continue,
    End,
}

/// Guarded edge out of a question set.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Invoke {
    #[serde(default)]
    pub criteria: Criteria,
    pub behavior: InvokeBehavior,
    #[serde(default)]
    pub next_question_set_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QuestionSet {
    pub id: String,
    #[serde(default)]
    pub button_text: Option<String>,
    #[serde(default)]
    pub questions: Vec<Question>,
    /// `None` marks the end of the survey.
    #[serde(default)]
    pub invokes: Option<Vec<Invoke>>,
}

impl QuestionSet {
    pub fn is_terminal(&self) -> bool {
        self.invokes.as_ref().map_or(true, |invokes| invokes.is_empty())
    }

    /// Ids of the sets reachable through `continue` invokes, in manifest order.
    pub fn continue_targets(&self) -> impl Iterator<Item = &str> {
        self.invokes
            .iter()
            .flatten()
            .filter(|inv| inv.behavior == InvokeBehavior::Continue)
            .filter_map(|inv| inv.next_question_set_id.as_deref())
    }
}

// ---------------------------------------------------------------------------
// Survey definition
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    /// One question at a time, following invokes.
    #[default]
    Paged,
    /// Every question at once, single submission.
    List,
}

/// Configuration of a `Survey` interaction.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SurveyDefinition {
    /// Filled from the owning interaction when absent from the configuration.
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub question_sets: Vec<QuestionSet>,
    #[serde(default)]
    pub render_as: RenderMode,
    #[serde(default)]
    pub submit_text: Option<String>,
    #[serde(default)]
    pub success_message: Option<String>,
    #[serde(default)]
    pub show_success_message: bool,
}

impl SurveyDefinition {
    /// Every question of every set, in manifest order.
    pub fn all_questions(&self) -> impl Iterator<Item = &Question> {
        self.question_sets.iter().flat_map(|set| set.questions.iter())
    }

    /// Questions that are asked and answered. Unsupported types are left out.
    pub fn answerable_questions(&self) -> impl Iterator<Item = &Question> {
        self.all_questions().filter(|q| q.is_supported())
    }

    pub fn question(&self, id: &str) -> Option<&Question> {
        self.all_questions().find(|q| q.id == id)
    }
}
