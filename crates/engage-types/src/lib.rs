//! Shared types, errors, data context, and answers for the Engage engine.
//!
//! This crate provides the foundational types used across all other Engage crates:
//! - `EngageError`: unified error taxonomy
//! - `DataContext`: read-only JSON document that criteria are evaluated against
//! - `RawAnswer`: answer entries collected from a question's input controls
//! - `SerializedAnswerState`: canonical wire representation of an answer

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Unified error type for all Engage subsystems.
#[derive(Debug, thiserror::Error)]
pub enum EngageError {
    // === Manifest Errors ===
    #[error("Manifest configuration error: {0}")]
    Configuration(String),

    #[error("Manifest validation failed: {0}")]
    ManifestValidation(String),

    #[error("Interaction '{0}' not found in manifest")]
    UnknownInteraction(String),

    #[error("Interaction '{id}' has type {actual}, expected {expected}")]
    WrongInteractionType {
        id: String,
        expected: String,
        actual: String,
    },

    // === Survey Errors ===
    #[error("Survey '{survey}' is not ready to submit")]
    NotReadyToSubmit { survey: String },

    #[error("Survey '{survey}' was already submitted")]
    AlreadySubmitted { survey: String },

    #[error("Question '{question}' was still invalid after {attempts} attempts")]
    AttemptsExhausted { question: String, attempts: usize },

    #[error("Responder error: {0}")]
    Responder(String),

    // === Submission Errors ===
    #[error("Survey submission failed with HTTP {status}: {message}")]
    Submission {
        status: u16,
        message: String,
        retryable: bool,
    },

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl EngageError {
    /// Returns `true` if the error is transient and the operation may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngageError::Submission { retryable: true, .. })
    }

    /// Returns `true` for manifest problems that no amount of user input can fix.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            EngageError::Configuration(_)
                | EngageError::ManifestValidation(_)
                | EngageError::UnknownInteraction(_)
                | EngageError::WrongInteractionType { .. }
        )
    }

    /// HTTP status reported by the submission endpoint, if any.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            EngageError::Submission { status, .. } if *status != 0 => Some(*status),
            _ => None,
        }
    }
}

/// A convenience alias for `Result<T, EngageError>`.
pub type Result<T> = std::result::Result<T, EngageError>;

// ---------------------------------------------------------------------------
// DataContext
// ---------------------------------------------------------------------------

/// Split a criteria path into segments.
///
/// Paths containing a `/` are split on `/`; all others are split on `.`.
/// Empty segments (leading or doubled separators) are dropped.
pub fn split_path(path: &str) -> Vec<&str> {
    let separator = if path.contains('/') { '/' } else { '.' };
    path.split(separator).filter(|s| !s.is_empty()).collect()
}

/// JSON document holding device, person, count, and answer data.
///
/// Evaluation only ever borrows a `DataContext`; the mutating helpers exist to
/// build one before it is handed to the evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataContext {
    root: Value,
}

impl DataContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self {
            root: Value::Object(Map::new()),
        }
    }

    /// Wrap an existing JSON document. Non-object documents are replaced by an
    /// empty object.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(_) => Self { root: value },
            other => {
                tracing::warn!(kind = %json_type_name(&other), "Data context must be a JSON object; using empty context");
                Self::new()
            }
        }
    }

    /// Look up a path. JSON `null` resolves to `None`, same as a missing key.
    pub fn resolve(&self, path: &str) -> Option<&Value> {
        let mut current = &self.root;
        for segment in split_path(path) {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        if current.is_null() {
            None
        } else {
            Some(current)
        }
    }

    /// Insert or overwrite the value at `path`, creating intermediate objects.
    pub fn insert(&mut self, path: &str, value: Value) {
        let segments = split_path(path);
        let Some((last, parents)) = segments.split_last() else {
            return;
        };
        let mut current = &mut self.root;
        for segment in parents {
            current = ensure_object(current)
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        ensure_object(current).insert(last.to_string(), value);
    }

    /// Builder-style [`insert`](DataContext::insert).
    pub fn with(mut self, path: &str, value: Value) -> Self {
        self.insert(path, value);
        self
    }

    /// Return a new context with `other` deep-merged over this one.
    pub fn overlay(&self, other: &DataContext) -> DataContext {
        let mut root = self.root.clone();
        merge_values(&mut root, &other.root);
        DataContext { root }
    }

    pub fn as_value(&self) -> &Value {
        &self.root
    }
}

impl Default for DataContext {
    fn default() -> Self {
        Self::new()
    }
}

fn ensure_object(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(map) => map,
        _ => unreachable!("value was just replaced by an object"),
    }
}

fn merge_values(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                match base_map.get_mut(key) {
                    Some(existing) => merge_values(existing, patch_value),
                    None => {
                        base_map.insert(key.clone(), patch_value.clone());
                    }
                }
            }
        }
        (base, patch) => *base = patch.clone(),
    }
}

/// Human-readable JSON type name, used in log lines and diagnostics.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ---------------------------------------------------------------------------
// RawAnswer
// ---------------------------------------------------------------------------

/// Free-form value of an answer entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Number(i64),
    Text(String),
}

impl AnswerValue {
    /// Integer view: numbers as-is, text parsed after trimming.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            AnswerValue::Number(n) => Some(*n),
            AnswerValue::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// One collected entry for a question. Choice questions set `id` (and `other`
/// for write-in choices); text and numeric questions set `value`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawAnswer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<AnswerValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other: Option<String>,
}

impl RawAnswer {
    /// A selected answer choice.
    pub fn choice(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    /// A selected write-in choice together with its typed text.
    pub fn choice_with_other(id: impl Into<String>, other: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            other: Some(other.into()),
            ..Self::default()
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            value: Some(AnswerValue::Text(text.into())),
            ..Self::default()
        }
    }

    pub fn number(n: i64) -> Self {
        Self {
            value: Some(AnswerValue::Number(n)),
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// SerializedAnswerState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerState {
    Answered,
    Empty,
    Skipped,
}

impl AnswerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerState::Answered => "answered",
            AnswerState::Empty => "empty",
            AnswerState::Skipped => "skipped",
        }
    }
}

/// One serialized answer: `{id}` for choices, `{id, value}` for write-ins,
/// `{value}` for text and numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedAnswer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedAnswerState {
    pub state: AnswerState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Vec<SerializedAnswer>>,
}

impl SerializedAnswerState {
    pub fn answered(value: Vec<SerializedAnswer>) -> Self {
        Self {
            state: AnswerState::Answered,
            value: Some(value),
        }
    }

    pub fn empty() -> Self {
        Self {
            state: AnswerState::Empty,
            value: None,
        }
    }

    pub fn skipped() -> Self {
        Self {
            state: AnswerState::Skipped,
            value: None,
        }
    }
}

/// Question id -> serialized answer state. Ordered so output is stable.
pub type AnswerSet = BTreeMap<String, SerializedAnswerState>;
