//! Answer store and the per-type answer serializer.

use std::collections::HashMap;

use engage_types::{
    AnswerSet, AnswerState, AnswerValue, DataContext, RawAnswer, SerializedAnswer,
    SerializedAnswerState,
};
use serde_json::{json, Value};

use crate::question::{Question, QuestionKind};

// ---------------------------------------------------------------------------
// AnswerStore
// ---------------------------------------------------------------------------

/// Raw entries collected for one survey session, keyed by question id.
#[derive(Debug, Clone, Default)]
pub struct AnswerStore {
    entries: HashMap<String, Vec<RawAnswer>>,
}

impl AnswerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace whatever was collected for `question_id`.
    pub fn record(&mut self, question_id: impl Into<String>, entries: Vec<RawAnswer>) {
        self.entries.insert(question_id.into(), entries);
    }

    /// Forget the entry for `question_id`; it serializes as omitted again.
    pub fn reset(&mut self, question_id: &str) {
        self.entries.remove(question_id);
    }

    pub fn get(&self, question_id: &str) -> Option<&[RawAnswer]> {
        self.entries.get(question_id).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `true` when at least one question has a non-empty entry list.
    pub fn has_any_answer(&self) -> bool {
        self.entries.values().any(|entries| !entries.is_empty())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

// ---------------------------------------------------------------------------
// Serialization
// ---------------------------------------------------------------------------

/// Serialize the stored answers of `questions`.
///
/// Questions with no entry are omitted; callers backfill them as skipped at
/// submission time. Pure: the same inputs always produce the same output.
pub fn serialize<'a>(
    questions: impl IntoIterator<Item = &'a Question>,
    store: &AnswerStore,
) -> AnswerSet {
    let mut out = AnswerSet::new();
    for question in questions {
        let Some(entries) = store.get(&question.id) else {
            continue;
        };
        if let Some(state) = serialize_question(question, entries) {
            out.insert(question.id.clone(), state);
        }
    }
    out
}

/// Serialize one question's entries. `None` means "leave it out".
pub fn serialize_question(question: &Question, entries: &[RawAnswer]) -> Option<SerializedAnswerState> {
    if let QuestionKind::Unsupported { type_name } = &question.kind {
        tracing::warn!(question_id = %question.id, question_type = %type_name, "Omitting answer for unsupported question type");
        return None;
    }
    if entries.is_empty() {
        return Some(SerializedAnswerState::empty());
    }

    match &question.kind {
        QuestionKind::MultiSelect { .. } => Some(SerializedAnswerState::answered(
            entries.iter().map(choice_answer).collect(),
        )),
        QuestionKind::MultiChoice { .. } => Some(SerializedAnswerState::answered(vec![
            choice_answer(&entries[0]),
        ])),
        QuestionKind::SingleLine { .. } => {
            let text = match &entries[0].value {
                Some(AnswerValue::Text(s)) => s.clone(),
                Some(AnswerValue::Number(n)) => n.to_string(),
                None => String::new(),
            };
            if text.is_empty() {
                Some(SerializedAnswerState::empty())
            } else {
                Some(SerializedAnswerState::answered(vec![SerializedAnswer {
                    id: None,
                    value: Some(Value::String(text)),
                }]))
            }
        }
        QuestionKind::Nps { .. } | QuestionKind::Range { .. } => {
            match entries[0].value.as_ref().and_then(AnswerValue::as_integer) {
                Some(n) => Some(SerializedAnswerState::answered(vec![SerializedAnswer {
                    id: None,
                    value: Some(json!(n)),
                }])),
                None => {
                    tracing::warn!(question_id = %question.id, "Numeric answer could not be parsed; omitting");
                    None
                }
            }
        }
        QuestionKind::Unsupported { .. } => None,
    }
}

fn choice_answer(entry: &RawAnswer) -> SerializedAnswer {
    SerializedAnswer {
        id: entry.id.clone(),
        value: entry.other.clone().map(Value::String),
    }
}

/// Insert `{state: skipped}` for every question without an entry.
/// Unsupported question types stay out of the output.
pub fn backfill_skipped<'a>(questions: impl IntoIterator<Item = &'a Question>, answers: &mut AnswerSet) {
    for question in questions.into_iter().filter(|q| q.is_supported()) {
        answers
            .entry(question.id.clone())
            .or_insert_with(SerializedAnswerState::skipped);
    }
}

/// Additive merge; a repeated question id is overwritten by `update`.
pub fn merge_answers(aggregate: &mut AnswerSet, update: AnswerSet) {
    aggregate.extend(update);
}

// ---------------------------------------------------------------------------
// Criteria view of answers
// ---------------------------------------------------------------------------

/// Expose serialized answers to criteria under `interactions/<question_id>/`:
///
/// * `state`: `"answered"`, `"empty"` or `"skipped"`
/// * `current_answer/{id,value}`: the first answer
/// * `answers/id`, `answers/value`: arrays over every answer
///
/// Keys are `/`-separated paths, so a question id containing `/` cannot be
/// addressed by criteria. The `question_id_path` lint rule reports such ids.
pub fn answers_context(answers: &AnswerSet) -> DataContext {
    let mut context = DataContext::new();
    for (question_id, state) in answers {
        let base = format!("interactions/{question_id}");
        context.insert(&format!("{base}/state"), json!(state.state.as_str()));

        let values = match (&state.state, &state.value) {
            (AnswerState::Answered, Some(values)) if !values.is_empty() => values,
            _ => continue,
        };

        let first = &values[0];
        let mut current = serde_json::Map::new();
        if let Some(id) = &first.id {
            current.insert("id".into(), json!(id));
        }
        if let Some(value) = &first.value {
            current.insert("value".into(), value.clone());
        }
        context.insert(&format!("{base}/current_answer"), Value::Object(current));

        let ids: Vec<Value> = values.iter().filter_map(|a| a.id.clone().map(Value::String)).collect();
        let vals: Vec<Value> = values.iter().filter_map(|a| a.value.clone()).collect();
        if !ids.is_empty() {
            context.insert(&format!("{base}/answers/id"), Value::Array(ids));
        }
        if !vals.is_empty() {
            context.insert(&format!("{base}/answers/value"), Value::Array(vals));
        }
    }
    context
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(value: Value) -> Question {
        serde_json::from_value(value).unwrap()
    }

    fn questions() -> Vec<Question> {
        vec![
            question(json!({ "id": "choice", "type": "multichoice" })),
            question(json!({ "id": "select", "type": "multiselect" })),
            question(json!({ "id": "text", "type": "singleline" })),
            question(json!({ "id": "nps", "type": "nps", "min": 0, "max": 10 })),
            question(json!({ "id": "range", "type": "range" })),
            question(json!({ "id": "odd", "type": "ranking" })),
        ]
    }

    #[test]
    fn record_replaces_previous_entries() {
        let mut store = AnswerStore::new();
        store.record("select", vec![RawAnswer::choice("a"), RawAnswer::choice_with_other("b", "x")]);
        store.record("select", vec![RawAnswer::choice("c")]);
        assert_eq!(store.get("select").unwrap(), &[RawAnswer::choice("c")]);
        store.reset("select");
        assert!(store.get("select").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn absent_entries_are_omitted_and_empty_lists_are_empty() {
        let mut store = AnswerStore::new();
        store.record("choice", Vec::new());
        let out = serialize(&questions(), &store);
        assert_eq!(out.len(), 1);
        assert_eq!(out["choice"], SerializedAnswerState::empty());
        assert!(!store.has_any_answer());
    }

    #[test]
    fn multiselect_keeps_every_entry_and_write_in_text() {
        let mut store = AnswerStore::new();
        store.record("select", vec![RawAnswer::choice("a"), RawAnswer::choice_with_other("b", "purple")]);
        let out = serialize(&questions(), &store);
        assert_eq!(
            serde_json::to_value(&out["select"]).unwrap(),
            json!({ "state": "answered", "value": [{ "id": "a" }, { "id": "b", "value": "purple" }] })
        );
    }

    #[test]
    fn multichoice_keeps_first_entry_only() {
        let mut store = AnswerStore::new();
        store.record("choice", vec![RawAnswer::choice("a1"), RawAnswer::choice("a2")]);
        let out = serialize(&questions(), &store);
        assert_eq!(
            serde_json::to_value(&out["choice"]).unwrap(),
            json!({ "state": "answered", "value": [{ "id": "a1" }] })
        );
    }

    #[test]
    fn singleline_empty_string_is_empty_state() {
        let mut store = AnswerStore::new();
        store.record("text", vec![RawAnswer::text("")]);
        assert_eq!(serialize(&questions(), &store)["text"], SerializedAnswerState::empty());

        store.record("text", vec![RawAnswer::text("Great app")]);
        assert_eq!(
            serde_json::to_value(&serialize(&questions(), &store)["text"]).unwrap(),
            json!({ "state": "answered", "value": [{ "value": "Great app" }] })
        );
    }

    #[test]
    fn numeric_questions_parse_integers() {
        let mut store = AnswerStore::new();
        store.record("nps", vec![RawAnswer::text("9")]);
        store.record("range", vec![RawAnswer::number(3)]);
        let out = serialize(&questions(), &store);
        assert_eq!(out["nps"].value.as_ref().unwrap()[0].value, Some(json!(9)));
        assert_eq!(out["range"].value.as_ref().unwrap()[0].value, Some(json!(3)));

        store.record("nps", vec![RawAnswer::text("nine")]);
        assert!(!serialize(&questions(), &store).contains_key("nps"));
    }

    #[test]
    fn unsupported_types_are_omitted() {
        let mut store = AnswerStore::new();
        store.record("odd", vec![RawAnswer::text("1")]);
        assert!(serialize(&questions(), &store).is_empty());
        store.record("odd", Vec::new());
        assert!(serialize(&questions(), &store).is_empty());
    }

    #[test]
    fn serialization_is_idempotent_and_pure() {
        let mut store = AnswerStore::new();
        store.record("select", vec![RawAnswer::choice("a"), RawAnswer::choice("b")]);
        store.record("text", vec![RawAnswer::text("hi")]);
        store.record("nps", vec![RawAnswer::number(7)]);
        let qs = questions();
        let first = serialize(&qs, &store);
        let second = serialize(&qs, &store);
        assert_eq!(first, second);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn backfill_marks_missing_questions_skipped() {
        let mut answers = AnswerSet::new();
        answers.insert("text".into(), SerializedAnswerState::empty());
        backfill_skipped(&questions(), &mut answers);
        assert_eq!(answers.len(), 5);
        assert_eq!(answers["text"], SerializedAnswerState::empty());
        assert_eq!(answers["choice"], SerializedAnswerState::skipped());
        assert!(!answers.contains_key("odd"));
    }

    #[test]
    fn merge_is_additive_with_last_write_wins() {
        let mut aggregate = AnswerSet::new();
        aggregate.insert("a".into(), SerializedAnswerState::empty());
        aggregate.insert("b".into(), SerializedAnswerState::empty());
        let mut update = AnswerSet::new();
        update.insert("b".into(), SerializedAnswerState::skipped());
        update.insert("c".into(), SerializedAnswerState::empty());
        merge_answers(&mut aggregate, update);
        assert_eq!(aggregate.len(), 3);
        assert_eq!(aggregate["b"], SerializedAnswerState::skipped());
    }

    #[test]
    fn answers_context_exposes_current_and_all_answers() {
        let mut store = AnswerStore::new();
        store.record("select", vec![RawAnswer::choice("a"), RawAnswer::choice_with_other("b", "x")]);
        store.record("text", vec![RawAnswer::text("")]);
        let ctx = answers_context(&serialize(&questions(), &store));

        assert_eq!(ctx.resolve("interactions/select/state"), Some(&json!("answered")));
        assert_eq!(ctx.resolve("interactions/select/current_answer/id"), Some(&json!("a")));
        assert_eq!(ctx.resolve("interactions/select/answers/id"), Some(&json!(["a", "b"])));
        assert_eq!(ctx.resolve("interactions/select/answers/value"), Some(&json!(["x"])));
        assert_eq!(ctx.resolve("interactions/text/state"), Some(&json!("empty")));
        assert_eq!(ctx.resolve("interactions/text/current_answer"), None);
    }
}
