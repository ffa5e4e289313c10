//! Responder trait and built-in implementations for collecting answers.

use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::sync::Mutex;

use async_trait::async_trait;
use engage_types::{EngageError, RawAnswer, Result};

use crate::question::{Question, QuestionKind};

#[async_trait]
pub trait Responder: Send + Sync {
    /// Collect the entries for `question` from its input controls.
    async fn respond(&self, question: &Question) -> Result<Vec<RawAnswer>>;
}

// ---------------------------------------------------------------------------
// SkipResponder
// ---------------------------------------------------------------------------

/// Leaves every question blank. Optional questions pass as empty; required
/// ones are rejected.
pub struct SkipResponder;

#[async_trait]
impl Responder for SkipResponder {
    async fn respond(&self, question: &Question) -> Result<Vec<RawAnswer>> {
        tracing::debug!(question_id = %question.id, "Skipping question");
        Ok(Vec::new())
    }
}

// ---------------------------------------------------------------------------
// ScriptedResponder
// ---------------------------------------------------------------------------

/// Plays back prepared answers per question id and records what was asked.
/// A question with no (remaining) script gets an empty response.
pub struct ScriptedResponder {
    scripts: Mutex<HashMap<String, VecDeque<Vec<RawAnswer>>>>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedResponder {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            asked: Mutex::new(Vec::new()),
        }
    }

    /// Queue one response for `question_id`. Repeated calls queue retries.
    pub fn with(self, question_id: impl Into<String>, entries: Vec<RawAnswer>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(question_id.into())
            .or_default()
            .push_back(entries);
        self
    }

    /// Build from `{"question_id": [entries...], ...}`.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        let parsed: HashMap<String, Vec<RawAnswer>> = serde_json::from_value(value)?;
        Ok(parsed
            .into_iter()
            .fold(Self::new(), |responder, (id, entries)| responder.with(id, entries)))
    }

    /// Question ids in the order they were asked.
    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().unwrap().clone()
    }
}

impl Default for ScriptedResponder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Responder for ScriptedResponder {
    async fn respond(&self, question: &Question) -> Result<Vec<RawAnswer>> {
        self.asked.lock().unwrap().push(question.id.clone());
        let entries = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&question.id)
            .and_then(VecDeque::pop_front)
            .unwrap_or_default();
        Ok(entries)
    }
}

// ---------------------------------------------------------------------------
// ConsoleResponder
// ---------------------------------------------------------------------------

/// Prompts on stdout and reads one line from stdin per question.
///
/// Choice questions take comma-separated choice numbers; a write-in choice is
/// entered as `n:text`. Numeric and text questions take the raw line.
pub struct ConsoleResponder;

#[async_trait]
impl Responder for ConsoleResponder {
    async fn respond(&self, question: &Question) -> Result<Vec<RawAnswer>> {
        println!("\n{}", question.value);
        if let Some(instructions) = &question.instructions {
            println!("({instructions})");
        }
        match &question.kind {
            QuestionKind::MultiChoice { answer_choices } | QuestionKind::MultiSelect { answer_choices, .. } => {
                for (i, choice) in answer_choices.iter().enumerate() {
                    let marker = if choice.is_other() { " (write-in)" } else { "" };
                    println!("  [{}] {}{}", i + 1, choice.value, marker);
                }
            }
            QuestionKind::Nps { min, max, .. } | QuestionKind::Range { min, max, .. } => {
                println!("  {} - {}", min.unwrap_or(1), max.map_or("…".to_string(), |m| m.to_string()));
            }
            QuestionKind::SingleLine { freeform_hint, .. } => {
                if let Some(hint) = freeform_hint {
                    println!("  {hint}");
                }
            }
            QuestionKind::Unsupported { .. } => {}
        }
        print!("> ");
        std::io::stdout().flush().map_err(EngageError::Io)?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input).map_err(EngageError::Io)?;
        parse_console_input(question, input.trim())
    }
}

/// Turn one line of console input into answer entries for `question`.
pub fn parse_console_input(question: &Question, input: &str) -> Result<Vec<RawAnswer>> {
    if input.is_empty() {
        return Ok(Vec::new());
    }
    match &question.kind {
        QuestionKind::MultiChoice { answer_choices } | QuestionKind::MultiSelect { answer_choices, .. } => {
            let mut entries = Vec::new();
            for part in input.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                let (index, other) = match part.split_once(':') {
                    Some((index, text)) => (index.trim(), Some(text.trim().to_string())),
                    None => (part, None),
                };
                let choice = index
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| i.checked_sub(1))
                    .and_then(|i| answer_choices.get(i))
                    .ok_or_else(|| EngageError::Responder(format!("no choice numbered '{index}'")))?;
                entries.push(match (choice.is_other(), other) {
                    (true, other) => RawAnswer::choice_with_other(&choice.id, other.unwrap_or_default()),
                    (false, _) => RawAnswer::choice(&choice.id),
                });
            }
            Ok(entries)
        }
        QuestionKind::Nps { .. }
        | QuestionKind::Range { .. }
        | QuestionKind::SingleLine { .. }
        | QuestionKind::Unsupported { .. } => Ok(vec![RawAnswer::text(input)]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn choice_question() -> Question {
        serde_json::from_value(json!({
            "id": "q1", "type": "multiselect", "value": "Pick",
            "answer_choices": [
                { "id": "c1", "value": "Red" },
                { "id": "c2", "value": "Other", "type": "select_other" }
            ]
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn scripted_plays_back_in_order() {
        let responder = ScriptedResponder::new()
            .with("q1", vec![])
            .with("q1", vec![RawAnswer::choice("c1")]);
        let q = choice_question();
        assert!(responder.respond(&q).await.unwrap().is_empty());
        assert_eq!(responder.respond(&q).await.unwrap(), vec![RawAnswer::choice("c1")]);
        assert!(responder.respond(&q).await.unwrap().is_empty());
        assert_eq!(responder.asked(), vec!["q1", "q1", "q1"]);
    }

    #[tokio::test]
    async fn scripted_from_json() {
        let responder = ScriptedResponder::from_json(json!({
            "q1": [{ "id": "c2", "other": "Teal" }]
        }))
        .unwrap();
        assert_eq!(
            responder.respond(&choice_question()).await.unwrap(),
            vec![RawAnswer::choice_with_other("c2", "Teal")]
        );
    }

    #[test]
    fn console_choice_parsing() {
        let q = choice_question();
        assert_eq!(
            parse_console_input(&q, "1, 2:Teal").unwrap(),
            vec![RawAnswer::choice("c1"), RawAnswer::choice_with_other("c2", "Teal")]
        );
        assert_eq!(
            parse_console_input(&q, "2").unwrap(),
            vec![RawAnswer::choice_with_other("c2", "")]
        );
        assert!(parse_console_input(&q, "3").is_err());
        assert!(parse_console_input(&q, "0").is_err());
        assert!(parse_console_input(&q, "").unwrap().is_empty());
    }

    #[tokio::test]
    async fn skip_responder_answers_nothing() {
        assert!(SkipResponder.respond(&choice_question()).await.unwrap().is_empty());
    }

    #[test]
    fn console_text_and_numbers_pass_through() {
        let q: Question = serde_json::from_value(json!({ "id": "n", "type": "nps" })).unwrap();
        assert_eq!(parse_console_input(&q, "8").unwrap(), vec![RawAnswer::text("8")]);
    }
}
