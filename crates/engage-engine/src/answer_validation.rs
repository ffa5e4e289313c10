//! Question response validation.

use engage_types::{AnswerValue, RawAnswer};

use crate::question::{Question, QuestionKind};

/// An entry counts as an answer when its trimmed text is non-empty, its number
/// is non-zero, or it names a choice. Numeric scales also accept a zero score;
/// see [`is_valid`].
pub fn entry_has_answer(entry: &RawAnswer) -> bool {
    if entry.id.is_some() {
        return true;
    }
    match &entry.value {
        Some(AnswerValue::Text(s)) => !s.trim().is_empty(),
        Some(AnswerValue::Number(n)) => *n != 0,
        None => false,
    }
}

/// Decide whether `entries` is an acceptable response to `question`.
pub fn is_valid(question: &Question, entries: &[RawAnswer]) -> bool {
    let score = match &question.kind {
        QuestionKind::Nps { .. } | QuestionKind::Range { .. } => entries
            .iter()
            .find_map(|e| e.value.as_ref().and_then(AnswerValue::as_integer)),
        _ => None,
    };
    // Any integer is a score for a numeric scale, zero included.
    let has_answer = score.is_some() || entries.iter().any(entry_has_answer);
    if !question.required && !has_answer {
        return true;
    }

    // A write-in choice was picked but left blank.
    if entries
        .iter()
        .any(|e| e.other.as_ref().is_some_and(|o| o.trim().is_empty()))
    {
        return false;
    }

    let required_ok = !question.required || has_answer;

    match &question.kind {
        QuestionKind::MultiSelect {
            min_selections,
            max_selections,
            ..
        } => {
            let count = entries.len();
            let min = min_selections.unwrap_or(0);
            let max = max_selections.unwrap_or(usize::MAX);
            required_ok && (min..=max).contains(&count)
        }
        QuestionKind::Nps { min, max, .. } | QuestionKind::Range { min, max, .. } => {
            let min = min.unwrap_or(1);
            let max = max.unwrap_or(i64::MAX);
            required_ok && score.is_some_and(|v| (min..=max).contains(&v))
        }
        QuestionKind::MultiChoice { .. }
        | QuestionKind::SingleLine { .. }
        | QuestionKind::Unsupported { .. } => required_ok,
    }
}
