//! Survey graph: question sets indexed by id, with the first set as entry.

use std::collections::HashMap;
use std::sync::Arc;

use engage_types::{EngageError, Result};

use crate::question::{QuestionSet, SurveyDefinition};

#[derive(Debug, Clone)]
pub struct SurveyGraph {
    definition: Arc<SurveyDefinition>,
    /// Maps question set id to its position in `definition.question_sets`.
    index: HashMap<String, usize>,
}

impl SurveyGraph {
    /// Build the graph. Fails when the survey has no question sets.
    pub fn new(definition: Arc<SurveyDefinition>) -> Result<Self> {
        if definition.question_sets.is_empty() {
            return Err(EngageError::Configuration(format!(
                "survey '{}' has no question sets",
                definition.id
            )));
        }

        let mut index = HashMap::with_capacity(definition.question_sets.len());
        for (position, set) in definition.question_sets.iter().enumerate() {
            if index.contains_key(&set.id) {
                tracing::warn!(survey = %definition.id, set_id = %set.id, "Duplicate question set id; keeping the first");
                continue;
            }
            index.insert(set.id.clone(), position);
        }

        Ok(Self { definition, index })
    }

    pub fn definition(&self) -> &Arc<SurveyDefinition> {
        &self.definition
    }

    pub fn survey_id(&self) -> &str {
        &self.definition.id
    }

    pub fn entry(&self) -> &QuestionSet {
        &self.definition.question_sets[0]
    }

    pub fn set(&self, id: &str) -> Option<&QuestionSet> {
        self.index
            .get(id)
            .map(|&position| &self.definition.question_sets[position])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn sets(&self) -> impl Iterator<Item = &QuestionSet> {
        self.definition.question_sets.iter()
    }

    /// Sets reachable in one step from `id` through `continue` invokes whose
    /// target exists.
    pub fn successors(&self, id: &str) -> Vec<&str> {
        self.set(id)
            .map(|set| set.continue_targets().filter(|t| self.contains(t)).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn definition(value: serde_json::Value) -> Arc<SurveyDefinition> {
        Arc::new(serde_json::from_value(value).unwrap())
    }

    #[test]
    fn entry_is_first_set() {
        let graph = SurveyGraph::new(definition(json!({
            "id": "survey",
            "question_sets": [
                { "id": "s1", "questions": [],
                  "invokes": [{ "behavior": "continue", "next_question_set_id": "s2" }] },
                { "id": "s2", "questions": [] }
            ]
        })))
        .unwrap();
        assert_eq!(graph.entry().id, "s1");
        assert!(graph.contains("s2"));
        assert_eq!(graph.successors("s1"), vec!["s2"]);
        assert!(graph.successors("s2").is_empty());
        assert!(graph.successors("missing").is_empty());
    }

    #[test]
    fn empty_survey_is_configuration_error() {
        let err = SurveyGraph::new(definition(json!({ "id": "empty", "question_sets": [] }))).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("no question sets"));
    }

    #[test]
    fn unresolved_targets_are_not_successors() {
        let graph = SurveyGraph::new(definition(json!({
            "question_sets": [
                { "id": "s1", "questions": [],
                  "invokes": [{ "behavior": "continue", "next_question_set_id": "nowhere" }] }
            ]
        })))
        .unwrap();
        assert!(graph.successors("s1").is_empty());
    }

    #[test]
    fn duplicate_set_ids_keep_first() {
        let graph = SurveyGraph::new(definition(json!({
            "question_sets": [
                { "id": "s1", "button_text": "first", "questions": [] },
                { "id": "s1", "button_text": "second", "questions": [] }
            ]
        })))
        .unwrap();
        assert_eq!(graph.set("s1").unwrap().button_text.as_deref(), Some("first"));
    }
}
