//! Manifest validation: lint rules and diagnostics.
//!
//! Provides built-in rules that check the targets table, note actions, and
//! the question set graph of every survey in a [`Manifest`]. Call [`validate`]
//! for advisory diagnostics or [`validate_or_raise`] to fail on any
//! `Error`-severity issue.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use engage_types::{EngageError, Result};

use crate::criteria::Criteria;
use crate::graph::SurveyGraph;
use crate::manifest::{Manifest, NoteAction, TEXT_MODAL_TYPE};
use crate::operators::shared_operators;
use crate::question::{InvokeBehavior, QuestionKind, SurveyDefinition};
use crate::targeting::Invocation;

// ---------------------------------------------------------------------------
// Diagnostic types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub rule: String,
    pub severity: Severity,
    pub message: String,
    pub interaction_id: Option<String>,
    /// Question set or question the problem is attached to.
    pub location: Option<String>,
    /// Transition between two question sets.
    pub edge: Option<(String, String)>,
    pub fix: Option<String>,
}

impl Diagnostic {
    fn new(rule: &str, severity: Severity, message: String) -> Self {
        Self {
            rule: rule.into(),
            severity,
            message,
            interaction_id: None,
            location: None,
            edge: None,
            fix: None,
        }
    }

    fn interaction(mut self, id: &str) -> Self {
        self.interaction_id = Some(id.into());
        self
    }

    fn at(mut self, location: &str) -> Self {
        self.location = Some(location.into());
        self
    }

    fn edge(mut self, from: &str, to: &str) -> Self {
        self.edge = Some((from.into(), to.into()));
        self
    }

    fn fix(mut self, fix: impl Into<String>) -> Self {
        self.fix = Some(fix.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }
}

// ---------------------------------------------------------------------------
// Lint input
// ---------------------------------------------------------------------------

/// A survey interaction whose configuration parsed.
pub struct SurveyEntry {
    pub interaction_id: String,
    pub definition: Arc<SurveyDefinition>,
    /// `None` when the survey has no question sets.
    pub graph: Option<SurveyGraph>,
}

/// The manifest with its surveys and note actions parsed once for all rules.
pub struct LintContext<'a> {
    pub manifest: &'a Manifest,
    pub surveys: Vec<SurveyEntry>,
    pub notes: Vec<(String, Vec<NoteAction>)>,
    /// Interaction id and parse error for configurations that did not parse.
    pub unparsed: Vec<(String, String)>,
}

impl<'a> LintContext<'a> {
    pub fn new(manifest: &'a Manifest) -> Self {
        let mut surveys = Vec::new();
        let mut notes = Vec::new();
        let mut unparsed = Vec::new();
        for interaction in &manifest.interactions {
            if interaction.is_survey() {
                match interaction.survey_definition() {
                    Ok(definition) => {
                        let definition = Arc::new(definition);
                        surveys.push(SurveyEntry {
                            interaction_id: interaction.id.clone(),
                            graph: SurveyGraph::new(Arc::clone(&definition)).ok(),
                            definition,
                        });
                    }
                    Err(e) => unparsed.push((interaction.id.clone(), e.to_string())),
                }
            } else if interaction.interaction_type == TEXT_MODAL_TYPE {
                match interaction.note_actions() {
                    Ok(actions) => notes.push((interaction.id.clone(), actions)),
                    Err(e) => unparsed.push((interaction.id.clone(), e.to_string())),
                }
            }
        }
        Self {
            manifest,
            surveys,
            notes,
            unparsed,
        }
    }

    /// Every invocation in the manifest, labelled with where it came from:
    /// event targets in event-name order, then note action invokes.
    fn invocations(&self) -> Vec<(String, &Invocation)> {
        let mut out = Vec::new();
        let mut events: Vec<_> = self.manifest.targets.iter().collect();
        events.sort_by(|a, b| a.0.cmp(b.0));
        for (event, invocations) in events {
            out.extend(invocations.iter().map(|inv| (format!("target '{event}'"), inv)));
        }
        for (note_id, actions) in &self.notes {
            for action in actions {
                out.extend(
                    action
                        .invokes
                        .iter()
                        .map(|inv| (format!("note '{note_id}' action '{}'", action.id), inv)),
                );
            }
        }
        out
    }
}

// ---------------------------------------------------------------------------
// LintRule trait
// ---------------------------------------------------------------------------

pub trait LintRule: Send + Sync {
    fn name(&self) -> &str;
    fn apply(&self, context: &LintContext<'_>) -> Vec<Diagnostic>;
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

struct InteractionParsesRule;
impl LintRule for InteractionParsesRule {
    fn name(&self) -> &str { "interaction_configuration" }
    fn apply(&self, context: &LintContext<'_>) -> Vec<Diagnostic> {
        context
            .unparsed
            .iter()
            .map(|(id, error)| {
                Diagnostic::new(self.name(), Severity::Error, format!("Interaction '{id}' has an unreadable configuration: {error}"))
                    .interaction(id)
            })
            .collect()
    }
}

struct SurveyHasQuestionSetsRule;
impl LintRule for SurveyHasQuestionSetsRule {
    fn name(&self) -> &str { "survey_has_question_sets" }
    fn apply(&self, context: &LintContext<'_>) -> Vec<Diagnostic> {
        context
            .surveys
            .iter()
            .filter(|s| s.definition.question_sets.is_empty())
            .map(|s| {
                Diagnostic::new(self.name(), Severity::Error, format!("Survey '{}' has no question sets", s.interaction_id))
                    .interaction(&s.interaction_id)
                    .fix("Add at least one question set")
            })
            .collect()
    }
}

struct NextQuestionSetExistsRule;
impl LintRule for NextQuestionSetExistsRule {
    fn name(&self) -> &str { "next_question_set_exists" }
    fn apply(&self, context: &LintContext<'_>) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        for survey in &context.surveys {
            let ids: HashSet<&str> = survey.definition.question_sets.iter().map(|s| s.id.as_str()).collect();
            for set in &survey.definition.question_sets {
                for target in set.continue_targets().filter(|t| !ids.contains(t)) {
                    diagnostics.push(
                        Diagnostic::new(
                            self.name(),
                            Severity::Error,
                            format!("Question set '{}' continues to unknown set '{target}'", set.id),
                        )
                        .interaction(&survey.interaction_id)
                        .edge(&set.id, target)
                        .fix(format!("Add a question set with id '{target}' or fix the invoke")),
                    );
                }
            }
        }
        diagnostics
    }
}

struct ContinueHasTargetRule;
impl LintRule for ContinueHasTargetRule {
    fn name(&self) -> &str { "continue_has_target" }
    fn apply(&self, context: &LintContext<'_>) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        for survey in &context.surveys {
            for set in &survey.definition.question_sets {
                let missing = set
                    .invokes
                    .iter()
                    .flatten()
                    .filter(|inv| inv.behavior == InvokeBehavior::Continue && inv.next_question_set_id.is_none())
                    .count();
                if missing > 0 {
                    diagnostics.push(
                        Diagnostic::new(
                            self.name(),
                            Severity::Warning,
                            format!("Question set '{}' has {missing} continue invoke(s) without a target; they end the survey", set.id),
                        )
                        .interaction(&survey.interaction_id)
                        .at(&set.id)
                        .fix("Set next_question_set_id or use behavior \"end\""),
                    );
                }
            }
        }
        diagnostics
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Active,
    Done,
}

/// Cycles in the `continue` graph, each as a path that starts and ends on
/// the same set.
pub fn find_cycles(graph: &SurveyGraph) -> Vec<Vec<String>> {
    fn visit<'g>(
        graph: &'g SurveyGraph,
        id: &'g str,
        marks: &mut HashMap<&'g str, Mark>,
        stack: &mut Vec<&'g str>,
        cycles: &mut Vec<Vec<String>>,
    ) {
        marks.insert(id, Mark::Active);
        stack.push(id);
        for next in graph.successors(id) {
            match marks.get(next) {
                Some(Mark::Active) => {
                    let start = stack.iter().position(|s| *s == next).unwrap_or(0);
                    let mut cycle: Vec<String> = stack[start..].iter().map(|s| s.to_string()).collect();
                    cycle.push(next.to_string());
                    cycles.push(cycle);
                }
                Some(Mark::Done) => {}
                None => visit(graph, next, marks, stack, cycles),
            }
        }
        stack.pop();
        marks.insert(id, Mark::Done);
    }

    let mut marks = HashMap::new();
    let mut stack = Vec::new();
    let mut cycles = Vec::new();
    for set in graph.sets() {
        if !marks.contains_key(set.id.as_str()) {
            visit(graph, &set.id, &mut marks, &mut stack, &mut cycles);
        }
    }
    cycles
}

struct QuestionSetCycleRule;
impl LintRule for QuestionSetCycleRule {
    fn name(&self) -> &str { "question_set_cycle" }
    fn apply(&self, context: &LintContext<'_>) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        for survey in &context.surveys {
            let Some(graph) = &survey.graph else { continue };
            for cycle in find_cycles(graph) {
                let (from, to) = match cycle.as_slice() {
                    [.., from, to] => (from.as_str(), to.as_str()),
                    _ => continue,
                };
                diagnostics.push(
                    Diagnostic::new(
                        self.name(),
                        Severity::Error,
                        format!("Question sets form a cycle: {}", cycle.join(" -> ")),
                    )
                    .interaction(&survey.interaction_id)
                    .edge(from, to)
                    .fix("Remove the invoke that leads back to an earlier set"),
                );
            }
        }
        diagnostics
    }
}

struct QuestionSetReachabilityRule;
impl LintRule for QuestionSetReachabilityRule {
    fn name(&self) -> &str { "question_set_reachability" }
    fn apply(&self, context: &LintContext<'_>) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        for survey in &context.surveys {
            let Some(graph) = &survey.graph else { continue };

            let mut visited = HashSet::new();
            let mut queue = VecDeque::new();
            visited.insert(graph.entry().id.as_str());
            queue.push_back(graph.entry().id.as_str());
            while let Some(current) = queue.pop_front() {
                for next in graph.successors(current) {
                    if visited.insert(next) {
                        queue.push_back(next);
                    }
                }
            }

            let mut reported = HashSet::new();
            for set in graph.sets() {
                if !visited.contains(set.id.as_str()) && reported.insert(set.id.as_str()) {
                    diagnostics.push(
                        Diagnostic::new(
                            self.name(),
                            Severity::Warning,
                            format!("Question set '{}' is not reachable from the first set", set.id),
                        )
                        .interaction(&survey.interaction_id)
                        .at(&set.id)
                        .fix(format!("Add an invoke continuing to '{}' or remove it", set.id)),
                    );
                }
            }
        }
        diagnostics
    }
}

struct SupportedQuestionTypeRule;
impl LintRule for SupportedQuestionTypeRule {
    fn name(&self) -> &str { "supported_question_type" }
    fn apply(&self, context: &LintContext<'_>) -> Vec<Diagnostic> {
        context
            .surveys
            .iter()
            .flat_map(|survey| {
                survey
                    .definition
                    .all_questions()
                    .filter(|q| matches!(q.kind, QuestionKind::Unsupported { .. }))
                    .map(move |q| {
                        Diagnostic::new(
                            self.name(),
                            Severity::Warning,
                            format!("Question '{}' has unsupported type '{}'; its answers are not submitted", q.id, q.type_name()),
                        )
                        .interaction(&survey.interaction_id)
                        .at(&q.id)
                    })
            })
            .collect()
    }
}

struct DuplicateQuestionIdRule;
impl LintRule for DuplicateQuestionIdRule {
    fn name(&self) -> &str { "duplicate_question_id" }
    fn apply(&self, context: &LintContext<'_>) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        for survey in &context.surveys {
            let mut seen = HashSet::new();
            let mut reported = HashSet::new();
            for question in survey.definition.all_questions() {
                if !seen.insert(question.id.as_str()) && reported.insert(question.id.as_str()) {
                    diagnostics.push(
                        Diagnostic::new(
                            self.name(),
                            Severity::Warning,
                            format!("Question id '{}' is used more than once; later answers overwrite earlier ones", question.id),
                        )
                        .interaction(&survey.interaction_id)
                        .at(&question.id),
                    );
                }
            }
        }
        diagnostics
    }
}

struct QuestionIdPathRule;
impl LintRule for QuestionIdPathRule {
    fn name(&self) -> &str { "question_id_path" }
    fn apply(&self, context: &LintContext<'_>) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        for survey in &context.surveys {
            for question in survey.definition.all_questions().filter(|q| q.id.contains('/')) {
                diagnostics.push(
                    Diagnostic::new(
                        self.name(),
                        Severity::Warning,
                        format!("Question id '{}' contains '/', so criteria cannot refer to its answers", question.id),
                    )
                    .interaction(&survey.interaction_id)
                    .at(&question.id)
                    .fix("Use a question id without '/'"),
                );
            }
        }
        diagnostics
    }
}

fn criteria_diagnostics(rule: &str, origin: &str, criteria: &Criteria) -> Vec<Diagnostic> {
    criteria
        .problems(shared_operators())
        .into_iter()
        .map(|problem| {
            Diagnostic::new(rule, Severity::Error, format!("Invalid criteria in {origin}: {problem}"))
                .fix("Criteria that cannot be evaluated never match")
        })
        .collect()
}

struct CriteriaWellFormedRule;
impl LintRule for CriteriaWellFormedRule {
    fn name(&self) -> &str { "criteria_well_formed" }
    fn apply(&self, context: &LintContext<'_>) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        for (origin, invocation) in context.invocations() {
            diagnostics.extend(criteria_diagnostics(self.name(), &origin, &invocation.criteria));
        }
        for survey in &context.surveys {
            for set in &survey.definition.question_sets {
                for invoke in set.invokes.iter().flatten() {
                    let origin = format!("question set '{}'", set.id);
                    diagnostics.extend(
                        criteria_diagnostics(self.name(), &origin, &invoke.criteria)
                            .into_iter()
                            .map(|d| d.interaction(&survey.interaction_id).at(&set.id)),
                    );
                }
            }
        }
        diagnostics
    }
}

struct TargetInteractionExistsRule;
impl LintRule for TargetInteractionExistsRule {
    fn name(&self) -> &str { "target_interaction_exists" }
    fn apply(&self, context: &LintContext<'_>) -> Vec<Diagnostic> {
        context
            .invocations()
            .into_iter()
            .filter(|(_, inv)| context.manifest.interaction(&inv.interaction_id).is_none())
            .map(|(origin, inv)| {
                Diagnostic::new(
                    self.name(),
                    Severity::Error,
                    format!("{origin} invokes unknown interaction '{}'", inv.interaction_id),
                )
                .fix(format!("Add interaction '{}' or remove the invocation", inv.interaction_id))
            })
            .collect()
    }
}

struct ChoiceBoundsRule;
impl LintRule for ChoiceBoundsRule {
    fn name(&self) -> &str { "choice_bounds" }
    fn apply(&self, context: &LintContext<'_>) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        for survey in &context.surveys {
            for question in survey.definition.all_questions() {
                let problem = match &question.kind {
                    QuestionKind::MultiSelect {
                        answer_choices,
                        min_selections,
                        max_selections,
                    } => match (min_selections, max_selections) {
                        (Some(min), Some(max)) if min > max => {
                            Some(format!("min_selections {min} exceeds max_selections {max}"))
                        }
                        (Some(min), _) if *min > answer_choices.len() => Some(format!(
                            "min_selections {min} exceeds the {} available choices",
                            answer_choices.len()
                        )),
                        _ => None,
                    },
                    QuestionKind::Nps { min, max, .. } | QuestionKind::Range { min, max, .. } => {
                        let (min, max) = (min.unwrap_or(1), *max);
                        match max {
                            Some(max) if min > max => Some(format!("min {min} exceeds max {max}")),
                            _ => None,
                        }
                    }
                    _ => None,
                };
                if let Some(problem) = problem {
                    diagnostics.push(
                        Diagnostic::new(
                            self.name(),
                            Severity::Warning,
                            format!("Question '{}' can never be answered validly: {problem}", question.id),
                        )
                        .interaction(&survey.interaction_id)
                        .at(&question.id),
                    );
                }
            }
        }
        diagnostics
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run all built-in lint rules and return collected diagnostics.
pub fn validate(manifest: &Manifest) -> Vec<Diagnostic> {
    let rules: Vec<Box<dyn LintRule>> = vec![
        Box::new(InteractionParsesRule),
        Box::new(SurveyHasQuestionSetsRule),
        Box::new(NextQuestionSetExistsRule),
        Box::new(QuestionSetCycleRule),
        Box::new(QuestionSetReachabilityRule),
        Box::new(SupportedQuestionTypeRule),
        Box::new(DuplicateQuestionIdRule),
        Box::new(QuestionIdPathRule),
        Box::new(ContinueHasTargetRule),
        Box::new(CriteriaWellFormedRule),
        Box::new(TargetInteractionExistsRule),
        Box::new(ChoiceBoundsRule),
    ];

    let context = LintContext::new(manifest);
    let mut diagnostics = Vec::new();
    for rule in &rules {
        diagnostics.extend(rule.apply(&context));
    }
    diagnostics
}

/// Run all lint rules; return `Err` if any `Error`-severity diagnostic found.
pub fn validate_or_raise(manifest: &Manifest) -> Result<Vec<Diagnostic>> {
    let diagnostics = validate(manifest);
    let errors: Vec<_> = diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .map(|d| d.message.clone())
        .collect();
    if !errors.is_empty() {
        return Err(EngageError::ManifestValidation(errors.join("; ")));
    }
    Ok(diagnostics)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn manifest(interactions: Value, targets: Value) -> Manifest {
        serde_json::from_value(json!({ "interactions": interactions, "targets": targets })).unwrap()
    }

    fn survey(sets: Value) -> Value {
        json!({ "id": "survey", "type": "Survey", "configuration": { "question_sets": sets } })
    }

    fn rules(diagnostics: &[Diagnostic]) -> Vec<&str> {
        diagnostics.iter().map(|d| d.rule.as_str()).collect()
    }

    #[test]
    fn valid_manifest_passes() {
        let m = manifest(
            json!([survey(json!([
                { "id": "s1", "questions": [{ "id": "q1", "type": "multichoice",
                    "answer_choices": [{ "id": "a", "value": "A" }] }],
                  "invokes": [{ "behavior": "continue", "next_question_set_id": "s2",
                                "criteria": { "interactions/q1/current_answer/id": "a" } },
                              { "behavior": "end" }] },
                { "id": "s2", "questions": [{ "id": "q2", "type": "nps", "min": 0, "max": 10 }] }
            ]))]),
            json!({ "launch": [{ "interaction_id": "survey", "criteria": { "code_point/launch/invokes/total": { "$gte": 3 } } }] }),
        );
        let diagnostics = validate_or_raise(&m).unwrap();
        assert!(diagnostics.is_empty(), "{diagnostics:?}");
    }

    #[test]
    fn empty_survey_is_error() {
        let m = manifest(json!([survey(json!([]))]), json!({}));
        let diagnostics = validate(&m);
        assert_eq!(rules(&diagnostics), vec!["survey_has_question_sets"]);
        assert!(validate_or_raise(&m).is_err());
    }

    #[test]
    fn unknown_next_set_is_error_with_edge() {
        let m = manifest(
            json!([survey(json!([
                { "id": "s1", "questions": [], "invokes": [{ "behavior": "continue", "next_question_set_id": "s9" }] }
            ]))]),
            json!({}),
        );
        let diagnostics = validate(&m);
        let d = diagnostics.iter().find(|d| d.rule == "next_question_set_exists").unwrap();
        assert_eq!(d.severity, Severity::Error);
        assert_eq!(d.edge, Some(("s1".into(), "s9".into())));
    }

    #[test]
    fn cycles_are_reported() {
        let m = manifest(
            json!([survey(json!([
                { "id": "a", "questions": [], "invokes": [{ "behavior": "continue", "next_question_set_id": "b" }] },
                { "id": "b", "questions": [], "invokes": [{ "behavior": "continue", "next_question_set_id": "c" }] },
                { "id": "c", "questions": [], "invokes": [{ "behavior": "continue", "next_question_set_id": "a" }] }
            ]))]),
            json!({}),
        );
        let diagnostics = validate(&m);
        let cycle: Vec<_> = diagnostics.iter().filter(|d| d.rule == "question_set_cycle").collect();
        assert_eq!(cycle.len(), 1);
        assert!(cycle[0].message.contains("a -> b -> c -> a"));
        assert_eq!(cycle[0].edge, Some(("c".into(), "a".into())));
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let graph = SurveyGraph::new(Arc::new(
            serde_json::from_value(json!({
                "question_sets": [
                    { "id": "a", "questions": [], "invokes": [{ "behavior": "continue", "next_question_set_id": "a" }] }
                ]
            }))
            .unwrap(),
        ))
        .unwrap();
        assert_eq!(find_cycles(&graph), vec![vec!["a".to_string(), "a".to_string()]]);
    }

    #[test]
    fn unreachable_set_is_warning() {
        let m = manifest(
            json!([survey(json!([
                { "id": "s1", "questions": [] },
                { "id": "orphan", "questions": [] }
            ]))]),
            json!({}),
        );
        let diagnostics = validate_or_raise(&m).unwrap();
        assert_eq!(rules(&diagnostics), vec!["question_set_reachability"]);
        assert_eq!(diagnostics[0].location.as_deref(), Some("orphan"));
    }

    #[test]
    fn question_level_warnings() {
        let m = manifest(
            json!([survey(json!([
                { "id": "s1", "questions": [
                    { "id": "q1", "type": "ranking" },
                    { "id": "q2", "type": "multiselect", "min_selections": 3, "max_selections": 1,
                      "answer_choices": [{ "id": "a" }] },
                    { "id": "q3", "type": "range", "min": 5, "max": 2 },
                    { "id": "q2", "type": "singleline" }
                  ],
                  "invokes": [{ "behavior": "continue" }] }
            ]))]),
            json!({}),
        );
        let diagnostics = validate_or_raise(&m).unwrap();
        let found = rules(&diagnostics);
        assert!(found.contains(&"supported_question_type"));
        assert!(found.contains(&"duplicate_question_id"));
        assert!(found.contains(&"continue_has_target"));
        assert_eq!(found.iter().filter(|r| **r == "choice_bounds").count(), 2);
        assert!(diagnostics.iter().all(|d| d.severity == Severity::Warning));
    }

    #[test]
    fn slash_in_question_id_is_warned() {
        let m = manifest(
            json!([survey(json!([
                { "id": "s1", "questions": [
                    { "id": "about/you", "type": "singleline" },
                    { "id": "q2", "type": "singleline" }
                ]}
            ]))]),
            json!({}),
        );
        let diagnostics = validate_or_raise(&m).unwrap();
        assert_eq!(rules(&diagnostics), vec!["question_id_path"]);
        assert_eq!(diagnostics[0].location.as_deref(), Some("about/you"));
    }

    #[test]
    fn bad_criteria_and_missing_interactions_are_errors() {
        let m = manifest(
            json!([
                survey(json!([{ "id": "s1", "questions": [],
                    "invokes": [{ "behavior": "end", "criteria": { "$or": "nope" } }] }])),
                { "id": "note", "type": "TextModal", "configuration": { "actions": [
                    { "id": "go", "invokes": [{ "interaction_id": "ghost" }] }
                ]}}
            ]),
            json!({
                "launch": [
                    { "interaction_id": "survey", "criteria": { "device/os": { "$like": "iOS" } } },
                    { "interaction_id": "missing" }
                ]
            }),
        );
        let diagnostics = validate(&m);
        let criteria: Vec<_> = diagnostics.iter().filter(|d| d.rule == "criteria_well_formed").collect();
        assert_eq!(criteria.len(), 2);
        assert!(criteria.iter().any(|d| d.message.contains("$like")));
        let missing: Vec<_> = diagnostics.iter().filter(|d| d.rule == "target_interaction_exists").collect();
        assert_eq!(missing.len(), 2);
        assert!(missing.iter().any(|d| d.message.contains("note 'note' action 'go'")));

        let err = validate_or_raise(&m).unwrap_err();
        assert!(matches!(err, EngageError::ManifestValidation(_)));
    }

    #[test]
    fn unreadable_configuration_is_error() {
        let m = manifest(
            json!([{ "id": "broken", "type": "Survey", "configuration": { "question_sets": "nope" } }]),
            json!({}),
        );
        let diagnostics = validate(&m);
        assert_eq!(rules(&diagnostics), vec!["interaction_configuration"]);
        assert_eq!(diagnostics[0].interaction_id.as_deref(), Some("broken"));
    }
}
