//! Targeting resolver: first-match selection of an invocation for an event.
//!
//! Order in the manifest is significant. The first invocation whose criteria
//! holds wins even when later ones would also match.

use std::collections::HashMap;

use engage_types::DataContext;
use serde::Deserialize;

use crate::criteria::{evaluate, Criteria};

/// A candidate interaction paired with the criteria gating it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Invocation {
    pub interaction_id: String,
    #[serde(default)]
    pub criteria: Criteria,
}

impl Invocation {
    pub fn new(interaction_id: impl Into<String>, criteria: Criteria) -> Self {
        Self {
            interaction_id: interaction_id.into(),
            criteria,
        }
    }
}

/// Event name -> ordered candidate invocations.
pub type TargetTable = HashMap<String, Vec<Invocation>>;

/// Select the invocation for `event`. Returns `None` when the event has no
/// configured targets or none of its criteria hold.
pub fn resolve<'a>(
    event: &str,
    table: &'a TargetTable,
    context: &DataContext,
) -> Option<&'a Invocation> {
    let Some(candidates) = table.get(event) else {
        tracing::debug!(%event, "No targets configured for event");
        return None;
    };
    let selected = resolve_candidates(candidates, context);
    match selected {
        Some(invocation) => {
            tracing::info!(%event, interaction_id = %invocation.interaction_id, "Event targeted interaction");
        }
        None => {
            tracing::debug!(%event, candidates = candidates.len(), "No target criteria matched");
        }
    }
    selected
}

/// Same first-match rule over an explicit candidate list, as embedded in
/// note actions.
pub fn resolve_candidates<'a>(
    candidates: &'a [Invocation],
    context: &DataContext,
) -> Option<&'a Invocation> {
    candidates
        .iter()
        .find(|invocation| evaluate(&invocation.criteria, context))
}
