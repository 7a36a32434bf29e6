use chrono::Utc;
use rusqlite::Savepoint;

use crate::db;
use crate::models::{ChangeSource, EffectExecution, WorkItem};

use super::conditions::DONE_EQUIVALENT;
use super::engine::WorkflowEngine;
use super::WorkflowError;

/// The closed set of named post-transition side effects.
///
/// Every effect is idempotent: re-running one with the same transition
/// context (crash mid-transition, retry) leaves the same state behind.
/// Names in the registry are validated against this set at engine
/// construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Stamp `started_at` on first entry to work. Later runs keep the
    /// original timestamp.
    StampStart,
    /// If the item's parent is in progress and all of the parent's children
    /// are now done, cascade the parent to `completed` through the full
    /// engine pipeline.
    CheckParentCompletion,
}

impl Effect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StampStart => "stamp_start",
            Self::CheckParentCompletion => "check_parent_completion",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "stamp_start" => Some(Self::StampStart),
            "check_parent_completion" => Some(Self::CheckParentCompletion),
            _ => None,
        }
    }
}

pub(crate) fn execute(
    engine: &WorkflowEngine,
    sp: &mut Savepoint,
    effect: Effect,
    item: &WorkItem,
    actor: &str,
    depth: u32,
) -> Result<EffectExecution, WorkflowError> {
    match effect {
        Effect::StampStart => stamp_start(sp, item),
        Effect::CheckParentCompletion => check_parent_completion(engine, sp, item, actor, depth),
    }
}

fn stamp_start(sp: &Savepoint, item: &WorkItem) -> Result<EffectExecution, WorkflowError> {
    sp.execute(
        "UPDATE work_items SET started_at = COALESCE(started_at, ?) WHERE id = ?",
        (Utc::now().to_rfc3339(), item.id.to_string()),
    )?;
    Ok(EffectExecution {
        name: Effect::StampStart.as_str().to_string(),
        detail: "stamped started_at".to_string(),
        cascaded_effects: Vec::new(),
        completed: true,
    })
}

fn check_parent_completion(
    engine: &WorkflowEngine,
    sp: &mut Savepoint,
    item: &WorkItem,
    actor: &str,
    depth: u32,
) -> Result<EffectExecution, WorkflowError> {
    let done = |name: Effect, detail: String, cascaded: Vec<String>| EffectExecution {
        name: name.as_str().to_string(),
        detail,
        cascaded_effects: cascaded,
        completed: true,
    };

    let Some(parent_id) = item.parent_id else {
        return Ok(done(
            Effect::CheckParentCompletion,
            "no parent to check".to_string(),
            Vec::new(),
        ));
    };
    let parent = db::item_by_id(sp, parent_id)?
        .ok_or_else(|| anyhow::anyhow!("parent row missing for {}", item.code()))?;

    let remaining: Vec<String> = db::children_of(sp, parent.id)?
        .iter()
        .filter(|c| !DONE_EQUIVALENT.contains(&c.status.as_str()))
        .map(|c| c.code())
        .collect();
    if !remaining.is_empty() {
        return Ok(done(
            Effect::CheckParentCompletion,
            format!(
                "{} child item(s) still open for {}",
                remaining.len(),
                parent.code()
            ),
            Vec::new(),
        ));
    }
    if parent.status != "in_progress" {
        return Ok(done(
            Effect::CheckParentCompletion,
            format!(
                "{} is '{}', not in progress; nothing to cascade",
                parent.code(),
                parent.status
            ),
            Vec::new(),
        ));
    }

    // Cascade in a nested savepoint so a rejection rolls back only the
    // cascade, never the triggering transition.
    let mut nested = sp.savepoint()?;
    match engine.run_transition(
        &mut nested,
        &parent.code(),
        "completed",
        actor,
        ChangeSource::Cascade,
        depth + 1,
    ) {
        Ok(outcome) => {
            nested.commit()?;
            let cascaded: Vec<String> = outcome
                .effects
                .iter()
                .flat_map(EffectExecution::executed_names)
                .collect();
            Ok(done(
                Effect::CheckParentCompletion,
                format!("completed parent {}", outcome.entity_code),
                cascaded,
            ))
        }
        Err(e) if e.is_anomaly() => Err(e),
        Err(e) => {
            drop(nested);
            tracing::warn!(
                parent = %parent.code(),
                error = %e,
                "parent completion cascade was rejected"
            );
            Ok(EffectExecution {
                name: Effect::CheckParentCompletion.as_str().to_string(),
                detail: format!("cascade not performed: {}", e),
                cascaded_effects: Vec::new(),
                completed: false,
            })
        }
    }
}
