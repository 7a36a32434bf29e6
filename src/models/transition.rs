use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AuditRecord, WorkItem};

/// One legal move in a work item's state machine.
///
/// Rules live in the `workflow_transitions` table, keyed by
/// `(entity_type, from_status, to_status)` so at most one rule can exist for
/// a given move. They are read-only at request time and change only through
/// the administrative path on [`crate::db::Database`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRule {
    pub entity_type: super::EntityType,
    pub from_status: String,
    pub to_status: String,
    /// Name of a condition that must hold for the move to be allowed.
    pub requires_condition: Option<String>,
    /// Name of a side effect to run after the status mutation.
    pub side_effect: Option<String>,
    /// When set, a side effect that does not complete (e.g. a cascade that
    /// is rejected) fails the whole transition instead of being reported.
    pub effect_required: bool,
    pub description: Option<String>,
}

/// Who or what initiated a status change.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChangeSource {
    /// A caller asked for this transition directly (CLI, API).
    Direct,
    /// A side effect of another transition triggered this one.
    Cascade,
    /// An unattended process (sync job, scheduler) asked for it.
    Automation,
}

impl ChangeSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Cascade => "cascade",
            Self::Automation => "automation",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "direct" => Some(Self::Direct),
            "cascade" => Some(Self::Cascade),
            "automation" => Some(Self::Automation),
            _ => None,
        }
    }
}

/// One side effect that ran after a successful transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectExecution {
    pub name: String,
    /// What the effect actually did ("set started_at", "completed parent F3",
    /// "cascade not performed: ...").
    pub detail: String,
    /// Effect names executed by a cascaded transition this effect triggered.
    pub cascaded_effects: Vec<String>,
    /// False when the effect's intended consequence (a cascade) was rejected.
    pub completed: bool,
}

impl EffectExecution {
    /// All names for the audit record: this effect plus anything it cascaded.
    pub fn executed_names(&self) -> Vec<String> {
        let mut names = vec![self.name.clone()];
        names.extend(self.cascaded_effects.iter().cloned());
        names
    }
}

/// Result of a successful transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub entity_type: super::EntityType,
    pub entity_id: Uuid,
    pub entity_code: String,
    pub from_status: String,
    pub to_status: String,
    pub effects: Vec<EffectExecution>,
    pub audit_record_id: i64,
}

/// `start_work` response: the transition plus enough context to begin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartedWork {
    pub transition: TransitionOutcome,
    pub item: WorkItem,
    /// Owning feature, when the started item has one.
    pub feature: Option<FeatureContext>,
}

/// Parent-feature context loaded for `start_work`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureContext {
    pub code: String,
    pub title: String,
    pub plan_data: Option<serde_json::Value>,
}

/// `complete_work` response: the transition plus a suggested next task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedWork {
    pub transition: TransitionOutcome,
    /// Next ready sibling task (todo, not blocked by unfinished work),
    /// or None when the parent has no more ready tasks.
    pub next_task: Option<NextTask>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextTask {
    pub code: String,
    pub title: String,
}

/// Audit trail for one work item, oldest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemHistory {
    pub entity_code: String,
    pub records: Vec<AuditRecord>,
}
