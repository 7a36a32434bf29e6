use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A tracked work item: an issue, a feature, or a task.
///
/// Work items are created by external callers but, once created, their
/// `status` is mutated exclusively through the workflow engine. Items are
/// never physically deleted; terminal statuses (`cancelled`, `wont_fix`,
/// `duplicate`, ...) represent end-of-life.
///
/// Features own tasks via `parent_id` and may nest under other features.
/// Tasks may block sibling tasks via `blocked_by_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: Uuid,
    pub entity_type: EntityType,
    /// Per-type sequence number, rendered with the type prefix (e.g. `BT12`).
    pub short_code: i64,
    pub title: String,
    pub details: Option<String>,
    /// Free-form structured payload (plan data, acceptance notes).
    pub plan_data: Option<serde_json::Value>,
    /// Current status, drawn from the per-type machine in the transition
    /// registry. Statuses are configuration, not code.
    pub status: String,
    pub parent_id: Option<Uuid>,
    /// A sibling task that must reach a done status before this one is ready.
    pub blocked_by_id: Option<Uuid>,
    /// Ordering hint among siblings, used for next-task suggestions.
    pub position: i64,
    pub assignee: Option<String>,
    /// Stamped by the `stamp_start` side effect on first entry to work.
    pub started_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkItem {
    /// Human-readable reference, e.g. `I7`, `F3`, `BT12`.
    pub fn code(&self) -> String {
        format!("{}{}", self.entity_type.code_prefix(), self.short_code)
    }
}

/// The fixed set of tracked entity types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Issue,
    Feature,
    Task,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Issue => "issue",
            Self::Feature => "feature",
            Self::Task => "task",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "issue" => Some(Self::Issue),
            "feature" => Some(Self::Feature),
            "task" => Some(Self::Task),
            _ => None,
        }
    }

    /// Short-code prefix. Prefixes are disjoint, so a reference identifies
    /// its type by construction. Tasks use `BT` ("build task") rather than
    /// a bare `T` to keep codes unambiguous to read aloud.
    pub fn code_prefix(&self) -> &'static str {
        match self {
            Self::Issue => "I",
            Self::Feature => "F",
            Self::Task => "BT",
        }
    }

    /// Status a freshly created item starts in, before the engine takes over.
    pub fn initial_status(&self) -> &'static str {
        match self {
            Self::Issue => "new",
            Self::Feature => "draft",
            Self::Task => "todo",
        }
    }
}

/// Input for creating a new work item.
///
/// Creation is an external-collaborator operation: the item enters the
/// workflow at its type's initial status and every later status change goes
/// through the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateItemInput {
    pub entity_type: EntityType,
    pub title: String,
    pub details: Option<String>,
    pub plan_data: Option<serde_json::Value>,
    /// Owning feature for tasks; parent feature for nested features.
    pub parent_id: Option<Uuid>,
    pub blocked_by_id: Option<Uuid>,
    pub position: Option<i64>,
    pub assignee: Option<String>,
}

/// Query filter for listing work items.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListItemsQuery {
    pub entity_type: Option<EntityType>,
    pub status: Option<String>,
}
