use rusqlite::Connection;

use crate::db;
use crate::models::WorkItem;

use super::WorkflowError;

/// Statuses that count as "done" when judging whether a parent's children
/// are finished. Cancelled counts: a cancelled child is a decision, not an
/// outstanding obligation, and must not block parent completion. This is a
/// confirmed product decision; keep it in mind anywhere this set is reused.
pub const DONE_EQUIVALENT: [&str; 2] = ["completed", "cancelled"];

/// The closed set of named transition preconditions.
///
/// Conditions are pure with respect to engine state: they may read related
/// items but never mutate anything. Names appearing in the transition
/// registry are validated against this set at engine construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    /// Every child of the item is in a done-equivalent status.
    AllChildrenDone,
    /// The item has an assignee set.
    HasAssignee,
}

impl Condition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AllChildrenDone => "all_children_done",
            Self::HasAssignee => "has_assignee",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "all_children_done" => Some(Self::AllChildrenDone),
            "has_assignee" => Some(Self::HasAssignee),
            _ => None,
        }
    }
}

/// Outcome of a condition check. The reason is caller-facing: on failure it
/// names what is outstanding so the rejection can be explained.
#[derive(Debug, Clone)]
pub struct Verdict {
    pub passed: bool,
    pub reason: String,
}

impl Verdict {
    fn pass(reason: impl Into<String>) -> Self {
        Self {
            passed: true,
            reason: reason.into(),
        }
    }

    fn fail(reason: impl Into<String>) -> Self {
        Self {
            passed: false,
            reason: reason.into(),
        }
    }
}

pub fn evaluate(
    conn: &Connection,
    condition: Condition,
    item: &WorkItem,
) -> Result<Verdict, WorkflowError> {
    match condition {
        Condition::AllChildrenDone => {
            let children = db::children_of(conn, item.id)?;
            let open: Vec<String> = children
                .iter()
                .filter(|c| !DONE_EQUIVALENT.contains(&c.status.as_str()))
                .map(|c| c.code())
                .collect();
            if open.is_empty() {
                Ok(Verdict::pass(format!(
                    "all {} child item(s) done",
                    children.len()
                )))
            } else {
                Ok(Verdict::fail(format!(
                    "{} child item(s) still open: {}",
                    open.len(),
                    open.join(", ")
                )))
            }
        }
        Condition::HasAssignee => match &item.assignee {
            Some(assignee) => Ok(Verdict::pass(format!("assigned to {}", assignee))),
            None => Ok(Verdict::fail(format!("{} has no assignee", item.code()))),
        },
    }
}
