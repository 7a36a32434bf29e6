use rusqlite::Connection;
use uuid::Uuid;

use crate::db;
use crate::models::{EntityType, WorkItem};

use super::WorkflowError;

/// Resolve a caller-supplied reference to a concrete work item.
///
/// Accepts a type-prefixed short code (`I7`, `F3`, `BT12`, case-insensitive)
/// or a UUID. The prefixes are disjoint and a UUID can never parse as a
/// short code, so a reference identifies at most one item by construction.
/// Read-only; no side effects.
pub fn resolve(conn: &Connection, reference: &str) -> Result<WorkItem, WorkflowError> {
    let cleaned = reference.trim();

    if let Some(item) = by_short_code(conn, cleaned)? {
        return Ok(item);
    }

    if let Ok(id) = Uuid::parse_str(cleaned) {
        if let Some(item) = db::item_by_id(conn, id)? {
            return Ok(item);
        }
    }

    Err(WorkflowError::NotFound {
        reference: cleaned.to_string(),
    })
}

fn by_short_code(conn: &Connection, reference: &str) -> Result<Option<WorkItem>, WorkflowError> {
    let upper = reference.to_ascii_uppercase();
    for entity_type in [EntityType::Task, EntityType::Feature, EntityType::Issue] {
        let Some(rest) = upper.strip_prefix(entity_type.code_prefix()) else {
            continue;
        };
        if rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_digit()) {
            continue;
        }
        let Ok(short_code) = rest.parse::<i64>() else {
            continue;
        };
        return Ok(db::item_by_code(conn, entity_type, short_code)?);
    }
    Ok(None)
}
