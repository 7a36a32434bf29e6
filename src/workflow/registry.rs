use rusqlite::Connection;

use crate::models::{EntityType, TransitionRule};

use super::conditions::Condition;
use super::effects::Effect;
use super::WorkflowError;

const RULE_COLUMNS: &str =
    "entity_type, from_status, to_status, requires_condition, side_effect, effect_required, description";

/// Look up the rule for one move. `None` is the normal "not allowed" outcome,
/// not a failure: it is how the state machine rejects invalid requests.
pub fn lookup(
    conn: &Connection,
    entity_type: EntityType,
    from_status: &str,
    to_status: &str,
) -> Result<Option<TransitionRule>, WorkflowError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM workflow_transitions
         WHERE entity_type = ? AND from_status = ? AND to_status = ?",
        RULE_COLUMNS
    ))?;
    let mut rows = stmt.query((entity_type.as_str(), from_status, to_status))?;
    match rows.next()? {
        Some(row) => Ok(Some(rule_from_row(row)?)),
        None => Ok(None),
    }
}

/// Legal next statuses from the given position, for error messages and for
/// callers that want to offer choices instead of guessing.
pub fn list_targets(
    conn: &Connection,
    entity_type: EntityType,
    from_status: &str,
) -> Result<Vec<String>, WorkflowError> {
    let mut stmt = conn.prepare(
        "SELECT to_status FROM workflow_transitions
         WHERE entity_type = ? AND from_status = ?
         ORDER BY to_status",
    )?;
    let targets = stmt
        .query_map((entity_type.as_str(), from_status), |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(targets)
}

pub fn all_rules(conn: &Connection) -> Result<Vec<TransitionRule>, WorkflowError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM workflow_transitions ORDER BY entity_type, from_status, to_status",
        RULE_COLUMNS
    ))?;
    let rules = stmt
        .query_map([], rule_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rules)
}

/// Check that every condition and effect name in the registry maps to a
/// known variant. Run at engine construction so a bad name surfaces at load
/// time, not on the first request that happens to hit the broken rule.
pub fn validate(conn: &Connection) -> Result<(), WorkflowError> {
    for rule in all_rules(conn)? {
        if let Some(name) = &rule.requires_condition {
            if Condition::from_str(name).is_none() {
                return Err(WorkflowError::UnknownCondition { name: name.clone() });
            }
        }
        if let Some(name) = &rule.side_effect {
            if Effect::from_str(name).is_none() {
                return Err(WorkflowError::UnknownEffect { name: name.clone() });
            }
        }
    }
    Ok(())
}

fn rule_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TransitionRule> {
    Ok(TransitionRule {
        entity_type: EntityType::from_str(&row.get::<_, String>(0)?).unwrap_or(EntityType::Task),
        from_status: row.get(1)?,
        to_status: row.get(2)?,
        requires_condition: row.get(3)?,
        side_effect: row.get(4)?,
        effect_required: row.get::<_, i64>(5)? != 0,
        description: row.get(6)?,
    })
}
