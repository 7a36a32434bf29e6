use rusqlite::Connection;
use uuid::Uuid;

use crate::db;
use crate::models::{AuditRecord, ChangeSource, EntityType};

use super::WorkflowError;

/// Fields of an audit record before the store assigns its id and timestamp.
pub(crate) struct NewAuditRecord<'a> {
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub entity_code: &'a str,
    pub from_status: &'a str,
    pub to_status: &'a str,
    pub actor: &'a str,
    pub change_source: ChangeSource,
    pub side_effects: &'a [String],
    pub metadata: Option<&'a serde_json::Value>,
}

/// Append one record. Runs inside the transition's transaction: an insert
/// failure fails the whole transition, so a status change can never exist
/// without its record.
pub(crate) fn record(conn: &Connection, rec: &NewAuditRecord<'_>) -> Result<i64, WorkflowError> {
    let side_effects = serde_json::to_string(rec.side_effects)
        .map_err(|e| WorkflowError::Storage(e.into()))?;
    let metadata = rec
        .metadata
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| WorkflowError::Storage(e.into()))?;

    conn.execute(
        "INSERT INTO audit_log (entity_type, entity_id, entity_code, from_status, to_status,
             actor, change_source, side_effects, metadata, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            rec.entity_type.as_str(),
            rec.entity_id.to_string(),
            rec.entity_code,
            rec.from_status,
            rec.to_status,
            rec.actor,
            rec.change_source.as_str(),
            side_effects,
            metadata,
            chrono::Utc::now().to_rfc3339(),
        ),
    )?;
    Ok(conn.last_insert_rowid())
}

/// Full trail for one item, oldest first.
pub(crate) fn history(conn: &Connection, entity_id: Uuid) -> Result<Vec<AuditRecord>, WorkflowError> {
    let mut stmt = conn.prepare(
        "SELECT record_id, entity_type, entity_id, entity_code, from_status, to_status,
                actor, change_source, side_effects, metadata, created_at
         FROM audit_log WHERE entity_id = ?
         ORDER BY created_at ASC, record_id ASC",
    )?;
    let records = stmt
        .query_map([entity_id.to_string()], record_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(records)
}

fn record_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditRecord> {
    let side_effects: Vec<String> = row
        .get::<_, String>(8)
        .map(|s| serde_json::from_str(&s).unwrap_or_default())?;
    let metadata = row
        .get::<_, Option<String>>(9)?
        .and_then(|s| serde_json::from_str(&s).ok());
    Ok(AuditRecord {
        record_id: row.get(0)?,
        entity_type: EntityType::from_str(&row.get::<_, String>(1)?)
            .unwrap_or(EntityType::Task),
        entity_id: db::parse_uuid(row.get::<_, String>(2)?),
        entity_code: row.get(3)?,
        from_status: row.get(4)?,
        to_status: row.get(5)?,
        actor: row.get(6)?,
        change_source: ChangeSource::from_str(&row.get::<_, String>(7)?)
            .unwrap_or(ChangeSource::Direct),
        side_effects,
        metadata,
        created_at: db::parse_datetime(row.get::<_, String>(10)?),
    })
}
