mod schema;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, Transaction};
use uuid::Uuid;

use crate::models::*;

/// Column list shared by every work-item SELECT.
pub(crate) const ITEM_COLUMNS: &str = "id, entity_type, short_code, title, details, plan_data, \
     status, parent_id, blocked_by_id, position, assignee, started_at, created_at, updated_at";

pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: PathBuf) -> Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Database path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open the database at `WAYPOINT_DB`, or the platform data directory.
    pub fn open_default() -> Result<Self> {
        if let Ok(path) = std::env::var("WAYPOINT_DB") {
            return Self::open(PathBuf::from(path));
        }
        let dirs = directories::ProjectDirs::from("", "", "waypoint")
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        let db_path = dirs.data_dir().join("waypoint.db");
        Self::open(db_path)
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        schema::run_migrations(&conn)
    }

    /// Run `f` inside a single transaction, holding the connection lock for
    /// the duration. Commits on `Ok`, rolls back on `Err`. The workflow
    /// engine runs its entire pipeline (status mutation + audit write) in
    /// one such unit, which is also what serializes transitions on the same
    /// entity: nothing else can touch the store mid-pipeline.
    pub fn with_transaction<T, E>(
        &self,
        f: impl FnOnce(&mut Transaction) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<rusqlite::Error>,
    {
        let mut conn = self.conn.lock().expect("database lock poisoned");
        let mut tx = conn.transaction()?;
        let value = f(&mut tx)?;
        tx.commit()?;
        Ok(value)
    }

    // ============================================================
    // Work item operations (external-collaborator surface)
    // ============================================================

    /// Create a work item at its type's initial status.
    ///
    /// Every later status change goes through the workflow engine; there is
    /// no update path for `status` here.
    pub fn create_item(&self, input: CreateItemInput) -> Result<WorkItem> {
        let mut conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.transaction()?;

        if let Some(parent_id) = input.parent_id {
            item_by_id(&tx, parent_id)?
                .ok_or_else(|| anyhow::anyhow!("Parent item not found"))?;
        }
        if let Some(blocked_by) = input.blocked_by_id {
            item_by_id(&tx, blocked_by)?
                .ok_or_else(|| anyhow::anyhow!("Blocking item not found"))?;
        }

        let id = Uuid::new_v4();
        let now = Utc::now();
        let status = input.entity_type.initial_status().to_string();
        let position = input.position.unwrap_or(0);

        let short_code: i64 = tx.query_row(
            "SELECT COALESCE(MAX(short_code), 0) + 1 FROM work_items WHERE entity_type = ?",
            [input.entity_type.as_str()],
            |row| row.get(0),
        )?;

        let plan_data = input
            .plan_data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        tx.execute(
            "INSERT INTO work_items (id, entity_type, short_code, title, details, plan_data,
                 status, parent_id, blocked_by_id, position, assignee, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            (
                id.to_string(),
                input.entity_type.as_str(),
                short_code,
                &input.title,
                &input.details,
                &plan_data,
                &status,
                input.parent_id.map(|u| u.to_string()),
                input.blocked_by_id.map(|u| u.to_string()),
                position,
                &input.assignee,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ),
        )?;
        tx.commit()?;

        Ok(WorkItem {
            id,
            entity_type: input.entity_type,
            short_code,
            title: input.title,
            details: input.details,
            plan_data: input.plan_data,
            status,
            parent_id: input.parent_id,
            blocked_by_id: input.blocked_by_id,
            position,
            assignee: input.assignee,
            started_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn get_item(&self, id: Uuid) -> Result<Option<WorkItem>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        item_by_id(&conn, id)
    }

    pub fn get_item_by_code(&self, entity_type: EntityType, short_code: i64) -> Result<Option<WorkItem>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        item_by_code(&conn, entity_type, short_code)
    }

    pub fn list_items(&self, query: &ListItemsQuery) -> Result<Vec<WorkItem>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut sql = format!("SELECT {} FROM work_items", ITEM_COLUMNS);
        let mut clauses = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(entity_type) = query.entity_type {
            clauses.push("entity_type = ?");
            params.push(Box::new(entity_type.as_str().to_string()));
        }
        if let Some(status) = &query.status {
            clauses.push("status = ?");
            params.push(Box::new(status.clone()));
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY entity_type, short_code");

        let mut stmt = conn.prepare(&sql)?;
        let params_ref: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let items = stmt
            .query_map(params_ref.as_slice(), item_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    pub fn get_children(&self, parent_id: Uuid) -> Result<Vec<WorkItem>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        children_of(&conn, parent_id)
    }

    // ============================================================
    // Transition registry administration
    // ============================================================
    //
    // The registry is read-only at request time. These are the config-update
    // path; after changing rules, re-validate with `WorkflowEngine::new`.

    pub fn insert_transition_rule(&self, rule: &TransitionRule) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        conn.execute(
            "INSERT INTO workflow_transitions
                 (entity_type, from_status, to_status, requires_condition, side_effect,
                  effect_required, description)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            (
                rule.entity_type.as_str(),
                &rule.from_status,
                &rule.to_status,
                &rule.requires_condition,
                &rule.side_effect,
                rule.effect_required as i64,
                &rule.description,
            ),
        )?;
        Ok(())
    }

    pub fn delete_transition_rule(
        &self,
        entity_type: EntityType,
        from_status: &str,
        to_status: &str,
    ) -> Result<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute(
            "DELETE FROM workflow_transitions
             WHERE entity_type = ? AND from_status = ? AND to_status = ?",
            (entity_type.as_str(), from_status, to_status),
        )?;
        Ok(rows > 0)
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
        }
    }
}

// ============================================================
// Connection-level helpers
// ============================================================
//
// These take a borrowed connection (or transaction, via deref) so the
// workflow engine can compose them inside one transactional unit without
// re-entering the database lock.

pub(crate) fn item_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<WorkItem> {
    let entity_type = EntityType::from_str(&row.get::<_, String>(1)?).unwrap_or(EntityType::Task);
    let plan_data = row
        .get::<_, Option<String>>(5)?
        .and_then(|s| serde_json::from_str(&s).ok());
    Ok(WorkItem {
        id: parse_uuid(row.get::<_, String>(0)?),
        entity_type,
        short_code: row.get(2)?,
        title: row.get(3)?,
        details: row.get(4)?,
        plan_data,
        status: row.get(6)?,
        parent_id: row.get::<_, Option<String>>(7)?.map(parse_uuid),
        blocked_by_id: row.get::<_, Option<String>>(8)?.map(parse_uuid),
        position: row.get(9)?,
        assignee: row.get(10)?,
        started_at: row.get::<_, Option<String>>(11)?.map(parse_datetime),
        created_at: parse_datetime(row.get::<_, String>(12)?),
        updated_at: parse_datetime(row.get::<_, String>(13)?),
    })
}

pub(crate) fn item_by_id(conn: &Connection, id: Uuid) -> Result<Option<WorkItem>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM work_items WHERE id = ?",
        ITEM_COLUMNS
    ))?;
    let mut rows = stmt.query([id.to_string()])?;
    match rows.next()? {
        Some(row) => Ok(Some(item_from_row(row)?)),
        None => Ok(None),
    }
}

pub(crate) fn item_by_code(
    conn: &Connection,
    entity_type: EntityType,
    short_code: i64,
) -> Result<Option<WorkItem>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM work_items WHERE entity_type = ? AND short_code = ?",
        ITEM_COLUMNS
    ))?;
    let mut rows = stmt.query((entity_type.as_str(), short_code))?;
    match rows.next()? {
        Some(row) => Ok(Some(item_from_row(row)?)),
        None => Ok(None),
    }
}

pub(crate) fn children_of(conn: &Connection, parent_id: Uuid) -> Result<Vec<WorkItem>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM work_items WHERE parent_id = ? ORDER BY position, short_code",
        ITEM_COLUMNS
    ))?;
    let items = stmt
        .query_map([parent_id.to_string()], item_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(items)
}

/// Status mutation, crate-private: only the workflow engine calls this.
pub(crate) fn set_status(conn: &Connection, id: Uuid, status: &str) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE work_items SET status = ?, updated_at = ? WHERE id = ?",
        (status, Utc::now().to_rfc3339(), id.to_string()),
    )?;
    Ok(())
}

pub(crate) fn parse_uuid(s: String) -> Uuid {
    Uuid::parse_str(&s).unwrap_or_else(|_| Uuid::nil())
}

pub(crate) fn parse_datetime(s: String) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
