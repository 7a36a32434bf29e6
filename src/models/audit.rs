use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ChangeSource, EntityType};

/// An immutable log entry recording one successful status transition.
///
/// The entity code and both statuses are denormalized so the trail stays
/// readable even if the item is later renamed or moved. Records are written
/// in the same transaction as the status mutation and are never updated or
/// deleted. Rejected transition attempts do not produce records; rejections
/// surface only through the error returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Monotonically assigned by the store.
    pub record_id: i64,
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub entity_code: String,
    pub from_status: String,
    pub to_status: String,
    pub actor: String,
    pub change_source: ChangeSource,
    /// Names of side effects executed, including effects of any cascaded
    /// transitions. Empty when the rule carried no side effect.
    pub side_effects: Vec<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}
