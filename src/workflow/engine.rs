use rusqlite::{Connection, Savepoint};
use uuid::Uuid;

use crate::db::{self, Database};
use crate::models::*;

use super::audit::{self, NewAuditRecord};
use super::conditions::{self, Condition, DONE_EQUIVALENT};
use super::effects::{self, Effect};
use super::{registry, resolver, WorkflowError};

/// Cascades deeper than this indicate a cycle in the transition registry
/// (or a pathologically deep item tree) and abort the whole transition.
pub const MAX_CASCADE_DEPTH: u32 = 5;

/// Conventional targets for the `start_work` / `complete_work` helpers.
const STATUS_IN_PROGRESS: &str = "in_progress";
const STATUS_COMPLETED: &str = "completed";

/// The public entry point for every status change.
///
/// A transition runs resolve -> registry lookup -> condition check -> status
/// mutation -> side effects -> audit write as one transactional unit; a
/// failure anywhere leaves no trace. Cloning is cheap (shared connection).
#[derive(Clone)]
pub struct WorkflowEngine {
    db: Database,
}

impl std::fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine").finish_non_exhaustive()
    }
}

impl WorkflowEngine {
    /// Build an engine, validating every condition and side-effect name in
    /// the transition registry. A stale name fails construction here rather
    /// than the first request that hits the broken rule.
    pub fn new(db: Database) -> Result<Self, WorkflowError> {
        db.with_transaction(|tx| registry::validate(tx))?;
        Ok(Self { db })
    }

    /// Move a work item to `target_status`, if the registry allows it.
    pub fn execute_transition(
        &self,
        reference: &str,
        target_status: &str,
        actor: &str,
        change_source: ChangeSource,
    ) -> Result<TransitionOutcome, WorkflowError> {
        self.db.with_transaction(|tx| {
            let mut sp = tx.savepoint()?;
            let outcome =
                self.run_transition(&mut sp, reference, target_status, actor, change_source, 0)?;
            sp.commit()?;
            Ok(outcome)
        })
    }

    /// Resolve a reference to its work item, read-only.
    pub fn get_item(&self, reference: &str) -> Result<WorkItem, WorkflowError> {
        self.db.with_transaction(|tx| resolver::resolve(tx, reference))
    }

    /// Legal next statuses for the referenced item.
    pub fn list_legal_transitions(&self, reference: &str) -> Result<Vec<String>, WorkflowError> {
        self.db.with_transaction(|tx| {
            let item = resolver::resolve(tx, reference)?;
            registry::list_targets(tx, item.entity_type, &item.status)
        })
    }

    /// Audit trail for the referenced item, oldest first.
    pub fn history(&self, reference: &str) -> Result<ItemHistory, WorkflowError> {
        self.db.with_transaction(|tx| {
            let item = resolver::resolve(tx, reference)?;
            let records = audit::history(tx, item.id)?;
            Ok(ItemHistory {
                entity_code: item.code(),
                records,
            })
        })
    }

    /// `execute_transition` pre-bound to `in_progress`, plus the context a
    /// caller needs to begin: the item itself and its owning feature's plan
    /// payload. Adds no invariants of its own.
    pub fn start_work(&self, reference: &str, actor: &str) -> Result<StartedWork, WorkflowError> {
        self.db.with_transaction(|tx| {
            let mut sp = tx.savepoint()?;
            let transition = self.run_transition(
                &mut sp,
                reference,
                STATUS_IN_PROGRESS,
                actor,
                ChangeSource::Direct,
                0,
            )?;
            let item = db::item_by_id(&sp, transition.entity_id)?
                .ok_or_else(|| anyhow::anyhow!("item vanished mid-transaction"))?;
            let feature = match item.parent_id {
                Some(parent_id) => db::item_by_id(&sp, parent_id)?.map(|parent| FeatureContext {
                    code: parent.code(),
                    title: parent.title,
                    plan_data: parent.plan_data,
                }),
                None => None,
            };
            sp.commit()?;
            Ok(StartedWork {
                transition,
                item,
                feature,
            })
        })
    }

    /// `execute_transition` pre-bound to `completed`, plus a suggestion for
    /// the next ready sibling task so a caller can keep moving.
    pub fn complete_work(&self, reference: &str, actor: &str) -> Result<CompletedWork, WorkflowError> {
        self.db.with_transaction(|tx| {
            let mut sp = tx.savepoint()?;
            let transition = self.run_transition(
                &mut sp,
                reference,
                STATUS_COMPLETED,
                actor,
                ChangeSource::Direct,
                0,
            )?;
            let next_task = next_ready_sibling(&sp, transition.entity_id)?;
            sp.commit()?;
            Ok(CompletedWork {
                transition,
                next_task,
            })
        })
    }

    /// One transition inside an open savepoint. Cascaded transitions
    /// re-enter here with `depth + 1` and their own nested savepoint, which
    /// keeps them indistinguishable from direct calls in the audit trail
    /// apart from the recorded change source.
    pub(crate) fn run_transition(
        &self,
        sp: &mut Savepoint,
        reference: &str,
        target_status: &str,
        actor: &str,
        change_source: ChangeSource,
        depth: u32,
    ) -> Result<TransitionOutcome, WorkflowError> {
        if depth > MAX_CASCADE_DEPTH {
            tracing::error!(
                reference,
                target_status,
                "cascade depth limit exceeded; check the transition registry for cycles"
            );
            return Err(WorkflowError::CascadeDepthExceeded {
                limit: MAX_CASCADE_DEPTH,
            });
        }

        // 1. Resolve.
        let item = resolver::resolve(sp, reference)?;
        let entity_code = item.code();

        // 2. Registry lookup. No rule is the normal rejection path.
        let Some(rule) = registry::lookup(sp, item.entity_type, &item.status, target_status)?
        else {
            let valid = registry::list_targets(sp, item.entity_type, &item.status)?;
            return Err(WorkflowError::InvalidTransition {
                entity_code,
                from_status: item.status.clone(),
                to_status: target_status.to_string(),
                valid,
            });
        };

        // 3. Condition gate.
        if let Some(name) = &rule.requires_condition {
            let condition = Condition::from_str(name).ok_or_else(|| {
                tracing::error!(condition = %name, entity = %entity_code,
                    "transition rule references an unregistered condition");
                WorkflowError::UnknownCondition { name: name.clone() }
            })?;
            let verdict = conditions::evaluate(sp, condition, &item)?;
            if !verdict.passed {
                return Err(WorkflowError::ConditionNotMet {
                    condition: name.clone(),
                    reason: verdict.reason,
                });
            }
        }

        // 4. Mutate.
        db::set_status(sp, item.id, target_status)?;

        // 5. Side effects.
        let mut executions: Vec<EffectExecution> = Vec::new();
        if let Some(name) = &rule.side_effect {
            let effect = Effect::from_str(name).ok_or_else(|| {
                tracing::error!(effect = %name, entity = %entity_code,
                    "transition rule references an unregistered side effect");
                WorkflowError::UnknownEffect { name: name.clone() }
            })?;
            let execution = effects::execute(self, sp, effect, &item, actor, depth)?;
            if rule.effect_required && !execution.completed {
                return Err(WorkflowError::EffectFailed {
                    effect: name.clone(),
                    detail: execution.detail,
                });
            }
            executions.push(execution);
        }

        // 6. Audit. The incomplete-cascade case is kept visible in metadata
        // even though the transition itself stands.
        let side_effect_names: Vec<String> = executions
            .iter()
            .flat_map(EffectExecution::executed_names)
            .collect();
        let metadata = executions
            .iter()
            .find(|e| !e.completed)
            .map(|e| serde_json::json!({ "effect_incomplete": e.name, "detail": e.detail }));
        let audit_record_id = audit::record(
            sp,
            &NewAuditRecord {
                entity_type: item.entity_type,
                entity_id: item.id,
                entity_code: &entity_code,
                from_status: &item.status,
                to_status: target_status,
                actor,
                change_source,
                side_effects: &side_effect_names,
                metadata: metadata.as_ref(),
            },
        )?;

        tracing::info!(
            entity = %entity_code,
            from = %item.status,
            to = %target_status,
            source = change_source.as_str(),
            "transition applied"
        );

        // 7. Report.
        Ok(TransitionOutcome {
            entity_type: item.entity_type,
            entity_id: item.id,
            entity_code,
            from_status: item.status,
            to_status: target_status.to_string(),
            effects: executions,
            audit_record_id,
        })
    }
}

/// Next ready task among the completed item's siblings: still `todo`, not
/// blocked by an unfinished task, lowest position first.
fn next_ready_sibling(conn: &Connection, entity_id: Uuid) -> Result<Option<NextTask>, WorkflowError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT sib.short_code, sib.title
         FROM work_items me
         JOIN work_items sib ON sib.parent_id = me.parent_id
         WHERE me.id = ? AND me.parent_id IS NOT NULL
           AND sib.entity_type = 'task' AND sib.status = 'todo'
           AND (sib.blocked_by_id IS NULL OR sib.blocked_by_id IN
                (SELECT id FROM work_items WHERE status IN ('{}', '{}')))
         ORDER BY sib.position, sib.short_code
         LIMIT 1",
        DONE_EQUIVALENT[0], DONE_EQUIVALENT[1]
    ))?;
    let mut rows = stmt.query([entity_id.to_string()])?;
    match rows.next()? {
        Some(row) => {
            let short_code: i64 = row.get(0)?;
            Ok(Some(NextTask {
                code: format!("{}{}", EntityType::Task.code_prefix(), short_code),
                title: row.get(1)?,
            }))
        }
        None => Ok(None),
    }
}
