//! SQLite workflow repository implementation.
//!
//! Implements `WorkflowRepository` from `steward-core` using sqlx with split
//! read/write pools. Workflow definitions are stored as JSON blobs next to
//! the columns dispatch filters on. Executions and action executions form the
//! audit trail and are never deleted.

use serde_json::Value;
use sqlx::Row;
use steward_core::repository::workflow::WorkflowRepository;
use steward_types::error::{ActionError, ActionErrorKind, RepositoryError};
use steward_types::execution::{
    ActionExecution, ActionExecutionStatus, ExecutionStatus, WorkflowExecution,
};
use steward_types::trigger::TriggerContext;
use steward_types::workflow::{ActionType, TriggerType, Workflow, WorkflowStatus};
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, parse_uuid, query_error};

/// SQLite-backed implementation of `WorkflowRepository`.
pub struct SqliteWorkflowRepository {
    pool: DatabasePool,
}

impl SqliteWorkflowRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Internal row types
// ---------------------------------------------------------------------------

fn definition_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Workflow, RepositoryError> {
    let definition: String = row.try_get("definition").map_err(query_error)?;
    serde_json::from_str(&definition)
        .map_err(|e| RepositoryError::Query(format!("invalid workflow definition JSON: {e}")))
}

struct ExecutionRow {
    id: String,
    workflow_id: String,
    workflow_name: String,
    trigger: String,
    context: String,
    status: String,
    started_at: String,
    completed_at: Option<String>,
    error: Option<String>,
}

impl ExecutionRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            workflow_id: row.try_get("workflow_id")?,
            workflow_name: row.try_get("workflow_name")?,
            trigger: row.try_get("trigger")?,
            context: row.try_get("context")?,
            status: row.try_get("status")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
            error: row.try_get("error")?,
        })
    }

    fn into_execution(self) -> Result<WorkflowExecution, RepositoryError> {
        let status: ExecutionStatus = self
            .status
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;
        let trigger: TriggerContext = serde_json::from_str(&self.trigger)
            .map_err(|e| RepositoryError::Query(format!("invalid trigger JSON: {e}")))?;
        let context: Value = serde_json::from_str(&self.context)
            .map_err(|e| RepositoryError::Query(format!("invalid context JSON: {e}")))?;

        Ok(WorkflowExecution {
            id: parse_uuid(&self.id)?,
            workflow_id: parse_uuid(&self.workflow_id)?,
            workflow_name: self.workflow_name,
            trigger,
            context,
            status,
            started_at: parse_datetime(&self.started_at)?,
            completed_at: self.completed_at.as_deref().map(parse_datetime).transpose()?,
            error: self.error,
        })
    }
}

struct ActionExecutionRow {
    id: String,
    execution_id: String,
    action_id: String,
    action_type: String,
    action_order: i32,
    status: String,
    result: Option<String>,
    error: Option<String>,
    error_kind: Option<String>,
    started_at: String,
    executed_at: Option<String>,
}

impl ActionExecutionRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            execution_id: row.try_get("execution_id")?,
            action_id: row.try_get("action_id")?,
            action_type: row.try_get("action_type")?,
            action_order: row.try_get("action_order")?,
            status: row.try_get("status")?,
            result: row.try_get("result")?,
            error: row.try_get("error")?,
            error_kind: row.try_get("error_kind")?,
            started_at: row.try_get("started_at")?,
            executed_at: row.try_get("executed_at")?,
        })
    }

    fn into_action_execution(self) -> Result<ActionExecution, RepositoryError> {
        let action_type: ActionType = self
            .action_type
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;
        let status: ActionExecutionStatus = self
            .status
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;
        let error_kind = self
            .error_kind
            .as_deref()
            .map(|k| k.parse::<ActionErrorKind>().map_err(RepositoryError::Query))
            .transpose()?;
        let result = self
            .result
            .as_deref()
            .map(|s| {
                serde_json::from_str(s)
                    .map_err(|e| RepositoryError::Query(format!("invalid action result: {e}")))
            })
            .transpose()?;

        Ok(ActionExecution {
            id: parse_uuid(&self.id)?,
            execution_id: parse_uuid(&self.execution_id)?,
            action_id: parse_uuid(&self.action_id)?,
            action_type,
            action_order: self.action_order,
            status,
            result,
            error: self.error,
            error_kind,
            started_at: parse_datetime(&self.started_at)?,
            executed_at: self.executed_at.as_deref().map(parse_datetime).transpose()?,
        })
    }
}

fn executions_from_rows(
    rows: &[sqlx::sqlite::SqliteRow],
) -> Result<Vec<WorkflowExecution>, RepositoryError> {
    let mut executions = Vec::with_capacity(rows.len());
    for row in rows {
        let r = ExecutionRow::from_row(row).map_err(query_error)?;
        executions.push(r.into_execution()?);
    }
    Ok(executions)
}

fn to_json_string(value: &Value) -> Result<String, RepositoryError> {
    serde_json::to_string(value).map_err(query_error)
}

/// Unique-constraint violations become `Conflict`; everything else `Query`.
fn write_error(e: sqlx::Error) -> RepositoryError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            RepositoryError::Conflict(db.message().to_string())
        }
        _ => RepositoryError::Query(e.to_string()),
    }
}

// ---------------------------------------------------------------------------
// WorkflowRepository impl
// ---------------------------------------------------------------------------

impl WorkflowRepository for SqliteWorkflowRepository {
    async fn save_workflow(&self, workflow: &Workflow) -> Result<(), RepositoryError> {
        let definition = serde_json::to_string(workflow)
            .map_err(|e| RepositoryError::Query(format!("serialize definition: {e}")))?;

        sqlx::query(
            r#"INSERT INTO workflows (id, name, trigger_type, status, is_active, definition, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 trigger_type = excluded.trigger_type,
                 status = excluded.status,
                 is_active = excluded.is_active,
                 definition = excluded.definition,
                 updated_at = excluded.updated_at"#,
        )
        .bind(workflow.id.to_string())
        .bind(&workflow.name)
        .bind(workflow.trigger_type.as_str())
        .bind(workflow.status.as_str())
        .bind(workflow.is_active)
        .bind(&definition)
        .bind(format_datetime(&workflow.created_at))
        .bind(format_datetime(&workflow.updated_at))
        .execute(&self.pool.writer)
        .await
        .map_err(write_error)?;

        Ok(())
    }

    async fn get_workflow(&self, id: &Uuid) -> Result<Option<Workflow>, RepositoryError> {
        let row = sqlx::query("SELECT definition FROM workflows WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        row.as_ref().map(definition_from_row).transpose()
    }

    async fn get_workflow_by_name(&self, name: &str) -> Result<Option<Workflow>, RepositoryError> {
        let row = sqlx::query("SELECT definition FROM workflows WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        row.as_ref().map(definition_from_row).transpose()
    }

    async fn list_workflows(&self) -> Result<Vec<Workflow>, RepositoryError> {
        let rows = sqlx::query("SELECT definition FROM workflows ORDER BY name ASC")
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_error)?;

        rows.iter().map(definition_from_row).collect()
    }

    async fn list_dispatchable(
        &self,
        trigger_type: TriggerType,
    ) -> Result<Vec<Workflow>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT definition FROM workflows WHERE trigger_type = ? AND status = ? AND is_active = 1 ORDER BY name ASC",
        )
        .bind(trigger_type.as_str())
        .bind(WorkflowStatus::Active.as_str())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        rows.iter().map(definition_from_row).collect()
    }

    async fn delete_workflow(&self, id: &Uuid) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM workflows WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(query_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn create_execution(&self, execution: &WorkflowExecution) -> Result<(), RepositoryError> {
        let trigger = serde_json::to_string(&execution.trigger).map_err(query_error)?;

        sqlx::query(
            r#"INSERT INTO workflow_executions
               (id, workflow_id, workflow_name, trigger_type, trigger, context, status,
                started_at, completed_at, error)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(execution.id.to_string())
        .bind(execution.workflow_id.to_string())
        .bind(&execution.workflow_name)
        .bind(execution.trigger.trigger_type.as_str())
        .bind(&trigger)
        .bind(to_json_string(&execution.context)?)
        .bind(execution.status.as_str())
        .bind(format_datetime(&execution.started_at))
        .bind(execution.completed_at.as_ref().map(format_datetime))
        .bind(&execution.error)
        .execute(&self.pool.writer)
        .await
        .map_err(write_error)?;

        Ok(())
    }

    async fn update_execution_status(
        &self,
        id: &Uuid,
        status: ExecutionStatus,
        error: Option<&str>,
        context: Option<&Value>,
    ) -> Result<(), RepositoryError> {
        let completed_at = status
            .is_terminal()
            .then(|| format_datetime(&chrono::Utc::now()));
        let context = context.map(to_json_string).transpose()?;

        let result = sqlx::query(
            r#"UPDATE workflow_executions SET
                 status = ?,
                 error = COALESCE(?, error),
                 context = COALESCE(?, context),
                 completed_at = COALESCE(?, completed_at)
               WHERE id = ?"#,
        )
        .bind(status.as_str())
        .bind(error)
        .bind(&context)
        .bind(&completed_at)
        .bind(id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn save_execution_context(&self, id: &Uuid, context: &Value) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE workflow_executions SET context = ? WHERE id = ?")
            .bind(to_json_string(context)?)
            .bind(id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(query_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn get_execution(&self, id: &Uuid) -> Result<Option<WorkflowExecution>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM workflow_executions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        match row {
            Some(row) => {
                let r = ExecutionRow::from_row(&row).map_err(query_error)?;
                Ok(Some(r.into_execution()?))
            }
            None => Ok(None),
        }
    }

    async fn list_executions(
        &self,
        workflow_id: Option<&Uuid>,
        limit: u32,
    ) -> Result<Vec<WorkflowExecution>, RepositoryError> {
        let rows = match workflow_id {
            Some(id) => {
                sqlx::query(
                    "SELECT * FROM workflow_executions WHERE workflow_id = ? ORDER BY started_at DESC, id DESC LIMIT ?",
                )
                .bind(id.to_string())
                .bind(i64::from(limit))
                .fetch_all(&self.pool.reader)
                .await
            }
            None => {
                sqlx::query(
                    "SELECT * FROM workflow_executions ORDER BY started_at DESC, id DESC LIMIT ?",
                )
                .bind(i64::from(limit))
                .fetch_all(&self.pool.reader)
                .await
            }
        }
        .map_err(query_error)?;

        executions_from_rows(&rows)
    }

    async fn list_running_executions(&self) -> Result<Vec<WorkflowExecution>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM workflow_executions WHERE status = 'running' ORDER BY started_at ASC",
        )
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        executions_from_rows(&rows)
    }

    async fn create_action_execution(&self, record: &ActionExecution) -> Result<(), RepositoryError> {
        let result = record.result.as_ref().map(to_json_string).transpose()?;

        sqlx::query(
            r#"INSERT INTO action_executions
               (id, execution_id, action_id, action_type, action_order, status,
                result, error, error_kind, started_at, executed_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(record.id.to_string())
        .bind(record.execution_id.to_string())
        .bind(record.action_id.to_string())
        .bind(record.action_type.as_str())
        .bind(record.action_order)
        .bind(record.status.as_str())
        .bind(&result)
        .bind(&record.error)
        .bind(record.error_kind.map(|k| k.as_str()))
        .bind(format_datetime(&record.started_at))
        .bind(record.executed_at.as_ref().map(format_datetime))
        .execute(&self.pool.writer)
        .await
        .map_err(write_error)?;

        Ok(())
    }

    async fn update_action_execution(
        &self,
        id: &Uuid,
        status: ActionExecutionStatus,
        result: Option<&Value>,
        error: Option<&ActionError>,
    ) -> Result<(), RepositoryError> {
        let executed_at = status
            .is_terminal()
            .then(|| format_datetime(&chrono::Utc::now()));
        let result = result.map(to_json_string).transpose()?;

        let outcome = sqlx::query(
            r#"UPDATE action_executions SET
                 status = ?,
                 result = COALESCE(?, result),
                 error = COALESCE(?, error),
                 error_kind = COALESCE(?, error_kind),
                 executed_at = COALESCE(?, executed_at)
               WHERE id = ?"#,
        )
        .bind(status.as_str())
        .bind(&result)
        .bind(error.map(|e| e.to_string()))
        .bind(error.map(|e| e.kind().as_str()))
        .bind(&executed_at)
        .bind(id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        if outcome.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn get_action_execution(&self, id: &Uuid) -> Result<Option<ActionExecution>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM action_executions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        match row {
            Some(row) => {
                let r = ActionExecutionRow::from_row(&row).map_err(query_error)?;
                Ok(Some(r.into_action_execution()?))
            }
            None => Ok(None),
        }
    }

    async fn list_action_executions(
        &self,
        execution_id: &Uuid,
    ) -> Result<Vec<ActionExecution>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM action_executions WHERE execution_id = ? ORDER BY action_order ASC, started_at ASC",
        )
        .bind(execution_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            let r = ActionExecutionRow::from_row(row).map_err(query_error)?;
            records.push(r.into_action_execution()?);
        }
        Ok(records)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
