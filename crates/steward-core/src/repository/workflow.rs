//! Workflow repository trait definition.
//!
//! Defines the storage interface for workflow definitions, workflow
//! executions, and action executions. The infrastructure layer
//! (steward-infra) implements this trait with SQLite persistence.

use serde_json::Value;
use steward_types::error::{ActionError, RepositoryError};
use steward_types::execution::{
    ActionExecution, ActionExecutionStatus, ExecutionStatus, WorkflowExecution,
};
use steward_types::workflow::{TriggerType, Workflow};
use uuid::Uuid;

/// Repository trait for workflow persistence.
///
/// Covers three entity families:
/// - **Definitions:** CRUD for workflows (actions are embedded and owned).
/// - **Executions:** Create/update/query workflow execution records.
/// - **Action executions:** Create/update/query per-action audit records.
///
/// Execution records are append-mostly: rows are created once and only
/// their status columns change afterwards. Nothing here deletes them.
pub trait WorkflowRepository: Send + Sync {
    // -----------------------------------------------------------------------
    // Definitions
    // -----------------------------------------------------------------------

    /// Upsert a workflow (insert or replace by ID).
    fn save_workflow(
        &self,
        workflow: &Workflow,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn get_workflow(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Workflow>, RepositoryError>> + Send;

    fn get_workflow_by_name(
        &self,
        name: &str,
    ) -> impl std::future::Future<Output = Result<Option<Workflow>, RepositoryError>> + Send;

    /// List all workflows, ordered by name.
    fn list_workflows(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<Workflow>, RepositoryError>> + Send;

    /// List workflows eligible for a trigger: `is_active`, status `active`,
    /// and a matching trigger type.
    fn list_dispatchable(
        &self,
        trigger_type: TriggerType,
    ) -> impl std::future::Future<Output = Result<Vec<Workflow>, RepositoryError>> + Send;

    /// Delete a workflow and its actions. Returns `true` if it existed.
    fn delete_workflow(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // Executions
    // -----------------------------------------------------------------------

    fn create_execution(
        &self,
        execution: &WorkflowExecution,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Update an execution's status (and optionally error message / context).
    ///
    /// Terminal statuses also stamp `completed_at`.
    fn update_execution_status(
        &self,
        id: &Uuid,
        status: ExecutionStatus,
        error: Option<&str>,
        context: Option<&Value>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Persist the accumulated context without changing the status.
    fn save_execution_context(
        &self,
        id: &Uuid,
        context: &Value,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn get_execution(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<WorkflowExecution>, RepositoryError>> + Send;

    /// List executions, newest first, optionally for one workflow.
    fn list_executions(
        &self,
        workflow_id: Option<&Uuid>,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<WorkflowExecution>, RepositoryError>> + Send;

    /// List executions still in `running` status (in flight or suspended on a delay).
    fn list_running_executions(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<WorkflowExecution>, RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // Action executions
    // -----------------------------------------------------------------------

    fn create_action_execution(
        &self,
        record: &ActionExecution,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Update an action execution's status and optionally its result/error.
    ///
    /// Terminal statuses also stamp `executed_at`.
    fn update_action_execution(
        &self,
        id: &Uuid,
        status: ActionExecutionStatus,
        result: Option<&Value>,
        error: Option<&ActionError>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn get_action_execution(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<ActionExecution>, RepositoryError>> + Send;

    /// List the action executions of one execution, ordered by action order.
    fn list_action_executions(
        &self,
        execution_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<ActionExecution>, RepositoryError>> + Send;
}
