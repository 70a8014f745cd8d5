//! Execution recorder: durable audit writes for workflow and action executions.
//!
//! Wraps `WorkflowRepository` with the transitions the runner needs. Every
//! write is awaited before the runner moves on, and any repository failure is
//! returned as a `RecorderError`, which is fatal for that execution: the runner
//! never continues an unaudited run.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use steward_types::error::ActionError;
use steward_types::execution::{
    ActionExecution, ActionExecutionStatus, ExecutionStatus, WorkflowExecution,
};
use steward_types::trigger::TriggerContext;
use steward_types::workflow::{Action, Workflow};
use uuid::Uuid;

use crate::repository::workflow::WorkflowRepository;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error("audit write failed: {0}")]
    Repository(String),
}

impl From<steward_types::error::RepositoryError> for RecorderError {
    fn from(err: steward_types::error::RepositoryError) -> Self {
        RecorderError::Repository(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// ExecutionRecorder
// ---------------------------------------------------------------------------

/// Generic over `R: WorkflowRepository` so it works with any storage backend.
pub struct ExecutionRecorder<R: WorkflowRepository> {
    repo: Arc<R>,
}

impl<R: WorkflowRepository> ExecutionRecorder<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    /// Access the underlying repository.
    pub fn repo(&self) -> &R {
        &self.repo
    }

    // -----------------------------------------------------------------------
    // Workflow executions
    // -----------------------------------------------------------------------

    /// Create the execution row in `running` state.
    pub async fn create_execution(
        &self,
        workflow: &Workflow,
        trigger: &TriggerContext,
        context: Value,
    ) -> Result<WorkflowExecution, RecorderError> {
        let execution = WorkflowExecution {
            id: Uuid::now_v7(),
            workflow_id: workflow.id,
            workflow_name: workflow.name.clone(),
            trigger: trigger.clone(),
            context,
            status: ExecutionStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            error: None,
        };
        self.repo.create_execution(&execution).await?;

        tracing::debug!(
            execution_id = %execution.id,
            workflow = %workflow.name,
            "recorded execution start"
        );
        Ok(execution)
    }

    pub async fn update_execution_status(
        &self,
        execution_id: Uuid,
        status: ExecutionStatus,
        error: Option<&str>,
        context: Option<&Value>,
    ) -> Result<(), RecorderError> {
        self.repo
            .update_execution_status(&execution_id, status, error, context)
            .await?;

        tracing::debug!(execution_id = %execution_id, status = %status, "recorded execution status");
        Ok(())
    }

    /// Persist the accumulated context after an action reaches a new state.
    pub async fn checkpoint_context(
        &self,
        execution_id: Uuid,
        context: &Value,
    ) -> Result<(), RecorderError> {
        self.repo
            .save_execution_context(&execution_id, context)
            .await
            .map_err(RecorderError::from)
    }

    // -----------------------------------------------------------------------
    // Action executions
    // -----------------------------------------------------------------------

    /// Create the action execution row in `running` state. Returns its id.
    pub async fn create_action_execution(
        &self,
        execution_id: Uuid,
        action: &Action,
    ) -> Result<Uuid, RecorderError> {
        let record = ActionExecution {
            id: Uuid::now_v7(),
            execution_id,
            action_id: action.id,
            action_type: action.action_type,
            action_order: action.order,
            status: ActionExecutionStatus::Running,
            result: None,
            error: None,
            error_kind: None,
            started_at: Utc::now(),
            executed_at: None,
        };
        self.repo.create_action_execution(&record).await?;

        tracing::debug!(
            execution_id = %execution_id,
            action_id = %action.id,
            order = action.order,
            "recorded action start"
        );
        Ok(record.id)
    }

    pub async fn update_action_execution_status(
        &self,
        action_execution_id: Uuid,
        status: ActionExecutionStatus,
        result: Option<&Value>,
        error: Option<&ActionError>,
    ) -> Result<(), RecorderError> {
        self.repo
            .update_action_execution(&action_execution_id, status, result, error)
            .await?;

        tracing::debug!(
            action_execution_id = %action_execution_id,
            status = %status,
            "recorded action status"
        );
        Ok(())
    }

    pub async fn action_completed(&self, id: Uuid, result: &Value) -> Result<(), RecorderError> {
        self.update_action_execution_status(id, ActionExecutionStatus::Completed, Some(result), None)
            .await
    }

    pub async fn action_failed(&self, id: Uuid, error: &ActionError) -> Result<(), RecorderError> {
        self.update_action_execution_status(id, ActionExecutionStatus::Failed, None, Some(error))
            .await
    }

    pub async fn action_skipped(&self, id: Uuid) -> Result<(), RecorderError> {
        self.update_action_execution_status(id, ActionExecutionStatus::Skipped, None, None)
            .await
    }

    pub async fn action_waiting(&self, id: Uuid) -> Result<(), RecorderError> {
        self.update_action_execution_status(id, ActionExecutionStatus::Waiting, None, None)
            .await
    }

    pub async fn action_resumed(&self, id: Uuid) -> Result<(), RecorderError> {
        self.update_action_execution_status(id, ActionExecutionStatus::Running, None, None)
            .await
    }
}
