//! Execution audit records.
//!
//! One `WorkflowExecution` per (workflow, trigger firing) and one
//! `ActionExecution` per (action, workflow execution). Records are created and
//! mutated only by the runner that owns them and are never deleted.
//! `PendingDelay` rows make delayed actions durable across restarts.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::ActionErrorKind;
use crate::trigger::TriggerContext;
use crate::workflow::ActionType;

// ---------------------------------------------------------------------------
// Statuses
// ---------------------------------------------------------------------------

/// Workflow-level execution status: `running -> completed | failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionStatus::Running)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(ExecutionStatus::Running),
            "completed" => Ok(ExecutionStatus::Completed),
            "failed" => Ok(ExecutionStatus::Failed),
            other => Err(format!("unknown execution status: '{other}'")),
        }
    }
}

/// Action-level status: `running [-> waiting -> running] -> completed | skipped | failed`.
///
/// `Waiting` is the non-terminal pending-delay state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionExecutionStatus {
    Running,
    Waiting,
    Completed,
    Skipped,
    Failed,
}

impl ActionExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionExecutionStatus::Running => "running",
            ActionExecutionStatus::Waiting => "waiting",
            ActionExecutionStatus::Completed => "completed",
            ActionExecutionStatus::Skipped => "skipped",
            ActionExecutionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ActionExecutionStatus::Completed
                | ActionExecutionStatus::Skipped
                | ActionExecutionStatus::Failed
        )
    }
}

impl fmt::Display for ActionExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(ActionExecutionStatus::Running),
            "waiting" => Ok(ActionExecutionStatus::Waiting),
            "completed" => Ok(ActionExecutionStatus::Completed),
            "skipped" => Ok(ActionExecutionStatus::Skipped),
            "failed" => Ok(ActionExecutionStatus::Failed),
            other => Err(format!("unknown action execution status: '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One attempt to run a workflow against one trigger context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub id: Uuid,
    pub workflow_id: Uuid,
    /// Denormalized for display; survives workflow deletion.
    pub workflow_name: String,
    /// Snapshot of the trigger that started this execution.
    pub trigger: TriggerContext,
    /// Accumulated execution context (variables, action outputs).
    pub context: Value,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One attempt to run one action within a workflow execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionExecution {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub action_id: Uuid,
    pub action_type: ActionType,
    pub action_order: i32,
    pub status: ActionExecutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ActionErrorKind>,
    pub started_at: DateTime<Utc>,
    /// When the action reached a terminal state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executed_at: Option<DateTime<Utc>>,
}

/// A durable "resume this action at `due_at`" row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDelay {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub action_execution_id: Uuid,
    pub action_id: Uuid,
    pub due_at: DateTime<Utc>,
    /// Set when a delay worker claims the row; cleared if the claim goes stale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<DateTime<Utc>>,
}
