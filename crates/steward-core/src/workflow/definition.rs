//! Workflow definition parsing, validation, and lifecycle transitions.
//!
//! Converts YAML into `Workflow` values, validates structural constraints
//! (unique action order values and ids, action configs valid for their type),
//! and moves workflows between draft / active / paused / archived.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use steward_types::workflow::{MAX_DELAY_SECS, Workflow, WorkflowStatus};
use thiserror::Error;
use uuid::Uuid;

use crate::repository::workflow::WorkflowRepository;

use super::handler::ActionHandlerRegistry;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum WorkflowError {
    /// YAML/JSON parse failure.
    #[error("parse error: {0}")]
    ParseError(String),

    /// Structural validation failure.
    #[error("validation error: {0}")]
    ValidationError(String),

    /// An action's config is not valid for its type.
    #[error("action {order} ({action_type}): {message}")]
    InvalidAction {
        order: i32,
        action_type: String,
        message: String,
    },

    #[error("cannot move workflow from {from} to {to}")]
    InvalidTransition {
        from: WorkflowStatus,
        to: WorkflowStatus,
    },

    #[error("workflow not found: {0}")]
    NotFound(String),

    #[error("repository error: {0}")]
    Repository(String),
}

impl From<steward_types::error::RepositoryError> for WorkflowError {
    fn from(err: steward_types::error::RepositoryError) -> Self {
        WorkflowError::Repository(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a YAML document into a structurally valid `Workflow`.
///
/// Action configs are not checked here; see `validate_workflow`.
pub fn parse_workflow_yaml(yaml: &str) -> Result<Workflow, WorkflowError> {
    let workflow: Workflow =
        serde_yaml_ng::from_str(yaml).map_err(|e| WorkflowError::ParseError(e.to_string()))?;
    validate_structure(&workflow)?;
    Ok(workflow)
}

pub fn serialize_workflow_yaml(workflow: &Workflow) -> Result<String, WorkflowError> {
    serde_yaml_ng::to_string(workflow).map_err(|e| WorkflowError::ParseError(e.to_string()))
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Checks that need no handler knowledge:
/// - name is non-empty
/// - action `order` values are unique
/// - action ids are unique
/// - no action delays longer than `MAX_DELAY_SECS`
pub fn validate_structure(workflow: &Workflow) -> Result<(), WorkflowError> {
    if workflow.name.trim().is_empty() {
        return Err(WorkflowError::ValidationError(
            "workflow name must not be empty".to_string(),
        ));
    }

    let mut orders = HashSet::new();
    let mut ids = HashSet::new();
    for action in &workflow.actions {
        if !orders.insert(action.order) {
            return Err(WorkflowError::ValidationError(format!(
                "duplicate action order {}",
                action.order
            )));
        }
        if !ids.insert(action.id) {
            return Err(WorkflowError::ValidationError(format!(
                "duplicate action id {}",
                action.id
            )));
        }
        if action.delay_secs > MAX_DELAY_SECS {
            return Err(WorkflowError::ValidationError(format!(
                "action {} delays {}s, more than the maximum of {MAX_DELAY_SECS}s",
                action.order, action.delay_secs
            )));
        }
    }
    Ok(())
}

/// Give re-imported actions the ids of the actions they replace.
///
/// An incoming action whose id the stored definition does not know takes
/// the id of the stored action with the same order and type. Delayed
/// executions resume by action id, so this keeps them attached across a
/// re-import of a file that leaves ids out.
fn carry_over_action_ids(workflow: &mut Workflow, existing: &Workflow) {
    let mut taken: HashSet<Uuid> = workflow.actions.iter().map(|a| a.id).collect();
    for action in &mut workflow.actions {
        if existing.action(&action.id).is_some() {
            continue;
        }
        let Some(previous) = existing
            .actions
            .iter()
            .find(|p| p.order == action.order && p.action_type == action.action_type)
        else {
            continue;
        };
        if taken.insert(previous.id) {
            taken.remove(&action.id);
            action.id = previous.id;
        }
    }
}

/// Full validation: structure plus every action config against its handler.
pub fn validate_workflow(
    workflow: &Workflow,
    registry: &ActionHandlerRegistry,
) -> Result<(), WorkflowError> {
    validate_structure(workflow)?;
    for action in workflow.ordered_actions() {
        registry
            .validate(action)
            .map_err(|e| WorkflowError::InvalidAction {
                order: action.order,
                action_type: action.action_type.to_string(),
                message: e.to_string(),
            })?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Validate and enable a workflow. Archived workflows cannot be re-activated.
pub fn activate(workflow: &mut Workflow, registry: &ActionHandlerRegistry) -> Result<(), WorkflowError> {
    if workflow.status == WorkflowStatus::Archived {
        return Err(WorkflowError::InvalidTransition {
            from: workflow.status,
            to: WorkflowStatus::Active,
        });
    }
    validate_workflow(workflow, registry)?;
    workflow.status = WorkflowStatus::Active;
    workflow.is_active = true;
    workflow.updated_at = Utc::now();
    Ok(())
}

pub fn pause(workflow: &mut Workflow) -> Result<(), WorkflowError> {
    if workflow.status == WorkflowStatus::Archived {
        return Err(WorkflowError::InvalidTransition {
            from: workflow.status,
            to: WorkflowStatus::Paused,
        });
    }
    workflow.status = WorkflowStatus::Paused;
    workflow.is_active = false;
    workflow.updated_at = Utc::now();
    Ok(())
}

pub fn archive(workflow: &mut Workflow) {
    workflow.status = WorkflowStatus::Archived;
    workflow.is_active = false;
    workflow.updated_at = Utc::now();
}

// ---------------------------------------------------------------------------
// WorkflowCatalog
// ---------------------------------------------------------------------------

/// Definition management over a `WorkflowRepository`.
pub struct WorkflowCatalog<R: WorkflowRepository> {
    repo: Arc<R>,
    registry: Arc<ActionHandlerRegistry>,
}

impl<R: WorkflowRepository> WorkflowCatalog<R> {
    pub fn new(repo: Arc<R>, registry: Arc<ActionHandlerRegistry>) -> Self {
        Self { repo, registry }
    }

    /// Parse and fully validate a YAML definition without saving it.
    pub fn check_yaml(&self, yaml: &str) -> Result<Workflow, WorkflowError> {
        let workflow = parse_workflow_yaml(yaml)?;
        validate_workflow(&workflow, &self.registry)?;
        Ok(workflow)
    }

    /// Import a YAML definition.
    ///
    /// Re-importing a workflow with an existing name replaces it in place,
    /// keeping its id and the ids of actions that are still there. A definition that arrives already enabled is fully
    /// validated first.
    pub async fn import_yaml(&self, yaml: &str) -> Result<Workflow, WorkflowError> {
        let mut workflow = parse_workflow_yaml(yaml)?;
        if workflow.is_enabled() {
            validate_workflow(&workflow, &self.registry)?;
        }

        if let Some(existing) = self.repo.get_workflow_by_name(&workflow.name).await? {
            workflow.id = existing.id;
            workflow.created_at = existing.created_at;
            carry_over_action_ids(&mut workflow, &existing);
        }
        workflow.updated_at = Utc::now();
        self.repo.save_workflow(&workflow).await?;

        tracing::info!(
            workflow_id = %workflow.id,
            workflow = %workflow.name,
            trigger = %workflow.trigger_type,
            actions = workflow.actions.len(),
            "imported workflow"
        );
        Ok(workflow)
    }

    /// Look up a workflow by id or, failing that, by name.
    pub async fn find(&self, key: &str) -> Result<Workflow, WorkflowError> {
        if let Ok(id) = key.parse::<Uuid>() {
            if let Some(workflow) = self.repo.get_workflow(&id).await? {
                return Ok(workflow);
            }
        }
        self.repo
            .get_workflow_by_name(key)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(key.to_string()))
    }

    pub async fn list(&self) -> Result<Vec<Workflow>, WorkflowError> {
        Ok(self.repo.list_workflows().await?)
    }

    pub async fn activate(&self, key: &str) -> Result<Workflow, WorkflowError> {
        let mut workflow = self.find(key).await?;
        activate(&mut workflow, &self.registry)?;
        self.persist(workflow, "activated workflow").await
    }

    pub async fn pause(&self, key: &str) -> Result<Workflow, WorkflowError> {
        let mut workflow = self.find(key).await?;
        pause(&mut workflow)?;
        self.persist(workflow, "paused workflow").await
    }

    pub async fn archive(&self, key: &str) -> Result<Workflow, WorkflowError> {
        let mut workflow = self.find(key).await?;
        archive(&mut workflow);
        self.persist(workflow, "archived workflow").await
    }

    /// Delete a workflow and its actions. Execution history is kept.
    pub async fn delete(&self, key: &str) -> Result<Workflow, WorkflowError> {
        let workflow = self.find(key).await?;
        self.repo.delete_workflow(&workflow.id).await?;
        tracing::info!(workflow_id = %workflow.id, workflow = %workflow.name, "deleted workflow");
        Ok(workflow)
    }

    async fn persist(&self, workflow: Workflow, message: &'static str) -> Result<Workflow, WorkflowError> {
        self.repo.save_workflow(&workflow).await?;
        tracing::info!(
            workflow_id = %workflow.id,
            workflow = %workflow.name,
            status = %workflow.status,
            "{message}"
        );
        Ok(workflow)
    }
}
