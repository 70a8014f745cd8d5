//! Action handler contract and registry.
//!
//! Each action type is one `ActionHandler` implementation registered under
//! its `ActionType` tag. The runner only ever talks to the registry, so
//! adding an action type means adding one handler, never editing the runner.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use steward_types::error::ActionError;
use steward_types::trigger::TriggerContext;
use steward_types::workflow::{Action, ActionType};
use uuid::Uuid;

use crate::collaborator::Collaborators;

use super::handlers;

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

/// Everything a handler sees for one invocation.
#[derive(Debug, Clone, Copy)]
pub struct ActionInput<'a> {
    pub execution_id: Uuid,
    pub config: &'a Map<String, Value>,
    pub trigger: &'a TriggerContext,
    /// The execution's expression context, used as template variables.
    pub context: &'a Value,
}

/// Structured success payload of a handler.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ActionOutput {
    /// Stored on the Action Execution as its result.
    pub result: Value,
    /// Merged into the execution's `variables` for later actions.
    pub exports: Map<String, Value>,
}

impl ActionOutput {
    pub fn new(result: Value) -> Self {
        Self {
            result,
            exports: Map::new(),
        }
    }

    pub fn with_export(mut self, key: impl Into<String>, value: Value) -> Self {
        self.exports.insert(key.into(), value);
        self
    }
}

/// Performs exactly one external side effect for one action type.
///
/// Handlers hold no engine state and may be retried by an operator; the
/// engine itself never retries.
pub trait ActionHandler: Send + Sync {
    fn action_type(&self) -> ActionType;

    /// Check that a config blob is structurally valid for this action type.
    fn validate(&self, config: &Map<String, Value>) -> Result<(), ActionError>;

    fn invoke<'a>(&'a self, input: ActionInput<'a>)
    -> BoxFuture<'a, Result<ActionOutput, ActionError>>;
}

/// Deserialize an action config into a handler's typed config.
pub fn parse_config<T: DeserializeOwned>(config: &Map<String, Value>) -> Result<T, ActionError> {
    serde_json::from_value(Value::Object(config.clone()))
        .map_err(|e| ActionError::InvalidConfig(e.to_string()))
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Lookup table from action type to handler.
#[derive(Default, Clone)]
pub struct ActionHandlerRegistry {
    handlers: HashMap<ActionType, Arc<dyn ActionHandler>>,
}

impl ActionHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with one built-in handler per `ActionType`.
    pub fn with_builtin_handlers(collaborators: Collaborators) -> Self {
        let mut registry = Self::new();
        for handler in handlers::builtin(collaborators) {
            registry.register(handler);
        }
        registry
    }

    /// Register a handler, replacing any existing one for the same type.
    pub fn register(&mut self, handler: Arc<dyn ActionHandler>) {
        self.handlers.insert(handler.action_type(), handler);
    }

    pub fn get(&self, action_type: ActionType) -> Option<&Arc<dyn ActionHandler>> {
        self.handlers.get(&action_type)
    }

    pub fn registered_types(&self) -> Vec<ActionType> {
        let mut types: Vec<ActionType> = self.handlers.keys().copied().collect();
        types.sort_by_key(|t| t.as_str());
        types
    }

    /// Validate an action's config against its handler.
    pub fn validate(&self, action: &Action) -> Result<(), ActionError> {
        match self.handlers.get(&action.action_type) {
            Some(handler) => handler.validate(&action.config),
            None => Err(unregistered(action.action_type)),
        }
    }

    /// Invoke the handler for `action`. A missing handler is reported as a
    /// handler failure (`Unknown`), never a panic.
    pub async fn invoke(
        &self,
        action: &Action,
        execution_id: Uuid,
        trigger: &TriggerContext,
        context: &Value,
    ) -> Result<ActionOutput, ActionError> {
        let handler = self
            .handlers
            .get(&action.action_type)
            .ok_or_else(|| unregistered(action.action_type))?;

        handler
            .invoke(ActionInput {
                execution_id,
                config: &action.config,
                trigger,
                context,
            })
            .await
    }
}

fn unregistered(action_type: ActionType) -> ActionError {
    ActionError::Unknown(format!("no handler registered for action type '{action_type}'"))
}

impl std::fmt::Debug for ActionHandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionHandlerRegistry")
            .field("types", &self.registered_types())
            .finish()
    }
}
