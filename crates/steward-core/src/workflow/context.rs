//! Accumulated execution context.
//!
//! `ExecutionContext` is the state that flows through one workflow execution:
//! the trigger snapshot, variables exported by earlier actions, and a per-action
//! outcome summary. It is persisted on the execution row after every action so
//! a delayed action resumes with exactly what it would have seen in-line.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use steward_types::error::ActionError;
use steward_types::trigger::TriggerContext;
use steward_types::workflow::Action;

use super::handler::ActionOutput;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum serialized size of a single action result kept in the context (256 KB).
pub const MAX_ACTION_OUTPUT_SIZE: usize = 262_144;

// ---------------------------------------------------------------------------
// ExecutionContext
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub trigger: TriggerContext,
    /// Values exported by completed actions (later exports overwrite earlier ones).
    #[serde(default)]
    pub variables: Map<String, Value>,
    /// Outcome summary per attempted action, keyed by action order.
    #[serde(default)]
    pub actions: BTreeMap<String, Value>,
}

impl ExecutionContext {
    pub fn new(trigger: TriggerContext) -> Self {
        Self {
            trigger,
            variables: Map::new(),
            actions: BTreeMap::new(),
        }
    }

    /// Record a completed action: store its result and merge its exports.
    pub fn record_output(&mut self, action: &Action, output: &ActionOutput) {
        let size = serde_json::to_string(&output.result)
            .map(|s| s.len())
            .unwrap_or(0);
        let result = if size > MAX_ACTION_OUTPUT_SIZE {
            tracing::warn!(
                action_id = %action.id,
                size,
                max = MAX_ACTION_OUTPUT_SIZE,
                "action result exceeds context size limit, truncating"
            );
            json!({"_truncated": true, "_original_size": size})
        } else {
            output.result.clone()
        };

        for (key, value) in &output.exports {
            self.variables.insert(key.clone(), value.clone());
        }
        self.actions.insert(
            action.order.to_string(),
            json!({"type": action.action_type, "status": "completed", "result": result}),
        );
    }

    pub fn record_skipped(&mut self, action: &Action) {
        self.actions.insert(
            action.order.to_string(),
            json!({"type": action.action_type, "status": "skipped"}),
        );
    }

    pub fn record_failure(&mut self, action: &Action, error: &ActionError) {
        self.actions.insert(
            action.order.to_string(),
            json!({
                "type": action.action_type,
                "status": "failed",
                "error": error.to_string(),
                "error_kind": error.kind(),
            }),
        );
    }

    /// Build the JSON object conditions and templates are evaluated against.
    ///
    /// Shape:
    /// ```json
    /// {
    ///   "trigger": { "type": "...", "fired_at": "..." },
    ///   "subjects": { "member_id": "...", ... },
    ///   "payload": { ... },
    ///   "variables": { ... },
    ///   "actions": { "<order>": { "status": "...", "result": ... } }
    /// }
    /// ```
    pub fn to_expression_context(&self) -> Value {
        json!({
            "trigger": {
                "type": self.trigger.trigger_type,
                "fired_at": self.trigger.fired_at,
            },
            "subjects": self.trigger.subjects,
            "payload": self.trigger.payload,
            "variables": self.variables,
            "actions": self.actions,
        })
    }

    /// Serialize the entire context for checkpointing.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| json!({}))
    }

    /// Restore a context from a checkpoint.
    pub fn from_json(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}
