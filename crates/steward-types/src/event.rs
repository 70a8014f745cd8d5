//! Engine events broadcast while workflows execute.
//!
//! Observational only: the execution audit trail is the source of truth.
//! All variants are Clone + Send + Sync for use with tokio broadcast channels.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::workflow::{ActionType, TriggerType};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    ExecutionStarted {
        execution_id: Uuid,
        workflow_id: Uuid,
        workflow_name: String,
        trigger_type: TriggerType,
    },

    ActionCompleted {
        execution_id: Uuid,
        action_id: Uuid,
        action_type: ActionType,
        duration_ms: u64,
    },

    ActionSkipped {
        execution_id: Uuid,
        action_id: Uuid,
        action_type: ActionType,
    },

    ActionFailed {
        execution_id: Uuid,
        action_id: Uuid,
        action_type: ActionType,
        error: String,
    },

    /// The action is waiting on the delay queue; the execution is suspended.
    ActionDelayed {
        execution_id: Uuid,
        action_id: Uuid,
        delay_secs: u64,
    },

    ExecutionCompleted {
        execution_id: Uuid,
        workflow_name: String,
        actions_completed: u32,
        actions_failed: u32,
        actions_skipped: u32,
    },

    ExecutionFailed {
        execution_id: Uuid,
        workflow_name: String,
        error: String,
    },
}

impl EngineEvent {
    pub fn execution_id(&self) -> Uuid {
        match self {
            EngineEvent::ExecutionStarted { execution_id, .. }
            | EngineEvent::ActionCompleted { execution_id, .. }
            | EngineEvent::ActionSkipped { execution_id, .. }
            | EngineEvent::ActionFailed { execution_id, .. }
            | EngineEvent::ActionDelayed { execution_id, .. }
            | EngineEvent::ExecutionCompleted { execution_id, .. }
            | EngineEvent::ExecutionFailed { execution_id, .. } => *execution_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_type_tag() {
        let event = EngineEvent::ActionSkipped {
            execution_id: Uuid::nil(),
            action_id: Uuid::nil(),
            action_type: ActionType::SendSms,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "action_skipped");
        assert_eq!(json["action_type"], "send-sms");

        let parsed: EngineEvent = serde_json::from_value(json).unwrap();
        assert!(matches!(parsed, EngineEvent::ActionSkipped { .. }));
    }

    #[test]
    fn execution_id_accessor() {
        let id = Uuid::now_v7();
        let event = EngineEvent::ExecutionFailed {
            execution_id: id,
            workflow_name: "welcome".to_string(),
            error: "recorder unavailable".to_string(),
        };
        assert_eq!(event.execution_id(), id);
    }
}
