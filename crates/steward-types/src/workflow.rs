//! Workflow definition types for Steward.
//!
//! A `Workflow` is a named automation rule: it listens for one trigger type
//! and owns an ordered list of `Action`s. Actions are embedded in the
//! workflow, so deleting a workflow deletes its actions with it.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Trigger type
// ---------------------------------------------------------------------------

/// The domain event a workflow listens for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TriggerType {
    MemberCreated,
    MemberUpdated,
    DonationCompleted,
    EventRegistered,
    EventCheckedIn,
    GroupJoined,
}

impl TriggerType {
    pub const ALL: [TriggerType; 6] = [
        TriggerType::MemberCreated,
        TriggerType::MemberUpdated,
        TriggerType::DonationCompleted,
        TriggerType::EventRegistered,
        TriggerType::EventCheckedIn,
        TriggerType::GroupJoined,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerType::MemberCreated => "member-created",
            TriggerType::MemberUpdated => "member-updated",
            TriggerType::DonationCompleted => "donation-completed",
            TriggerType::EventRegistered => "event-registered",
            TriggerType::EventCheckedIn => "event-checked-in",
            TriggerType::GroupJoined => "group-joined",
        }
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TriggerType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown trigger type: '{s}'"))
    }
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// Lifecycle status of a workflow definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    #[default]
    Draft,
    Active,
    Paused,
    Archived,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Draft => "draft",
            WorkflowStatus::Active => "active",
            WorkflowStatus::Paused => "paused",
            WorkflowStatus::Archived => "archived",
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(WorkflowStatus::Draft),
            "active" => Ok(WorkflowStatus::Active),
            "paused" => Ok(WorkflowStatus::Paused),
            "archived" => Ok(WorkflowStatus::Archived),
            other => Err(format!("unknown workflow status: '{other}'")),
        }
    }
}

/// A named automation rule.
///
/// YAML imports and the persisted JSON blob both deserialize into this struct.
/// Identifiers and timestamps are generated when a YAML file omits them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// UUIDv7 assigned on first import.
    #[serde(default = "Uuid::now_v7")]
    pub id: Uuid,
    /// Human-readable workflow name.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Domain event this workflow listens for.
    pub trigger_type: TriggerType,
    /// Operator kill-switch, independent of the lifecycle status.
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub status: WorkflowStatus,
    /// Actions in declaration order; execution order is by `Action::order`.
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    /// A new draft workflow with no actions.
    pub fn new(name: impl Into<String>, trigger_type: TriggerType) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            description: None,
            trigger_type,
            is_active: false,
            status: WorkflowStatus::Draft,
            actions: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether a trigger of `trigger_type` should start an execution of this workflow.
    pub fn matches(&self, trigger_type: TriggerType) -> bool {
        self.is_enabled() && self.trigger_type == trigger_type
    }

    /// Active flag set and lifecycle status `active`.
    pub fn is_enabled(&self) -> bool {
        self.is_active && self.status == WorkflowStatus::Active
    }

    /// Actions sorted by their `order` value.
    pub fn ordered_actions(&self) -> Vec<&Action> {
        let mut actions: Vec<&Action> = self.actions.iter().collect();
        actions.sort_by_key(|a| a.order);
        actions
    }

    pub fn action(&self, action_id: &Uuid) -> Option<&Action> {
        self.actions.iter().find(|a| &a.id == action_id)
    }
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// The side effect an action performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionType {
    SendEmail,
    SendSms,
    SendNotification,
    CreateTask,
    AssignToGroup,
    UpdateField,
    TriggerWebhook,
}

impl ActionType {
    pub const ALL: [ActionType; 7] = [
        ActionType::SendEmail,
        ActionType::SendSms,
        ActionType::SendNotification,
        ActionType::CreateTask,
        ActionType::AssignToGroup,
        ActionType::UpdateField,
        ActionType::TriggerWebhook,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::SendEmail => "send-email",
            ActionType::SendSms => "send-sms",
            ActionType::SendNotification => "send-notification",
            ActionType::CreateTask => "create-task",
            ActionType::AssignToGroup => "assign-to-group",
            ActionType::UpdateField => "update-field",
            ActionType::TriggerWebhook => "trigger-webhook",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown action type: '{s}'"))
    }
}

/// Longest delay an action may declare: ten years.
pub const MAX_DELAY_SECS: u64 = 10 * 366 * 24 * 60 * 60;

/// One ordered step of a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    #[serde(default = "Uuid::now_v7")]
    pub id: Uuid,
    #[serde(rename = "type")]
    pub action_type: ActionType,
    /// Position in the workflow; unique within the workflow.
    pub order: i32,
    /// JEXL condition gating the action. Absent means always run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Seconds to wait before invoking the handler.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub delay_secs: u64,
    /// Type-specific parameters (template id, group id, webhook URL, ...).
    #[serde(default)]
    pub config: Map<String, Value>,
}

fn is_zero(v: &u64) -> bool {
    *v == 0
}

impl Action {
    pub fn new(action_type: ActionType, order: i32) -> Self {
        Self {
            id: Uuid::now_v7(),
            action_type,
            order,
            condition: None,
            delay_secs: 0,
            config: Map::new(),
        }
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn with_delay_secs(mut self, delay_secs: u64) -> Self {
        self.delay_secs = delay_secs;
        self
    }

    /// Replace the config with the entries of a JSON object (non-objects clear it).
    pub fn with_config(mut self, config: Value) -> Self {
        self.config = match config {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        self
    }

    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn action(order: i32, action_type: ActionType) -> Action {
        Action {
            id: Uuid::now_v7(),
            action_type,
            order,
            condition: None,
            delay_secs: 0,
            config: Map::new(),
        }
    }

    fn workflow() -> Workflow {
        Workflow {
            id: Uuid::now_v7(),
            name: "welcome".to_string(),
            description: None,
            trigger_type: TriggerType::MemberCreated,
            is_active: true,
            status: WorkflowStatus::Active,
            actions: vec![
                action(3, ActionType::TriggerWebhook),
                action(1, ActionType::UpdateField),
                action(2, ActionType::SendSms),
            ],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn trigger_type_str_roundtrip() {
        for t in TriggerType::ALL {
            assert_eq!(t.as_str().parse::<TriggerType>().unwrap(), t);
            let json = serde_json::to_value(t).unwrap();
            assert_eq!(json, json!(t.as_str()));
        }
        assert!("member-deleted".parse::<TriggerType>().is_err());
    }

    #[test]
    fn action_type_str_roundtrip() {
        for t in ActionType::ALL {
            assert_eq!(t.as_str().parse::<ActionType>().unwrap(), t);
            assert_eq!(serde_json::to_value(t).unwrap(), json!(t.as_str()));
        }
    }

    #[test]
    fn ordered_actions_sorts_by_order() {
        let wf = workflow();
        let orders: Vec<i32> = wf.ordered_actions().iter().map(|a| a.order).collect();
        assert_eq!(orders, vec![1, 2, 3]);
    }

    #[test]
    fn matches_requires_active_flag_status_and_type() {
        let mut wf = workflow();
        assert!(wf.matches(TriggerType::MemberCreated));
        assert!(!wf.matches(TriggerType::DonationCompleted));

        wf.is_active = false;
        assert!(!wf.matches(TriggerType::MemberCreated));

        wf.is_active = true;
        wf.status = WorkflowStatus::Paused;
        assert!(!wf.matches(TriggerType::MemberCreated));
    }

    #[test]
    fn yaml_defaults_fill_ids_and_status() {
        let yaml = r#"
name: welcome-email
trigger_type: member-created
actions:
  - type: send-email
    order: 1
    config:
      template_id: welcome
  - type: send-sms
    order: 2
    delay_secs: 300
    condition: "variables.status == 'visited'"
    config:
      body: "Hi {{ member.display_name }}"
"#;
        let wf: Workflow = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(wf.status, WorkflowStatus::Draft);
        assert!(!wf.is_active);
        assert_eq!(wf.actions.len(), 2);
        assert_ne!(wf.actions[0].id, wf.actions[1].id);
        assert_eq!(wf.actions[1].delay(), Duration::from_secs(300));
        assert_eq!(wf.actions[0].config["template_id"], json!("welcome"));
    }

    #[test]
    fn workflow_status_parse() {
        assert_eq!("paused".parse::<WorkflowStatus>().unwrap(), WorkflowStatus::Paused);
        assert!("deleted".parse::<WorkflowStatus>().is_err());
    }
}
