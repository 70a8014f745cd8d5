//! Trigger context: the ephemeral value raised by business operations.
//!
//! A `TriggerContext` is never persisted on its own. It is snapshotted into
//! each `WorkflowExecution` it starts, for audit and replay.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::workflow::TriggerType;

/// Identifiers of the records a trigger is about.
///
/// Zero or more may be set; they are not mutually exclusive (a donation
/// trigger usually carries both a donation and a member reference).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectRefs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub donation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
}

/// A domain event that may start workflow executions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerContext {
    #[serde(rename = "type")]
    pub trigger_type: TriggerType,
    #[serde(default)]
    pub subjects: SubjectRefs,
    /// Open, action-specific data (donation amount, event name, ...).
    #[serde(default)]
    pub payload: Map<String, Value>,
    #[serde(default = "Utc::now")]
    pub fired_at: DateTime<Utc>,
}

impl TriggerContext {
    pub fn new(trigger_type: TriggerType) -> Self {
        Self {
            trigger_type,
            subjects: SubjectRefs::default(),
            payload: Map::new(),
            fired_at: Utc::now(),
        }
    }

    pub fn with_member(mut self, member_id: impl Into<String>) -> Self {
        self.subjects.member_id = Some(member_id.into());
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.subjects.user_id = Some(user_id.into());
        self
    }

    pub fn with_donation(mut self, donation_id: impl Into<String>) -> Self {
        self.subjects.donation_id = Some(donation_id.into());
        self
    }

    pub fn with_event(mut self, event_id: impl Into<String>) -> Self {
        self.subjects.event_id = Some(event_id.into());
        self
    }

    pub fn with_group(mut self, group_id: impl Into<String>) -> Self {
        self.subjects.group_id = Some(group_id.into());
        self
    }

    pub fn with_payload(mut self, key: impl Into<String>, value: Value) -> Self {
        self.payload.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_sets_subjects_and_payload() {
        let ctx = TriggerContext::new(TriggerType::DonationCompleted)
            .with_member("m1")
            .with_donation("d9")
            .with_payload("amount", json!(50));

        assert_eq!(ctx.subjects.member_id.as_deref(), Some("m1"));
        assert_eq!(ctx.subjects.donation_id.as_deref(), Some("d9"));
        assert!(ctx.subjects.event_id.is_none());
        assert_eq!(ctx.payload["amount"], json!(50));
    }

    #[test]
    fn deserialize_minimal_json() {
        let ctx: TriggerContext =
            serde_json::from_value(json!({"type": "member-created", "subjects": {"member_id": "m1"}}))
                .unwrap();
        assert_eq!(ctx.trigger_type, TriggerType::MemberCreated);
        assert_eq!(ctx.subjects.member_id.as_deref(), Some("m1"));
        assert!(ctx.payload.is_empty());
    }

    #[test]
    fn unset_subjects_are_omitted() {
        let ctx = TriggerContext::new(TriggerType::GroupJoined).with_group("g1");
        let value = serde_json::to_value(&ctx).unwrap();
        assert_eq!(value["subjects"], json!({"group_id": "g1"}));
    }
}
