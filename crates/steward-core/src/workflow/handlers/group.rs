use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use steward_types::error::ActionError;
use steward_types::workflow::ActionType;

use crate::collaborator::GroupMembership;
use crate::workflow::handler::{ActionHandler, ActionInput, ActionOutput, parse_config};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AssignToGroupConfig {
    group_id: String,
    role: Option<String>,
}

/// `assign-to-group`: upsert the trigger's member into a group.
pub struct AssignToGroupHandler {
    groups: Arc<dyn GroupMembership>,
}

impl AssignToGroupHandler {
    pub fn new(groups: Arc<dyn GroupMembership>) -> Self {
        Self { groups }
    }
}

impl ActionHandler for AssignToGroupHandler {
    fn action_type(&self) -> ActionType {
        ActionType::AssignToGroup
    }

    fn validate(&self, config: &Map<String, Value>) -> Result<(), ActionError> {
        let config: AssignToGroupConfig = parse_config(config)?;
        if config.group_id.trim().is_empty() {
            return Err(ActionError::InvalidConfig("group_id must not be empty".to_string()));
        }
        Ok(())
    }

    fn invoke<'a>(
        &'a self,
        input: ActionInput<'a>,
    ) -> BoxFuture<'a, Result<ActionOutput, ActionError>> {
        Box::pin(async move {
            let config: AssignToGroupConfig = parse_config(input.config)?;
            let member_id = input.trigger.subjects.member_id.as_deref().ok_or_else(|| {
                ActionError::RecipientNotFound("trigger carries no member reference".to_string())
            })?;

            let added = self
                .groups
                .upsert_member(&config.group_id, member_id, config.role.as_deref())
                .await?;

            Ok(ActionOutput::new(json!({
                "group_id": config.group_id,
                "member_id": member_id,
                "added": added,
            })))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeCollaborators;
    use steward_types::error::ActionErrorKind;
    use steward_types::trigger::TriggerContext;
    use steward_types::workflow::TriggerType;
    use uuid::Uuid;

    #[tokio::test]
    async fn upserts_membership_idempotently() {
        let fakes = FakeCollaborators::new();
        let handler = AssignToGroupHandler::new(fakes.collaborators().groups);
        let config = json!({"group_id": "newcomers", "role": "guest"})
            .as_object()
            .cloned()
            .unwrap();
        let trigger = TriggerContext::new(TriggerType::MemberCreated).with_member("m1");
        let input = ActionInput {
            execution_id: Uuid::now_v7(),
            config: &config,
            trigger: &trigger,
            context: &json!({}),
        };

        let first = handler.invoke(input).await.unwrap();
        let second = handler.invoke(input).await.unwrap();

        assert_eq!(first.result["added"], true);
        assert_eq!(second.result["added"], false);
        assert_eq!(
            fakes.memberships(),
            vec![("newcomers".to_string(), "m1".to_string(), Some("guest".to_string()))]
        );
    }

    #[tokio::test]
    async fn missing_member_reference_fails() {
        let fakes = FakeCollaborators::new();
        let handler = AssignToGroupHandler::new(fakes.collaborators().groups);
        let config = json!({"group_id": "g1"}).as_object().cloned().unwrap();
        let trigger = TriggerContext::new(TriggerType::EventRegistered).with_event("e1");

        let err = handler
            .invoke(ActionInput {
                execution_id: Uuid::now_v7(),
                config: &config,
                trigger: &trigger,
                context: &json!({}),
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ActionErrorKind::RecipientNotFound);
    }

    #[test]
    fn validate_rejects_blank_group() {
        let fakes = FakeCollaborators::new();
        let handler = AssignToGroupHandler::new(fakes.collaborators().groups);
        let blank = json!({"group_id": " "}).as_object().cloned().unwrap();
        assert!(handler.validate(&blank).is_err());
        assert!(handler.validate(&Map::new()).is_err());
    }
}
