//! Built-in action handlers, one per `ActionType`.

mod field;
mod group;
mod message;
mod task;
mod webhook;

use std::sync::Arc;

use serde::Deserialize;
use steward_types::error::ActionError;
use steward_types::trigger::TriggerContext;

use crate::collaborator::{Channel, Collaborators, SubjectRef};

use super::handler::ActionHandler;

pub use field::UpdateFieldHandler;
pub use group::AssignToGroupHandler;
pub use message::MessageHandler;
pub use task::CreateTaskHandler;
pub use webhook::TriggerWebhookHandler;

/// One handler per action type, wired to the given collaborators.
pub fn builtin(collaborators: Collaborators) -> Vec<Arc<dyn ActionHandler>> {
    vec![
        Arc::new(MessageHandler::new(Channel::Email, &collaborators)),
        Arc::new(MessageHandler::new(Channel::Sms, &collaborators)),
        Arc::new(MessageHandler::new(Channel::Notification, &collaborators)),
        Arc::new(CreateTaskHandler::new(collaborators.tasks.clone())),
        Arc::new(AssignToGroupHandler::new(collaborators.groups.clone())),
        Arc::new(UpdateFieldHandler::new(collaborators.records.clone())),
        Arc::new(TriggerWebhookHandler::new(collaborators.webhooks.clone())),
    ]
}

/// Which subject of the trigger an action is aimed at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum SubjectTarget {
    #[default]
    Member,
    User,
}

impl SubjectTarget {
    pub(crate) fn resolve(self, trigger: &TriggerContext) -> Result<SubjectRef, ActionError> {
        let (kind, id) = match self {
            SubjectTarget::Member => ("member", &trigger.subjects.member_id),
            SubjectTarget::User => ("user", &trigger.subjects.user_id),
        };
        let id = id.clone().ok_or_else(|| {
            ActionError::RecipientNotFound(format!("trigger carries no {kind} reference"))
        })?;
        Ok(match self {
            SubjectTarget::Member => SubjectRef::Member(id),
            SubjectTarget::User => SubjectRef::User(id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeCollaborators;
    use steward_types::error::ActionErrorKind;
    use steward_types::workflow::{ActionType, TriggerType};

    #[test]
    fn builtin_covers_every_action_type() {
        let fakes = FakeCollaborators::new();
        let handlers = builtin(fakes.collaborators());
        let mut types: Vec<ActionType> = handlers.iter().map(|h| h.action_type()).collect();
        types.sort_by_key(|t| t.as_str());
        let mut all = ActionType::ALL.to_vec();
        all.sort_by_key(|t| t.as_str());
        assert_eq!(types, all);
    }

    #[test]
    fn subject_target_requires_reference() {
        let trigger = TriggerContext::new(TriggerType::DonationCompleted).with_user("u1");
        assert_eq!(
            SubjectTarget::User.resolve(&trigger).unwrap(),
            SubjectRef::User("u1".to_string())
        );
        let err = SubjectTarget::Member.resolve(&trigger).unwrap_err();
        assert_eq!(err.kind(), ActionErrorKind::RecipientNotFound);
    }
}
