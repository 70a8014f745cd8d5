//! `send-email`, `send-sms` and `send-notification`.
//!
//! The three messaging actions share one flow and differ only in channel:
//! resolve the recipient, render the template with the recipient merged into
//! the variables, hand the message to that channel's sender.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use steward_types::error::ActionError;
use steward_types::workflow::ActionType;

use crate::collaborator::{
    Channel, Collaborators, Contact, IdentityLookup, MessageSender, OutboundMessage, TemplateRef,
    TemplateRenderer,
};
use crate::workflow::handler::{ActionHandler, ActionInput, ActionOutput, parse_config};

use super::SubjectTarget;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MessageConfig {
    #[serde(default)]
    recipient: SubjectTarget,
    template_id: Option<String>,
    subject: Option<String>,
    body: Option<String>,
}

impl MessageConfig {
    fn template(&self) -> Result<TemplateRef, ActionError> {
        if self.template_id.is_some() && self.subject.is_some() {
            return Err(ActionError::InvalidConfig(
                "subject comes from the library template; drop subject or template_id".to_string(),
            ));
        }
        match (&self.template_id, &self.body) {
            (Some(id), None) => Ok(TemplateRef::Library(id.clone())),
            (None, Some(body)) => Ok(TemplateRef::Inline {
                subject: self.subject.clone(),
                body: body.clone(),
            }),
            (Some(_), Some(_)) => Err(ActionError::InvalidConfig(
                "set either template_id or body, not both".to_string(),
            )),
            (None, None) => Err(ActionError::InvalidConfig(
                "one of template_id or body is required".to_string(),
            )),
        }
    }
}

pub struct MessageHandler {
    channel: Channel,
    identity: Arc<dyn IdentityLookup>,
    sender: Arc<dyn MessageSender>,
    templates: Arc<dyn TemplateRenderer>,
}

impl MessageHandler {
    pub fn new(channel: Channel, collaborators: &Collaborators) -> Self {
        Self {
            channel,
            identity: collaborators.identity.clone(),
            sender: collaborators.sender(channel).clone(),
            templates: collaborators.templates.clone(),
        }
    }

    fn address(&self, contact: &Contact) -> Option<String> {
        match self.channel {
            Channel::Email => contact.email.clone(),
            Channel::Sms => contact.phone.clone(),
            Channel::Notification => Some(contact.id.clone()),
        }
    }
}

impl ActionHandler for MessageHandler {
    fn action_type(&self) -> ActionType {
        match self.channel {
            Channel::Email => ActionType::SendEmail,
            Channel::Sms => ActionType::SendSms,
            Channel::Notification => ActionType::SendNotification,
        }
    }

    fn validate(&self, config: &Map<String, Value>) -> Result<(), ActionError> {
        let config: MessageConfig = parse_config(config)?;
        config.template().map(|_| ())
    }

    fn invoke<'a>(
        &'a self,
        input: ActionInput<'a>,
    ) -> BoxFuture<'a, Result<ActionOutput, ActionError>> {
        Box::pin(async move {
            let config: MessageConfig = parse_config(input.config)?;
            let template = config.template()?;
            let subject = config.recipient.resolve(input.trigger)?;

            let contact = self.identity.resolve(&subject).await?;
            let address = self.address(&contact).ok_or_else(|| {
                ActionError::RecipientNotFound(format!("{subject} has no {} address", self.channel))
            })?;

            let mut variables = input.context.clone();
            if let Value::Object(map) = &mut variables {
                let contact_value = serde_json::to_value(&contact).unwrap_or_default();
                map.insert(subject.kind().to_string(), contact_value.clone());
                map.insert("recipient".to_string(), contact_value);
            }
            let rendered = self.templates.render(&template, &variables)?;

            let message = OutboundMessage {
                channel: self.channel,
                recipient: contact,
                address: address.clone(),
                subject: rendered.subject,
                body: rendered.body,
                execution_id: input.execution_id,
            };
            let receipt = self.sender.send(&message).await?;

            tracing::debug!(
                execution_id = %input.execution_id,
                channel = %self.channel,
                message_id = %receipt.message_id,
                "message handed to sender"
            );

            Ok(ActionOutput::new(json!({
                "channel": self.channel,
                "recipient": message.recipient.id,
                "address": address,
                "message_id": receipt.message_id,
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

    fn config(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    async fn invoke(
        handler: &MessageHandler,
        config: &Map<String, Value>,
        trigger: &TriggerContext,
    ) -> Result<ActionOutput, ActionError> {
        handler
            .invoke(ActionInput {
                execution_id: Uuid::now_v7(),
                config,
                trigger,
                context: &json!({"payload": trigger.payload}),
            })
            .await
    }

    #[tokio::test]
    async fn email_renders_with_recipient_and_sends_once() {
        let fakes = FakeCollaborators::new();
        fakes.add_member("m1", "Ruth", Some("ruth@example.org"), None);
        let handler = MessageHandler::new(Channel::Email, &fakes.collaborators());

        let trigger = TriggerContext::new(TriggerType::DonationCompleted)
            .with_member("m1")
            .with_payload("amount", json!(50));
        let cfg = config(json!({
            "subject": "Thank you {{ member.display_name }}",
            "body": "We received ${{ payload.amount }}."
        }));

        let out = invoke(&handler, &cfg, &trigger).await.unwrap();
        assert_eq!(out.result["address"], "ruth@example.org");

        let sent = fakes.sent(Channel::Email);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].address, "ruth@example.org");
        assert_eq!(sent[0].subject.as_deref(), Some("Thank you Ruth"));
        assert_eq!(sent[0].body, "We received $50.");
    }

    #[tokio::test]
    async fn sms_without_phone_is_recipient_not_found() {
        let fakes = FakeCollaborators::new();
        fakes.add_member("m1", "Ruth", Some("ruth@example.org"), None);
        let handler = MessageHandler::new(Channel::Sms, &fakes.collaborators());

        let trigger = TriggerContext::new(TriggerType::EventCheckedIn).with_member("m1");
        let err = invoke(&handler, &config(json!({"body": "hi"})), &trigger)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ActionErrorKind::RecipientNotFound);
        assert!(fakes.sent(Channel::Sms).is_empty());
    }

    #[tokio::test]
    async fn unknown_member_is_recipient_not_found() {
        let fakes = FakeCollaborators::new();
        let handler = MessageHandler::new(Channel::Notification, &fakes.collaborators());

        let trigger = TriggerContext::new(TriggerType::GroupJoined).with_member("ghost");
        let err = invoke(&handler, &config(json!({"body": "hi"})), &trigger)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ActionErrorKind::RecipientNotFound);
    }

    #[tokio::test]
    async fn sender_outage_is_downstream_unavailable() {
        let fakes = FakeCollaborators::new();
        fakes.add_member("m1", "Ruth", Some("ruth@example.org"), None);
        fakes.fail_sends(true);
        let handler = MessageHandler::new(Channel::Email, &fakes.collaborators());

        let trigger = TriggerContext::new(TriggerType::MemberCreated).with_member("m1");
        let err = invoke(&handler, &config(json!({"body": "hi"})), &trigger)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ActionErrorKind::DownstreamUnavailable);
    }

    #[test]
    fn validate_requires_exactly_one_text_source() {
        let fakes = FakeCollaborators::new();
        let handler = MessageHandler::new(Channel::Email, &fakes.collaborators());

        assert!(handler.validate(&config(json!({"template_id": "welcome"}))).is_ok());
        assert!(handler.validate(&config(json!({"body": "x", "recipient": "user"}))).is_ok());
        assert!(handler.validate(&config(json!({}))).is_err());
        assert!(
            handler
                .validate(&config(json!({"template_id": "welcome", "body": "x"})))
                .is_err()
        );
        assert!(handler.validate(&config(json!({"body": "x", "bogus": 1}))).is_err());
    }

    #[test]
    fn validate_rejects_subject_alongside_template_id() {
        let fakes = FakeCollaborators::new();
        let handler = MessageHandler::new(Channel::Email, &fakes.collaborators());

        let err = handler
            .validate(&config(json!({"template_id": "welcome", "subject": "Hi"})))
            .unwrap_err();
        assert_eq!(err.kind(), ActionErrorKind::InvalidConfig);
        assert!(
            handler
                .validate(&config(json!({"subject": "Hi", "body": "x"})))
                .is_ok()
        );
    }
}
