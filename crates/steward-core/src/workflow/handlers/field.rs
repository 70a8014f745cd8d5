use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use steward_types::error::ActionError;
use steward_types::workflow::ActionType;

use crate::collaborator::RecordMutator;
use crate::workflow::handler::{ActionHandler, ActionInput, ActionOutput, parse_config};
use crate::workflow::template::render_text;

use super::SubjectTarget;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct UpdateFieldConfig {
    field: String,
    value: Value,
    #[serde(default)]
    target: SubjectTarget,
}

/// `update-field`: set one field on the trigger's member (or user) record.
///
/// The new value is exported under the field name, so later conditions can
/// test it (`variables.status == 'visited'`). String values are rendered as
/// templates first.
pub struct UpdateFieldHandler {
    records: Arc<dyn RecordMutator>,
}

impl UpdateFieldHandler {
    pub fn new(records: Arc<dyn RecordMutator>) -> Self {
        Self { records }
    }
}

fn check_field_name(field: &str) -> Result<(), ActionError> {
    let mut chars = field.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ActionError::InvalidConfig(format!("invalid field name '{field}'")))
    }
}

impl ActionHandler for UpdateFieldHandler {
    fn action_type(&self) -> ActionType {
        ActionType::UpdateField
    }

    fn validate(&self, config: &Map<String, Value>) -> Result<(), ActionError> {
        let config: UpdateFieldConfig = parse_config(config)?;
        check_field_name(&config.field)
    }

    fn invoke<'a>(
        &'a self,
        input: ActionInput<'a>,
    ) -> BoxFuture<'a, Result<ActionOutput, ActionError>> {
        Box::pin(async move {
            let config: UpdateFieldConfig = parse_config(input.config)?;
            check_field_name(&config.field)?;
            let subject = config.target.resolve(input.trigger)?;

            let value = match config.value {
                Value::String(s) => Value::String(render_text(&s, input.context)),
                other => other,
            };

            self.records
                .update_field(&subject, &config.field, &value)
                .await?;

            Ok(ActionOutput::new(json!({
                "target": subject,
                "field": config.field,
                "value": value,
            }))
            .with_export(config.field, value))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborator::SubjectRef;
    use crate::testing::FakeCollaborators;
    use steward_types::trigger::TriggerContext;
    use steward_types::workflow::TriggerType;
    use uuid::Uuid;

    #[tokio::test]
    async fn sets_field_and_exports_value() {
        let fakes = FakeCollaborators::new();
        fakes.add_member("m1", "Ruth", None, None);
        let handler = UpdateFieldHandler::new(fakes.collaborators().records);
        let config = json!({"field": "status", "value": "visited"})
            .as_object()
            .cloned()
            .unwrap();
        let trigger = TriggerContext::new(TriggerType::EventCheckedIn).with_member("m1");

        let out = handler
            .invoke(ActionInput {
                execution_id: Uuid::now_v7(),
                config: &config,
                trigger: &trigger,
                context: &json!({}),
            })
            .await
            .unwrap();

        assert_eq!(out.exports["status"], "visited");
        assert_eq!(
            fakes.field(&SubjectRef::Member("m1".to_string()), "status"),
            Some(json!("visited"))
        );
    }

    #[tokio::test]
    async fn string_values_are_rendered() {
        let fakes = FakeCollaborators::new();
        fakes.add_member("m1", "Ruth", None, None);
        let handler = UpdateFieldHandler::new(fakes.collaborators().records);
        let config = json!({"field": "last_event", "value": "{{ payload.event_name }}"})
            .as_object()
            .cloned()
            .unwrap();
        let trigger = TriggerContext::new(TriggerType::EventCheckedIn).with_member("m1");

        let out = handler
            .invoke(ActionInput {
                execution_id: Uuid::now_v7(),
                config: &config,
                trigger: &trigger,
                context: &json!({"payload": {"event_name": "Easter"}}),
            })
            .await
            .unwrap();
        assert_eq!(out.result["value"], "Easter");
    }

    #[test]
    fn field_names_are_identifiers() {
        assert!(check_field_name("status").is_ok());
        assert!(check_field_name("_first_visit2").is_ok());
        assert!(check_field_name("").is_err());
        assert!(check_field_name("2nd").is_err());
        assert!(check_field_name("name; DROP TABLE").is_err());
    }
}
