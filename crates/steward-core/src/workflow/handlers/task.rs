use std::sync::Arc;

use chrono::{Duration, Utc};
use futures_util::future::BoxFuture;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use steward_types::error::ActionError;
use steward_types::workflow::ActionType;

use crate::collaborator::{NewTask, TaskCreator};
use crate::workflow::handler::{ActionHandler, ActionInput, ActionOutput, parse_config};
use crate::workflow::template::render_text;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CreateTaskConfig {
    title: String,
    description: Option<String>,
    assignee_id: Option<String>,
    due_in_days: Option<u32>,
}

/// `create-task`: open a follow-up task, linked to the trigger's member if any.
pub struct CreateTaskHandler {
    tasks: Arc<dyn TaskCreator>,
}

impl CreateTaskHandler {
    pub fn new(tasks: Arc<dyn TaskCreator>) -> Self {
        Self { tasks }
    }
}

impl ActionHandler for CreateTaskHandler {
    fn action_type(&self) -> ActionType {
        ActionType::CreateTask
    }

    fn validate(&self, config: &Map<String, Value>) -> Result<(), ActionError> {
        let config: CreateTaskConfig = parse_config(config)?;
        if config.title.trim().is_empty() {
            return Err(ActionError::InvalidConfig("title must not be empty".to_string()));
        }
        Ok(())
    }

    fn invoke<'a>(
        &'a self,
        input: ActionInput<'a>,
    ) -> BoxFuture<'a, Result<ActionOutput, ActionError>> {
        Box::pin(async move {
            let config: CreateTaskConfig = parse_config(input.config)?;

            let task = NewTask {
                title: render_text(&config.title, input.context),
                description: config
                    .description
                    .as_deref()
                    .map(|d| render_text(d, input.context)),
                assignee_id: config.assignee_id,
                member_id: input.trigger.subjects.member_id.clone(),
                due_at: config
                    .due_in_days
                    .map(|days| Utc::now() + Duration::days(i64::from(days))),
                execution_id: input.execution_id,
            };
            let task_id = self.tasks.create_task(&task).await?;

            Ok(ActionOutput::new(json!({
                "task_id": task_id,
                "title": task.title,
                "due_at": task.due_at,
            }))
            .with_export("task_id", json!(task_id)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeCollaborators;
    use steward_types::trigger::TriggerContext;
    use steward_types::workflow::TriggerType;
    use uuid::Uuid;

    #[tokio::test]
    async fn creates_rendered_task_linked_to_member() {
        let fakes = FakeCollaborators::new();
        let handler = CreateTaskHandler::new(fakes.collaborators().tasks);
        let config = json!({
            "title": "Call {{ payload.first_name }}",
            "assignee_id": "pastor-1",
            "due_in_days": 3
        })
        .as_object()
        .cloned()
        .unwrap();
        let trigger = TriggerContext::new(TriggerType::MemberCreated).with_member("m1");

        let out = handler
            .invoke(ActionInput {
                execution_id: Uuid::now_v7(),
                config: &config,
                trigger: &trigger,
                context: &json!({"payload": {"first_name": "Naomi"}}),
            })
            .await
            .unwrap();

        let tasks = fakes.tasks();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "Call Naomi");
        assert_eq!(tasks[0].member_id.as_deref(), Some("m1"));
        assert!(tasks[0].due_at.is_some());
        assert_eq!(out.exports["task_id"], out.result["task_id"]);
    }

    #[test]
    fn validate_requires_title() {
        let fakes = FakeCollaborators::new();
        let handler = CreateTaskHandler::new(fakes.collaborators().tasks);
        assert!(handler.validate(&Map::new()).is_err());
        let blank = json!({"title": ""}).as_object().cloned().unwrap();
        assert!(handler.validate(&blank).is_err());
    }
}
