use std::collections::BTreeMap;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use steward_types::error::ActionError;
use steward_types::workflow::ActionType;

use crate::collaborator::{WebhookRequest, WebhookTransport};
use crate::workflow::handler::{ActionHandler, ActionInput, ActionOutput, parse_config};

const ALLOWED_METHODS: [&str; 5] = ["GET", "POST", "PUT", "PATCH", "DELETE"];

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WebhookConfig {
    url: String,
    #[serde(default = "default_method")]
    method: String,
    #[serde(default)]
    headers: BTreeMap<String, String>,
    body: Option<Value>,
}

fn default_method() -> String {
    "POST".to_string()
}

impl WebhookConfig {
    fn check(&self) -> Result<(), ActionError> {
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(ActionError::InvalidConfig(format!(
                "webhook url must be http(s): '{}'",
                self.url
            )));
        }
        if !ALLOWED_METHODS.contains(&self.method.to_ascii_uppercase().as_str()) {
            return Err(ActionError::InvalidConfig(format!(
                "unsupported webhook method '{}'",
                self.method
            )));
        }
        Ok(())
    }
}

/// `trigger-webhook`: one HTTP call, no retry.
///
/// Without an explicit `body`, the trigger snapshot is posted. A 4xx reply is
/// a configuration problem; any other non-2xx reply is a downstream outage.
pub struct TriggerWebhookHandler {
    transport: Arc<dyn WebhookTransport>,
}

impl TriggerWebhookHandler {
    pub fn new(transport: Arc<dyn WebhookTransport>) -> Self {
        Self { transport }
    }
}

impl ActionHandler for TriggerWebhookHandler {
    fn action_type(&self) -> ActionType {
        ActionType::TriggerWebhook
    }

    fn validate(&self, config: &Map<String, Value>) -> Result<(), ActionError> {
        parse_config::<WebhookConfig>(config)?.check()
    }

    fn invoke<'a>(
        &'a self,
        input: ActionInput<'a>,
    ) -> BoxFuture<'a, Result<ActionOutput, ActionError>> {
        Box::pin(async move {
            let config: WebhookConfig = parse_config(input.config)?;
            config.check()?;

            let body = config.body.unwrap_or_else(|| {
                json!({
                    "execution_id": input.execution_id,
                    "trigger": input.trigger,
                })
            });
            let request = WebhookRequest {
                url: config.url,
                method: config.method.to_ascii_uppercase(),
                headers: config.headers,
                body: Some(body),
            };

            let response = self.transport.call(&request).await?;
            match response.status {
                200..=299 => Ok(ActionOutput::new(json!({
                    "status": response.status,
                    "body": response.body,
                }))),
                400..=499 => Err(ActionError::InvalidConfig(format!(
                    "webhook {} returned {}",
                    request.url, response.status
                ))),
                status => Err(ActionError::DownstreamUnavailable(format!(
                    "webhook {} returned {status}",
                    request.url
                ))),
            }
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

    async fn call(fakes: &FakeCollaborators, cfg: Value) -> Result<ActionOutput, ActionError> {
        let handler = TriggerWebhookHandler::new(fakes.collaborators().webhooks);
        let cfg = config(cfg);
        let trigger = TriggerContext::new(TriggerType::DonationCompleted).with_donation("d1");
        handler
            .invoke(ActionInput {
                execution_id: Uuid::now_v7(),
                config: &cfg,
                trigger: &trigger,
                context: &json!({}),
            })
            .await
    }

    #[tokio::test]
    async fn posts_trigger_snapshot_by_default() {
        let fakes = FakeCollaborators::new();
        let out = call(&fakes, json!({"url": "https://hooks.example.org/gift"}))
            .await
            .unwrap();
        assert_eq!(out.result["status"], 200);

        let requests = fakes.webhook_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "POST");
        let body = requests[0].body.as_ref().unwrap();
        assert_eq!(body["trigger"]["type"], "donation-completed");
        assert_eq!(body["trigger"]["subjects"]["donation_id"], "d1");
    }

    #[tokio::test]
    async fn status_codes_map_to_error_kinds() {
        let fakes = FakeCollaborators::new();
        fakes.set_webhook_status(404);
        let err = call(&fakes, json!({"url": "https://x.test"})).await.unwrap_err();
        assert_eq!(err.kind(), ActionErrorKind::InvalidConfig);

        fakes.set_webhook_status(503);
        let err = call(&fakes, json!({"url": "https://x.test"})).await.unwrap_err();
        assert_eq!(err.kind(), ActionErrorKind::DownstreamUnavailable);
    }

    #[test]
    fn validate_checks_url_and_method() {
        let fakes = FakeCollaborators::new();
        let handler = TriggerWebhookHandler::new(fakes.collaborators().webhooks);
        assert!(handler.validate(&config(json!({"url": "https://a.test", "method": "put"}))).is_ok());
        assert!(handler.validate(&config(json!({"url": "ftp://a.test"}))).is_err());
        assert!(handler.validate(&config(json!({"url": "https://a.test", "method": "TRACE"}))).is_err());
    }
}
