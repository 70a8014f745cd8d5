//! Application state wiring the automation engine together.
//!
//! The engine is generic over its repositories; AppState pins it to the
//! SQLite implementations and hands every built-in handler the SQLite
//! directory, the outbox senders, the template library and the HTTP
//! webhook transport.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use steward_core::collaborator::Collaborators;
use steward_core::event::EventBus;
use steward_core::workflow::definition::WorkflowCatalog;
use steward_core::workflow::delay::{DelayScheduler, DelaySettings};
use steward_core::workflow::dispatcher::WorkflowDispatcher;
use steward_core::workflow::handler::ActionHandlerRegistry;
use steward_core::workflow::runner::WorkflowRunner;
use steward_core::workflow::template::TemplateLibrary;
use steward_infra::config::{load_engine_config, resolve_data_dir};
use steward_infra::http::webhook::HttpWebhookTransport;
use steward_infra::sqlite::delay::SqliteDelayRepository;
use steward_infra::sqlite::directory::SqliteDirectory;
use steward_infra::sqlite::outbox::SqliteOutbox;
use steward_infra::sqlite::pool::{DatabasePool, database_url};
use steward_infra::sqlite::workflow::SqliteWorkflowRepository;
use steward_types::config::EngineConfig;

/// Concrete type aliases for the engine generics pinned to infra implementations.
pub type ConcreteRunner = WorkflowRunner<SqliteWorkflowRepository, SqliteDelayRepository>;
pub type ConcreteDispatcher = WorkflowDispatcher<SqliteWorkflowRepository, SqliteDelayRepository>;
pub type ConcreteCatalog = WorkflowCatalog<SqliteWorkflowRepository>;

/// Shared application state holding the wired engine.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<EngineConfig>,
    pub data_dir: PathBuf,
    pub db_pool: DatabasePool,
    pub workflows: Arc<SqliteWorkflowRepository>,
    pub delays: Arc<SqliteDelayRepository>,
    pub catalog: Arc<ConcreteCatalog>,
    pub dispatcher: ConcreteDispatcher,
    pub directory: SqliteDirectory,
    pub outbox: SqliteOutbox,
    pub events: EventBus,
}

impl AppState {
    /// Resolve the data directory, load config, open the database and wire the engine.
    pub async fn init(data_dir: Option<PathBuf>) -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir(data_dir)?;
        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

        let config = load_engine_config(&data_dir).await;

        let db_pool = DatabasePool::new(&database_url(&data_dir))
            .await
            .context("failed to open the steward database")?;

        let workflows = Arc::new(SqliteWorkflowRepository::new(db_pool.clone()));
        let delays = Arc::new(SqliteDelayRepository::new(db_pool.clone()));
        let directory = SqliteDirectory::new(db_pool.clone());
        let outbox = SqliteOutbox::new(db_pool.clone());

        let webhooks = HttpWebhookTransport::new(Duration::from_secs(config.webhook_timeout_secs))
            .context("failed to build the webhook HTTP client")?;

        // All three channels share the outbox; the channel is recorded per row.
        let collaborators = Collaborators {
            identity: Arc::new(directory.clone()),
            email: Arc::new(outbox.clone()),
            sms: Arc::new(outbox.clone()),
            notifications: Arc::new(outbox.clone()),
            templates: Arc::new(TemplateLibrary::new(config.templates.clone())),
            groups: Arc::new(directory.clone()),
            records: Arc::new(directory.clone()),
            tasks: Arc::new(directory.clone()),
            webhooks: Arc::new(webhooks),
        };
        let registry = Arc::new(ActionHandlerRegistry::with_builtin_handlers(collaborators));

        let events = EventBus::new(config.event_bus_capacity);
        let scheduler = Arc::new(DelayScheduler::new(
            Arc::clone(&delays),
            DelaySettings::from(&config),
        ));
        let runner: ConcreteRunner = WorkflowRunner::new(
            Arc::clone(&workflows),
            scheduler,
            Arc::clone(&registry),
            events.clone(),
        )
        .with_inactive_resume(config.inactive_resume);

        let dispatcher = WorkflowDispatcher::new(Arc::new(runner));
        let catalog = Arc::new(WorkflowCatalog::new(Arc::clone(&workflows), registry));

        tracing::debug!(
            data_dir = %data_dir.display(),
            templates = config.templates.len(),
            "steward engine wired"
        );

        Ok(Self {
            config: Arc::new(config),
            data_dir,
            db_pool,
            workflows,
            delays,
            catalog,
            dispatcher,
            directory,
            outbox,
            events,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use steward_core::collaborator::{Channel, Contact, SubjectRef};
    use steward_core::repository::workflow::WorkflowRepository;
    use steward_types::execution::ExecutionStatus;
    use steward_types::trigger::TriggerContext;
    use steward_types::workflow::TriggerType;
    use tempfile::TempDir;

    const WELCOME_YAML: &str = r#"
name: Welcome
trigger_type: member-created
actions:
  - type: send-email
    order: 1
    config:
      subject: "Welcome, {{ member.display_name }}"
      body: "See you Sunday."
  - type: assign-to-group
    order: 2
    config:
      group_id: newcomers
  - type: create-task
    order: 3
    delay_secs: 3600
    config:
      title: "Call {{ member.display_name }}"
"#;

    #[tokio::test]
    async fn init_wires_engine_end_to_end() {
        let tmp = TempDir::new().unwrap();
        let state = AppState::init(Some(tmp.path().to_path_buf())).await.unwrap();
        assert!(tmp.path().join("steward.db").exists());

        state
            .directory
            .upsert_contact(
                &SubjectRef::Member("m1".to_string()),
                &Contact {
                    id: "m1".to_string(),
                    display_name: Some("Ruth".to_string()),
                    email: Some("ruth@example.org".to_string()),
                    phone: None,
                },
            )
            .await
            .unwrap();

        state.catalog.import_yaml(WELCOME_YAML).await.unwrap();
        state.catalog.activate("Welcome").await.unwrap();

        let report = state
            .dispatcher
            .dispatch_and_wait(TriggerContext::new(TriggerType::MemberCreated).with_member("m1"))
            .await;
        assert_eq!(report.matched, 1);
        assert_eq!(report.suspended, 1);

        let emails = state.outbox.pending(Some(Channel::Email), 10).await.unwrap();
        assert_eq!(emails.len(), 1);
        assert_eq!(emails[0].subject.as_deref(), Some("Welcome, Ruth"));

        let members = state.directory.group_members("newcomers").await.unwrap();
        assert_eq!(members.len(), 1);

        let execution = state
            .workflows
            .get_execution(&report.execution_ids[0])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(execution.status, ExecutionStatus::Running);

        state.db_pool.close().await;
    }
}
