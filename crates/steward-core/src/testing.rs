//! In-memory test doubles: repositories, collaborators, and a wired-up harness.
//!
//! Compiled for this crate's tests and, behind the `testing` feature, for
//! downstream crates that want a runner without SQLite.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU16, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use serde_json::Value;
use steward_types::config::InactiveResumePolicy;
use steward_types::error::{ActionError, RepositoryError};
use steward_types::execution::{
    ActionExecution, ActionExecutionStatus, ExecutionStatus, PendingDelay, WorkflowExecution,
};
use steward_types::workflow::{TriggerType, Workflow};
use uuid::Uuid;

use crate::collaborator::{
    Channel, CollaboratorError, Collaborators, Contact, DeliveryReceipt, GroupMembership,
    IdentityLookup, MessageSender, NewTask, OutboundMessage, RecordMutator, SubjectRef,
    TaskCreator, WebhookRequest, WebhookResponse, WebhookTransport,
};
use crate::event::EventBus;
use crate::repository::delay::DelayRepository;
use crate::repository::workflow::WorkflowRepository;
use crate::workflow::delay::{DelayScheduler, DelaySettings};
use crate::workflow::dispatcher::WorkflowDispatcher;
use crate::workflow::handler::ActionHandlerRegistry;
use crate::workflow::runner::WorkflowRunner;
use crate::workflow::template::TemplateLibrary;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// InMemoryRepository
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Store {
    workflows: HashMap<Uuid, Workflow>,
    executions: HashMap<Uuid, WorkflowExecution>,
    action_executions: HashMap<Uuid, ActionExecution>,
}

/// `WorkflowRepository` over hash maps, with write-failure injection.
pub struct InMemoryRepository {
    store: Mutex<Store>,
    fail_all: AtomicBool,
    /// Writes still allowed before failing; negative means unlimited.
    write_budget: AtomicI64,
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self {
            store: Mutex::new(Store::default()),
            fail_all: AtomicBool::new(false),
            write_budget: AtomicI64::new(-1),
        }
    }

    /// Make every subsequent write fail (or succeed again).
    pub fn fail_writes(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    /// Allow `n` more writes, then fail every write after that.
    pub fn fail_writes_after(&self, n: u32) {
        self.write_budget.store(i64::from(n), Ordering::SeqCst);
    }

    fn check_write(&self) -> Result<(), RepositoryError> {
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(RepositoryError::Query("injected write failure".to_string()));
        }
        let allowed = self
            .write_budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |budget| match budget {
                b if b < 0 => Some(b),
                0 => None,
                b => Some(b - 1),
            });
        match allowed {
            Ok(_) => Ok(()),
            Err(_) => Err(RepositoryError::Query("injected write failure".to_string())),
        }
    }
}

impl WorkflowRepository for InMemoryRepository {
    async fn save_workflow(&self, workflow: &Workflow) -> Result<(), RepositoryError> {
        self.check_write()?;
        let mut store = lock(&self.store);
        let clash = store
            .workflows
            .values()
            .any(|w| w.name == workflow.name && w.id != workflow.id);
        if clash {
            return Err(RepositoryError::Conflict(format!(
                "workflow name '{}' already exists",
                workflow.name
            )));
        }
        store.workflows.insert(workflow.id, workflow.clone());
        Ok(())
    }

    async fn get_workflow(&self, id: &Uuid) -> Result<Option<Workflow>, RepositoryError> {
        Ok(lock(&self.store).workflows.get(id).cloned())
    }

    async fn get_workflow_by_name(&self, name: &str) -> Result<Option<Workflow>, RepositoryError> {
        Ok(lock(&self.store)
            .workflows
            .values()
            .find(|w| w.name == name)
            .cloned())
    }

    async fn list_workflows(&self) -> Result<Vec<Workflow>, RepositoryError> {
        let mut workflows: Vec<Workflow> = lock(&self.store).workflows.values().cloned().collect();
        workflows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(workflows)
    }

    async fn list_dispatchable(
        &self,
        trigger_type: TriggerType,
    ) -> Result<Vec<Workflow>, RepositoryError> {
        let mut workflows: Vec<Workflow> = lock(&self.store)
            .workflows
            .values()
            .filter(|w| w.matches(trigger_type))
            .cloned()
            .collect();
        workflows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(workflows)
    }

    async fn delete_workflow(&self, id: &Uuid) -> Result<bool, RepositoryError> {
        self.check_write()?;
        Ok(lock(&self.store).workflows.remove(id).is_some())
    }

    async fn create_execution(&self, execution: &WorkflowExecution) -> Result<(), RepositoryError> {
        self.check_write()?;
        lock(&self.store)
            .executions
            .insert(execution.id, execution.clone());
        Ok(())
    }

    async fn update_execution_status(
        &self,
        id: &Uuid,
        status: ExecutionStatus,
        error: Option<&str>,
        context: Option<&Value>,
    ) -> Result<(), RepositoryError> {
        self.check_write()?;
        let mut store = lock(&self.store);
        let execution = store.executions.get_mut(id).ok_or(RepositoryError::NotFound)?;
        execution.status = status;
        if let Some(error) = error {
            execution.error = Some(error.to_string());
        }
        if let Some(context) = context {
            execution.context = context.clone();
        }
        if status.is_terminal() {
            execution.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn save_execution_context(&self, id: &Uuid, context: &Value) -> Result<(), RepositoryError> {
        self.check_write()?;
        let mut store = lock(&self.store);
        let execution = store.executions.get_mut(id).ok_or(RepositoryError::NotFound)?;
        execution.context = context.clone();
        Ok(())
    }

    async fn get_execution(&self, id: &Uuid) -> Result<Option<WorkflowExecution>, RepositoryError> {
        Ok(lock(&self.store).executions.get(id).cloned())
    }

    async fn list_executions(
        &self,
        workflow_id: Option<&Uuid>,
        limit: u32,
    ) -> Result<Vec<WorkflowExecution>, RepositoryError> {
        let mut executions: Vec<WorkflowExecution> = lock(&self.store)
            .executions
            .values()
            .filter(|e| workflow_id.is_none_or(|id| &e.workflow_id == id))
            .cloned()
            .collect();
        executions.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(b.id.cmp(&a.id)));
        executions.truncate(limit as usize);
        Ok(executions)
    }

    async fn list_running_executions(&self) -> Result<Vec<WorkflowExecution>, RepositoryError> {
        let mut executions: Vec<WorkflowExecution> = lock(&self.store)
            .executions
            .values()
            .filter(|e| e.status == ExecutionStatus::Running)
            .cloned()
            .collect();
        executions.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        Ok(executions)
    }

    async fn create_action_execution(&self, record: &ActionExecution) -> Result<(), RepositoryError> {
        self.check_write()?;
        lock(&self.store)
            .action_executions
            .insert(record.id, record.clone());
        Ok(())
    }

    async fn update_action_execution(
        &self,
        id: &Uuid,
        status: ActionExecutionStatus,
        result: Option<&Value>,
        error: Option<&ActionError>,
    ) -> Result<(), RepositoryError> {
        self.check_write()?;
        let mut store = lock(&self.store);
        let record = store
            .action_executions
            .get_mut(id)
            .ok_or(RepositoryError::NotFound)?;
        record.status = status;
        if let Some(result) = result {
            record.result = Some(result.clone());
        }
        if let Some(error) = error {
            record.error = Some(error.to_string());
            record.error_kind = Some(error.kind());
        }
        if status.is_terminal() {
            record.executed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn get_action_execution(&self, id: &Uuid) -> Result<Option<ActionExecution>, RepositoryError> {
        Ok(lock(&self.store).action_executions.get(id).cloned())
    }

    async fn list_action_executions(
        &self,
        execution_id: &Uuid,
    ) -> Result<Vec<ActionExecution>, RepositoryError> {
        let mut records: Vec<ActionExecution> = lock(&self.store)
            .action_executions
            .values()
            .filter(|r| &r.execution_id == execution_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.action_order);
        Ok(records)
    }
}

// ---------------------------------------------------------------------------
// InMemoryDelayQueue
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryDelayQueue {
    rows: Mutex<Vec<PendingDelay>>,
}

impl InMemoryDelayQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DelayRepository for InMemoryDelayQueue {
    async fn schedule(&self, delay: &PendingDelay) -> Result<(), RepositoryError> {
        lock(&self.rows).push(delay.clone());
        Ok(())
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<PendingDelay>, RepositoryError> {
        let mut rows = lock(&self.rows);
        rows.sort_by_key(|r| r.due_at);
        let mut claimed = Vec::new();
        for row in rows.iter_mut() {
            if claimed.len() >= limit as usize {
                break;
            }
            if row.claimed_at.is_none() && row.due_at <= now {
                row.claimed_at = Some(now);
                claimed.push(row.clone());
            }
        }
        Ok(claimed)
    }

    async fn complete(&self, id: &Uuid) -> Result<(), RepositoryError> {
        lock(&self.rows).retain(|r| &r.id != id);
        Ok(())
    }

    async fn release_stale(&self, claimed_before: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let mut released = 0;
        for row in lock(&self.rows).iter_mut() {
            if row.claimed_at.is_some_and(|at| at < claimed_before) {
                row.claimed_at = None;
                released += 1;
            }
        }
        Ok(released)
    }

    async fn next_due(&self) -> Result<Option<DateTime<Utc>>, RepositoryError> {
        Ok(lock(&self.rows)
            .iter()
            .filter(|r| r.claimed_at.is_none())
            .map(|r| r.due_at)
            .min())
    }

    async fn list_pending(&self, limit: u32) -> Result<Vec<PendingDelay>, RepositoryError> {
        let mut rows = lock(&self.rows).clone();
        rows.sort_by_key(|r| r.due_at);
        rows.truncate(limit as usize);
        Ok(rows)
    }
}

// ---------------------------------------------------------------------------
// FakeCollaborators
// ---------------------------------------------------------------------------

#[derive(Default)]
struct FakeState {
    members: Mutex<HashMap<String, Contact>>,
    sent: Mutex<Vec<OutboundMessage>>,
    fail_sends: AtomicBool,
    memberships: Mutex<Vec<(String, String, Option<String>)>>,
    fields: Mutex<HashMap<(String, String), Value>>,
    tasks: Mutex<Vec<NewTask>>,
    webhook_requests: Mutex<Vec<WebhookRequest>>,
    webhook_status: AtomicU16,
    sequence: AtomicU64,
}

impl FakeState {
    fn next_id(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.sequence.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

/// Recording doubles for every collaborator port. Clones share state.
#[derive(Clone)]
pub struct FakeCollaborators {
    state: Arc<FakeState>,
}

impl Default for FakeCollaborators {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeCollaborators {
    pub fn new() -> Self {
        let state = FakeState::default();
        state.webhook_status.store(200, Ordering::SeqCst);
        Self {
            state: Arc::new(state),
        }
    }

    /// Wire the fakes into a `Collaborators` set with an empty template library.
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            identity: self.state.clone(),
            email: self.state.clone(),
            sms: self.state.clone(),
            notifications: self.state.clone(),
            templates: Arc::new(TemplateLibrary::default()),
            groups: self.state.clone(),
            records: self.state.clone(),
            tasks: self.state.clone(),
            webhooks: self.state.clone(),
        }
    }

    pub fn add_member(&self, id: &str, name: &str, email: Option<&str>, phone: Option<&str>) {
        lock(&self.state.members).insert(
            id.to_string(),
            Contact {
                id: id.to_string(),
                display_name: Some(name.to_string()),
                email: email.map(str::to_string),
                phone: phone.map(str::to_string),
            },
        );
    }

    pub fn sent(&self, channel: Channel) -> Vec<OutboundMessage> {
        lock(&self.state.sent)
            .iter()
            .filter(|m| m.channel == channel)
            .cloned()
            .collect()
    }

    /// Make every sender report `Unavailable`.
    pub fn fail_sends(&self, fail: bool) {
        self.state.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// `(group_id, member_id, role)` in insertion order.
    pub fn memberships(&self) -> Vec<(String, String, Option<String>)> {
        lock(&self.state.memberships).clone()
    }

    pub fn field(&self, subject: &SubjectRef, field: &str) -> Option<Value> {
        lock(&self.state.fields)
            .get(&(subject.to_string(), field.to_string()))
            .cloned()
    }

    pub fn tasks(&self) -> Vec<NewTask> {
        lock(&self.state.tasks).clone()
    }

    pub fn webhook_requests(&self) -> Vec<WebhookRequest> {
        lock(&self.state.webhook_requests).clone()
    }

    pub fn set_webhook_status(&self, status: u16) {
        self.state.webhook_status.store(status, Ordering::SeqCst);
    }
}

impl IdentityLookup for FakeState {
    fn resolve<'a>(
        &'a self,
        subject: &'a SubjectRef,
    ) -> BoxFuture<'a, Result<Contact, CollaboratorError>> {
        Box::pin(async move {
            match subject {
                SubjectRef::Member(id) => lock(&self.members)
                    .get(id)
                    .cloned()
                    .ok_or_else(|| CollaboratorError::NotFound(subject.to_string())),
                SubjectRef::User(_) => Err(CollaboratorError::NotFound(subject.to_string())),
            }
        })
    }
}

impl MessageSender for FakeState {
    fn send<'a>(
        &'a self,
        message: &'a OutboundMessage,
    ) -> BoxFuture<'a, Result<DeliveryReceipt, CollaboratorError>> {
        Box::pin(async move {
            if self.fail_sends.load(Ordering::SeqCst) {
                return Err(CollaboratorError::Unavailable(format!(
                    "{} gateway down",
                    message.channel
                )));
            }
            lock(&self.sent).push(message.clone());
            Ok(DeliveryReceipt {
                message_id: self.next_id("msg"),
            })
        })
    }
}

impl GroupMembership for FakeState {
    fn upsert_member<'a>(
        &'a self,
        group_id: &'a str,
        member_id: &'a str,
        role: Option<&'a str>,
    ) -> BoxFuture<'a, Result<bool, CollaboratorError>> {
        Box::pin(async move {
            let mut memberships = lock(&self.memberships);
            let role = role.map(str::to_string);
            match memberships
                .iter_mut()
                .find(|(g, m, _)| g == group_id && m == member_id)
            {
                Some(existing) => {
                    existing.2 = role;
                    Ok(false)
                }
                None => {
                    memberships.push((group_id.to_string(), member_id.to_string(), role));
                    Ok(true)
                }
            }
        })
    }
}

impl RecordMutator for FakeState {
    fn update_field<'a>(
        &'a self,
        subject: &'a SubjectRef,
        field: &'a str,
        value: &'a Value,
    ) -> BoxFuture<'a, Result<(), CollaboratorError>> {
        Box::pin(async move {
            let known = match subject {
                SubjectRef::Member(id) => lock(&self.members).contains_key(id),
                SubjectRef::User(_) => false,
            };
            if !known {
                return Err(CollaboratorError::NotFound(subject.to_string()));
            }
            lock(&self.fields).insert((subject.to_string(), field.to_string()), value.clone());
            Ok(())
        })
    }
}

impl TaskCreator for FakeState {
    fn create_task<'a>(&'a self, task: &'a NewTask) -> BoxFuture<'a, Result<String, CollaboratorError>> {
        Box::pin(async move {
            lock(&self.tasks).push(task.clone());
            Ok(self.next_id("task"))
        })
    }
}

impl WebhookTransport for FakeState {
    fn call<'a>(
        &'a self,
        request: &'a WebhookRequest,
    ) -> BoxFuture<'a, Result<WebhookResponse, CollaboratorError>> {
        Box::pin(async move {
            lock(&self.webhook_requests).push(request.clone());
            Ok(WebhookResponse {
                status: self.webhook_status.load(Ordering::SeqCst),
                body: Some("ok".to_string()),
            })
        })
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub type TestRunner = WorkflowRunner<InMemoryRepository, InMemoryDelayQueue>;
pub type TestDispatcher = WorkflowDispatcher<InMemoryRepository, InMemoryDelayQueue>;

/// A runner and dispatcher wired to in-memory storage and fake collaborators.
pub struct Harness {
    pub repo: Arc<InMemoryRepository>,
    pub queue: Arc<InMemoryDelayQueue>,
    pub fakes: FakeCollaborators,
    pub runner: Arc<TestRunner>,
    pub dispatcher: TestDispatcher,
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

impl Harness {
    pub fn new() -> Self {
        Self::build(None, InactiveResumePolicy::default(), DelaySettings::default())
    }

    pub fn with_policy(policy: InactiveResumePolicy) -> Self {
        Self::build(None, policy, DelaySettings::default())
    }

    pub fn with_registry(registry: ActionHandlerRegistry) -> Self {
        Self::build(Some(registry), InactiveResumePolicy::default(), DelaySettings::default())
    }

    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        let settings = DelaySettings {
            poll_interval,
            ..DelaySettings::default()
        };
        Self::build(None, InactiveResumePolicy::default(), settings)
    }

    fn build(
        registry: Option<ActionHandlerRegistry>,
        policy: InactiveResumePolicy,
        settings: DelaySettings,
    ) -> Self {
        let repo = Arc::new(InMemoryRepository::new());
        let queue = Arc::new(InMemoryDelayQueue::new());
        let fakes = FakeCollaborators::new();
        let registry = registry
            .unwrap_or_else(|| ActionHandlerRegistry::with_builtin_handlers(fakes.collaborators()));

        let runner = Arc::new(
            WorkflowRunner::new(
                repo.clone(),
                Arc::new(DelayScheduler::new(queue.clone(), settings)),
                Arc::new(registry),
                EventBus::default(),
            )
            .with_inactive_resume(policy),
        );
        let dispatcher = WorkflowDispatcher::new(runner.clone());

        Self {
            repo,
            queue,
            fakes,
            runner,
            dispatcher,
        }
    }

    pub async fn save(&self, workflow: &Workflow) {
        self.repo.save_workflow(workflow).await.unwrap();
    }

    pub async fn execution(&self, id: Uuid) -> WorkflowExecution {
        self.repo.get_execution(&id).await.unwrap().unwrap()
    }

    pub async fn action_executions(&self, execution_id: Uuid) -> Vec<ActionExecution> {
        self.repo.list_action_executions(&execution_id).await.unwrap()
    }

    pub async fn pending_delays(&self) -> Vec<PendingDelay> {
        self.queue.list_pending(u32::MAX).await.unwrap()
    }

    /// Claim every delay due within the next `minutes`.
    pub async fn claim_due_in_minutes(&self, minutes: i64) -> Vec<PendingDelay> {
        self.runner
            .delays()
            .claim_due(Utc::now() + chrono::Duration::minutes(minutes))
            .await
            .unwrap()
    }
}
