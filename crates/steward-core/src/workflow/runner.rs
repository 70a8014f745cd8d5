//! Workflow runner: executes one workflow's ordered actions for one trigger.
//!
//! Per action, in strict `order`:
//! 1. record the Action Execution as `running`
//! 2. evaluate the condition; `false` records `skipped` (no handler, no delay)
//! 3. a non-zero delay records `waiting`, schedules a durable resumption and
//!    suspends the execution; `resume` picks it up from here
//! 4. invoke the handler; success records `completed`, any handler error
//!    records `failed`, and the runner moves on either way
//!
//! When every action is terminal the execution is `completed`. Audit write
//! failures and definition problems (an out-of-range delay, a workflow or
//! action that vanished mid-run) mark it `failed`.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures_util::FutureExt;
use steward_types::config::InactiveResumePolicy;
use steward_types::error::ActionError;
use steward_types::event::EngineEvent;
use steward_types::execution::{
    ActionExecutionStatus, ExecutionStatus, PendingDelay, WorkflowExecution,
};
use steward_types::trigger::TriggerContext;
use steward_types::workflow::{Action, MAX_DELAY_SECS, Workflow};
use uuid::Uuid;

use crate::event::EventBus;
use crate::repository::delay::DelayRepository;
use crate::repository::workflow::WorkflowRepository;

use super::condition::ConditionEvaluator;
use super::context::ExecutionContext;
use super::delay::{DelayScheduler, ResumeToken};
use super::handler::ActionHandlerRegistry;
use super::recorder::{ExecutionRecorder, RecorderError};

// ---------------------------------------------------------------------------
// Error and result types
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error(transparent)]
    Recorder(#[from] RecorderError),

    #[error("workflow definition invalid: {0}")]
    DefinitionInvalid(String),

    #[error("execution not found: {0}")]
    ExecutionNotFound(Uuid),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every action reached a terminal state.
    Completed,
    /// An action is waiting on the delay queue.
    Suspended(ResumeToken),
    /// A resumption arrived for an execution or action that already moved on.
    Stale,
}

#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub execution_id: Uuid,
    pub outcome: RunOutcome,
}

impl ExecutionResult {
    pub fn is_completed(&self) -> bool {
        self.outcome == RunOutcome::Completed
    }
}

enum Step {
    Continue,
    Suspend(ResumeToken),
}

// ---------------------------------------------------------------------------
// WorkflowRunner
// ---------------------------------------------------------------------------

pub struct WorkflowRunner<R: WorkflowRepository, Q: DelayRepository> {
    recorder: ExecutionRecorder<R>,
    delays: Arc<DelayScheduler<Q>>,
    registry: Arc<ActionHandlerRegistry>,
    conditions: ConditionEvaluator,
    events: EventBus,
    inactive_resume: InactiveResumePolicy,
}

impl<R: WorkflowRepository, Q: DelayRepository> WorkflowRunner<R, Q> {
    pub fn new(
        repo: Arc<R>,
        delays: Arc<DelayScheduler<Q>>,
        registry: Arc<ActionHandlerRegistry>,
        events: EventBus,
    ) -> Self {
        Self {
            recorder: ExecutionRecorder::new(repo),
            delays,
            registry,
            conditions: ConditionEvaluator::new(),
            events,
            inactive_resume: InactiveResumePolicy::default(),
        }
    }

    /// Set what happens to a delayed action whose workflow was deactivated.
    pub fn with_inactive_resume(mut self, policy: InactiveResumePolicy) -> Self {
        self.inactive_resume = policy;
        self
    }

    pub fn recorder(&self) -> &ExecutionRecorder<R> {
        &self.recorder
    }

    pub fn delays(&self) -> &Arc<DelayScheduler<Q>> {
        &self.delays
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    // -----------------------------------------------------------------------
    // Entry points
    // -----------------------------------------------------------------------

    /// Start a new execution of `workflow` for `trigger`.
    pub async fn run(
        &self,
        workflow: &Workflow,
        trigger: &TriggerContext,
    ) -> Result<ExecutionResult, RunnerError> {
        let mut ctx = ExecutionContext::new(trigger.clone());
        let execution = self
            .recorder
            .create_execution(workflow, trigger, ctx.to_json())
            .await?;
        let execution_id = execution.id;

        self.events.publish(EngineEvent::ExecutionStarted {
            execution_id,
            workflow_id: workflow.id,
            workflow_name: workflow.name.clone(),
            trigger_type: trigger.trigger_type,
        });
        tracing::info!(
            execution_id = %execution_id,
            workflow = %workflow.name,
            trigger = %trigger.trigger_type,
            actions = workflow.actions.len(),
            "workflow execution started"
        );

        let actions = workflow.ordered_actions();
        let result = self
            .drive(&workflow.name, execution_id, &actions, &mut ctx)
            .await;
        self.settle(&workflow.name, execution_id, result).await
    }

    /// Continue an execution whose delayed action is now due.
    ///
    /// A resumption whose execution is already terminal, or whose action is no
    /// longer `waiting`, is ignored (`RunOutcome::Stale`).
    pub async fn resume(&self, delay: &PendingDelay) -> Result<ExecutionResult, RunnerError> {
        let repo = self.recorder.repo();
        let execution = repo
            .get_execution(&delay.execution_id)
            .await
            .map_err(RecorderError::from)?
            .ok_or(RunnerError::ExecutionNotFound(delay.execution_id))?;

        let stale = ExecutionResult {
            execution_id: execution.id,
            outcome: RunOutcome::Stale,
        };
        if execution.status.is_terminal() {
            tracing::debug!(execution_id = %execution.id, "execution already finished, ignoring resume");
            return Ok(stale);
        }
        let waiting = repo
            .get_action_execution(&delay.action_execution_id)
            .await
            .map_err(RecorderError::from)?
            .is_some_and(|r| r.status == ActionExecutionStatus::Waiting);
        if !waiting {
            tracing::debug!(
                execution_id = %execution.id,
                action_execution_id = %delay.action_execution_id,
                "action no longer waiting, ignoring resume"
            );
            return Ok(stale);
        }

        let result = self.resume_waiting(&execution, delay).await;
        self.settle(&execution.workflow_name, execution.id, result).await
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    async fn resume_waiting(
        &self,
        execution: &WorkflowExecution,
        delay: &PendingDelay,
    ) -> Result<ExecutionResult, RunnerError> {
        let action_execution_id = delay.action_execution_id;
        let workflow = self
            .recorder
            .repo()
            .get_workflow(&execution.workflow_id)
            .await
            .map_err(RecorderError::from)?;
        let Some(workflow) = workflow else {
            return Err(self
                .abandon(
                    action_execution_id,
                    format!("workflow {} was deleted while an action was delayed", execution.workflow_id),
                )
                .await);
        };
        let Some(action) = workflow.action(&delay.action_id) else {
            return Err(self
                .abandon(
                    action_execution_id,
                    format!("action {} was removed while it was delayed", delay.action_id),
                )
                .await);
        };
        let mut ctx = match ExecutionContext::from_json(execution.context.clone()) {
            Ok(ctx) => ctx,
            Err(e) => {
                return Err(self
                    .abandon(action_execution_id, format!("execution context unreadable: {e}"))
                    .await);
            }
        };

        let remaining: Vec<&Action> = workflow
            .ordered_actions()
            .into_iter()
            .filter(|a| a.order > action.order)
            .collect();

        if !workflow.is_enabled() && self.inactive_resume == InactiveResumePolicy::Skip {
            tracing::info!(
                execution_id = %execution.id,
                workflow = %workflow.name,
                skipped = remaining.len() + 1,
                "workflow no longer active, skipping delayed action and the rest"
            );
            self.skip(execution.id, action, action_execution_id, &mut ctx)
                .await?;
            for next in remaining {
                let id = self
                    .recorder
                    .create_action_execution(execution.id, next)
                    .await?;
                self.skip(execution.id, next, id, &mut ctx).await?;
            }
            return self.complete(&workflow.name, execution.id, &ctx).await;
        }

        tracing::debug!(
            execution_id = %execution.id,
            action_id = %action.id,
            "resuming delayed action"
        );
        self.recorder.action_resumed(action_execution_id).await?;
        self.invoke(execution.id, action, action_execution_id, &mut ctx)
            .await?;
        self.drive(&workflow.name, execution.id, &remaining, &mut ctx)
            .await
    }

    /// Walk `actions` in order until one suspends or all are terminal.
    async fn drive(
        &self,
        workflow_name: &str,
        execution_id: Uuid,
        actions: &[&Action],
        ctx: &mut ExecutionContext,
    ) -> Result<ExecutionResult, RunnerError> {
        for action in actions {
            let action_execution_id = self
                .recorder
                .create_action_execution(execution_id, action)
                .await?;

            if let Step::Suspend(token) = self
                .step(execution_id, action, action_execution_id, ctx)
                .await?
            {
                return Ok(ExecutionResult {
                    execution_id,
                    outcome: RunOutcome::Suspended(token),
                });
            }
        }

        self.complete(workflow_name, execution_id, ctx).await
    }

    async fn step(
        &self,
        execution_id: Uuid,
        action: &Action,
        action_execution_id: Uuid,
        ctx: &mut ExecutionContext,
    ) -> Result<Step, RunnerError> {
        let gate = ctx.to_expression_context();
        if !self.conditions.evaluate(action.condition.as_deref(), &gate) {
            self.skip(execution_id, action, action_execution_id, ctx)
                .await?;
            return Ok(Step::Continue);
        }

        if action.delay_secs > 0 {
            if action.delay_secs > MAX_DELAY_SECS {
                return Err(self
                    .abandon(
                        action_execution_id,
                        format!(
                            "delay of {}s exceeds the maximum of {MAX_DELAY_SECS}s",
                            action.delay_secs
                        ),
                    )
                    .await);
            }
            // Waiting must be durable before the row can be claimed.
            self.recorder.action_waiting(action_execution_id).await?;
            self.recorder
                .checkpoint_context(execution_id, &ctx.to_json())
                .await?;
            let token = match self
                .delays
                .after(action.delay(), execution_id, action_execution_id, action.id)
                .await
            {
                Ok(token) => token,
                Err(e) => {
                    let reason = ActionError::Unknown(format!("delay not scheduled: {e}"));
                    if let Err(mark) = self.recorder.action_failed(action_execution_id, &reason).await {
                        tracing::error!(
                            execution_id = %execution_id,
                            error = %mark,
                            "could not record unscheduled delay"
                        );
                    }
                    return Err(e.into());
                }
            };

            self.events.publish(EngineEvent::ActionDelayed {
                execution_id,
                action_id: action.id,
                delay_secs: action.delay_secs,
            });
            tracing::info!(
                execution_id = %execution_id,
                action_id = %action.id,
                due_at = %token.due_at,
                "action delayed, execution suspended"
            );
            return Ok(Step::Suspend(token));
        }

        self.invoke(execution_id, action, action_execution_id, ctx)
            .await?;
        Ok(Step::Continue)
    }

    async fn invoke(
        &self,
        execution_id: Uuid,
        action: &Action,
        action_execution_id: Uuid,
        ctx: &mut ExecutionContext,
    ) -> Result<(), RunnerError> {
        let variables = ctx.to_expression_context();
        let started = Instant::now();
        let outcome = AssertUnwindSafe(self.registry.invoke(
            action,
            execution_id,
            &ctx.trigger,
            &variables,
        ))
        .catch_unwind()
        .await
        .unwrap_or_else(|_| Err(ActionError::Unknown("action handler panicked".to_string())));
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(output) => {
                self.recorder
                    .action_completed(action_execution_id, &output.result)
                    .await?;
                ctx.record_output(action, &output);

                self.events.publish(EngineEvent::ActionCompleted {
                    execution_id,
                    action_id: action.id,
                    action_type: action.action_type,
                    duration_ms,
                });
                tracing::debug!(
                    execution_id = %execution_id,
                    action_type = %action.action_type,
                    order = action.order,
                    duration_ms,
                    "action completed"
                );
            }
            Err(err) => {
                tracing::warn!(
                    execution_id = %execution_id,
                    action_type = %action.action_type,
                    order = action.order,
                    error_kind = %err.kind(),
                    error = %err,
                    "action failed, continuing with next action"
                );
                self.recorder
                    .action_failed(action_execution_id, &err)
                    .await?;
                ctx.record_failure(action, &err);

                self.events.publish(EngineEvent::ActionFailed {
                    execution_id,
                    action_id: action.id,
                    action_type: action.action_type,
                    error: err.to_string(),
                });
            }
        }

        self.recorder
            .checkpoint_context(execution_id, &ctx.to_json())
            .await?;
        Ok(())
    }

    async fn skip(
        &self,
        execution_id: Uuid,
        action: &Action,
        action_execution_id: Uuid,
        ctx: &mut ExecutionContext,
    ) -> Result<(), RunnerError> {
        self.recorder.action_skipped(action_execution_id).await?;
        ctx.record_skipped(action);
        self.recorder
            .checkpoint_context(execution_id, &ctx.to_json())
            .await?;

        self.events.publish(EngineEvent::ActionSkipped {
            execution_id,
            action_id: action.id,
            action_type: action.action_type,
        });
        tracing::debug!(
            execution_id = %execution_id,
            order = action.order,
            "action skipped"
        );
        Ok(())
    }

    async fn complete(
        &self,
        workflow_name: &str,
        execution_id: Uuid,
        ctx: &ExecutionContext,
    ) -> Result<ExecutionResult, RunnerError> {
        self.recorder
            .update_execution_status(
                execution_id,
                ExecutionStatus::Completed,
                None,
                Some(&ctx.to_json()),
            )
            .await?;

        let records = self
            .recorder
            .repo()
            .list_action_executions(&execution_id)
            .await
            .map_err(RecorderError::from)?;
        let count = |status: ActionExecutionStatus| {
            records.iter().filter(|r| r.status == status).count() as u32
        };
        let (completed, failed, skipped) = (
            count(ActionExecutionStatus::Completed),
            count(ActionExecutionStatus::Failed),
            count(ActionExecutionStatus::Skipped),
        );

        self.events.publish(EngineEvent::ExecutionCompleted {
            execution_id,
            workflow_name: workflow_name.to_string(),
            actions_completed: completed,
            actions_failed: failed,
            actions_skipped: skipped,
        });
        tracing::info!(
            execution_id = %execution_id,
            workflow = workflow_name,
            completed,
            failed,
            skipped,
            "workflow execution completed"
        );

        Ok(ExecutionResult {
            execution_id,
            outcome: RunOutcome::Completed,
        })
    }

    /// Mark the waiting action failed and produce the definition error.
    async fn abandon(&self, action_execution_id: Uuid, reason: String) -> RunnerError {
        let err = ActionError::Unknown(reason.clone());
        if let Err(e) = self.recorder.action_failed(action_execution_id, &err).await {
            return RunnerError::Recorder(e);
        }
        RunnerError::DefinitionInvalid(reason)
    }

    /// On error, mark the execution `failed` (best effort) before returning it.
    async fn settle(
        &self,
        workflow_name: &str,
        execution_id: Uuid,
        result: Result<ExecutionResult, RunnerError>,
    ) -> Result<ExecutionResult, RunnerError> {
        let message = match &result {
            Ok(_) => None,
            Err(err) => Some(err.to_string()),
        };
        let Some(message) = message else {
            return result;
        };

        if let Err(e) = self
            .recorder
            .update_execution_status(execution_id, ExecutionStatus::Failed, Some(&message), None)
            .await
        {
            tracing::error!(
                execution_id = %execution_id,
                error = %e,
                "could not record execution failure"
            );
        }
        self.events.publish(EngineEvent::ExecutionFailed {
            execution_id,
            workflow_name: workflow_name.to_string(),
            error: message,
        });
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborator::Channel;
    use crate::testing::Harness;
    use serde_json::json;
    use steward_types::error::ActionErrorKind;
    use steward_types::workflow::{ActionType, TriggerType, WorkflowStatus};

    fn enabled(mut workflow: Workflow) -> Workflow {
        workflow.is_active = true;
        workflow.status = WorkflowStatus::Active;
        workflow
    }

    fn welcome_email() -> Workflow {
        let mut wf = enabled(Workflow::new("Welcome Email", TriggerType::MemberCreated));
        wf.actions.push(Action::new(ActionType::SendEmail, 1).with_config(json!({
            "subject": "Welcome {{ member.display_name }}",
            "body": "We are glad you joined us."
        })));
        wf
    }

    fn member_created(member_id: &str) -> TriggerContext {
        TriggerContext::new(TriggerType::MemberCreated).with_member(member_id)
    }

    #[tokio::test]
    async fn welcome_email_completes_and_sends_once() {
        let h = Harness::new();
        h.fakes.add_member("m1", "Ruth", Some("ruth@example.org"), None);
        let wf = welcome_email();
        h.save(&wf).await;

        let result = h.runner.run(&wf, &member_created("m1")).await.unwrap();
        assert!(result.is_completed());

        let execution = h.execution(result.execution_id).await;
        assert_eq!(execution.status, ExecutionStatus::Completed);
        let actions = h.action_executions(result.execution_id).await;
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].status, ActionExecutionStatus::Completed);

        let sent = h.fakes.sent(Channel::Email);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].address, "ruth@example.org");
        assert_eq!(sent[0].subject.as_deref(), Some("Welcome Ruth"));
    }

    #[tokio::test]
    async fn unknown_recipient_fails_action_but_completes_execution() {
        let h = Harness::new();
        let wf = welcome_email();
        h.save(&wf).await;

        let result = h.runner.run(&wf, &member_created("m1")).await.unwrap();

        assert_eq!(h.execution(result.execution_id).await.status, ExecutionStatus::Completed);
        let actions = h.action_executions(result.execution_id).await;
        assert_eq!(actions[0].status, ActionExecutionStatus::Failed);
        assert_eq!(actions[0].error_kind, Some(ActionErrorKind::RecipientNotFound));
        assert!(h.fakes.sent(Channel::Email).is_empty());
    }

    #[tokio::test]
    async fn later_condition_sees_earlier_field_update() {
        let h = Harness::new();
        h.fakes.add_member("m1", "Ruth", None, Some("+15550100"));
        let mut wf = enabled(Workflow::new("First visit", TriggerType::EventCheckedIn));
        wf.actions.push(
            Action::new(ActionType::SendSms, 2)
                .with_condition("variables.status == 'visited'")
                .with_config(json!({"body": "Thanks for visiting!"})),
        );
        wf.actions.push(
            Action::new(ActionType::UpdateField, 1)
                .with_config(json!({"field": "status", "value": "visited"})),
        );
        h.save(&wf).await;

        let trigger = TriggerContext::new(TriggerType::EventCheckedIn).with_member("m1");
        let result = h.runner.run(&wf, &trigger).await.unwrap();

        let actions = h.action_executions(result.execution_id).await;
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].action_type, ActionType::UpdateField);
        assert!(actions.iter().all(|a| a.status == ActionExecutionStatus::Completed));
        assert_eq!(h.fakes.sent(Channel::Sms).len(), 1);
    }

    #[tokio::test]
    async fn false_condition_skips_without_invoking_or_delaying() {
        let h = Harness::new();
        h.fakes.add_member("m1", "Ruth", Some("ruth@example.org"), None);
        let mut wf = enabled(Workflow::new("Big gifts", TriggerType::DonationCompleted));
        wf.actions.push(
            Action::new(ActionType::SendEmail, 1)
                .with_condition("payload.amount > 1000")
                .with_delay_secs(3600)
                .with_config(json!({"body": "Thank you!"})),
        );
        h.save(&wf).await;

        let trigger = TriggerContext::new(TriggerType::DonationCompleted)
            .with_member("m1")
            .with_payload("amount", json!(20));
        let result = h.runner.run(&wf, &trigger).await.unwrap();

        assert!(result.is_completed());
        let actions = h.action_executions(result.execution_id).await;
        assert_eq!(actions[0].status, ActionExecutionStatus::Skipped);
        assert!(h.fakes.sent(Channel::Email).is_empty());
        assert!(h.pending_delays().await.is_empty());
    }

    #[tokio::test]
    async fn failures_do_not_halt_and_order_is_respected() {
        let h = Harness::new();
        let mut wf = enabled(Workflow::new("Fan out", TriggerType::GroupJoined));
        for order in [3, 1, 2] {
            wf.actions.push(
                Action::new(ActionType::TriggerWebhook, order)
                    .with_config(json!({"url": "https://hooks.test/x", "body": {"n": order}})),
            );
        }
        // Order 0 fails: no member reference on the trigger.
        wf.actions.push(
            Action::new(ActionType::AssignToGroup, 0).with_config(json!({"group_id": "g1"})),
        );
        h.save(&wf).await;

        let trigger = TriggerContext::new(TriggerType::GroupJoined).with_group("g1");
        let result = h.runner.run(&wf, &trigger).await.unwrap();

        let actions = h.action_executions(result.execution_id).await;
        let statuses: Vec<_> = actions.iter().map(|a| (a.action_order, a.status)).collect();
        assert_eq!(
            statuses,
            vec![
                (0, ActionExecutionStatus::Failed),
                (1, ActionExecutionStatus::Completed),
                (2, ActionExecutionStatus::Completed),
                (3, ActionExecutionStatus::Completed),
            ]
        );
        let bodies: Vec<_> = h
            .fakes
            .webhook_requests()
            .into_iter()
            .map(|r| r.body.unwrap()["n"].clone())
            .collect();
        assert_eq!(bodies, vec![json!(1), json!(2), json!(3)]);
    }

    #[tokio::test]
    async fn empty_workflow_completes_trivially() {
        let h = Harness::new();
        let wf = enabled(Workflow::new("Nothing", TriggerType::MemberUpdated));
        h.save(&wf).await;

        let trigger = TriggerContext::new(TriggerType::MemberUpdated);
        let result = h.runner.run(&wf, &trigger).await.unwrap();

        assert!(result.is_completed());
        assert!(h.action_executions(result.execution_id).await.is_empty());
    }

    #[tokio::test]
    async fn unregistered_action_type_is_recorded_as_failure() {
        let h = Harness::with_registry(ActionHandlerRegistry::new());
        let mut wf = enabled(Workflow::new("Bare", TriggerType::MemberCreated));
        wf.actions.push(Action::new(ActionType::CreateTask, 1));
        h.save(&wf).await;

        let result = h.runner.run(&wf, &member_created("m1")).await.unwrap();

        let actions = h.action_executions(result.execution_id).await;
        assert_eq!(actions[0].status, ActionExecutionStatus::Failed);
        assert_eq!(actions[0].error_kind, Some(ActionErrorKind::Unknown));
        assert!(result.is_completed());
    }

    #[tokio::test]
    async fn audit_failure_mid_run_is_fatal() {
        let h = Harness::new();
        h.fakes.add_member("m1", "Ruth", Some("ruth@example.org"), None);
        let wf = welcome_email();
        h.save(&wf).await;
        // Execution row and the action row succeed; the next write fails.
        h.repo.fail_writes_after(2);

        let err = h.runner.run(&wf, &member_created("m1")).await.unwrap_err();
        assert!(matches!(err, RunnerError::Recorder(_)));
    }

    #[tokio::test]
    async fn delayed_action_suspends_until_resumed() {
        let h = Harness::new();
        h.fakes.add_member("m1", "Ruth", None, Some("+15550100"));
        let mut wf = enabled(Workflow::new("Follow up", TriggerType::EventCheckedIn));
        wf.actions.push(
            Action::new(ActionType::SendSms, 1)
                .with_delay_secs(300)
                .with_config(json!({"body": "How was your visit?"})),
        );
        h.save(&wf).await;

        let trigger = TriggerContext::new(TriggerType::EventCheckedIn).with_member("m1");
        let result = h.runner.run(&wf, &trigger).await.unwrap();
        assert!(matches!(result.outcome, RunOutcome::Suspended(_)));

        assert_eq!(h.execution(result.execution_id).await.status, ExecutionStatus::Running);
        let actions = h.action_executions(result.execution_id).await;
        assert_eq!(actions[0].status, ActionExecutionStatus::Waiting);
        assert!(h.fakes.sent(Channel::Sms).is_empty());

        let due = h.claim_due_in_minutes(6).await;
        assert_eq!(due.len(), 1);
        let resumed = h.runner.resume(&due[0]).await.unwrap();
        assert!(resumed.is_completed());

        assert_eq!(h.execution(result.execution_id).await.status, ExecutionStatus::Completed);
        let actions = h.action_executions(result.execution_id).await;
        assert_eq!(actions[0].status, ActionExecutionStatus::Completed);
        assert_eq!(h.fakes.sent(Channel::Sms).len(), 1);

        // A duplicate resumption is ignored.
        let again = h.runner.resume(&due[0]).await.unwrap();
        assert_eq!(again.outcome, RunOutcome::Stale);
        assert_eq!(h.fakes.sent(Channel::Sms).len(), 1);
    }

    fn delayed_then_immediate() -> Workflow {
        let mut wf = enabled(Workflow::new("Drip", TriggerType::MemberCreated));
        wf.actions.push(
            Action::new(ActionType::SendNotification, 1)
                .with_delay_secs(60)
                .with_config(json!({"body": "Day one"})),
        );
        wf.actions.push(
            Action::new(ActionType::SendNotification, 2).with_config(json!({"body": "Right after"})),
        );
        wf
    }

    #[tokio::test]
    async fn paused_workflow_still_delivers_by_default() {
        let h = Harness::new();
        h.fakes.add_member("m1", "Ruth", None, None);
        let mut wf = delayed_then_immediate();
        h.save(&wf).await;
        h.runner.run(&wf, &member_created("m1")).await.unwrap();

        wf.is_active = false;
        wf.status = WorkflowStatus::Paused;
        h.save(&wf).await;

        let due = h.claim_due_in_minutes(2).await;
        let result = h.runner.resume(&due[0]).await.unwrap();
        assert!(result.is_completed());
        assert_eq!(h.fakes.sent(Channel::Notification).len(), 2);
    }

    #[tokio::test]
    async fn paused_workflow_skips_remaining_under_skip_policy() {
        let h = Harness::with_policy(InactiveResumePolicy::Skip);
        h.fakes.add_member("m1", "Ruth", None, None);
        let mut wf = delayed_then_immediate();
        h.save(&wf).await;
        let started = h.runner.run(&wf, &member_created("m1")).await.unwrap();

        wf.is_active = false;
        h.save(&wf).await;

        let due = h.claim_due_in_minutes(2).await;
        let result = h.runner.resume(&due[0]).await.unwrap();
        assert!(result.is_completed());

        let actions = h.action_executions(started.execution_id).await;
        assert_eq!(actions.len(), 2);
        assert!(actions.iter().all(|a| a.status == ActionExecutionStatus::Skipped));
        assert!(h.fakes.sent(Channel::Notification).is_empty());
    }

    #[tokio::test]
    async fn deleted_workflow_fails_waiting_execution() {
        let h = Harness::new();
        let wf = delayed_then_immediate();
        h.save(&wf).await;
        let started = h.runner.run(&wf, &member_created("m1")).await.unwrap();

        h.repo.delete_workflow(&wf.id).await.unwrap();

        let due = h.claim_due_in_minutes(2).await;
        let err = h.runner.resume(&due[0]).await.unwrap_err();
        assert!(matches!(err, RunnerError::DefinitionInvalid(_)));

        let execution = h.execution(started.execution_id).await;
        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert!(execution.error.unwrap().contains("deleted"));
        let actions = h.action_executions(started.execution_id).await;
        assert_eq!(actions[0].status, ActionExecutionStatus::Failed);
    }

    #[tokio::test]
    async fn out_of_range_delay_fails_the_execution_with_terminal_actions() {
        let h = Harness::new();
        h.fakes.add_member("m1", "Ruth", None, None);
        let mut wf = enabled(Workflow::new("Someday", TriggerType::MemberCreated));
        wf.actions.push(
            Action::new(ActionType::SendNotification, 1)
                .with_delay_secs(10_000_000_000_000)
                .with_config(json!({"body": "Eventually"})),
        );
        h.save(&wf).await;

        let report = h.dispatcher.dispatch_and_wait(member_created("m1")).await;
        assert_eq!(report.matched, 1);
        assert_eq!(report.failed, 1);

        let executions = h.repo.list_executions(Some(&wf.id), 10).await.unwrap();
        assert_eq!(executions.len(), 1);
        let execution = &executions[0];
        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert!(execution.error.as_deref().unwrap().contains("exceeds the maximum"));
        let actions = h.action_executions(execution.id).await;
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].status, ActionExecutionStatus::Failed);
        assert!(h.pending_delays().await.is_empty());
        assert!(h.fakes.sent(Channel::Notification).is_empty());
    }

    #[tokio::test]
    async fn events_trace_the_execution() {
        let h = Harness::new();
        let mut rx = h.runner.events().subscribe();
        let wf = welcome_email();
        h.save(&wf).await;

        h.runner.run(&wf, &member_created("nobody")).await.unwrap();

        assert!(matches!(rx.recv().await.unwrap(), EngineEvent::ExecutionStarted { .. }));
        assert!(matches!(rx.recv().await.unwrap(), EngineEvent::ActionFailed { .. }));
        match rx.recv().await.unwrap() {
            EngineEvent::ExecutionCompleted { actions_failed, actions_completed, .. } => {
                assert_eq!(actions_failed, 1);
                assert_eq!(actions_completed, 0);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
