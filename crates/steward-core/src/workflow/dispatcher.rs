//! Workflow dispatcher: the engine's inbound boundary.
//!
//! `dispatch` is fire-and-forget for the business operation that raised the
//! trigger: it spawns the matching-and-execution work and returns at once.
//! Every matching workflow runs in its own task, and whatever goes wrong in one
//! (an error or a panic) is logged here and goes no further.
//!
//! The dispatcher also owns the delay worker loop that resumes suspended
//! executions when their delayed action falls due.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use steward_types::error::RepositoryError;
use steward_types::trigger::TriggerContext;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::repository::delay::DelayRepository;
use crate::repository::workflow::WorkflowRepository;

use super::runner::{RunOutcome, RunnerError, WorkflowRunner};

/// Summary of one dispatch, for callers that choose to wait on it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub matched: usize,
    pub completed: usize,
    pub suspended: usize,
    pub failed: usize,
    pub execution_ids: Vec<Uuid>,
}

pub struct WorkflowDispatcher<R: WorkflowRepository, Q: DelayRepository> {
    runner: Arc<WorkflowRunner<R, Q>>,
}

impl<R: WorkflowRepository, Q: DelayRepository> Clone for WorkflowDispatcher<R, Q> {
    fn clone(&self) -> Self {
        Self {
            runner: Arc::clone(&self.runner),
        }
    }
}

impl<R, Q> WorkflowDispatcher<R, Q>
where
    R: WorkflowRepository + 'static,
    Q: DelayRepository + 'static,
{
    pub fn new(runner: Arc<WorkflowRunner<R, Q>>) -> Self {
        Self { runner }
    }

    pub fn runner(&self) -> &Arc<WorkflowRunner<R, Q>> {
        &self.runner
    }

    /// Start every workflow matching `trigger` and return immediately.
    ///
    /// The handle may be dropped; the work continues in the background.
    pub fn dispatch(&self, trigger: TriggerContext) -> JoinHandle<DispatchReport> {
        let this = self.clone();
        tokio::spawn(async move { this.dispatch_and_wait(trigger).await })
    }

    /// Run every workflow matching `trigger` concurrently and wait for all of
    /// them to complete or suspend. Never fails; failures are counted and logged.
    pub async fn dispatch_and_wait(&self, trigger: TriggerContext) -> DispatchReport {
        let mut report = DispatchReport::default();

        let workflows = match self
            .runner
            .recorder()
            .repo()
            .list_dispatchable(trigger.trigger_type)
            .await
        {
            Ok(workflows) => workflows,
            Err(e) => {
                tracing::error!(
                    trigger = %trigger.trigger_type,
                    error = %e,
                    "failed to load workflows for trigger"
                );
                return report;
            }
        };

        let workflows: Vec<_> = workflows
            .into_iter()
            .filter(|w| w.matches(trigger.trigger_type))
            .collect();
        if workflows.is_empty() {
            tracing::debug!(trigger = %trigger.trigger_type, "no active workflows match trigger");
            return report;
        }
        report.matched = workflows.len();

        let trigger = Arc::new(trigger);
        let mut set = JoinSet::new();
        for workflow in workflows {
            let runner = Arc::clone(&self.runner);
            let trigger = Arc::clone(&trigger);
            set.spawn(async move {
                let result = runner.run(&workflow, &trigger).await;
                (workflow.name, result)
            });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((_, Ok(result))) => {
                    report.execution_ids.push(result.execution_id);
                    match result.outcome {
                        RunOutcome::Completed => report.completed += 1,
                        RunOutcome::Suspended(_) => report.suspended += 1,
                        RunOutcome::Stale => {}
                    }
                }
                Ok((workflow, Err(e))) => {
                    report.failed += 1;
                    tracing::error!(workflow = %workflow, error = %e, "workflow execution failed");
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(error = %e, "workflow runner task aborted");
                }
            }
        }

        report
    }

    // -----------------------------------------------------------------------
    // Delay resumption
    // -----------------------------------------------------------------------

    /// Claim delays due at `now` and resume them concurrently.
    ///
    /// Rows are completed once handled. A resumption that failed on an audit
    /// write keeps its claim so lease recovery re-queues it. Returns the
    /// number of claimed rows.
    pub async fn resume_due(&self, now: DateTime<Utc>) -> Result<usize, RepositoryError> {
        let delays = Arc::clone(self.runner.delays());
        let due = delays.claim_due(now).await?;
        let claimed = due.len();

        let mut set = JoinSet::new();
        for delay in due {
            let runner = Arc::clone(&self.runner);
            set.spawn(async move {
                let result = runner.resume(&delay).await;
                (delay, result)
            });
        }

        while let Some(joined) = set.join_next().await {
            let (delay, result) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::error!(error = %e, "delay resumption task aborted");
                    continue;
                }
            };

            match result {
                Err(RunnerError::Recorder(e)) => {
                    tracing::error!(
                        delay_id = %delay.id,
                        execution_id = %delay.execution_id,
                        error = %e,
                        "delayed action could not be audited, leaving claim for recovery"
                    );
                    continue;
                }
                Err(e) => tracing::error!(
                    delay_id = %delay.id,
                    execution_id = %delay.execution_id,
                    error = %e,
                    "delayed action resumption failed"
                ),
                Ok(_) => {}
            }

            if let Err(e) = delays.complete(&delay.id).await {
                tracing::warn!(delay_id = %delay.id, error = %e, "failed to remove handled delay");
            }
        }

        Ok(claimed)
    }

    /// Resume due delays until `cancel` fires.
    ///
    /// Stale claims from a previous process are re-queued first.
    pub async fn run_delay_worker(&self, cancel: CancellationToken) {
        let delays = Arc::clone(self.runner.delays());
        if let Err(e) = delays.recover_stale(Utc::now()).await {
            tracing::warn!(error = %e, "failed to recover stale delay claims");
        }
        tracing::info!(
            poll_interval_ms = delays.settings().poll_interval.as_millis() as u64,
            "delay worker started"
        );

        loop {
            if cancel.is_cancelled() {
                break;
            }
            match self.resume_due(Utc::now()).await {
                Ok(0) => {}
                Ok(n) => tracing::debug!(resumed = n, "resumed delayed actions"),
                Err(e) => tracing::warn!(error = %e, "failed to claim due delays"),
            }
            if !delays.wait_for_work(&cancel).await {
                break;
            }
        }

        tracing::info!("delay worker stopped");
    }

    pub fn spawn_delay_worker(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move { this.run_delay_worker(cancel).await })
    }
}
